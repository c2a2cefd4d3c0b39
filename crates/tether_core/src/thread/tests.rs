use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;

use super::*;
use crate::threadable::{Command, Threadable};

const WAIT: Duration = Duration::from_secs(5);

/// Minimal Threadable that counts its lifecycle hooks.
struct Probe {
    me: Weak<Probe>,
    commands_tx: Sender<Command>,
    commands_rx: Receiver<Command>,
    errors_tx: Sender<ThreadError>,
    errors_rx: Receiver<ThreadError>,
    thread: Mutex<Option<Thread>>,
    initial: Mutex<Option<Thread>>,
    closed: AtomicBool,
    inits: AtomicUsize,
    activations: AtomicUsize,
    deactivations: AtomicUsize,
    teardowns: AtomicUsize,
    /// Whether the item was already closed when it last lost its owner.
    closed_when_released: AtomicBool,
    fail_init: Mutex<Option<ThreadError>>,
    fail_activate: Mutex<Option<ThreadError>>,
    fail_deactivate: Mutex<Option<ThreadError>>,
}

impl Probe {
    fn new() -> Arc<Self> {
        let (commands_tx, commands_rx) = bounded(0);
        let (errors_tx, errors_rx) = unbounded();
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            commands_tx,
            commands_rx,
            errors_tx,
            errors_rx,
            thread: Mutex::new(None),
            initial: Mutex::new(None),
            closed: AtomicBool::new(false),
            inits: AtomicUsize::new(0),
            activations: AtomicUsize::new(0),
            deactivations: AtomicUsize::new(0),
            teardowns: AtomicUsize::new(0),
            closed_when_released: AtomicBool::new(false),
            fail_init: Mutex::new(None),
            fail_activate: Mutex::new(None),
            fail_deactivate: Mutex::new(None),
        })
    }

    fn submit(&self, f: impl FnOnce(&Thread, &dyn Threadable) -> Result<(), ThreadError> + Send + 'static) {
        self.commands_tx.send(Box::new(f)).unwrap();
    }

    fn next_error(&self) -> ThreadError {
        self.errors_rx.recv_timeout(WAIT).unwrap()
    }
}

impl Threadable for Probe {
    fn is_initialized(&self) -> bool {
        self.initial.lock().is_some()
    }

    fn initialize(&self, thread: &Thread) -> Result<(), ThreadError> {
        if let Some(err) = self.fail_init.lock().take() {
            return Err(err);
        }
        self.inits.fetch_add(1, Ordering::SeqCst);
        *self.initial.lock() = Some(thread.clone());
        Ok(())
    }

    fn teardown(&self, _thread: &Thread) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
    }

    fn activate(&self, _thread: &Thread) -> Result<(), ThreadError> {
        if let Some(err) = self.fail_activate.lock().take() {
            return Err(err);
        }
        self.activations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn deactivate(&self, _thread: &Thread) -> Result<(), ThreadError> {
        if let Some(err) = self.fail_deactivate.lock().take() {
            return Err(err);
        }
        self.deactivations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn commands(&self) -> Receiver<Command> {
        self.commands_rx.clone()
    }

    fn report_error(&self, err: ThreadError) {
        let _ = self.errors_tx.send(err);
    }

    fn set_thread(&self, thread: Option<Thread>) {
        if thread.is_none() {
            self.closed_when_released.store(self.is_closed(), Ordering::SeqCst);
        }
        *self.thread.lock() = thread;
    }

    fn try_claim(&self, thread: &Thread) -> bool {
        let mut owner = self.thread.lock();
        if owner.is_some() {
            return false;
        }
        *owner = Some(thread.clone());
        true
    }

    fn thread(&self) -> Option<Thread> {
        self.thread.lock().clone()
    }

    fn close(&self) {
        if self.is_closed() {
            return;
        }
        let me = self.me.upgrade().map(|me| me as ThreadableRef);
        if let (Some(owner), Some(me)) = (self.thread(), &me) {
            let _ = owner.release(me);
        }
        if self.is_closed() {
            return;
        }
        let initial = self.initial.lock().clone();
        if let (Some(initial), Some(me)) = (initial, me) {
            initial.close_threadable(me);
        }
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn spawn(name: &str) -> Thread {
    Thread::spawn(ThreadConfig::named(name)).unwrap()
}

#[test]
fn test_activate_same_item_twice_is_noop() {
    let thread = spawn("noop");
    let probe = Probe::new();

    thread.set_active(Some(probe.clone())).unwrap();
    thread.set_active(Some(probe.clone())).unwrap();

    assert_eq!(probe.inits.load(Ordering::SeqCst), 1);
    assert_eq!(probe.activations.load(Ordering::SeqCst), 1);
    assert_eq!(probe.thread(), Some(thread.clone()));
    assert!(same_threadable(&thread.active().unwrap(), &(probe.clone() as ThreadableRef)));

    thread.set_active(None).unwrap();
    thread.set_active(None).unwrap();
    assert_eq!(probe.deactivations.load(Ordering::SeqCst), 1);
    assert!(probe.thread().is_none());
    thread.force_close();
    thread.join();
}

#[test]
fn test_item_owned_by_other_thread_is_refused() {
    let first = spawn("owner");
    let second = spawn("thief");
    let probe = Probe::new();

    first.set_active(Some(probe.clone())).unwrap();
    let err = second.set_active(Some(probe.clone())).unwrap_err();

    assert!(matches!(err, SchedulerError::OwnedElsewhere));
    assert_eq!(probe.thread(), Some(first.clone()));
    assert!(second.active().is_none());

    first.force_close();
    second.force_close();
    first.join();
    second.join();
}

#[test]
fn test_release_only_deactivates_the_named_item() {
    let thread = spawn("release");
    let active = Probe::new();
    let bystander = Probe::new();
    thread.set_active(Some(active.clone())).unwrap();

    thread.release(&(bystander.clone() as ThreadableRef)).unwrap();
    assert_eq!(active.deactivations.load(Ordering::SeqCst), 0);
    assert_eq!(active.thread(), Some(thread.clone()));

    thread.release(&(active.clone() as ThreadableRef)).unwrap();
    assert_eq!(active.deactivations.load(Ordering::SeqCst), 1);
    assert!(active.thread().is_none());
    assert!(thread.active().is_none());

    thread.force_close();
    thread.join();
}

#[test]
fn test_closed_item_is_refused() {
    let thread = spawn("closed-item");
    let probe = Probe::new();
    probe.close();

    let err = thread.set_active(Some(probe.clone())).unwrap_err();
    assert!(matches!(err, SchedulerError::Closed));
    assert_eq!(probe.inits.load(Ordering::SeqCst), 0);

    thread.close();
    thread.join();
}

#[test]
fn test_initialization_happens_once_across_threads() {
    let first = spawn("init-a");
    let second = spawn("init-b");
    let probe = Probe::new();

    for _ in 0..3 {
        first.set_active(Some(probe.clone())).unwrap();
        first.set_active(None).unwrap();
        second.set_active(Some(probe.clone())).unwrap();
        second.set_active(None).unwrap();
    }

    assert_eq!(probe.inits.load(Ordering::SeqCst), 1);
    assert_eq!(probe.activations.load(Ordering::SeqCst), 6);
    assert_eq!(probe.deactivations.load(Ordering::SeqCst), 6);

    // Teardown is routed to the initializing thread.
    probe.close();
    first.close();
    second.close();
    first.join();
    second.join();
    assert_eq!(probe.teardowns.load(Ordering::SeqCst), 1);
}

#[test]
fn test_commands_run_in_submission_order() {
    let thread = spawn("ordering");
    let probe = Probe::new();
    thread.set_active(Some(probe.clone())).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    for i in 0..100 {
        let seen = Arc::clone(&seen);
        probe.submit(move |_, _| {
            seen.lock().push(i);
            Ok(())
        });
    }

    let (done_tx, done_rx) = bounded(1);
    probe.submit(move |_, _| {
        done_tx.send(()).unwrap();
        Ok(())
    });
    done_rx.recv_timeout(WAIT).unwrap();

    assert_eq!(*seen.lock(), (0..100).collect::<Vec<_>>());
    thread.force_close();
    thread.join();
}

#[test]
fn test_command_sees_owning_thread_and_item() {
    let thread = spawn("observer");
    let probe = Probe::new();
    thread.set_active(Some(probe.clone())).unwrap();

    let expected = thread.clone();
    let (tx, rx) = bounded(1);
    probe.submit(move |t, item| {
        let on_thread = *t == expected;
        let owned = item.thread() == Some(expected.clone());
        let is_probe = item.as_any().downcast_ref::<Probe>().is_some();
        let current = Thread::current() == Some(expected.clone());
        tx.send(on_thread && owned && is_probe && current).unwrap();
        Ok(())
    });
    assert!(rx.recv_timeout(WAIT).unwrap());
    assert!(Thread::current().is_none());

    thread.force_close();
    thread.join();
}

#[test]
fn test_non_fatal_command_error_keeps_item_active() {
    let thread = spawn("non-fatal");
    let probe = Probe::new();
    thread.set_active(Some(probe.clone())).unwrap();

    probe.submit(|_, _| Err(ThreadError::recoverable("vsync unsupported")));
    assert_eq!(probe.next_error(), ThreadError::recoverable("vsync unsupported"));

    // Still being served.
    let (tx, rx) = bounded(1);
    probe.submit(move |_, _| {
        tx.send(()).unwrap();
        Ok(())
    });
    rx.recv_timeout(WAIT).unwrap();

    assert!(probe.errors_rx.try_recv().is_err());
    assert_eq!(probe.thread(), Some(thread.clone()));
    assert!(!probe.is_closed());

    thread.force_close();
    thread.join();
}

#[test]
fn test_fatal_command_error_surfaces_on_next_switch() {
    let thread = spawn("fatal");
    let probe = Probe::new();
    thread.set_active(Some(probe.clone())).unwrap();

    let fatal = ThreadError::fatal("device lost");
    let returned = fatal.clone();
    probe.submit(move |_, _| Err(returned));
    assert_eq!(probe.next_error(), fatal);

    let err = thread.set_active(None).unwrap_err();
    match err {
        SchedulerError::Deactivate(inner) => assert_eq!(inner, fatal),
        other => panic!("unexpected error: {other}"),
    }
    assert!(probe.is_closed());
    // Closed before its owner let go, so nobody could claim it in between.
    assert!(probe.closed_when_released.load(Ordering::SeqCst));
    assert!(probe.thread().is_none());
    // The broken item is never asked to deactivate.
    assert_eq!(probe.deactivations.load(Ordering::SeqCst), 0);

    thread.close();
    thread.join();
    assert_eq!(probe.teardowns.load(Ordering::SeqCst), 1);
}

#[test]
fn test_panicking_command_is_fatal() {
    let thread = spawn("panic");
    let probe = Probe::new();
    thread.set_active(Some(probe.clone())).unwrap();

    probe.submit(|_, _| panic!("bad command"));
    let err = probe.next_error();
    assert!(err.is_fatal());

    assert!(matches!(thread.set_active(None), Err(SchedulerError::Deactivate(_))));
    assert!(probe.is_closed());
    thread.close();
    thread.join();
}

#[test]
fn test_activation_failure_closes_item() {
    let thread = spawn("activate-fail");
    let probe = Probe::new();
    *probe.fail_activate.lock() = Some(ThreadError::fatal("make current failed"));

    let err = thread.set_active(Some(probe.clone())).unwrap_err();
    assert!(matches!(err, SchedulerError::Activate(ref e) if e.message() == "make current failed"));

    // Dual delivery: returned and reported.
    assert_eq!(probe.next_error().message(), "make current failed");
    assert!(probe.is_closed());
    assert!(probe.thread().is_none());
    assert!(thread.active().is_none());

    thread.close();
    thread.join();
    assert_eq!(probe.inits.load(Ordering::SeqCst), 1);
    assert_eq!(probe.teardowns.load(Ordering::SeqCst), 1);
}

#[test]
fn test_initialization_failure_leaves_nothing_to_tear_down() {
    let thread = spawn("init-fail");
    let probe = Probe::new();
    *probe.fail_init.lock() = Some(ThreadError::fatal("no pixel format"));

    let err = thread.set_active(Some(probe.clone())).unwrap_err();
    assert!(matches!(err, SchedulerError::Activate(_)));
    assert!(probe.is_closed());
    assert!(!probe.is_initialized());

    thread.close();
    thread.join();
    assert_eq!(probe.teardowns.load(Ordering::SeqCst), 0);
}

#[test]
fn test_deactivation_failure_is_returned_and_fatal_closes() {
    let thread = spawn("deactivate-fail");
    let recoverable = Probe::new();
    let broken = Probe::new();

    thread.set_active(Some(recoverable.clone())).unwrap();
    *recoverable.fail_deactivate.lock() = Some(ThreadError::recoverable("flush slow"));
    let err = thread.set_active(Some(broken.clone())).unwrap_err();
    assert!(matches!(err, SchedulerError::Deactivate(ref e) if !e.is_fatal()));
    assert!(!recoverable.is_closed());
    // The switch itself went through.
    assert_eq!(broken.thread(), Some(thread.clone()));

    *broken.fail_deactivate.lock() = Some(ThreadError::fatal("context lost"));
    let err = thread.set_active(None).unwrap_err();
    assert!(matches!(err, SchedulerError::Deactivate(ref e) if e.is_fatal()));
    assert!(broken.is_closed());
    assert!(broken.closed_when_released.load(Ordering::SeqCst));
    assert!(!recoverable.closed_when_released.load(Ordering::SeqCst));

    recoverable.close();
    thread.close();
    thread.join();
    assert_eq!(broken.teardowns.load(Ordering::SeqCst), 1);
    assert_eq!(recoverable.teardowns.load(Ordering::SeqCst), 1);
}

#[test]
fn test_close_blocks_activation_but_serves_pending_teardown() {
    let thread = spawn("graceful");
    let probe = Probe::new();
    thread.set_active(Some(probe.clone())).unwrap();

    thread.close();
    assert!(thread.is_closed());
    assert!(probe.thread().is_none());

    let late = Probe::new();
    assert!(matches!(thread.set_active(Some(late)), Err(SchedulerError::ThreadClosed)));

    // The loop is still alive, waiting for the probe's close request.
    assert_eq!(probe.teardowns.load(Ordering::SeqCst), 0);
    probe.close();
    thread.join();
    assert_eq!(probe.teardowns.load(Ordering::SeqCst), 1);
}

#[test]
fn test_force_close_tears_down_remaining_items() {
    let thread = spawn("forced");
    let first = Probe::new();
    let second = Probe::new();
    thread.set_active(Some(first.clone())).unwrap();
    thread.set_active(Some(second.clone())).unwrap();

    thread.force_close();
    thread.force_close();
    thread.join();

    assert_eq!(first.teardowns.load(Ordering::SeqCst), 1);
    assert_eq!(second.teardowns.load(Ordering::SeqCst), 1);
    assert!(!first.is_closed());
}

#[test]
fn test_duplicate_close_requests_tear_down_once() {
    let thread = spawn("double-close");
    let probe = Probe::new();
    thread.set_active(Some(probe.clone())).unwrap();
    thread.set_active(None).unwrap();

    thread.close_threadable(probe.clone());
    thread.close_threadable(probe.clone());
    thread.close();
    thread.join();

    assert_eq!(probe.teardowns.load(Ordering::SeqCst), 1);
}

#[test]
fn test_queries_from_a_command_do_not_wait_for_a_pending_switch() {
    let thread = spawn("query");
    let probe = Probe::new();
    thread.set_active(Some(probe.clone())).unwrap();

    let (started_tx, started_rx) = bounded(0);
    let (seen_tx, seen_rx) = bounded(1);
    probe.submit(move |thread, _| {
        started_tx.send(()).unwrap();
        // Long enough for the switcher below to block on the handshake.
        std::thread::sleep(Duration::from_millis(100));
        seen_tx.send((thread.active().is_some(), thread.is_closed())).unwrap();
        Ok(())
    });
    started_rx.recv_timeout(WAIT).unwrap();

    let switcher = {
        let thread = thread.clone();
        std::thread::spawn(move || thread.set_active(None))
    };

    let (_, closed) = seen_rx.recv_timeout(WAIT).unwrap();
    assert!(!closed);
    switcher.join().unwrap().unwrap();
    assert!(thread.active().is_none());
    assert_eq!(probe.deactivations.load(Ordering::SeqCst), 1);

    probe.close();
    thread.close();
    thread.join();
}

#[test]
fn test_close_request_for_active_item_waits_until_it_leaves() {
    let thread = spawn("close-active");
    let probe = Probe::new();
    thread.set_active(Some(probe.clone())).unwrap();

    thread.close_threadable(probe.clone());

    // The loop picks ready queues at random; a few round trips make sure the
    // close request has been seen while the item is still being served.
    for _ in 0..16 {
        let (tx, rx) = bounded(1);
        probe.submit(move |_, _| {
            tx.send(()).unwrap();
            Ok(())
        });
        rx.recv_timeout(WAIT).unwrap();
    }
    assert_eq!(probe.teardowns.load(Ordering::SeqCst), 0);
    assert!(same_threadable(&thread.active().unwrap(), &(probe.clone() as ThreadableRef)));

    thread.set_active(None).unwrap();
    assert_eq!(probe.deactivations.load(Ordering::SeqCst), 1);

    thread.close();
    thread.join();
    assert_eq!(probe.teardowns.load(Ordering::SeqCst), 1);
}
