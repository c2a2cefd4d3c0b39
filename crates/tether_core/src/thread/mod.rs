//! # Dedicated Thread
//!
//! A [`Thread`] owns one OS thread for its whole lifetime and hosts at most
//! one active [`Threadable`] at a time.
//!
//! ## Switching
//!
//! ```text
//!   caller                               scheduler loop
//!   ──────                               ──────────────
//!   set_active(x)
//!     x.try_claim(self)
//!     switch ───── Activate(x) ────────> deactivate(old)
//!     wait   <──── deactivate ack ──────
//!     old.set_thread(None)
//!                                        initialize(x) (first time only)
//!                                        activate(x)
//!     wait   <──── activate ack ────────
//!                                        serve x.commands()
//! ```
//!
//! [`Thread::set_active`] is the only way a Threadable moves between threads.
//! Switches on one thread are serialized: the next request is accepted only
//! after both acknowledgements of the previous one. Queries such as
//! [`Thread::active`] never wait for a switch in progress.
//!
//! ## Blocking
//!
//! Nothing here times out. Calling [`Thread::set_active`], [`Thread::close`]
//! or [`Thread::join`] from inside a command running on the same thread
//! deadlocks.

mod scheduler;

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::error::{SchedulerError, SchedulerResult, ThreadError, ThreadErrorKind};
use crate::threadable::{same_threadable, ThreadableRef};

use scheduler::{Ack, CloseRequest, Scheduler, SwitchRequest};

thread_local! {
    static CURRENT: RefCell<Option<Thread>> = const { RefCell::new(None) };
}

/// Configuration for a dedicated thread.
#[derive(Clone, Debug)]
pub struct ThreadConfig {
    /// Name given to the OS thread.
    pub name: String,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            name: "tether-thread".to_string(),
        }
    }
}

impl ThreadConfig {
    /// Creates a config with the given thread name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Caller-side view of the last requested switch.
///
/// Only ever locked to read or write a field, never across a handshake.
struct Snapshot {
    current: Option<ThreadableRef>,
    closed: bool,
}

struct ThreadInner {
    name: String,
    switches: Sender<SwitchRequest>,
    closes: Sender<CloseRequest>,
    deactivated: Receiver<Ack>,
    activated: Receiver<Ack>,
    /// Held for the whole handshake of one switch.
    switching: Mutex<()>,
    snapshot: Mutex<Snapshot>,
    force_closed: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to a dedicated scheduler thread.
///
/// Cloning the handle is cheap; all clones refer to the same OS thread.
/// Equality is identity.
#[derive(Clone)]
pub struct Thread {
    inner: Arc<ThreadInner>,
}

impl Thread {
    /// Spawns a new dedicated thread running an idle scheduler loop.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Spawn`] if the OS thread cannot be created.
    pub fn spawn(config: ThreadConfig) -> SchedulerResult<Self> {
        let (switch_tx, switch_rx) = bounded(0);
        let (close_tx, close_rx) = unbounded();
        let (deactivate_tx, deactivate_rx) = bounded(0);
        let (activate_tx, activate_rx) = bounded(0);

        let thread = Self {
            inner: Arc::new(ThreadInner {
                name: config.name.clone(),
                switches: switch_tx,
                closes: close_tx,
                deactivated: deactivate_rx,
                activated: activate_rx,
                switching: Mutex::new(()),
                snapshot: Mutex::new(Snapshot {
                    current: None,
                    closed: false,
                }),
                force_closed: AtomicBool::new(false),
                handle: Mutex::new(None),
            }),
        };

        let scheduler = Scheduler::new(thread.clone(), switch_rx, close_rx, deactivate_tx, activate_tx);
        let handle = std::thread::Builder::new()
            .name(config.name)
            .spawn(move || scheduler.run())?;
        *thread.inner.handle.lock() = Some(handle);

        tracing::info!(thread = %thread.name(), "dedicated thread spawned");
        Ok(thread)
    }

    /// Returns the dedicated thread the caller is running on, or `None` when
    /// called from any other OS thread.
    #[must_use]
    pub fn current() -> Option<Self> {
        CURRENT.with(|current| current.borrow().clone())
    }

    /// Marks the calling OS thread as running `thread`'s loop.
    fn enter(thread: &Self) {
        CURRENT.with(|current| *current.borrow_mut() = Some(thread.clone()));
    }

    fn exit() {
        CURRENT.with(|current| current.borrow_mut().take());
    }

    /// Returns the OS thread name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Deactivates the current Threadable and activates `item`.
    ///
    /// Passing the currently active item does nothing. Passing `None` only
    /// deactivates.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::OwnedElsewhere`] / [`SchedulerError::Closed`] if
    ///   `item` cannot be taken; nothing is changed.
    /// - [`SchedulerError::ThreadClosed`] after [`close`](Self::close).
    /// - [`SchedulerError::Activate`] if `item` failed to initialize or
    ///   activate. It has been closed.
    /// - [`SchedulerError::Deactivate`] if the previous item failed to
    ///   deactivate, or a fatal command error was pending for it. A fatal
    ///   one means the previous item has been closed.
    pub fn set_active(&self, item: Option<ThreadableRef>) -> SchedulerResult<()> {
        let _switching = self.inner.switching.lock();
        self.switch(item)
    }

    /// Runs one switch. Callers hold `switching`.
    fn switch(&self, item: Option<ThreadableRef>) -> SchedulerResult<()> {
        let unchanged = match (&self.active(), &item) {
            (Some(current), Some(next)) => same_threadable(current, next),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return Ok(());
        }

        let closed = self.is_closed();
        match &item {
            Some(next) => {
                if !next.try_claim(self) {
                    return Err(SchedulerError::OwnedElsewhere);
                }
                let refused = if next.is_closed() {
                    Some(SchedulerError::Closed)
                } else if closed {
                    Some(SchedulerError::ThreadClosed)
                } else {
                    None
                };
                if let Some(err) = refused {
                    next.set_thread(None);
                    return Err(err);
                }
            }
            None if closed => return Err(SchedulerError::ThreadClosed),
            None => {}
        }

        let previous = std::mem::replace(&mut self.inner.snapshot.lock().current, item.clone());

        tracing::debug!(
            thread = %self.name(),
            previous = previous.is_some(),
            next = item.is_some(),
            "switching active threadable"
        );

        if self.inner.switches.send(SwitchRequest::Activate(item.clone())).is_err() {
            self.inner.snapshot.lock().current = None;
            for stale in previous.iter().chain(item.iter()) {
                stale.set_thread(None);
            }
            return Err(SchedulerError::ThreadClosed);
        }

        let mut outcome = Ok(());
        // The previous item keeps its affinity until the loop is done with it,
        // and a broken one is closed before anyone else can claim it.
        let deactivated = self.await_ack(&self.inner.deactivated, previous.as_ref());
        if let Some(prev) = &previous {
            if deactivated.as_ref().is_some_and(ThreadError::is_fatal) {
                prev.close();
            }
            prev.set_thread(None);
        }
        if let Some(err) = deactivated {
            outcome = Err(SchedulerError::Deactivate(err));
        }

        if let Some(err) = self.await_ack(&self.inner.activated, item.as_ref()) {
            self.inner.snapshot.lock().current = None;
            if let Some(next) = &item {
                next.close();
                next.set_thread(None);
            }
            return Err(SchedulerError::Activate(err));
        }

        outcome
    }

    /// Waits for one acknowledgement. A vanished loop counts as a fatal
    /// failure of `item`.
    fn await_ack(&self, acks: &Receiver<Ack>, item: Option<&ThreadableRef>) -> Ack {
        acks.recv().unwrap_or_else(|_| {
            tracing::error!(thread = %self.name(), "scheduler loop exited during a switch");
            let err = ThreadError::new(
                ThreadErrorKind::Disconnected,
                "scheduler loop exited during a switch",
                true,
            );
            if let Some(item) = item {
                item.report_error(err.clone());
            }
            Some(err)
        })
    }

    fn is_active_here(&self, item: &ThreadableRef) -> bool {
        self.inner
            .snapshot
            .lock()
            .current
            .as_ref()
            .is_some_and(|current| same_threadable(current, item))
    }

    /// Deactivates `item` if it is the active Threadable here. Does nothing
    /// otherwise, including while a switch away from `item` is in progress.
    ///
    /// # Errors
    ///
    /// Same as [`set_active`](Self::set_active) with `None`.
    pub fn release(&self, item: &ThreadableRef) -> SchedulerResult<()> {
        if !self.is_active_here(item) {
            return Ok(());
        }
        let _switching = self.inner.switching.lock();
        if !self.is_active_here(item) {
            return Ok(());
        }
        self.switch(None)
    }

    /// Returns the active Threadable, or the target of a switch in progress.
    #[must_use]
    pub fn active(&self) -> Option<ThreadableRef> {
        self.inner.snapshot.lock().current.clone()
    }

    /// Asks the loop to run `item`'s thread-side teardown.
    ///
    /// Asynchronous: returns immediately, teardown happens on this thread's
    /// loop. Ignored if `item` was never initialized here.
    pub fn close_threadable(&self, item: ThreadableRef) {
        if self.inner.closes.send(CloseRequest::Item(item)).is_err() {
            tracing::warn!(thread = %self.name(), "close request after scheduler exit");
        }
    }

    /// Deactivates the current Threadable and stops accepting activations.
    ///
    /// The loop keeps serving close requests and exits once every Threadable
    /// it initialized has been torn down. Idempotent.
    pub fn close(&self) {
        let _switching = self.inner.switching.lock();
        if self.is_closed() {
            return;
        }

        if let Err(err) = self.switch(None) {
            tracing::warn!(thread = %self.name(), error = %err, "deactivation on close failed");
        }
        self.inner.snapshot.lock().closed = true;

        // Ignored if the loop already exited after a forced drain.
        let _ = self.inner.switches.send(SwitchRequest::Shutdown);
        tracing::info!(thread = %self.name(), "thread closed");
    }

    /// [`close`](Self::close), then tears down every Threadable still
    /// initialized on this thread without waiting for close requests.
    ///
    /// Last resort: other consumers may still depend on those resources.
    /// Irreversible.
    pub fn force_close(&self) {
        self.close();
        if self.inner.force_closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.inner.closes.send(CloseRequest::ForceAll);
        tracing::warn!(thread = %self.name(), "thread force closed");
    }

    /// Returns true once [`close`](Self::close) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.snapshot.lock().closed
    }

    /// Blocks until the scheduler loop has exited.
    ///
    /// Only returns after [`close`](Self::close) and the teardown of every
    /// Threadable initialized here. No-op on subsequent calls.
    pub fn join(&self) {
        let handle = self.inner.handle.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == std::thread::current().id() {
                *self.inner.handle.lock() = Some(handle);
                return;
            }
            if handle.join().is_err() {
                tracing::error!(thread = %self.name(), "scheduler loop panicked");
            }
        }
    }
}

impl PartialEq for Thread {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Thread {}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread").field("name", &self.inner.name).finish()
    }
}

#[cfg(test)]
mod tests;
