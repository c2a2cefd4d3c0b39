//! # Scheduler Loop
//!
//! Runs on the dedicated OS thread for its whole life. The loop is an
//! explicit state machine:
//!
//! ```text
//!            switch(None)                 activate ok
//!   ┌──────┐ ─────────────> ┌────────────┐ ──────────> ┌─────────┐
//!   │ Idle │                │ Activating │             │ Serving │──┐ command
//!   └──────┘ <───────────── └────────────┘ <────────── └─────────┘<─┘
//!      │      init/activate    switch(Some)   switch / fatal command
//!      │      failed
//!      │ shutdown / force
//!      ▼
//!   ┌──────────┐
//!   │ Draining │ ──> tear down everything still initialized, exit
//!   └──────────┘
//! ```
//!
//! Three queues feed the loop: switch requests (rendezvous), close requests
//! (unbounded, never blocks the requester) and the active item's own
//! commands. Each switch is answered with exactly two acknowledgements, the
//! deactivation result for the previous item and then the activation result
//! for the new one.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crossbeam_channel::{never, select, Receiver, RecvError, Sender};

use crate::error::{ThreadError, ThreadErrorKind};
use crate::thread::Thread;
use crate::threadable::{same_threadable, threadable_key, Command, ThreadableRef};

/// Request to change the active Threadable.
pub(crate) enum SwitchRequest {
    /// Deactivate the current item and activate this one (`None` = nothing).
    Activate(Option<ThreadableRef>),
    /// Stop accepting switches and start draining.
    Shutdown,
}

/// Out-of-band request consumed by the loop.
pub(crate) enum CloseRequest {
    /// Run the thread-side teardown of a previously initialized item.
    Item(ThreadableRef),
    /// Tear down everything still initialized without waiting for requests.
    ForceAll,
}

/// Acknowledgement sent back to `set_active`. `None` means success.
pub(crate) type Ack = Option<ThreadError>;

enum Phase {
    Idle,
    Activating(ThreadableRef),
    Serving(ThreadableRef),
    Draining { forced: bool },
}

enum Event {
    Switch(Result<SwitchRequest, RecvError>),
    Close(Result<CloseRequest, RecvError>),
    Command(Result<Command, RecvError>),
}

pub(crate) struct Scheduler {
    thread: Thread,
    switches: Receiver<SwitchRequest>,
    closes: Receiver<CloseRequest>,
    deactivated: Sender<Ack>,
    activated: Sender<Ack>,
    /// Stand-in command queue while nothing is active.
    no_commands: Receiver<Command>,
    initialized: HashMap<usize, ThreadableRef>,
    /// Fatal command error waiting for the next switch away from its item.
    deferred: Option<ThreadError>,
    /// Close request for the active item, honored once it leaves.
    closing: Option<ThreadableRef>,
}

impl Scheduler {
    pub(crate) fn new(
        thread: Thread,
        switches: Receiver<SwitchRequest>,
        closes: Receiver<CloseRequest>,
        deactivated: Sender<Ack>,
        activated: Sender<Ack>,
    ) -> Self {
        Self {
            thread,
            switches,
            closes,
            deactivated,
            activated,
            no_commands: never(),
            initialized: HashMap::new(),
            deferred: None,
            closing: None,
        }
    }

    pub(crate) fn run(mut self) {
        Thread::enter(&self.thread);
        tracing::debug!(thread = %self.thread.name(), "scheduler started");

        let mut phase = Phase::Idle;
        loop {
            phase = match phase {
                Phase::Idle => self.idle(),
                Phase::Activating(item) => self.activate(item),
                Phase::Serving(item) => self.serve(item),
                Phase::Draining { forced } => {
                    self.drain(forced);
                    break;
                }
            };
        }

        tracing::debug!(thread = %self.thread.name(), "scheduler exited");
        Thread::exit();
    }

    fn next_event(&self, commands: &Receiver<Command>) -> Event {
        select! {
            recv(self.switches) -> msg => Event::Switch(msg),
            recv(self.closes) -> msg => Event::Close(msg),
            recv(commands) -> msg => Event::Command(msg),
        }
    }

    fn idle(&mut self) -> Phase {
        match self.next_event(&self.no_commands) {
            Event::Switch(Ok(SwitchRequest::Activate(next))) => {
                // Nothing to deactivate. A deferred fatal error answers in its place.
                let deferred = self.deferred.take();
                Self::acknowledge(&self.deactivated, deferred);
                self.begin(next)
            }
            Event::Switch(Ok(SwitchRequest::Shutdown) | Err(_)) => Phase::Draining { forced: false },
            Event::Close(Ok(CloseRequest::Item(item))) => {
                self.teardown(&item);
                Phase::Idle
            }
            Event::Close(Ok(CloseRequest::ForceAll) | Err(_)) => Phase::Draining { forced: true },
            Event::Command(_) => Phase::Idle,
        }
    }

    fn begin(&mut self, next: Option<ThreadableRef>) -> Phase {
        match next {
            Some(item) => Phase::Activating(item),
            None => {
                Self::acknowledge(&self.activated, None);
                Phase::Idle
            }
        }
    }

    fn activate(&mut self, item: ThreadableRef) -> Phase {
        if !item.is_initialized() {
            if let Err(err) = item.initialize(&self.thread) {
                tracing::warn!(thread = %self.thread.name(), error = %err, "initialization failed");
                item.report_error(err.clone());
                Self::acknowledge(&self.activated, Some(err));
                return Phase::Idle;
            }
            self.initialized.insert(threadable_key(&item), Arc::clone(&item));
        }

        if let Err(err) = item.activate(&self.thread) {
            tracing::warn!(thread = %self.thread.name(), error = %err, "activation failed");
            item.report_error(err.clone());
            Self::acknowledge(&self.activated, Some(err));
            return Phase::Idle;
        }

        Self::acknowledge(&self.activated, None);
        Phase::Serving(item)
    }

    fn serve(&mut self, item: ThreadableRef) -> Phase {
        let commands = item.commands();
        match self.next_event(&commands) {
            Event::Switch(Ok(SwitchRequest::Activate(next))) => {
                let result = item.deactivate(&self.thread);
                if let Err(err) = &result {
                    tracing::warn!(thread = %self.thread.name(), error = %err, "deactivation failed");
                    item.report_error(err.clone());
                }
                self.leave(&item);
                Self::acknowledge(&self.deactivated, result.err());
                self.begin(next)
            }
            Event::Switch(Ok(SwitchRequest::Shutdown) | Err(_)) => {
                self.retire(&item);
                self.leave(&item);
                Phase::Draining { forced: false }
            }
            Event::Close(Ok(CloseRequest::Item(other))) => {
                if same_threadable(&other, &item) {
                    tracing::warn!(
                        thread = %self.thread.name(),
                        "close requested for the active threadable, deferred until it leaves"
                    );
                    self.closing = Some(other);
                } else {
                    self.teardown(&other);
                }
                Phase::Serving(item)
            }
            Event::Close(Ok(CloseRequest::ForceAll) | Err(_)) => {
                self.retire(&item);
                Phase::Draining { forced: true }
            }
            Event::Command(Ok(command)) => self.execute(item, command),
            Event::Command(Err(_)) => {
                let err = ThreadError::new(
                    ThreadErrorKind::Disconnected,
                    "command queue disconnected",
                    true,
                );
                item.report_error(err.clone());
                self.deferred = Some(err);
                self.leave(&item);
                Phase::Idle
            }
        }
    }

    fn execute(&mut self, item: ThreadableRef, command: Command) -> Phase {
        let thread = &self.thread;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| command(thread, item.as_ref())))
            .unwrap_or_else(|_| Err(ThreadError::fatal("command panicked")));

        match outcome {
            Ok(()) => Phase::Serving(item),
            Err(err) => {
                item.report_error(err.clone());
                if !err.is_fatal() {
                    return Phase::Serving(item);
                }
                // The resource is considered broken: no deactivate hook runs.
                // The next caller switching it away receives this error.
                tracing::error!(thread = %self.thread.name(), error = %err, "fatal command error");
                self.deferred = Some(err);
                self.leave(&item);
                Phase::Idle
            }
        }
    }

    /// Deactivates an item that is leaving without a switch request.
    fn retire(&self, item: &ThreadableRef) {
        if let Err(err) = item.deactivate(&self.thread) {
            item.report_error(err);
        }
    }

    /// Runs a close request that arrived while `item` was active.
    fn leave(&mut self, item: &ThreadableRef) {
        if self.closing.as_ref().is_some_and(|closing| same_threadable(closing, item)) {
            self.closing = None;
            self.teardown(item);
        }
    }

    fn teardown(&mut self, item: &ThreadableRef) {
        if self.initialized.remove(&threadable_key(item)).is_some() {
            tracing::debug!(thread = %self.thread.name(), "tearing down threadable");
            item.teardown(&self.thread);
        } else {
            tracing::debug!(thread = %self.thread.name(), "close request for threadable not initialized here");
        }
    }

    fn drain(&mut self, forced: bool) {
        if !forced {
            while !self.initialized.is_empty() {
                match self.closes.recv() {
                    Ok(CloseRequest::Item(item)) => self.teardown(&item),
                    Ok(CloseRequest::ForceAll) | Err(_) => break,
                }
            }
        }

        for (_, item) in self.initialized.drain() {
            tracing::warn!(thread = %self.thread.name(), "force closing threadable");
            item.teardown(&self.thread);
        }
    }

    fn acknowledge(sender: &Sender<Ack>, ack: Ack) {
        if sender.send(ack).is_err() {
            tracing::warn!("switch caller went away before acknowledgement");
        }
    }
}
