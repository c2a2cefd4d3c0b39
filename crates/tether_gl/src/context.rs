//! # Rendering Context
//!
//! A [`Context`] is the primary [`Threadable`]: a platform rendering context
//! that is created lazily on the first thread that activates it, driven only
//! through commands executed by its owning thread's loop, and torn down on
//! the thread that created it.
//!
//! ## Lifecycle
//!
//! ```text
//!   created ──first activation──> initialized ──close()──> closed
//!   (pending source)              (initial thread fixed)   (never again)
//! ```
//!
//! Every context except the shared one borrows the shared context through a
//! [`SharedLease`] while it is being created, so both end up in one share
//! group.
//!
//! ## Errors
//!
//! Errors raised on the owning thread land on an unbounded queue read
//! through [`Context::errors`]. Reporting never blocks the loop; an
//! undrained queue grows without limit.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tether_core::{Command, Thread, ThreadError, ThreadErrorKind, Threadable, ThreadableRef};

use crate::driver::{ContextDriver, WindowDriver};
use crate::settings::ContextSettings;
use crate::share::SharedLease;

/// How a context's platform resource is created on first activation.
#[derive(Clone)]
pub(crate) enum ContextSource {
    /// Default settings, 1x1 offscreen surface.
    Default,
    /// Offscreen surface of the given size.
    Settings {
        settings: ContextSettings,
        width: u32,
        height: u32,
    },
    /// Rendering into a window.
    Owner {
        settings: ContextSettings,
        owner: Arc<dyn WindowDriver>,
        bits_per_pixel: u32,
    },
}

/// A rendering context with thread affinity.
///
/// Created through [`Runtime`](crate::Runtime). Schedule it with
/// [`Thread::set_active`], then drive it with [`submit`](Self::submit).
pub struct Context {
    me: Weak<Context>,
    /// `None` only for the shared context itself.
    shared: Option<Arc<Context>>,
    driver: Box<dyn ContextDriver>,
    pending: Mutex<Option<ContextSource>>,
    initial_thread: OnceLock<Thread>,
    thread: Mutex<Option<Thread>>,
    commands_tx: Sender<Command>,
    commands_rx: Receiver<Command>,
    errors_tx: Sender<ThreadError>,
    errors_rx: Receiver<ThreadError>,
    closed: AtomicBool,
    /// Set once the scheduler is bound to close the context: a failed
    /// activation or any fatal error.
    broken: AtomicBool,
    torn_down: AtomicBool,
}

impl Context {
    pub(crate) fn create(
        driver: Box<dyn ContextDriver>,
        source: ContextSource,
        shared: Option<Arc<Context>>,
    ) -> Arc<Self> {
        let (commands_tx, commands_rx) = bounded(0);
        let (errors_tx, errors_rx) = unbounded();

        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            shared,
            driver,
            pending: Mutex::new(Some(source)),
            initial_thread: OnceLock::new(),
            thread: Mutex::new(None),
            commands_tx,
            commands_rx,
            errors_tx,
            errors_rx,
            closed: AtomicBool::new(false),
            broken: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
        })
    }

    /// Wraps a typed function into a raw [`Command`].
    ///
    /// The command fails with a fatal `ForeignCommand` error if it ends up
    /// running against a Threadable that is not a `Context`.
    pub fn command<F>(f: F) -> Command
    where
        F: FnOnce(&Thread, &Context) -> Result<(), ThreadError> + Send + 'static,
    {
        Box::new(move |thread: &Thread, item: &dyn Threadable| {
            match item.as_any().downcast_ref::<Context>() {
                Some(context) => f(thread, context),
                None => Err(ThreadError::new(
                    ThreadErrorKind::ForeignCommand,
                    "context command executed against another threadable",
                    true,
                )),
            }
        })
    }

    /// Submits `f` to run on the owning thread with this context active.
    ///
    /// Blocks until the owning loop accepts the command. Blocks forever if
    /// the context is never activated.
    pub fn submit<F>(&self, f: F)
    where
        F: FnOnce(&Thread, &Context) -> Result<(), ThreadError> + Send + 'static,
    {
        self.send(Self::command(f));
    }

    /// Submits a raw command. Same blocking rules as [`submit`](Self::submit).
    pub fn send(&self, command: Command) {
        // The context holds the receive end, so the queue cannot disconnect.
        let _ = self.commands_tx.send(command);
    }

    /// Send end of the command queue.
    ///
    /// The queue has no buffer: every send waits for the owning loop.
    #[must_use]
    pub fn command_sender(&self) -> Sender<Command> {
        self.commands_tx.clone()
    }

    /// Receive end of the error queue.
    ///
    /// Carries both fatal and non-fatal errors raised on the owning thread.
    #[must_use]
    pub fn errors(&self) -> Receiver<ThreadError> {
        self.errors_rx.clone()
    }

    /// Returns true while a thread has this context active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.thread.lock().is_some()
    }

    /// Thread that created the platform resource. Fixed for life once set.
    #[must_use]
    pub fn initial_thread(&self) -> Option<Thread> {
        self.initial_thread.get().cloned()
    }

    /// Returns true for the process-wide shared context.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.shared.is_none()
    }

    /// Platform driver.
    ///
    /// Only touch it from the owning thread's loop.
    #[must_use]
    pub fn driver(&self) -> &dyn ContextDriver {
        self.driver.as_ref()
    }

    /// Presents the back buffer.
    ///
    /// # Errors
    ///
    /// `Inactive` unless called from a command on the owning thread, or the
    /// driver's error.
    pub fn swap_buffers(&self) -> Result<(), ThreadError> {
        self.ensure_current("swap buffers")?;
        self.driver.swap_buffers()
    }

    /// Settings actually obtained at creation.
    ///
    /// # Errors
    ///
    /// Same as [`swap_buffers`](Self::swap_buffers).
    pub fn settings(&self) -> Result<ContextSettings, ThreadError> {
        self.ensure_current("get settings")?;
        self.driver.settings()
    }

    /// Enables or disables vertical synchronization.
    ///
    /// # Errors
    ///
    /// Same as [`swap_buffers`](Self::swap_buffers).
    pub fn set_vertical_sync_enabled(&self, enabled: bool) -> Result<(), ThreadError> {
        self.ensure_current("set vertical sync")?;
        self.driver.set_vertical_sync_enabled(enabled)
    }

    /// Command presenting the back buffer.
    #[must_use]
    pub fn swap_buffers_command() -> Command {
        Self::command(|_, context| context.swap_buffers())
    }

    /// Command sending the obtained settings to `results`.
    #[must_use]
    pub fn settings_command(results: Sender<ContextSettings>) -> Command {
        Self::command(move |_, context| {
            let settings = context.settings()?;
            results.send(settings).map_err(|_| {
                ThreadError::new(ThreadErrorKind::Disconnected, "settings receiver dropped", false)
            })
        })
    }

    /// Command toggling vertical synchronization.
    #[must_use]
    pub fn vsync_command(enabled: bool) -> Command {
        Self::command(move |_, context| context.set_vertical_sync_enabled(enabled))
    }

    fn ensure_current(&self, operation: &str) -> Result<(), ThreadError> {
        let owner = self.thread.lock().clone();
        match (owner, Thread::current()) {
            (Some(owner), Some(current)) if owner == current => Ok(()),
            _ => Err(ThreadError::new(
                ThreadErrorKind::Inactive,
                format!("{operation} requires the context to be active on the calling thread"),
                false,
            )),
        }
    }

    /// Creates the platform resource from `source`.
    fn create_resource(
        &self,
        source: &ContextSource,
        shared: Option<&dyn ContextDriver>,
    ) -> Result<(), ThreadError> {
        match source {
            ContextSource::Default => self.driver.initialize(shared),
            ContextSource::Settings {
                settings,
                width,
                height,
            } => self
                .driver
                .initialize_from_settings(settings, *width, *height, shared),
            ContextSource::Owner {
                settings,
                owner,
                bits_per_pixel,
            } => self.driver.initialize_from_owner(
                settings,
                owner.system_handle(),
                *bits_per_pixel,
                shared,
            ),
        }
    }

    /// Marks the context closed without scheduling a teardown.
    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn closed_error() -> ThreadError {
        ThreadError::new(ThreadErrorKind::Closed, "context is closed", true)
    }
}

impl Threadable for Context {
    fn is_initialized(&self) -> bool {
        self.pending.lock().is_none()
    }

    fn initialize(&self, thread: &Thread) -> Result<(), ThreadError> {
        let source = self.pending.lock().clone();
        let Some(source) = source else {
            panic!("context initialized twice");
        };

        match &self.shared {
            Some(shared) => {
                let lease = SharedLease::acquire(shared, thread)?;
                self.create_resource(&source, Some(lease.driver()))?;
            }
            None => self.create_resource(&source, None)?,
        }

        if self.initial_thread.set(thread.clone()).is_err() {
            tracing::warn!(thread = %thread.name(), "initial thread already recorded");
        }
        *self.pending.lock() = None;
        tracing::debug!(thread = %thread.name(), shared = self.is_shared(), "context created");
        Ok(())
    }

    fn teardown(&self, thread: &Thread) {
        if self.initial_thread.get() != Some(thread) {
            tracing::error!(thread = %thread.name(), "context torn down away from its initial thread");
            self.report_error(ThreadError::new(
                ThreadErrorKind::NotInitialThread,
                "context torn down away from its initial thread",
                true,
            ));
            return;
        }
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(err) = self.driver.close() {
            tracing::warn!(thread = %thread.name(), error = %err, "context driver close failed");
            self.report_error(err);
        }
    }

    fn activate(&self, _thread: &Thread) -> Result<(), ThreadError> {
        if self.is_closed() {
            return Err(Self::closed_error());
        }
        let result = self.driver.activate();
        if result.is_err() {
            self.broken.store(true, Ordering::SeqCst);
        }
        result
    }

    fn deactivate(&self, _thread: &Thread) -> Result<(), ThreadError> {
        if self.is_closed() {
            return Err(Self::closed_error());
        }
        let result = self.driver.deactivate();
        if result.as_ref().is_err_and(ThreadError::is_fatal) {
            self.broken.store(true, Ordering::SeqCst);
        }
        result
    }

    fn commands(&self) -> Receiver<Command> {
        self.commands_rx.clone()
    }

    fn report_error(&self, err: ThreadError) {
        if err.is_fatal() {
            self.broken.store(true, Ordering::SeqCst);
        }
        // Unbounded, and the context holds the receive end: never blocks, never fails.
        let _ = self.errors_tx.send(err);
    }

    fn set_thread(&self, thread: Option<Thread>) {
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

    /// Deactivates the context if needed and schedules its teardown on the
    /// initial thread. Idempotent.
    ///
    /// # Panics
    ///
    /// Panics if called on the shared context, unless it never came up or
    /// already failed fatally.
    fn close(&self) {
        if self.is_closed() {
            return;
        }
        assert!(
            !self.is_shared() || !self.is_initialized() || self.broken.load(Ordering::SeqCst),
            "the shared context cannot be closed"
        );

        let me = self.me.upgrade().map(|me| me as ThreadableRef);
        if let (Some(owner), Some(me)) = (self.thread(), &me) {
            if let Err(err) = owner.release(me) {
                tracing::warn!(thread = %owner.name(), error = %err, "deactivation on close failed");
            }
            // A fatal deactivation already closed us.
            if self.is_closed() {
                return;
            }
        }

        if self.is_initialized() {
            if let (Some(initial), Some(me)) = (self.initial_thread(), me) {
                initial.close_threadable(me);
            }
        }
        self.mark_closed();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("shared", &self.is_shared())
            .field("initialized", &self.is_initialized())
            .field("active", &self.is_active())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
