//! # Window
//!
//! A [`Window`] owns a platform window and the [`Context`] rendering into it.
//! It is scheduled as a single Threadable: activating the window activates
//! its context, and a fatal error on either closes both.
//!
//! The platform window is created on the first thread that activates it.
//! That thread stays the window's home: window-only operations (position,
//! size, title, events, cursor) fail with a non-fatal `NotInitialThread`
//! error anywhere else.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use thiserror::Error;
use tether_core::{Command, Thread, ThreadError, ThreadErrorKind, Threadable, ThreadableRef};

use crate::context::{Context, ContextSource};
use crate::driver::{ContextDriver, WindowDriver, WindowHandle};
use crate::event::Event;
use crate::settings::{ContextSettings, VideoMode};
use crate::style::WindowStyle;

/// Errors detected when a window is constructed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    /// The style flags are not a valid combination.
    #[error("invalid window style: {0}")]
    InvalidStyle(&'static str),

    /// The video mode has a zero dimension.
    #[error("invalid video mode {width}x{height}")]
    InvalidMode {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
}

#[derive(Clone)]
struct WindowRequest {
    mode: VideoMode,
    title: String,
    style: WindowStyle,
}

/// A platform window and its rendering context.
pub struct Window {
    me: Weak<Window>,
    driver: Arc<dyn WindowDriver>,
    context: Arc<Context>,
    pending: Mutex<Option<WindowRequest>>,
    torn_down: AtomicBool,
}

impl Window {
    pub(crate) fn create(
        driver: Arc<dyn WindowDriver>,
        context_driver: Box<dyn ContextDriver>,
        shared: Arc<Context>,
        mode: VideoMode,
        title: &str,
        style: WindowStyle,
        settings: ContextSettings,
    ) -> Result<Arc<Self>, WindowError> {
        style.check()?;
        if mode.width == 0 || mode.height == 0 {
            return Err(WindowError::InvalidMode {
                width: mode.width,
                height: mode.height,
            });
        }

        let context = Context::create(
            context_driver,
            ContextSource::Owner {
                settings,
                owner: Arc::clone(&driver),
                bits_per_pixel: mode.bits_per_pixel,
            },
            Some(shared),
        );

        Ok(Arc::new_cyclic(|me| Self {
            me: me.clone(),
            driver,
            context,
            pending: Mutex::new(Some(WindowRequest {
                mode,
                title: title.to_owned(),
                style,
            })),
            torn_down: AtomicBool::new(false),
        }))
    }

    /// Wraps a typed function into a raw [`Command`].
    ///
    /// The command fails with a fatal `ForeignCommand` error if it ends up
    /// running against a Threadable that is not a `Window`.
    pub fn command<F>(f: F) -> Command
    where
        F: FnOnce(&Thread, &Window) -> Result<(), ThreadError> + Send + 'static,
    {
        Box::new(move |thread: &Thread, item: &dyn Threadable| {
            match item.as_any().downcast_ref::<Window>() {
                Some(window) => f(thread, window),
                None => Err(ThreadError::new(
                    ThreadErrorKind::ForeignCommand,
                    "window command executed against another threadable",
                    true,
                )),
            }
        })
    }

    /// Submits `f` to run on the owning thread with this window active.
    ///
    /// Blocks until the owning loop accepts the command.
    pub fn submit<F>(&self, f: F)
    where
        F: FnOnce(&Thread, &Window) -> Result<(), ThreadError> + Send + 'static,
    {
        self.context.send(Self::command(f));
    }

    /// Send end of the command queue (shared with the window's context).
    #[must_use]
    pub fn command_sender(&self) -> Sender<Command> {
        self.context.command_sender()
    }

    /// Receive end of the error queue.
    #[must_use]
    pub fn errors(&self) -> Receiver<ThreadError> {
        self.context.errors()
    }

    /// The context rendering into this window.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Platform driver.
    #[must_use]
    pub fn driver(&self) -> &dyn WindowDriver {
        self.driver.as_ref()
    }

    /// Returns true while a thread has this window active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.context.is_active()
    }

    /// Thread that created the platform window.
    #[must_use]
    pub fn initial_thread(&self) -> Option<Thread> {
        self.context.initial_thread()
    }

    /// Presents the back buffer.
    ///
    /// # Errors
    ///
    /// See [`Context::swap_buffers`].
    pub fn swap_buffers(&self) -> Result<(), ThreadError> {
        self.context.swap_buffers()
    }

    /// Settings actually obtained by the window's context.
    ///
    /// # Errors
    ///
    /// See [`Context::settings`].
    pub fn settings(&self) -> Result<ContextSettings, ThreadError> {
        self.context.settings()
    }

    /// Enables or disables vertical synchronization.
    ///
    /// # Errors
    ///
    /// See [`Context::set_vertical_sync_enabled`].
    pub fn set_vertical_sync_enabled(&self, enabled: bool) -> Result<(), ThreadError> {
        self.context.set_vertical_sync_enabled(enabled)
    }

    fn on_initial_thread(&self, thread: &Thread, operation: &str) -> Result<(), ThreadError> {
        if self.context.initial_thread().as_ref() == Some(thread) {
            return Ok(());
        }
        Err(ThreadError::new(
            ThreadErrorKind::NotInitialThread,
            format!("{operation} must run on the window's initial thread"),
            false,
        ))
    }

    /// Platform handle of the window.
    ///
    /// # Errors
    ///
    /// `NotInitialThread` unless `thread` is the window's initial thread.
    pub fn system_handle(&self, thread: &Thread) -> Result<WindowHandle, ThreadError> {
        self.on_initial_thread(thread, "system handle")?;
        Ok(self.driver.system_handle())
    }

    /// Collects pending events. With `block`, waits for at least one.
    ///
    /// Translation errors are returned alongside the events.
    ///
    /// # Errors
    ///
    /// `NotInitialThread` unless `thread` is the window's initial thread.
    pub fn poll_events(
        &self,
        thread: &Thread,
        block: bool,
    ) -> Result<(Vec<Event>, Vec<ThreadError>), ThreadError> {
        self.on_initial_thread(thread, "poll events")?;
        Ok(self.driver.poll_events(block))
    }

    /// Position of the top-left corner in desktop coordinates.
    ///
    /// # Errors
    ///
    /// `NotInitialThread` unless `thread` is the window's initial thread.
    pub fn position(&self, thread: &Thread) -> Result<(i32, i32), ThreadError> {
        self.on_initial_thread(thread, "get position")?;
        Ok(self.driver.position())
    }

    /// Moves the window.
    ///
    /// # Errors
    ///
    /// `NotInitialThread` unless `thread` is the window's initial thread.
    pub fn set_position(&self, thread: &Thread, x: i32, y: i32) -> Result<(), ThreadError> {
        self.on_initial_thread(thread, "set position")?;
        self.driver.set_position(x, y);
        Ok(())
    }

    /// Client area size in pixels.
    ///
    /// # Errors
    ///
    /// `NotInitialThread` unless `thread` is the window's initial thread.
    pub fn size(&self, thread: &Thread) -> Result<(u32, u32), ThreadError> {
        self.on_initial_thread(thread, "get size")?;
        Ok(self.driver.size())
    }

    /// Resizes the client area.
    ///
    /// # Errors
    ///
    /// `NotInitialThread` unless `thread` is the window's initial thread.
    pub fn set_size(&self, thread: &Thread, width: u32, height: u32) -> Result<(), ThreadError> {
        self.on_initial_thread(thread, "set size")?;
        self.driver.set_size(width, height);
        Ok(())
    }

    /// Changes the title.
    ///
    /// # Errors
    ///
    /// `NotInitialThread` unless `thread` is the window's initial thread.
    pub fn set_title(&self, thread: &Thread, title: &str) -> Result<(), ThreadError> {
        self.on_initial_thread(thread, "set title")?;
        self.driver.set_title(title);
        Ok(())
    }

    /// Shows or hides the window.
    ///
    /// # Errors
    ///
    /// `NotInitialThread`, or the driver's error.
    pub fn set_visible(&self, thread: &Thread, visible: bool) -> Result<(), ThreadError> {
        self.on_initial_thread(thread, "set visible")?;
        self.driver.set_visible(visible)
    }

    /// Shows or hides the cursor over the window.
    ///
    /// # Errors
    ///
    /// `NotInitialThread`, or the driver's error.
    pub fn set_mouse_cursor_visible(&self, thread: &Thread, visible: bool) -> Result<(), ThreadError> {
        self.on_initial_thread(thread, "set mouse cursor visible")?;
        self.driver.set_mouse_cursor_visible(visible)
    }

    /// Enables or disables key repeat events.
    ///
    /// # Errors
    ///
    /// `NotInitialThread`, or the driver's error.
    pub fn set_key_repeat_enabled(&self, thread: &Thread, enabled: bool) -> Result<(), ThreadError> {
        self.on_initial_thread(thread, "set key repeat")?;
        self.driver.set_key_repeat_enabled(enabled)
    }

    /// Cursor position relative to the window.
    ///
    /// # Errors
    ///
    /// `NotInitialThread`, or the driver's error.
    pub fn mouse_position(&self, thread: &Thread) -> Result<(i32, i32), ThreadError> {
        self.on_initial_thread(thread, "get mouse position")?;
        self.driver.mouse_position()
    }

    /// Moves the cursor, relative to the window.
    ///
    /// # Errors
    ///
    /// `NotInitialThread`, or the driver's error.
    pub fn set_mouse_position(&self, thread: &Thread, x: i32, y: i32) -> Result<(), ThreadError> {
        self.on_initial_thread(thread, "set mouse position")?;
        self.driver.set_mouse_position(x, y)
    }

    /// Reports a non-fatal error and carries on; passes a fatal one through.
    fn tolerate(&self, result: Result<(), ThreadError>) -> Result<(), ThreadError> {
        match result {
            Err(err) if !err.is_fatal() => {
                tracing::warn!(error = %err, "window default not applied");
                self.report_error(err);
                Ok(())
            }
            other => other,
        }
    }

    fn apply_defaults(&self, thread: &Thread) -> Result<(), ThreadError> {
        self.tolerate(self.set_visible(thread, true))?;
        self.tolerate(self.set_mouse_cursor_visible(thread, true))?;
        self.tolerate(self.context.set_vertical_sync_enabled(false))?;
        self.tolerate(self.set_key_repeat_enabled(thread, true))
    }

    fn close_platform_window(&self) {
        if let Err(err) = self.driver.close() {
            tracing::warn!(error = %err, "window driver close failed");
            self.report_error(err);
        }
    }
}

impl Threadable for Window {
    fn is_initialized(&self) -> bool {
        self.pending.lock().is_none()
    }

    fn initialize(&self, thread: &Thread) -> Result<(), ThreadError> {
        let request = self.pending.lock().clone();
        let Some(request) = request else {
            panic!("window initialized twice");
        };

        self.tolerate(self.driver.initialize(request.mode, &request.title, request.style))?;

        if let Err(err) = self.context.initialize(thread) {
            self.close_platform_window();
            return Err(err);
        }

        if let Err(err) = self.apply_defaults(thread) {
            self.context.teardown(thread);
            self.close_platform_window();
            return Err(err);
        }

        *self.pending.lock() = None;
        tracing::debug!(thread = %thread.name(), title = %request.title, "window created");
        Ok(())
    }

    fn teardown(&self, thread: &Thread) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        // The context must go before the surface it renders into.
        self.context.teardown(thread);
        self.close_platform_window();
    }

    fn activate(&self, thread: &Thread) -> Result<(), ThreadError> {
        self.context.activate(thread)
    }

    fn deactivate(&self, thread: &Thread) -> Result<(), ThreadError> {
        self.context.deactivate(thread)
    }

    fn commands(&self) -> Receiver<Command> {
        self.context.commands()
    }

    fn report_error(&self, err: ThreadError) {
        self.context.report_error(err);
    }

    fn set_thread(&self, thread: Option<Thread>) {
        self.context.set_thread(thread);
    }

    fn try_claim(&self, thread: &Thread) -> bool {
        self.context.try_claim(thread)
    }

    fn thread(&self) -> Option<Thread> {
        self.context.thread()
    }

    /// Deactivates the window if needed and schedules its teardown on the
    /// initial thread. Idempotent.
    fn close(&self) {
        if self.is_closed() {
            return;
        }

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
        self.context.mark_closed();
    }

    fn is_closed(&self) -> bool {
        self.context.is_closed()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Window")
            .field("handle", &self.driver.system_handle())
            .field("context", &self.context)
            .finish()
    }
}
