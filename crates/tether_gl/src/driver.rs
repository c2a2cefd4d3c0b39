//! # Driver Contract
//!
//! Platform code is reached only through these traits. Every method is
//! called on a dedicated thread's scheduler loop (or, for [`take`] and
//! [`release`], on a borrowing loop while the shared context is paused), so
//! implementations may assume the calling OS thread is the one the
//! underlying API expects.
//!
//! [`take`]: ContextDriver::take
//! [`release`]: ContextDriver::release

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tether_core::ThreadError;

use crate::event::Event;
use crate::settings::{ContextSettings, VideoMode};
use crate::share::Rendezvous;
use crate::style::WindowStyle;

/// Opaque platform handle of a window. Zero is never a valid handle.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub u64);

impl WindowHandle {
    /// Returns true for any non-zero handle.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Debug for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WindowHandle({:#x})", self.0)
    }
}

/// Platform side of a rendering context.
///
/// `shared` is the driver of the process-wide shared context, current on
/// the calling thread for the duration of the call. It is `None` only when
/// creating the shared context itself.
pub trait ContextDriver: Send + Sync + 'static {
    /// Creates a context with default settings and a 1x1 offscreen surface.
    ///
    /// # Errors
    ///
    /// Any creation failure.
    fn initialize(&self, shared: Option<&dyn ContextDriver>) -> Result<(), ThreadError> {
        self.initialize_from_settings(&ContextSettings::default(), 1, 1, shared)
    }

    /// Creates a context with an offscreen surface of the given size.
    ///
    /// # Errors
    ///
    /// Any creation failure.
    fn initialize_from_settings(
        &self,
        settings: &ContextSettings,
        width: u32,
        height: u32,
        shared: Option<&dyn ContextDriver>,
    ) -> Result<(), ThreadError>;

    /// Creates a context rendering into an existing window.
    ///
    /// # Errors
    ///
    /// Any creation failure.
    fn initialize_from_owner(
        &self,
        settings: &ContextSettings,
        owner: WindowHandle,
        bits_per_pixel: u32,
        shared: Option<&dyn ContextDriver>,
    ) -> Result<(), ThreadError>;

    /// Makes the context current on the calling thread.
    ///
    /// # Errors
    ///
    /// Any platform failure.
    fn activate(&self) -> Result<(), ThreadError>;

    /// Detaches the context from the calling thread.
    ///
    /// # Errors
    ///
    /// Any platform failure.
    fn deactivate(&self) -> Result<(), ThreadError>;

    /// Detaches from the home thread, parks on `rendezvous` until the
    /// borrower is done, then reattaches.
    ///
    /// # Errors
    ///
    /// Failure to detach (the rendezvous is then never signalled) or to
    /// reattach.
    fn pause(&self, rendezvous: &Rendezvous) -> Result<(), ThreadError>;

    /// Makes the paused context current on the calling (borrowing) thread.
    ///
    /// # Errors
    ///
    /// Any platform failure.
    fn take(&self) -> Result<(), ThreadError>;

    /// Detaches the borrowed context from the calling thread.
    ///
    /// # Errors
    ///
    /// Any platform failure.
    fn release(&self) -> Result<(), ThreadError>;

    /// Presents the back buffer.
    ///
    /// # Errors
    ///
    /// Any platform failure.
    fn swap_buffers(&self) -> Result<(), ThreadError>;

    /// Settings actually obtained at creation.
    ///
    /// # Errors
    ///
    /// Any platform failure.
    fn settings(&self) -> Result<ContextSettings, ThreadError>;

    /// Enables or disables vertical synchronization.
    ///
    /// # Errors
    ///
    /// Unsupported by the platform, or any platform failure.
    fn set_vertical_sync_enabled(&self, enabled: bool) -> Result<(), ThreadError>;

    /// Destroys the platform context. Called on the initializing thread.
    ///
    /// # Errors
    ///
    /// Any platform failure.
    fn close(&self) -> Result<(), ThreadError>;

    /// Upcast for platform-specific access.
    fn as_any(&self) -> &dyn Any;
}

/// Platform side of a window.
///
/// Everything except [`system_handle`](Self::system_handle) is called on the
/// window's initial thread only.
pub trait WindowDriver: Send + Sync + 'static {
    /// Creates the platform window.
    ///
    /// # Errors
    ///
    /// Any creation failure.
    fn initialize(&self, mode: VideoMode, title: &str, style: WindowStyle) -> Result<(), ThreadError>;

    /// Destroys the platform window.
    ///
    /// # Errors
    ///
    /// Any platform failure.
    fn close(&self) -> Result<(), ThreadError>;

    /// Platform handle. Invalid until [`initialize`](Self::initialize) succeeded.
    fn system_handle(&self) -> WindowHandle;

    /// Collects pending events. With `block`, waits for at least one.
    ///
    /// Errors raised while translating events are returned alongside them.
    fn poll_events(&self, block: bool) -> (Vec<Event>, Vec<ThreadError>);

    /// Position of the top-left corner in desktop coordinates.
    fn position(&self) -> (i32, i32);

    /// Moves the window.
    fn set_position(&self, x: i32, y: i32);

    /// Client area size in pixels.
    fn size(&self) -> (u32, u32);

    /// Resizes the client area.
    fn set_size(&self, width: u32, height: u32);

    /// Changes the title.
    fn set_title(&self, title: &str);

    /// Shows or hides the window.
    ///
    /// # Errors
    ///
    /// Any platform failure.
    fn set_visible(&self, visible: bool) -> Result<(), ThreadError>;

    /// Shows or hides the cursor over the window.
    ///
    /// # Errors
    ///
    /// Any platform failure.
    fn set_mouse_cursor_visible(&self, visible: bool) -> Result<(), ThreadError>;

    /// Enables or disables key repeat events.
    ///
    /// # Errors
    ///
    /// Any platform failure.
    fn set_key_repeat_enabled(&self, enabled: bool) -> Result<(), ThreadError>;

    /// Cursor position relative to the window.
    ///
    /// # Errors
    ///
    /// Any platform failure.
    fn mouse_position(&self) -> Result<(i32, i32), ThreadError>;

    /// Moves the cursor, relative to the window.
    ///
    /// # Errors
    ///
    /// Any platform failure.
    fn set_mouse_position(&self, x: i32, y: i32) -> Result<(), ThreadError>;

    /// Upcast for platform-specific access.
    fn as_any(&self) -> &dyn Any;
}

/// Factory for the drivers of one platform.
pub trait Platform: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Creates an uninitialized context driver.
    fn create_context_driver(&self) -> Box<dyn ContextDriver>;

    /// Creates an uninitialized window driver.
    fn create_window_driver(&self) -> Arc<dyn WindowDriver>;
}
