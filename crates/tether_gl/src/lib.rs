//! # Tether GL
//!
//! Rendering contexts and windows scheduled on dedicated threads by
//! [`tether_core`].
//!
//! ## Architecture Rules
//!
//! 1. **Explicit bootstrap** - [`Runtime::bootstrap`] creates the shared
//!    thread and the shared context; nothing is initialized behind the
//!    caller's back
//! 2. **One share group** - every context borrows the shared context while
//!    it is created, so all of them see the same objects
//! 3. **Drivers behind traits** - platform code is only reached through
//!    [`ContextDriver`], [`WindowDriver`] and [`Platform`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tether_gl::{headless::HeadlessPlatform, Runtime, RuntimeConfig};
//!
//! let runtime = Runtime::bootstrap(Arc::new(HeadlessPlatform::new()), RuntimeConfig::default())?;
//! let thread = runtime.spawn_thread()?;
//! let context = runtime.create_context();
//! thread.set_active(Some(context.clone()))?;
//! context.submit(|_, context| context.swap_buffers());
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod context;
pub mod driver;
pub mod event;
pub mod headless;
pub mod runtime;
pub mod settings;
pub mod share;
pub mod style;
pub mod window;

pub use config::RuntimeConfig;
pub use context::Context;
pub use driver::{ContextDriver, Platform, WindowDriver, WindowHandle};
pub use event::{Event, Key, Modifiers, MouseButton};
pub use runtime::{Runtime, RuntimeError};
pub use settings::{ContextSettings, VideoMode};
pub use share::Rendezvous;
pub use style::WindowStyle;
pub use window::{Window, WindowError};
