//! # Runtime
//!
//! Explicit bootstrap of the process-wide shared pair: one dedicated thread
//! and the shared context it keeps active for the life of the process. Every
//! other context and window is created through the [`Runtime`] so that it
//! shares with that context.
//!
//! ```rust,ignore
//! let runtime = Runtime::bootstrap(Arc::new(HeadlessPlatform::new()), RuntimeConfig::default())?;
//! let render = runtime.spawn_thread()?;
//! let context = runtime.create_context();
//! render.set_active(Some(context.clone()))?;
//! ```

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tether_core::{SchedulerError, Thread, ThreadConfig};

use crate::config::RuntimeConfig;
use crate::context::{Context, ContextSource};
use crate::driver::Platform;
use crate::settings::{ContextSettings, VideoMode};
use crate::style::WindowStyle;
use crate::window::{Window, WindowError};

/// Errors raised while bootstrapping or extending the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A dedicated thread could not be spawned.
    #[error("failed to spawn thread: {0}")]
    Spawn(#[source] SchedulerError),

    /// The shared context could not be created or activated.
    #[error("failed to activate the shared context: {0}")]
    SharedActivation(#[source] SchedulerError),

    /// The configuration could not be parsed.
    #[error("invalid runtime config: {0}")]
    Config(#[from] toml::de::Error),
}

/// Owner of the shared thread and shared context.
pub struct Runtime {
    platform: Arc<dyn Platform>,
    config: RuntimeConfig,
    shared_thread: Thread,
    shared_context: Arc<Context>,
    spawned: AtomicUsize,
}

impl Runtime {
    /// Spawns the shared thread and activates the shared context on it.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Spawn`] or [`RuntimeError::SharedActivation`]. The
    /// shared thread is shut down before returning an activation error.
    pub fn bootstrap(platform: Arc<dyn Platform>, config: RuntimeConfig) -> Result<Self, RuntimeError> {
        let shared_thread = Thread::spawn(ThreadConfig::named(config.shared_thread_name.clone()))
            .map_err(RuntimeError::Spawn)?;

        let shared_context = Context::create(
            platform.create_context_driver(),
            ContextSource::Settings {
                settings: config.shared_settings,
                width: config.shared_width,
                height: config.shared_height,
            },
            None,
        );

        if let Err(err) = shared_thread.set_active(Some(shared_context.clone())) {
            tracing::error!(platform = platform.name(), error = %err, "shared context activation failed");
            shared_thread.force_close();
            shared_thread.join();
            return Err(RuntimeError::SharedActivation(err));
        }

        tracing::info!(
            platform = platform.name(),
            thread = %shared_thread.name(),
            "runtime bootstrapped"
        );
        Ok(Self {
            platform,
            config,
            shared_thread,
            shared_context,
            spawned: AtomicUsize::new(0),
        })
    }

    /// The thread that keeps the shared context active.
    #[must_use]
    pub fn shared_thread(&self) -> &Thread {
        &self.shared_thread
    }

    /// The process-wide shared context. It can never be closed.
    #[must_use]
    pub fn shared_context(&self) -> &Arc<Context> {
        &self.shared_context
    }

    /// Configuration the runtime was bootstrapped with.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Spawns a dedicated thread named after the configured prefix.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Spawn`] if the OS refuses the thread.
    pub fn spawn_thread(&self) -> Result<Thread, RuntimeError> {
        let index = self.spawned.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{index}", self.config.thread_name_prefix);
        Thread::spawn(ThreadConfig::named(name)).map_err(RuntimeError::Spawn)
    }

    /// Creates a context with default settings and a 1x1 offscreen surface.
    ///
    /// The platform resource is created on first activation.
    #[must_use]
    pub fn create_context(&self) -> Arc<Context> {
        self.new_context(ContextSource::Default)
    }

    /// Creates a context with an offscreen surface of the given size.
    #[must_use]
    pub fn create_context_from_settings(
        &self,
        settings: ContextSettings,
        width: u32,
        height: u32,
    ) -> Arc<Context> {
        self.new_context(ContextSource::Settings {
            settings,
            width,
            height,
        })
    }

    fn new_context(&self, source: ContextSource) -> Arc<Context> {
        Context::create(
            self.platform.create_context_driver(),
            source,
            Some(Arc::clone(&self.shared_context)),
        )
    }

    /// Creates a window. The platform window is created on first activation.
    ///
    /// # Errors
    ///
    /// [`WindowError`] for an invalid style or an empty video mode.
    pub fn create_window(
        &self,
        mode: VideoMode,
        title: &str,
        style: WindowStyle,
        settings: ContextSettings,
    ) -> Result<Arc<Window>, WindowError> {
        Window::create(
            self.platform.create_window_driver(),
            self.platform.create_context_driver(),
            Arc::clone(&self.shared_context),
            mode,
            title,
            style,
            settings,
        )
    }

    /// Force closes the shared thread and waits for it to exit.
    ///
    /// Last resort at process exit: contexts still alive elsewhere lose
    /// their share group's owner.
    pub fn shutdown(self) {
        tracing::info!(thread = %self.shared_thread.name(), "runtime shutting down");
        self.shared_thread.force_close();
        self.shared_thread.join();
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("platform", &self.platform.name())
            .field("shared_thread", &self.shared_thread)
            .field("shared_context", &self.shared_context)
            .finish_non_exhaustive()
    }
}
