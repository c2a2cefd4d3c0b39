//! Runtime configuration, loaded once at startup.
//!
//! ```toml
//! shared_thread_name = "tether-shared"
//! thread_name_prefix = "tether-render"
//! shared_width = 1
//! shared_height = 1
//!
//! [shared_settings]
//! depth_bits = 24
//! stencil_bits = 8
//! ```
//!
//! Every field is optional.

use serde::{Deserialize, Serialize};

use crate::runtime::RuntimeError;
use crate::settings::ContextSettings;

fn default_shared_thread_name() -> String {
    "tether-shared".to_string()
}

fn default_thread_name_prefix() -> String {
    "tether-render".to_string()
}

fn default_shared_extent() -> u32 {
    1
}

/// Configuration for [`Runtime::bootstrap`](crate::Runtime::bootstrap).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// OS thread name of the shared thread.
    #[serde(default = "default_shared_thread_name")]
    pub shared_thread_name: String,

    /// Prefix for threads spawned by [`Runtime::spawn_thread`](crate::Runtime::spawn_thread).
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,

    /// Settings of the shared context.
    #[serde(default)]
    pub shared_settings: ContextSettings,

    /// Width of the shared context's offscreen surface.
    #[serde(default = "default_shared_extent")]
    pub shared_width: u32,

    /// Height of the shared context's offscreen surface.
    #[serde(default = "default_shared_extent")]
    pub shared_height: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            shared_thread_name: default_shared_thread_name(),
            thread_name_prefix: default_thread_name_prefix(),
            shared_settings: ContextSettings::default(),
            shared_width: default_shared_extent(),
            shared_height: default_shared_extent(),
        }
    }
}

impl RuntimeConfig {
    /// Parses a config from TOML.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Config`] on malformed input.
    pub fn from_toml_str(source: &str) -> Result<Self, RuntimeError> {
        Ok(toml::from_str(source)?)
    }
}
