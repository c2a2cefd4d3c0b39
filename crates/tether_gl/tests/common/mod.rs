//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::bounded;
use tether_core::{Thread, ThreadError};
use tether_gl::headless::{HeadlessContext, HeadlessPlatform, HeadlessWindow};
use tether_gl::{Context, Runtime, RuntimeConfig, Window};

pub const WAIT: Duration = Duration::from_secs(5);

/// Installs a test-writer subscriber once per process. `RUST_LOG` selects levels.
pub fn try_init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn bootstrap() -> (HeadlessPlatform, Runtime) {
    try_init_tracing();
    let platform = HeadlessPlatform::new();
    let runtime = Runtime::bootstrap(Arc::new(platform.clone()), RuntimeConfig::default())
        .expect("bootstrap headless runtime");
    (platform, runtime)
}

/// Runs `f` on the context's owning thread and waits for its result.
///
/// The error is also returned to the loop, so it is reported as usual.
pub fn run<T, F>(context: &Context, f: F) -> Result<T, ThreadError>
where
    T: Send + 'static,
    F: FnOnce(&Thread, &Context) -> Result<T, ThreadError> + Send + 'static,
{
    let (tx, rx) = bounded(1);
    context.submit(move |thread, context| match f(thread, context) {
        Ok(value) => {
            let _ = tx.send(Ok(value));
            Ok(())
        }
        Err(err) => {
            let _ = tx.send(Err(err.clone()));
            Err(err)
        }
    });
    rx.recv_timeout(WAIT).expect("command did not run")
}

/// [`run`] for windows.
pub fn run_window<T, F>(window: &Window, f: F) -> Result<T, ThreadError>
where
    T: Send + 'static,
    F: FnOnce(&Thread, &Window) -> Result<T, ThreadError> + Send + 'static,
{
    let (tx, rx) = bounded(1);
    window.submit(move |thread, window| match f(thread, window) {
        Ok(value) => {
            let _ = tx.send(Ok(value));
            Ok(())
        }
        Err(err) => {
            let _ = tx.send(Err(err.clone()));
            Err(err)
        }
    });
    rx.recv_timeout(WAIT).expect("command did not run")
}

pub fn headless(context: &Context) -> &HeadlessContext {
    context
        .driver()
        .as_any()
        .downcast_ref::<HeadlessContext>()
        .expect("headless context driver")
}

pub fn headless_window(window: &Window) -> &HeadlessWindow {
    window
        .driver()
        .as_any()
        .downcast_ref::<HeadlessWindow>()
        .expect("headless window driver")
}
