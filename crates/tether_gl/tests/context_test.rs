//! Integration tests for contexts on the headless platform.

mod common;

use std::sync::Arc;

use crossbeam_channel::bounded;
use tether_core::{SchedulerError, ThreadError, ThreadErrorKind, Threadable};
use tether_gl::headless::{HeadlessOp, HeadlessPlatform};
use tether_gl::{Context, ContextSettings, Runtime, RuntimeConfig, RuntimeError};

use common::{bootstrap, headless, run, WAIT};

#[test]
fn test_shared_context_is_active_after_bootstrap() {
    let (platform, runtime) = bootstrap();

    let shared = runtime.shared_context();
    assert!(shared.is_shared());
    assert!(shared.is_active());
    assert_eq!(shared.thread().as_ref(), Some(runtime.shared_thread()));
    assert_eq!(shared.initial_thread().as_ref(), Some(runtime.shared_thread()));
    assert_eq!(platform.stats().contexts_created, 1);

    runtime.shutdown();
    assert_eq!(platform.stats().contexts_destroyed, 1);
}

#[test]
#[should_panic(expected = "the shared context cannot be closed")]
fn test_closing_shared_context_panics() {
    let (_platform, runtime) = bootstrap();
    runtime.shared_context().close();
}

#[test]
#[should_panic(expected = "the shared context cannot be closed")]
fn test_closing_inactive_shared_context_panics() {
    let (_platform, runtime) = bootstrap();
    runtime.shared_thread().set_active(None).unwrap();
    assert!(!runtime.shared_context().is_active());
    runtime.shared_context().close();
}

#[test]
fn test_shared_context_survives_deactivation() {
    let (_platform, runtime) = bootstrap();
    let shared = runtime.shared_context().clone();
    runtime.shared_thread().set_active(None).unwrap();

    let closed = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| shared.close()));
    assert!(closed.is_err());
    assert!(!shared.is_closed());

    runtime.shared_thread().set_active(Some(shared.clone())).unwrap();
    let thread = runtime.spawn_thread().unwrap();
    let context = runtime.create_context();
    thread.set_active(Some(context.clone())).unwrap();

    context.close();
    thread.close();
    thread.join();
    runtime.shutdown();
}

#[test]
fn test_contexts_share_through_the_shared_context() {
    let (platform, runtime) = bootstrap();
    let thread_a = runtime.spawn_thread().unwrap();
    let thread_b = runtime.spawn_thread().unwrap();
    let a = runtime.create_context();
    let b = runtime.create_context();

    thread_a.set_active(Some(a.clone())).unwrap();
    thread_b.set_active(Some(b.clone())).unwrap();
    assert_eq!(platform.stats().shared_borrows, 2);
    assert_eq!(platform.stats().contexts_created, 3);

    // The shared context went back home after each borrow.
    assert!(runtime.shared_context().is_active());
    assert!(headless(&a).shares_with(headless(runtime.shared_context())));
    assert!(headless(&a).shares_with(headless(&b)));

    run(&a, |_, context| headless(context).upload("mesh", vec![1, 2, 3])).unwrap();
    let seen = run(&b, |_, context| headless(context).download("mesh")).unwrap();
    assert_eq!(seen, Some(vec![1, 2, 3]));

    a.close();
    assert!(a.is_closed());
    assert!(!a.is_active());
    assert!(b.is_active());
    let still_there = run(&b, |_, context| headless(context).download("mesh")).unwrap();
    assert_eq!(still_there, Some(vec![1, 2, 3]));

    thread_a.close();
    thread_a.join();
    assert!(headless(&a).is_destroyed());
    assert!(!headless(&b).is_destroyed());
    assert_eq!(platform.stats().contexts_destroyed, 1);

    b.close();
    thread_b.close();
    thread_b.join();
    runtime.shutdown();
    assert_eq!(platform.stats().contexts_destroyed, 3);
}

#[test]
fn test_non_fatal_command_error_is_reported_once() {
    let (_platform, runtime) = bootstrap();
    let thread = runtime.spawn_thread().unwrap();
    let context = runtime.create_context();
    thread.set_active(Some(context.clone())).unwrap();
    let errors = context.errors();

    let result = run(&context, |_, _| Err::<(), _>(ThreadError::recoverable("texture too large")));
    assert!(result.is_err());

    let reported = errors.recv_timeout(WAIT).unwrap();
    assert_eq!(reported.message(), "texture too large");
    assert!(!reported.is_fatal());

    // A later command proves the loop is past the failing one.
    run(&context, |_, context| context.swap_buffers()).unwrap();
    assert!(context.is_active());
    assert!(errors.try_recv().is_err());

    context.close();
    thread.close();
    thread.join();
    runtime.shutdown();
}

#[test]
fn test_fatal_command_error_surfaces_on_next_switch() {
    let (platform, runtime) = bootstrap();
    let thread = runtime.spawn_thread().unwrap();
    let context = runtime.create_context();
    thread.set_active(Some(context.clone())).unwrap();
    let errors = context.errors();

    context.submit(|_, _| Err(ThreadError::fatal("device lost")));

    let err = thread.set_active(None).unwrap_err();
    assert!(matches!(err, SchedulerError::Deactivate(ref e) if e.message() == "device lost"));
    assert!(context.is_closed());
    assert_eq!(errors.recv_timeout(WAIT).unwrap().message(), "device lost");

    let err = thread.set_active(Some(context.clone())).unwrap_err();
    assert!(matches!(err, SchedulerError::Closed));

    thread.close();
    thread.join();
    assert!(headless(&context).is_destroyed());
    assert_eq!(platform.stats().contexts_destroyed, 1);
    runtime.shutdown();
}

#[test]
fn test_double_close_tears_down_once() {
    let (platform, runtime) = bootstrap();
    let thread = runtime.spawn_thread().unwrap();
    let context = runtime.create_context();
    thread.set_active(Some(context.clone())).unwrap();

    context.close();
    context.close();
    thread.close_threadable(context.clone());

    thread.close();
    thread.join();
    assert_eq!(platform.stats().contexts_destroyed, 1);
    runtime.shutdown();
}

#[test]
fn test_context_migrates_but_keeps_its_initial_thread() {
    let (platform, runtime) = bootstrap();
    let home = runtime.spawn_thread().unwrap();
    let away = runtime.spawn_thread().unwrap();
    let context = runtime.create_context();

    home.set_active(Some(context.clone())).unwrap();
    home.set_active(None).unwrap();
    away.set_active(Some(context.clone())).unwrap();

    assert_eq!(context.thread().as_ref(), Some(&away));
    assert_eq!(context.initial_thread().as_ref(), Some(&home));
    assert_eq!(platform.stats().contexts_created, 2);

    let ran_on = run(&context, |thread, _| Ok(thread.clone())).unwrap();
    assert_eq!(ran_on, away);

    // Teardown is scheduled on the initial thread, not the current one.
    context.close();
    away.close();
    away.join();
    home.close();
    home.join();
    assert!(headless(&context).is_destroyed());
    runtime.shutdown();
}

#[test]
fn test_pass_through_outside_a_command_is_rejected() {
    let (_platform, runtime) = bootstrap();
    let thread = runtime.spawn_thread().unwrap();
    let context = runtime.create_context();
    thread.set_active(Some(context.clone())).unwrap();

    let err = context.swap_buffers().unwrap_err();
    assert_eq!(err.kind(), ThreadErrorKind::Inactive);
    assert!(!err.is_fatal());

    context.close();
    thread.close();
    thread.join();
    runtime.shutdown();
}

#[test]
fn test_command_builders() {
    let (_platform, runtime) = bootstrap();
    let thread = runtime.spawn_thread().unwrap();
    let settings = ContextSettings {
        depth_bits: 24,
        stencil_bits: 8,
        ..ContextSettings::default()
    };
    let context = runtime.create_context_from_settings(settings, 64, 64);
    thread.set_active(Some(context.clone())).unwrap();

    let (tx, rx) = bounded(1);
    context.send(Context::settings_command(tx));
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), settings);

    context.send(Context::vsync_command(true));
    context.send(Context::swap_buffers_command());
    let (frames, vsync) = run(&context, |_, context| {
        let driver = headless(context);
        Ok((driver.frames(), driver.vsync_enabled()))
    })
    .unwrap();
    assert_eq!(frames, 1);
    assert!(vsync);

    context.close();
    thread.close();
    thread.join();
    runtime.shutdown();
}

#[test]
fn test_initialization_failure_closes_the_context() {
    let (platform, runtime) = bootstrap();
    let thread = runtime.spawn_thread().unwrap();
    let context = runtime.create_context();
    let errors = context.errors();

    platform.fail_next(HeadlessOp::Initialize, ThreadError::fatal("no pixel format"));
    let err = thread.set_active(Some(context.clone())).unwrap_err();
    assert!(matches!(err, SchedulerError::Activate(ref e) if e.message() == "no pixel format"));
    assert!(context.is_closed());
    assert!(context.initial_thread().is_none());
    assert_eq!(errors.recv_timeout(WAIT).unwrap().message(), "no pixel format");

    // The failed creation still handed the shared context back.
    assert!(runtime.shared_context().is_active());
    let retry = runtime.create_context();
    thread.set_active(Some(retry.clone())).unwrap();

    retry.close();
    thread.close();
    thread.join();
    runtime.shutdown();
}

#[test]
fn test_bootstrap_failure_is_reported() {
    let platform = HeadlessPlatform::new();
    platform.fail_next(HeadlessOp::Initialize, ThreadError::fatal("no display"));

    let err = Runtime::bootstrap(Arc::new(platform.clone()), RuntimeConfig::default()).unwrap_err();
    assert!(matches!(err, RuntimeError::SharedActivation(_)));
    assert_eq!(platform.stats().contexts_created, 0);
}

#[test]
fn test_threads_are_named_from_config() {
    let config = RuntimeConfig::from_toml_str(
        r#"
        shared_thread_name = "gpu-shared"
        thread_name_prefix = "gpu"
        "#,
    )
    .unwrap();
    let runtime = Runtime::bootstrap(Arc::new(HeadlessPlatform::new()), config).unwrap();

    assert_eq!(runtime.shared_thread().name(), "gpu-shared");
    let first = runtime.spawn_thread().unwrap();
    let second = runtime.spawn_thread().unwrap();
    assert_eq!(first.name(), "gpu-0");
    assert_eq!(second.name(), "gpu-1");

    first.close();
    second.close();
    first.join();
    second.join();
    runtime.shutdown();
}
