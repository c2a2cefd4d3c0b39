//! # Scheduler Error Types
//!
//! Two layers of errors live here:
//!
//! - [`ThreadError`]: raised *on* a dedicated thread by a Threadable or a
//!   command. Every one carries a fatal flag. Fatal means the owning resource
//!   must be torn down, non-fatal means it is reported and the resource keeps
//!   running.
//! - [`SchedulerError`]: returned to the caller of [`Thread::set_active`]
//!   when a switch is refused or one of its two acknowledgements failed.
//!
//! [`Thread::set_active`]: crate::Thread::set_active

use std::fmt;

use thiserror::Error;

/// Broad classification of a [`ThreadError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ThreadErrorKind {
    /// The platform driver failed.
    Driver,
    /// The resource was already closed.
    Closed,
    /// A window-only operation ran on a thread other than the window's
    /// initial thread.
    NotInitialThread,
    /// The operation needs the resource to be active on the calling thread.
    Inactive,
    /// A command was executed against a Threadable of the wrong type.
    ForeignCommand,
    /// The shared resource could not be borrowed.
    SharedUnavailable,
    /// A channel the operation depended on was disconnected.
    Disconnected,
}

impl fmt::Display for ThreadErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Driver => "driver",
            Self::Closed => "closed",
            Self::NotInitialThread => "not on initial thread",
            Self::Inactive => "inactive",
            Self::ForeignCommand => "foreign command",
            Self::SharedUnavailable => "shared resource unavailable",
            Self::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// An error raised on a dedicated thread, annotated with a fatal flag.
///
/// Immutable once constructed.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("{kind} error: {message}{}", fatal_suffix(.fatal))]
pub struct ThreadError {
    kind: ThreadErrorKind,
    message: String,
    fatal: bool,
}

impl ThreadError {
    /// Creates an error of the given kind.
    #[must_use]
    pub fn new(kind: ThreadErrorKind, message: impl Into<String>, fatal: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            fatal,
        }
    }

    /// Creates a fatal driver error. The owning resource will be torn down.
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ThreadErrorKind::Driver, message, true)
    }

    /// Creates a non-fatal driver error. It is reported and execution continues.
    #[must_use]
    pub fn recoverable(message: impl Into<String>) -> Self {
        Self::new(ThreadErrorKind::Driver, message, false)
    }

    /// Returns true if the owning resource must be torn down.
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    /// Returns the error classification.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ThreadErrorKind {
        self.kind
    }

    /// Returns the human readable message.
    #[inline]
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

fn fatal_suffix(fatal: &bool) -> &'static str {
    if *fatal {
        " (fatal)"
    } else {
        ""
    }
}

/// Errors returned by [`Thread`](crate::Thread) operations.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// The Threadable is currently active on another thread.
    #[error("threadable is active on another thread")]
    OwnedElsewhere,

    /// The Threadable has been closed and can never be reactivated.
    #[error("threadable is closed")]
    Closed,

    /// The thread no longer accepts activations.
    #[error("thread is closed")]
    ThreadClosed,

    /// The previously active Threadable failed to deactivate.
    ///
    /// Also carries a fatal command error that was deferred until the
    /// resource was switched away.
    #[error("deactivation failed: {0}")]
    Deactivate(ThreadError),

    /// The requested Threadable failed to initialize or activate.
    #[error("activation failed: {0}")]
    Activate(ThreadError),

    /// The OS thread could not be spawned.
    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl SchedulerError {
    /// Returns the underlying [`ThreadError`] for acknowledgement failures.
    #[must_use]
    pub fn thread_error(&self) -> Option<&ThreadError> {
        match self {
            Self::Deactivate(err) | Self::Activate(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;
