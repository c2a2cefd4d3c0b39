//! # Threadable
//!
//! The capability set of anything that must run on one dedicated thread at a
//! time: lifecycle hooks, a command source, an error sink and affinity
//! bookkeeping.
//!
//! ```text
//!   caller ──Command──> Threadable::commands() ──> Thread loop ──> f(thread, item)
//!                                                      │
//!                                                      └──> report_error() ──> observers
//! ```
//!
//! Every hook that takes a `&Thread` is only ever invoked by that thread's
//! scheduler loop.

use std::any::Any;
use std::sync::Arc;

use crossbeam_channel::Receiver;

use crate::error::ThreadError;
use crate::thread::Thread;

/// A unit of work executed on the thread that currently owns a Threadable.
///
/// The function observes the Threadable as active and running on the given
/// thread. A returned error is reported to the Threadable's observers, and a
/// fatal one deactivates it.
pub type Command = Box<dyn FnOnce(&Thread, &dyn Threadable) -> Result<(), ThreadError> + Send>;

/// Shared handle to a Threadable.
pub type ThreadableRef = Arc<dyn Threadable>;

/// Anything schedulable on a dedicated [`Thread`].
///
/// Implementations use interior mutability: the scheduler and the callers of
/// [`Thread::set_active`] only ever hold shared references.
pub trait Threadable: Send + Sync + 'static {
    /// Returns false until [`initialize`](Self::initialize) has succeeded once.
    ///
    /// Threadables without thread-dependent setup always return true.
    fn is_initialized(&self) -> bool;

    /// Performs thread-dependent setup. Called at most once, and only while
    /// [`is_initialized`](Self::is_initialized) is false.
    ///
    /// # Errors
    ///
    /// Returns the error that prevented setup. The Threadable stays
    /// uninitialized.
    fn initialize(&self, thread: &Thread) -> Result<(), ThreadError>;

    /// Thread-side teardown, run on the thread that initialized the
    /// Threadable once per successful [`initialize`](Self::initialize).
    fn teardown(&self, thread: &Thread);

    /// First hook run when the Threadable becomes active on `thread`.
    ///
    /// # Errors
    ///
    /// Any error aborts the activation and closes the Threadable.
    fn activate(&self, thread: &Thread) -> Result<(), ThreadError>;

    /// Last hook run before the Threadable leaves `thread`.
    ///
    /// # Errors
    ///
    /// A fatal error closes the Threadable.
    fn deactivate(&self, thread: &Thread) -> Result<(), ThreadError>;

    /// Receive end of the Threadable's command queue.
    fn commands(&self) -> Receiver<Command>;

    /// Non-blocking sink for errors raised on the owning thread.
    fn report_error(&self, err: ThreadError);

    /// Records the thread the Threadable is running on.
    ///
    /// Only called by the [`Thread`] that is releasing ownership.
    fn set_thread(&self, thread: Option<Thread>);

    /// Records `thread` as the owner if there is none, in one atomic step.
    ///
    /// Returns false, and changes nothing, when another thread owns the
    /// Threadable. Two threads racing for a free Threadable must not both
    /// succeed.
    fn try_claim(&self, thread: &Thread) -> bool;

    /// Returns the thread the Threadable is running on, if any.
    fn thread(&self) -> Option<Thread>;

    /// Caller-side close: deactivates if needed and schedules
    /// [`teardown`](Self::teardown) on the initializing thread.
    ///
    /// A closed Threadable can never be reactivated.
    fn close(&self);

    /// Returns true once [`close`](Self::close) has run.
    fn is_closed(&self) -> bool;

    /// Upcast used by typed command wrappers.
    fn as_any(&self) -> &dyn Any;
}

/// Identity of a Threadable, independent of the vtable it is viewed through.
#[inline]
#[must_use]
pub fn threadable_key(item: &ThreadableRef) -> usize {
    Arc::as_ptr(item).cast::<()>() as usize
}

/// Returns true if both handles point at the same Threadable.
#[inline]
#[must_use]
pub fn same_threadable(a: &ThreadableRef, b: &ThreadableRef) -> bool {
    threadable_key(a) == threadable_key(b)
}
