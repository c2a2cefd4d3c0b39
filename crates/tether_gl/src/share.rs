//! # Shared Context Lease
//!
//! Every context shares its objects with one process-wide shared context.
//! Creating a sharing context needs the shared handle current on the
//! *creating* thread, while the platform forbids a handle from being current
//! on two threads at once. The handle is lent out for exactly one creation
//! call:
//!
//! ```text
//!   borrower loop                         shared loop
//!   ─────────────                         ───────────
//!   submit pause command ───────────────> driver.pause(rendezvous)
//!                                           detach from home thread
//!   wait paused  <─────────── paused ────── park
//!   driver.take()                              │
//!   create the new context                     │ blocked, so no other
//!   driver.release()                           │ borrower can interleave
//!   resume ─────────────────────────────────> reattach, return
//! ```
//!
//! Release and resume live in [`SharedLease`]'s `Drop`, so they run on every
//! exit path, including a panicking creation call.

use crossbeam_channel::{bounded, Receiver, Sender};
use tether_core::{Thread, ThreadError, ThreadErrorKind, Threadable};

use crate::context::Context;
use crate::driver::ContextDriver;

/// Shared-loop side of the pause handshake, handed to
/// [`ContextDriver::pause`].
pub struct Rendezvous {
    paused: Sender<()>,
    resume: Receiver<()>,
}

impl Rendezvous {
    /// Tells the borrower the handle is detached, then blocks until it has
    /// been given back.
    ///
    /// Drivers call this between detaching from and reattaching to the home
    /// thread.
    pub fn park(&self) {
        if self.paused.send(()).is_err() {
            tracing::warn!("shared context borrower went away before the pause");
            return;
        }
        if self.resume.recv().is_err() {
            tracing::warn!("shared context borrower went away without resuming");
        }
    }
}

/// Borrower side of the pause handshake.
struct Borrower {
    paused: Receiver<()>,
    resume: Sender<()>,
}

fn rendezvous() -> (Rendezvous, Borrower) {
    let (paused_tx, paused_rx) = bounded(0);
    let (resume_tx, resume_rx) = bounded(0);
    (
        Rendezvous {
            paused: paused_tx,
            resume: resume_rx,
        },
        Borrower {
            paused: paused_rx,
            resume: resume_tx,
        },
    )
}

/// Exclusive custody of the shared context's handle on the borrowing thread.
///
/// While a lease is alive the shared context's loop is parked inside the
/// pause command, so leases are mutually exclusive.
pub(crate) struct SharedLease<'a> {
    shared: &'a Context,
    borrower: Borrower,
    taken: bool,
}

impl<'a> SharedLease<'a> {
    /// Pauses `shared` on its home thread and makes its handle current on
    /// the calling loop.
    ///
    /// # Errors
    ///
    /// - `SharedUnavailable` if `shared` is not active, or is active on the
    ///   borrowing thread itself (pausing would park the caller's own loop).
    /// - `SharedUnavailable` if the shared driver failed to detach.
    /// - The driver's `take` error.
    pub(crate) fn acquire(shared: &'a Context, borrower: &Thread) -> Result<Self, ThreadError> {
        match shared.thread() {
            Some(home) if home != *borrower => {}
            Some(_) => {
                return Err(ThreadError::new(
                    ThreadErrorKind::SharedUnavailable,
                    "cannot borrow the shared context from its own thread",
                    true,
                ))
            }
            None => {
                return Err(ThreadError::new(
                    ThreadErrorKind::SharedUnavailable,
                    "shared context is not active",
                    true,
                ))
            }
        }

        let (rendezvous, borrower_side) = rendezvous();
        shared.submit(move |_, context| context.driver().pause(&rendezvous));

        if borrower_side.paused.recv().is_err() {
            // The pause command returned without parking.
            return Err(ThreadError::new(
                ThreadErrorKind::SharedUnavailable,
                "shared context failed to pause",
                true,
            ));
        }

        let mut lease = Self {
            shared,
            borrower: borrower_side,
            taken: false,
        };
        lease.shared.driver().take()?;
        lease.taken = true;

        tracing::debug!(thread = %borrower.name(), "shared context borrowed");
        Ok(lease)
    }

    /// Driver of the borrowed shared context, current on this thread.
    pub(crate) fn driver(&self) -> &dyn ContextDriver {
        self.shared.driver()
    }
}

impl Drop for SharedLease<'_> {
    fn drop(&mut self) {
        if self.taken {
            if let Err(err) = self.shared.driver().release() {
                tracing::error!(error = %err, "failed to release the shared context");
                self.shared.report_error(err);
            }
        }
        if self.borrower.resume.send(()).is_err() {
            tracing::warn!("shared context loop went away during a lease");
        }
        tracing::debug!("shared context returned");
    }
}
