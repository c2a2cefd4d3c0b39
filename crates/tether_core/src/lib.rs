//! # Tether Core
//!
//! Scheduler for resources with **thread affinity**: things that may only be
//! created, activated and driven from one OS thread at a time, and that move
//! between threads through a synchronized handshake instead of a lock.
//!
//! ## Architecture Rules
//!
//! 1. **One active item per thread** - a [`Thread`] hosts at most one
//!    [`Threadable`] at any instant
//! 2. **Handshakes, not locks** - callers and the scheduler loop talk through
//!    rendezvous channels; the loop never shares mutable state
//! 3. **Errors carry their severity** - a fatal [`ThreadError`] tears the
//!    resource down, a non-fatal one is reported and execution continues
//!
//! ## Example
//!
//! ```rust,ignore
//! use tether_core::{Thread, ThreadConfig};
//!
//! let thread = Thread::spawn(ThreadConfig::named("render"))?;
//! thread.set_active(Some(context.clone()))?;
//! // ... submit commands to the context ...
//! thread.set_active(None)?;
//! thread.close();
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod thread;
pub mod threadable;

pub use error::{SchedulerError, SchedulerResult, ThreadError, ThreadErrorKind};
pub use thread::{Thread, ThreadConfig};
pub use threadable::{same_threadable, threadable_key, Command, Threadable, ThreadableRef};
