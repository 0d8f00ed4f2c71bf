//! XUX Arbiter
//!
//! The synchronization layer of XUX-OS lifted onto a hosted target, plus the
//! resource arbiter that sits on top of it:
//! - Interrupt-safe spin locks with ticket (FIFO) and randomized backoff disciplines
//! - Nested per-processor interrupt masking
//! - A resource ownership arbiter with pluggable policies, a bounded audit log and
//!   a table persisted in a region that several processes can map at once
//!
//! # Architectural Overview
//! ```text
//! +---------------------------+
//! |        Arbiter            |  request / get_log / set_policy
//! +---------------------------+
//! | Region (heap | mmap+flock)|
//! +---------------------------+
//! |  KernelLock (ticket|back) |
//! +---------------------------+
//! |   IntrReqGuard / nesting  |
//! +---------------------------+
//! |   Processor-local state   |
//! +---------------------------+
//! ```
//!
//! On a hosted target a "processor" is the current OS thread and the interrupt
//! enable bit is emulated per processor by [`interrupt::InterruptController`].

// #![deny(missing_docs)]

extern crate self as xux_arbiter;

pub mod arbiter;
pub mod config;
pub mod interrupt;
pub mod io;
pub mod processor;
pub mod sync;

#[doc(hidden)]
pub mod testing;

pub use arbiter::{
    AlwaysAllow, Arbiter, ArbiterError, ArbitrationEntry, ArbitrationLogEntry, Decision,
    PermissivePolicy, Policy, RegionError, RestrictivePolicy,
};
pub use config::{ArbiterConfig, Backing};
pub use interrupt::{InterruptController, InterruptState, IntrReqGuard};
pub use sync::spin::{
    BackoffLock, KernelLock, RawBackoffLock, RawKernelLock, RawSpinLock, SpinLock,
};
