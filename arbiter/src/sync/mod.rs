//! Synchronization primitives.

pub mod rw;
pub mod spin;

pub use rw::RwSpinLock;
pub use spin::{BackoffLock, KernelLock, SpinLock};
