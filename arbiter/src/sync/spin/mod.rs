//! # Spin Locks Module
//!
//! Low-level mutual exclusion for short critical sections.
//!
//! ## Implementations
//! - [x] [`RawIrqSpinLock`] - the shared skeleton: interrupt masking, holder
//!   tracking, misuse detection
//! - [x] [`Ticket`] - fair spinning using the ticket algorithm
//!   ▶ Strict FIFO admission, no starvation
//! - [x] [`Backoff`] - single-slot spinning with randomized exponential backoff
//!   ▶ Better under high contention, no ordering guarantee
//! - [x] [`KernelLock`] - the build-time choice between the two (`backoff` feature)
//!
//! ## Usage Guidelines
//! ```rust
//! use xux_arbiter::SpinLock;
//! let lock = SpinLock::new(0);
//! *lock.lock() = 42;
//! assert_eq!(*lock.lock(), 42);
//! ```
//!
//! ## Safety
//! - Spinlocks MUST NOT be held across long-running operations
//! - Guards are `!Send`: release on the processor that acquired
//! - Acquiring a lock you already hold, or releasing one you don't, panics

mod backoff;
mod identity;
mod mutex;
mod ticket;
#[cfg(test)]
mod test;

pub use backoff::Backoff;
pub use identity::LockIdentity;
pub use mutex::RawIrqSpinLock;
pub use ticket::Ticket;

/// A spin discipline plugged into [`RawIrqSpinLock`].
///
/// # Safety
/// `spin_acquire` and a successful `spin_try_acquire` must give the caller
/// exclusive ownership with acquire ordering until `spin_release`, which must
/// publish with release ordering.
pub unsafe trait SpinStrategy {
    const INIT: Self;

    /// Spins until owned.
    fn spin_acquire(&self);

    /// One attempt at ownership, never spins.
    fn spin_try_acquire(&self) -> bool;

    /// # Safety
    /// The caller owns the lock.
    unsafe fn spin_release(&self);

    fn is_locked(&self) -> bool;
}

/// FIFO ticket lock without data.
pub type RawSpinLock = RawIrqSpinLock<Ticket>;

/// Randomized backoff lock without data.
pub type RawBackoffLock = RawIrqSpinLock<Backoff>;

/// A ticket-based mutex that ensures FIFO ordering for lock acquisition.
pub type SpinLock<T> = lock_api::Mutex<RawSpinLock, T>;
pub type SpinLockGuard<'a, T> = lock_api::MutexGuard<'a, RawSpinLock, T>;

/// A backoff mutex, same contract as [`SpinLock`] without fairness.
pub type BackoffLock<T> = lock_api::Mutex<RawBackoffLock, T>;
pub type BackoffLockGuard<'a, T> = lock_api::MutexGuard<'a, RawBackoffLock, T>;

/// The discipline the rest of the crate locks with.
#[cfg(not(feature = "backoff"))]
pub type RawKernelLock = RawSpinLock;
#[cfg(feature = "backoff")]
pub type RawKernelLock = RawBackoffLock;

pub type KernelLock<T> = lock_api::Mutex<RawKernelLock, T>;
pub type KernelLockGuard<'a, T> = lock_api::MutexGuard<'a, RawKernelLock, T>;
