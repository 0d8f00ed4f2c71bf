use core::panic::Location;
use core::sync::atomic::{fence, Ordering};

use lock_api::{GuardNoSend, RawMutex};

use super::identity::{LockIdentity, Site};
use super::SpinStrategy;
use crate::interrupt::InterruptController;
use crate::processor::current_processor_id;

/// Interrupt-safe spin lock skeleton shared by every spin discipline.
///
/// Acquire masks interrupts on the current processor before spinning and
/// release unmasks them (nested, see [`crate::interrupt`]), so an interrupt
/// handler can never spin on a lock the code it interrupted is holding. The
/// skeleton also owns misuse detection:
/// - acquiring a lock the current processor already holds panics
/// - releasing a lock the current processor does not hold panics
///
/// The spin discipline itself is `S`.
pub struct RawIrqSpinLock<S> {
    strategy: S,
    identity: LockIdentity,
}

impl<S: SpinStrategy> RawIrqSpinLock<S> {
    pub const fn named(name: &'static str) -> Self {
        Self {
            strategy: S::INIT,
            identity: LockIdentity::new(name),
        }
    }

    /// Spins until the lock is held by the current processor.
    ///
    /// # Panics
    /// If the current processor already holds the lock.
    #[track_caller]
    pub fn acquire(&self) {
        self.acquire_at(Some(Location::caller()));
    }

    /// Releases the lock.
    ///
    /// # Panics
    /// If the current processor does not hold the lock.
    pub fn release(&self) {
        let me = current_processor_id();
        if !self.identity.is_held_by(me) {
            panic!(
                "lock `{}` released by processor {} but held by {}",
                self.identity.name(),
                me,
                holder_name(self.identity.holder()),
            );
        }
        self.identity.clear();
        fence(Ordering::Release);
        // SAFETY: ownership checked above.
        unsafe { self.strategy.spin_release() };
        InterruptController::leave_nested();
    }

    /// One attempt, never spins and never panics.
    #[track_caller]
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Some(Location::caller()))
    }

    pub fn is_held_by_current_processor(&self) -> bool {
        self.identity.is_held_by(current_processor_id())
    }

    /// Whether anybody holds the lock right now.
    pub fn is_locked(&self) -> bool {
        self.strategy.is_locked()
    }

    pub fn name(&self) -> &'static str {
        self.identity.name()
    }

    pub fn identity(&self) -> &LockIdentity {
        &self.identity
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    fn acquire_at(&self, site: Site) {
        InterruptController::enter_nested();
        self.check_dead_lock();

        if !self.strategy.spin_try_acquire() {
            log::trace!("lock `{}` contended, spinning", self.identity.name());
            self.strategy.spin_acquire();
        }
        fence(Ordering::Acquire);

        self.identity.claim(current_processor_id(), site);
    }

    fn try_acquire_at(&self, site: Site) -> bool {
        InterruptController::enter_nested();
        if !self.is_held_by_current_processor() && self.strategy.spin_try_acquire() {
            fence(Ordering::Acquire);
            self.identity.claim(current_processor_id(), site);
            true
        } else {
            InterruptController::leave_nested();
            false
        }
    }

    /// Recursive locking would spin forever; fail loudly instead.
    #[inline]
    fn check_dead_lock(&self) {
        if self.is_held_by_current_processor() {
            panic!(
                "dead lock: lock `{}` re-acquired by processor {} (held since {})",
                self.identity.name(),
                current_processor_id(),
                self.identity.describe_site(),
            );
        }
    }
}

fn holder_name(holder: usize) -> String {
    if holder == crate::processor::ProcessorId::NONE {
        String::from("nobody")
    } else {
        format!("processor {}", holder)
    }
}

unsafe impl<S: SpinStrategy> RawMutex for RawIrqSpinLock<S> {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self::named("<anonymous>");

    // Holder tracking and interrupt masking are per processor, a guard must
    // be released where it was taken.
    type GuardMarker = GuardNoSend;

    fn lock(&self) {
        self.acquire_at(None);
    }

    fn try_lock(&self) -> bool {
        self.try_acquire_at(None)
    }

    unsafe fn unlock(&self) {
        self.release();
    }

    fn is_locked(&self) -> bool {
        self.strategy.is_locked()
    }
}

impl<S: SpinStrategy> core::fmt::Debug for RawIrqSpinLock<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RawIrqSpinLock")
            .field("name", &self.identity.name())
            .field("locked", &self.is_locked())
            .field("holder", &holder_name(self.identity.holder()))
            .finish()
    }
}
