use core::sync::atomic::{AtomicBool, Ordering};

use super::SpinStrategy;
use crate::config::BACKOFF_MAX_SPINS;
use crate::processor::current_processor_id;

/// Randomized backoff discipline: single-slot ownership.
///
/// An acquirer makes one compare-and-swap on the held flag; on failure it
/// pauses for a random burst drawn from `1..=window`, doubles the window (up
/// to [`BACKOFF_MAX_SPINS`]) and tries again. There is no ordering between
/// spinners, so one can lose indefinitely under heavy contention; throughput
/// is traded for fairness.
pub struct Backoff {
    locked: AtomicBool,
}

unsafe impl SpinStrategy for Backoff {
    const INIT: Self = Backoff {
        locked: AtomicBool::new(false),
    };

    fn spin_acquire(&self) {
        let mut rng = Lcg::new(self as *const Self as usize ^ current_processor_id().as_usize());
        let mut window = 1;
        while !self.spin_try_acquire() {
            for _ in 0..rng.next_in(window) {
                core::hint::spin_loop();
            }
            window = (window << 1).min(BACKOFF_MAX_SPINS);
        }
    }

    fn spin_try_acquire(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn spin_release(&self) {
        self.locked.store(false, Ordering::Release);
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

/// Numerical Recipes linear congruential generator; quality is irrelevant,
/// it only has to decorrelate spinners cheaply.
pub(crate) struct Lcg(u32);

impl Lcg {
    pub(crate) fn new(seed: usize) -> Self {
        // fold the upper half in so address-derived seeds differ
        Self((seed as u64 ^ (seed as u64 >> 32)) as u32 | 1)
    }

    pub(crate) fn next(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        // low bits of an LCG cycle quickly
        self.0 >> 16
    }

    /// Uniform-ish value in `1..=bound`.
    pub(crate) fn next_in(&mut self, bound: u32) -> u32 {
        1 + self.next() % bound.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lcg_bursts_stay_in_bounds() {
        let mut rng = Lcg::new(0xdead_beef);
        for window in [1, 2, 17, BACKOFF_MAX_SPINS] {
            for _ in 0..1000 {
                let spins = rng.next_in(window);
                assert!((1..=window).contains(&spins));
            }
        }
    }

    #[test]
    fn lcg_is_not_constant() {
        let mut rng = Lcg::new(7);
        let first = rng.next();
        assert!((0..16).any(|_| rng.next() != first));
    }

    #[test]
    fn single_slot_claim() {
        let lock = Backoff::INIT;
        assert!(lock.spin_try_acquire());
        assert!(lock.is_locked());
        assert!(!lock.spin_try_acquire());
        unsafe { lock.spin_release() };
        lock.spin_acquire();
        assert!(lock.is_locked());
        unsafe { lock.spin_release() };
    }
}
