//! A readers-writer spin lock built on one atomic word.
//!
//! Used where reads vastly outnumber writes (the arbiter's policy slot is read
//! on every request and written on `set_policy`). A waiting writer blocks new
//! readers, so a steady stream of readers cannot starve it.

use core::sync::atomic::{AtomicU32, Ordering};
use lock_api::GuardSend;

/// The raw implementation of a readers-writer lock.
///
/// State word layout:
/// - bit 0: a writer holds the lock
/// - bit 1: a writer is waiting
/// - bits 2..: reader count
pub struct RawRwSpinLock(AtomicU32);

const WRITER: u32 = 1;
const WRITER_WAITING: u32 = 1 << 1;
const READER: u32 = 1 << 2;

/// A readers-writer lock type providing shared read access and exclusive write access.
pub type RwSpinLock<T> = lock_api::RwLock<RawRwSpinLock, T>;
pub type RwSpinLockReadGuard<'a, T> = lock_api::RwLockReadGuard<'a, RawRwSpinLock, T>;
pub type RwSpinLockWriteGuard<'a, T> = lock_api::RwLockWriteGuard<'a, RawRwSpinLock, T>;

impl RawRwSpinLock {
    /// Number of readers currently inside.
    pub fn readers(&self) -> u32 {
        self.0.load(Ordering::Relaxed) / READER
    }
}

unsafe impl lock_api::RawRwLock for RawRwSpinLock {
    const INIT: RawRwSpinLock = RawRwSpinLock(AtomicU32::new(0));
    type GuardMarker = GuardSend;

    fn lock_shared(&self) {
        while !self.try_lock_shared() {
            core::hint::spin_loop();
        }
    }

    fn try_lock_shared(&self) -> bool {
        let state = self.0.load(Ordering::Relaxed);
        if state & (WRITER | WRITER_WAITING) != 0 {
            return false;
        }
        self.0
            .compare_exchange(state, state + READER, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock_shared(&self) {
        self.0.fetch_sub(READER, Ordering::Release);
    }

    fn lock_exclusive(&self) {
        loop {
            if self.try_lock_exclusive() {
                return;
            }
            // Announce ourselves so no new reader gets in.
            self.0.fetch_or(WRITER_WAITING, Ordering::Relaxed);
            core::hint::spin_loop();
        }
    }

    fn try_lock_exclusive(&self) -> bool {
        let state = self.0.load(Ordering::Relaxed);
        if state & !WRITER_WAITING != 0 {
            return false;
        }
        // Clears our waiting bit; another waiting writer sets it again.
        self.0
            .compare_exchange(state, WRITER, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock_exclusive(&self) {
        self.0.fetch_and(!WRITER, Ordering::Release);
    }

    fn is_locked(&self) -> bool {
        self.0.load(Ordering::Relaxed) & !WRITER_WAITING != 0
    }

    fn is_locked_exclusive(&self) -> bool {
        self.0.load(Ordering::Relaxed) & WRITER != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn readers_share_writers_exclude() {
        let lock = RwSpinLock::new(5);
        {
            let a = lock.read();
            let b = lock.read();
            assert_eq!(*a + *b, 10);
            assert!(lock.try_write().is_none());
        }
        *lock.write() += 1;
        assert!(lock.try_read().is_some());
        assert_eq!(*lock.read(), 6);
    }

    #[test]
    fn waiting_writer_blocks_new_readers() {
        let lock = Arc::new(RwSpinLock::new(0u32));
        let reader = lock.read();

        let writer = {
            let lock = lock.clone();
            thread::spawn(move || *lock.write() += 1)
        };
        while lock.try_read().is_some() {
            thread::yield_now();
        }
        drop(reader);
        writer.join().unwrap();
        assert_eq!(*lock.read(), 1);
    }
}
