use core::sync::atomic::{AtomicU32, Ordering};

use super::SpinStrategy;

/// Ticket discipline: strict FIFO admission.
///
/// Each acquirer takes a ticket from `tail` and spins until `head` ("now
/// serving") reaches it. Release advances `head`, admitting exactly the next
/// ticket holder. Counters wrap; only equality and differences are used.
pub struct Ticket {
    head: AtomicU32,      // Currently allowed ticket number
    tail: AtomicU32,      // Next available ticket number
}

impl Ticket {
    /// Ticket that will be admitted next.
    pub fn now_serving(&self) -> u32 {
        self.head.load(Ordering::Relaxed)
    }

    /// Ticket the next acquirer will draw.
    pub fn next_ticket(&self) -> u32 {
        self.tail.load(Ordering::Relaxed)
    }

    /// Tickets issued and not yet served: the holder plus every spinner.
    pub fn queued(&self) -> u32 {
        let head = self.head.load(Ordering::Acquire);
        self.tail.load(Ordering::Acquire).wrapping_sub(head)
    }

    /// Spinners behind the current holder.
    pub fn waiters(&self) -> u32 {
        self.queued().saturating_sub(1)
    }
}

unsafe impl SpinStrategy for Ticket {
    const INIT: Self = Ticket {
        head: AtomicU32::new(0),
        tail: AtomicU32::new(0),
    };

    fn spin_acquire(&self) {
        // 1. Get a ticket (FIFO guarantee)
        let my_ticket = self.tail.fetch_add(1, Ordering::Relaxed);

        // 2. Spin until it's our turn
        while self.head.load(Ordering::Acquire) != my_ticket {
            core::hint::spin_loop();
        }
    }

    fn spin_try_acquire(&self) -> bool {
        // Only free when every issued ticket has been served; claim the
        // next one in the same step or give up.
        let head = self.head.load(Ordering::Acquire);
        self.tail
            .compare_exchange(head, head.wrapping_add(1), Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn spin_release(&self) {
        // Advance to next ticket
        self.head.fetch_add(1, Ordering::Release);
    }

    fn is_locked(&self) -> bool {
        self.queued() != 0
    }
}
