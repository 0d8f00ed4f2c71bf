//! Per-processor interrupt masking.
//!
//! Interrupt disabling nests: the first [`InterruptController::enter_nested`]
//! on a processor records whether interrupts were enabled, inner levels only
//! count, and the outermost [`InterruptController::leave_nested`] puts the
//! recorded state back. Spin locks mask interrupts for as long as they are
//! held so a handler on the same processor can never spin on a lock the
//! interrupted code owns.

use core::marker::PhantomData;

use crate::processor::{with_current_processor, PendingInterrupt};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InterruptState {
    Enabled,
    Disabled,
}

impl From<InterruptState> for bool {
    fn from(value: InterruptState) -> Self {
        match value {
            InterruptState::Enabled => true,
            InterruptState::Disabled => false,
        }
    }
}

impl From<bool> for InterruptState {
    fn from(value: bool) -> Self {
        match value {
            true => InterruptState::Enabled,
            false => InterruptState::Disabled,
        }
    }
}

pub struct InterruptController;

impl InterruptController {
    /// Enables interrupts on the current processor and delivers anything
    /// raised while they were masked.
    #[inline]
    pub fn global_enable() {
        with_current_processor(|p| p.set_interrupt_state(InterruptState::Enabled));
        Self::deliver_pending();
    }

    #[inline]
    pub fn global_disable() {
        with_current_processor(|p| p.set_interrupt_state(InterruptState::Disabled));
    }

    pub fn get_state() -> InterruptState {
        with_current_processor(|p| p.interrupt_state())
    }

    pub fn set_state(state: InterruptState) {
        match state {
            InterruptState::Enabled => Self::global_enable(),
            InterruptState::Disabled => Self::global_disable(),
        }
    }

    /// Current masking depth of this processor.
    pub fn nest_depth() -> usize {
        with_current_processor(|p| p.nest_depth())
    }

    /// Masks interrupts and returns a guard that unmasks them when dropped.
    pub fn intr_disable_nested() -> IntrReqGuard {
        IntrReqGuard::new()
    }

    /// Raw form of [`IntrReqGuard::new`]; must be paired with
    /// [`leave_nested`](Self::leave_nested) on the same processor.
    pub fn enter_nested() {
        with_current_processor(|p| {
            let old_intr_state = p.interrupt_state();
            p.set_interrupt_state(InterruptState::Disabled);

            // 0 -> 1
            if p.increment_nest() == 0 {
                p.set_saved_interrupt_state(old_intr_state);
            }
        });
    }

    /// Leaves one masking level.
    ///
    /// # Panics
    /// When interrupts are enabled (someone unmasked inside the nest) or when
    /// there is no level left to leave.
    pub fn leave_nested() {
        let restore = with_current_processor(|p| {
            if p.interrupt_state() == InterruptState::Enabled {
                panic!(
                    "interrupt nest left on processor {} while interrupts are enabled",
                    p.id()
                );
            }
            match p.decrement_nest() {
                // Last level going out of scope
                Some(1) => Some(p.saved_interrupt_state()),
                Some(_) => None,
                None => panic!("unbalanced interrupt nest on processor {}", p.id()),
            }
        });

        if let Some(state) = restore {
            Self::set_state(state);
        }
    }

    /// Emulates an interrupt arriving on the current processor.
    ///
    /// The handler runs right away with interrupts masked if the processor
    /// accepts interrupts, otherwise it stays pending until they are enabled.
    pub fn raise(handler: impl FnOnce() + 'static) {
        let handler: PendingInterrupt = Box::new(handler);
        if Self::get_state() == InterruptState::Enabled {
            Self::dispatch(handler);
            // anything the handler raised was queued while it ran masked
            Self::deliver_pending();
        } else {
            log::trace!("interrupt pending on masked processor");
            with_current_processor(|p| p.queue_pending(handler));
        }
    }

    /// Number of interrupts waiting for this processor to unmask.
    pub fn pending_count() -> usize {
        with_current_processor(|p| p.pending_count())
    }

    fn deliver_pending() {
        loop {
            let pending = with_current_processor(|p| p.take_pending());
            if pending.is_empty() {
                break;
            }
            for handler in pending {
                Self::dispatch(handler);
            }
        }
    }

    fn dispatch(handler: PendingInterrupt) {
        with_current_processor(|p| p.set_interrupt_state(InterruptState::Disabled));
        handler();
        with_current_processor(|p| p.set_interrupt_state(InterruptState::Enabled));
    }
}

/// RAII guard for interrupt-disabled critical sections.
///
/// When dropped, restores the previous interrupt state if this is the
/// outermost guard in a nesting chain. Tied to the processor that created it.
pub struct IntrReqGuard {
    _not_send: PhantomData<*const ()>,
}

impl IntrReqGuard {
    pub fn new() -> Self {
        InterruptController::enter_nested();
        Self { _not_send: PhantomData }
    }
}

impl Default for IntrReqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IntrReqGuard {
    fn drop(&mut self) {
        InterruptController::leave_nested();
    }
}
