//! Processor-local state for the hosted target.
//!
//! Each OS thread plays the role of one processor (hart). A thread receives a
//! unique [`ProcessorId`] the first time it asks for one, and owns a
//! [`ProcessorLocal`] holding its interrupt enable bit and masking nest state.

use core::cell::{Cell, RefCell};
use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::interrupt::InterruptState;

/// A unique identifier for a processor (one hosted thread).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessorId(usize);

impl ProcessorId {
    /// Sentinel stored in lock identities when nobody holds the lock.
    pub const NONE: usize = usize::MAX;

    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl From<ProcessorId> for usize {
    fn from(value: ProcessorId) -> Self {
        value.0
    }
}

impl fmt::Display for ProcessorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

static NEXT_PROCESSOR_ID: AtomicUsize = AtomicUsize::new(0);

pub(crate) type PendingInterrupt = Box<dyn FnOnce()>;

/// Per-processor state. Only the owning processor ever touches it, so plain
/// cells are enough.
pub struct ProcessorLocal {
    id: ProcessorId,

    // - Interrupt

    /// Emulated interrupt enable bit (`sstatus.SIE` on the real target).
    interrupt_enabled: Cell<bool>,
    /// Nesting counter for interrupt disable operations.
    interrupt_nest_cnt: Cell<usize>,
    /// Saved interrupt state for restoration when the nest unwinds.
    saved_interrupt_state: Cell<bool>,
    /// Interrupts raised while masked, delivered on re-enable.
    pending: RefCell<Vec<PendingInterrupt>>,
}

impl ProcessorLocal {
    fn new() -> Self {
        let id = ProcessorId(NEXT_PROCESSOR_ID.fetch_add(1, Ordering::Relaxed));
        Self {
            id,
            interrupt_enabled: Cell::new(true),
            interrupt_nest_cnt: Cell::new(0),
            saved_interrupt_state: Cell::new(true),
            pending: RefCell::new(Vec::new()),
        }
    }

    pub fn id(&self) -> ProcessorId {
        self.id
    }

    // ========== interrupt bit ========== //
    pub(crate) fn interrupt_state(&self) -> InterruptState {
        self.interrupt_enabled.get().into()
    }

    pub(crate) fn set_interrupt_state(&self, state: InterruptState) {
        self.interrupt_enabled.set(state.into());
    }

    // ========== nesting ========== //
    pub fn saved_interrupt_state(&self) -> InterruptState {
        self.saved_interrupt_state.get().into()
    }

    pub(crate) fn set_saved_interrupt_state(&self, state: InterruptState) {
        self.saved_interrupt_state.set(state.into());
    }

    pub fn nest_depth(&self) -> usize {
        self.interrupt_nest_cnt.get()
    }

    /// Returns the depth before the increment.
    pub(crate) fn increment_nest(&self) -> usize {
        let old = self.interrupt_nest_cnt.get();
        self.interrupt_nest_cnt.set(old + 1);
        old
    }

    /// Returns the depth before the decrement, or `None` when already at zero.
    pub(crate) fn decrement_nest(&self) -> Option<usize> {
        let old = self.interrupt_nest_cnt.get();
        let new = old.checked_sub(1)?;
        self.interrupt_nest_cnt.set(new);
        Some(old)
    }

    // ========== pending delivery ========== //
    pub(crate) fn queue_pending(&self, handler: PendingInterrupt) {
        self.pending.borrow_mut().push(handler);
    }

    pub(crate) fn take_pending(&self) -> Vec<PendingInterrupt> {
        core::mem::take(&mut *self.pending.borrow_mut())
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }
}

thread_local! {
    static PROCESSOR_LOCAL: ProcessorLocal = ProcessorLocal::new();
}

/// Runs `f` with the current processor's local state.
#[inline]
pub fn with_current_processor<R>(f: impl FnOnce(&ProcessorLocal) -> R) -> R {
    PROCESSOR_LOCAL.with(f)
}

/// Returns the ID of the current processor.
#[inline]
pub fn current_processor_id() -> ProcessorId {
    with_current_processor(|p| p.id())
}

/// Like [`current_processor_id`], but usable while the thread is being torn down.
pub fn try_current_processor_id() -> Option<ProcessorId> {
    PROCESSOR_LOCAL.try_with(|p| p.id()).ok()
}
