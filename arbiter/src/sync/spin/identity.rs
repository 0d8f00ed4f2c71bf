//! Who holds a lock, and where it was taken.
//!
//! Holder tracking drives misuse detection (re-entrant acquire, foreign
//! release) and `is_held_by_current_processor`. Debug builds also keep the
//! last few acquisition sites so a misuse panic can say where the lock was
//! taken.

use core::panic::Location;
use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

#[cfg(debug_assertions)]
use crate::config::LOCK_TRACE_DEPTH;
use crate::processor::ProcessorId;

pub(crate) type Site = Option<&'static Location<'static>>;

pub struct LockIdentity {
    holder: AtomicUsize,
    name: &'static str,
    /// Most recent acquisition site first.
    #[cfg(debug_assertions)]
    trace: [AtomicPtr<Location<'static>>; LOCK_TRACE_DEPTH],
    /// Site of the current hold.
    site: AtomicPtr<Location<'static>>,
}

#[allow(clippy::declare_interior_mutable_const)]
const NO_SITE: AtomicPtr<Location<'static>> = AtomicPtr::new(ptr::null_mut());

impl LockIdentity {
    pub const fn new(name: &'static str) -> Self {
        Self {
            holder: AtomicUsize::new(ProcessorId::NONE),
            name,
            #[cfg(debug_assertions)]
            trace: [NO_SITE; LOCK_TRACE_DEPTH],
            site: NO_SITE,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Raw holder id, [`ProcessorId::NONE`] when free.
    pub fn holder(&self) -> usize {
        self.holder.load(Ordering::Relaxed)
    }

    pub fn is_held_by(&self, id: ProcessorId) -> bool {
        self.holder() == id.as_usize()
    }

    pub(crate) fn claim(&self, id: ProcessorId, site: Site) {
        let site = site.map_or(ptr::null_mut(), |s| s as *const Location<'static> as *mut Location<'static>);
        self.site.store(site, Ordering::Relaxed);
        #[cfg(debug_assertions)]
        {
            for slot in (1..LOCK_TRACE_DEPTH).rev() {
                let older = self.trace[slot - 1].load(Ordering::Relaxed);
                self.trace[slot].store(older, Ordering::Relaxed);
            }
            self.trace[0].store(site, Ordering::Relaxed);
        }
        self.holder.store(id.as_usize(), Ordering::Relaxed);
    }

    pub(crate) fn clear(&self) {
        self.holder.store(ProcessorId::NONE, Ordering::Relaxed);
        self.site.store(ptr::null_mut(), Ordering::Relaxed);
    }

    /// Where the current holder took the lock, if it came in through a
    /// call-site-tracking entry point.
    pub fn held_since(&self) -> Site {
        let site = self.site.load(Ordering::Relaxed);
        // SAFETY: only `&'static Location` values are ever stored.
        unsafe { site.as_ref() }
    }

    /// Recent acquisition sites, newest first (debug builds only).
    #[cfg(debug_assertions)]
    pub fn trace(&self) -> [Site; LOCK_TRACE_DEPTH] {
        // SAFETY: see `held_since`.
        core::array::from_fn(|i| unsafe { self.trace[i].load(Ordering::Relaxed).as_ref() })
    }

    pub(crate) fn describe_site(&self) -> String {
        match self.held_since() {
            Some(site) => format!("{}:{}", site.file(), site.line()),
            None => String::from("<untracked>"),
        }
    }
}
