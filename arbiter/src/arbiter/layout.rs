//! Bit-exact layout of the shared arbiter state.
//!
//! ```text
//! +----------------------------------+  0
//! | N x {i32 type, i32 id, i32 owner}|
//! +----------------------------------+  12 * N
//! | M x {type, id, owner, granted}   |
//! +----------------------------------+  12 * N + 16 * M
//! | i32 log_head | i32 log_count     |
//! +----------------------------------+  12 * N + 16 * M + 8
//! ```
//!
//! No header, native endianness. All-zero bytes are a valid fresh state: every
//! entry free, empty log.

use core::mem::size_of;

use super::error::RegionError;
use crate::config::{MAX_LOG_CAPACITY, MAX_TABLE_CAPACITY};

/// One slot of the ownership table. `owner == 0` means free.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArbitrationEntry {
    pub resource_type: i32,
    pub resource_id: i32,
    pub owner: i32,
}

impl ArbitrationEntry {
    pub const FREE_OWNER: i32 = 0;

    pub fn is_free(&self) -> bool {
        self.owner == Self::FREE_OWNER
    }

    fn matches(&self, resource_type: i32, resource_id: i32) -> bool {
        !self.is_free() && self.resource_type == resource_type && self.resource_id == resource_id
    }
}

/// One decision of the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArbitrationLogEntry {
    pub resource_type: i32,
    pub resource_id: i32,
    /// The requester the decision was made for.
    pub owner: i32,
    pub granted: bool,
}

/// In-region form of [`ArbitrationLogEntry`].
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct LogRecord {
    resource_type: i32,
    resource_id: i32,
    owner: i32,
    granted: i32,
}

impl From<ArbitrationLogEntry> for LogRecord {
    fn from(entry: ArbitrationLogEntry) -> Self {
        Self {
            resource_type: entry.resource_type,
            resource_id: entry.resource_id,
            owner: entry.owner,
            granted: entry.granted as i32,
        }
    }
}

impl From<LogRecord> for ArbitrationLogEntry {
    fn from(record: LogRecord) -> Self {
        Self {
            resource_type: record.resource_type,
            resource_id: record.resource_id,
            owner: record.owner,
            granted: record.granted != 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub table_capacity: usize,
    pub log_capacity: usize,
}

const _: () = assert!(size_of::<ArbitrationEntry>() == Layout::ENTRY_SIZE);
const _: () = assert!(size_of::<LogRecord>() == Layout::LOG_ENTRY_SIZE);

impl Layout {
    pub const ENTRY_SIZE: usize = 12;
    pub const LOG_ENTRY_SIZE: usize = 16;
    pub const CONTROL_SIZE: usize = 8;

    pub fn new(table_capacity: usize, log_capacity: usize) -> Result<Self, RegionError> {
        if !(1..=MAX_TABLE_CAPACITY).contains(&table_capacity)
            || !(1..=MAX_LOG_CAPACITY).contains(&log_capacity)
        {
            return Err(RegionError::InvalidGeometry { table_capacity, log_capacity });
        }
        Ok(Self { table_capacity, log_capacity })
    }

    pub fn log_offset(&self) -> usize {
        self.table_capacity * Self::ENTRY_SIZE
    }

    pub fn control_offset(&self) -> usize {
        self.log_offset() + self.log_capacity * Self::LOG_ENTRY_SIZE
    }

    /// Total region size in bytes.
    pub fn size(&self) -> usize {
        self.control_offset() + Self::CONTROL_SIZE
    }

    /// Region size in 32-bit words; every field is one word.
    pub fn words(&self) -> usize {
        self.size() / size_of::<i32>()
    }
}

/// Where a request lands in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    Owned(usize),
    Free(usize),
}

impl Slot {
    pub(crate) fn index(self) -> usize {
        match self {
            Slot::Owned(index) | Slot::Free(index) => index,
        }
    }
}

/// Typed view of a mapped region. Exists only while both the in-process and
/// the cross-process lock are held.
pub(crate) struct SharedState<'a> {
    entries: &'a mut [ArbitrationEntry],
    log: &'a mut [LogRecord],
    control: &'a mut [i32; 2],
}

impl<'a> SharedState<'a> {
    /// # Safety
    /// `base` must be 4-byte aligned, valid for `layout.size()` bytes and not
    /// accessed by anyone else for `'a`.
    pub(crate) unsafe fn from_raw(base: *mut u8, layout: &Layout) -> Self {
        let entries = base as *mut ArbitrationEntry;
        let log = base.add(layout.log_offset()) as *mut LogRecord;
        let control = base.add(layout.control_offset()) as *mut [i32; 2];
        Self {
            entries: core::slice::from_raw_parts_mut(entries, layout.table_capacity),
            log: core::slice::from_raw_parts_mut(log, layout.log_capacity),
            control: &mut *control,
        }
    }

    /// The entry owning `(resource_type, resource_id)`, else the first free slot.
    pub(crate) fn slot_for(&self, resource_type: i32, resource_id: i32) -> Option<Slot> {
        if let Some(index) = self
            .entries
            .iter()
            .position(|e| e.matches(resource_type, resource_id))
        {
            return Some(Slot::Owned(index));
        }
        self.entries.iter().position(ArbitrationEntry::is_free).map(Slot::Free)
    }

    pub(crate) fn entry(&self, index: usize) -> &ArbitrationEntry {
        &self.entries[index]
    }

    pub(crate) fn assign(&mut self, index: usize, entry: ArbitrationEntry) {
        self.entries[index] = entry;
    }

    pub(crate) fn occupied(&self) -> Vec<ArbitrationEntry> {
        self.entries.iter().filter(|e| !e.is_free()).copied().collect()
    }

    pub(crate) fn owner_of(&self, resource_type: i32, resource_id: i32) -> Option<i32> {
        self.entries
            .iter()
            .find(|e| e.matches(resource_type, resource_id))
            .map(|e| e.owner)
    }

    // Control words come from a file other processes write; clamp them
    // rather than trusting them as indices.
    fn log_head(&self) -> usize {
        usize::try_from(self.control[0]).unwrap_or(0) % self.log.len()
    }

    fn log_count(&self) -> usize {
        usize::try_from(self.control[1]).unwrap_or(0).min(self.log.len())
    }

    pub(crate) fn append_log(&mut self, entry: ArbitrationLogEntry) {
        let capacity = self.log.len();
        let head = self.log_head();
        let count = self.log_count();
        self.log[head] = entry.into();
        self.control[0] = ((head + 1) % capacity) as i32;
        self.control[1] = (count + 1).min(capacity) as i32;
    }

    /// Up to `max` most recent decisions, oldest first.
    pub(crate) fn recent(&self, max: usize) -> Vec<ArbitrationLogEntry> {
        let capacity = self.log.len();
        let head = self.log_head();
        let n = max.min(self.log_count());
        (0..n)
            .map(|i| self.log[(head + capacity - n + i) % capacity].into())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_state<R>(layout: Layout, f: impl FnOnce(&mut SharedState<'_>) -> R) -> R {
        let mut words = vec![0u32; layout.words()];
        let mut state = unsafe { SharedState::from_raw(words.as_mut_ptr() as *mut u8, &layout) };
        f(&mut state)
    }

    fn decision(id: i32, granted: bool) -> ArbitrationLogEntry {
        ArbitrationLogEntry { resource_type: 1, resource_id: id, owner: 7, granted }
    }

    #[test]
    fn layout_matches_wire_contract() {
        let layout = Layout::new(16, 16).unwrap();
        assert_eq!(layout.log_offset(), 192);
        assert_eq!(layout.control_offset(), 192 + 256);
        assert_eq!(layout.size(), 456);
        assert_eq!(layout.words(), 114);
    }

    #[test]
    fn layout_rejects_empty_geometry() {
        assert!(Layout::new(0, 16).is_err());
        assert!(Layout::new(16, 0).is_err());
        assert!(Layout::new(MAX_TABLE_CAPACITY + 1, 16).is_err());
    }

    #[test]
    fn zeroed_region_is_fresh() {
        with_state(Layout::new(4, 4).unwrap(), |state| {
            assert!(state.occupied().is_empty());
            assert!(state.recent(4).is_empty());
            // (0, 0) must not match a never-used slot
            assert_eq!(state.slot_for(0, 0), Some(Slot::Free(0)));
            assert_eq!(state.owner_of(0, 0), None);
        });
    }

    #[test]
    fn slot_lookup_prefers_existing_entry() {
        with_state(Layout::new(3, 4).unwrap(), |state| {
            state.assign(1, ArbitrationEntry { resource_type: 2, resource_id: 9, owner: 5 });
            assert_eq!(state.slot_for(2, 9), Some(Slot::Owned(1)));
            assert_eq!(state.slot_for(2, 10), Some(Slot::Free(0)));
            state.assign(0, ArbitrationEntry { resource_type: 2, resource_id: 10, owner: 5 });
            state.assign(2, ArbitrationEntry { resource_type: 2, resource_id: 11, owner: 5 });
            assert_eq!(state.slot_for(3, 3), None);
        });
    }

    #[test]
    fn ring_keeps_latest_in_order() {
        with_state(Layout::new(1, 4).unwrap(), |state| {
            for id in 0..7 {
                state.append_log(decision(id, id % 2 == 0));
            }
            let ids: Vec<_> = state.recent(4).iter().map(|e| e.resource_id).collect();
            assert_eq!(ids, vec![3, 4, 5, 6]);
            let ids: Vec<_> = state.recent(2).iter().map(|e| e.resource_id).collect();
            assert_eq!(ids, vec![5, 6]);
            assert_eq!(state.recent(100).len(), 4);
            assert!(state.recent(4)[1].granted);
        });
    }

    #[test]
    fn corrupt_control_words_are_clamped() {
        with_state(Layout::new(1, 4).unwrap(), |state| {
            state.control[0] = -3;
            state.control[1] = 1000;
            assert_eq!(state.recent(10).len(), 4);
            state.append_log(decision(42, true));
            assert_eq!(state.control[0], 1);
            assert_eq!(state.recent(1)[0].resource_id, 42);
        });
    }
}
