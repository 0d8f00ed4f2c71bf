//! Backing memory for [`SharedState`].
//!
//! A heap region is private to the process and relies on the in-process lock
//! alone. A file region is mapped `MAP_SHARED`, so every process mapping the
//! same file sees the same bytes, and is serialized across processes with a
//! whole-file `flock`. The file is created and sized (zero-filled) under that
//! lock, so exactly one opener initializes it.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;
use std::ptr::NonNull;

use super::error::RegionError;
use super::layout::{Layout, SharedState};
use crate::config::Backing;

enum RegionKind {
    Heap(*mut [u32]),
    Mapped(File),
}

pub(crate) struct Region {
    base: NonNull<u8>,
    layout: Layout,
    kind: RegionKind,
}

// SAFETY: the region owns its memory; all access goes through `&mut self`.
unsafe impl Send for Region {}

impl Region {
    pub(crate) fn open(backing: &Backing, layout: Layout) -> Result<Self, RegionError> {
        match backing {
            Backing::Heap => Ok(Self::heap(layout)),
            Backing::File(path) => Self::mapped(path, layout),
        }
    }

    fn heap(layout: Layout) -> Self {
        let words: *mut [u32] = Box::into_raw(vec![0u32; layout.words()].into_boxed_slice());
        // SAFETY: Box::into_raw never returns null.
        let base = unsafe { NonNull::new_unchecked(words as *mut u32 as *mut u8) };
        Self { base, layout, kind: RegionKind::Heap(words) }
    }

    fn mapped(path: &Path, layout: Layout) -> Result<Self, RegionError> {
        let io_err = |source| RegionError::Io { path: path.to_path_buf(), source };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(io_err)?;

        let lock = RegionLock::exclusive(file.as_raw_fd())?;

        let expected = layout.size() as u64;
        let found = file.metadata().map_err(io_err)?.len();
        if found == 0 {
            file.set_len(expected).map_err(io_err)?;
            log::info!("region {} created ({} bytes)", path.display(), expected);
        } else if found != expected {
            return Err(RegionError::LayoutMismatch { path: path.to_path_buf(), expected, found });
        } else {
            log::info!("region {} attached", path.display());
        }

        // SAFETY: fresh mapping of a file we just sized; checked for failure below.
        let ptr = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                layout.size(),
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(RegionError::Map(io::Error::last_os_error()));
        }
        drop(lock);

        let base = NonNull::new(ptr as *mut u8).ok_or_else(|| {
            RegionError::Map(io::Error::new(io::ErrorKind::Other, "mmap returned null"))
        })?;
        Ok(Self { base, layout, kind: RegionKind::Mapped(file) })
    }

    pub(crate) fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Takes the cross-process lock; a no-op for heap regions.
    pub(crate) fn lock_region(&self) -> Result<RegionLock, RegionError> {
        match &self.kind {
            RegionKind::Heap(_) => Ok(RegionLock { fd: None }),
            RegionKind::Mapped(file) => RegionLock::exclusive(file.as_raw_fd()),
        }
    }

    /// Typed view of the region. The lock argument proves the cross-process
    /// side is held; `&mut self` proves the in-process side.
    pub(crate) fn state(&mut self, _lock: &RegionLock) -> SharedState<'_> {
        // SAFETY: base is page- or u32-aligned and spans layout.size() bytes;
        // both locks are held for the lifetime of the borrow.
        unsafe { SharedState::from_raw(self.base.as_ptr(), &self.layout) }
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        match self.kind {
            RegionKind::Heap(words) => {
                // SAFETY: produced by Box::into_raw in `heap`.
                drop(unsafe { Box::from_raw(words) });
            }
            RegionKind::Mapped(_) => {
                // SAFETY: mapping created in `mapped` with this length.
                let rc = unsafe { libc::munmap(self.base.as_ptr() as *mut libc::c_void, self.layout.size()) };
                if rc != 0 {
                    log::warn!("munmap failed: {}", io::Error::last_os_error());
                }
            }
        }
    }
}

/// Held whole-file `flock`; released on drop.
pub(crate) struct RegionLock {
    fd: Option<RawFd>,
}

impl RegionLock {
    fn exclusive(fd: RawFd) -> Result<Self, RegionError> {
        loop {
            // SAFETY: fd is owned by a live File for the duration of the lock.
            if unsafe { libc::flock(fd, libc::LOCK_EX) } == 0 {
                return Ok(Self { fd: Some(fd) });
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(RegionError::Lock(err));
            }
        }
    }
}

impl Drop for RegionLock {
    fn drop(&mut self) {
        if let Some(fd) = self.fd {
            // SAFETY: see `exclusive`.
            if unsafe { libc::flock(fd, libc::LOCK_UN) } != 0 {
                log::warn!("flock unlock failed: {}", io::Error::last_os_error());
            }
        }
    }
}
