//! Recoverable arbiter outcomes. Misuse of the locks underneath is fatal and
//! never shows up here.

use std::fmt;
use std::io;
use std::path::PathBuf;

use strum_macros::Display;

/// Outcome of a request that reached the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Decision {
    Granted,
    Denied,
}

impl Decision {
    pub fn is_granted(self) -> bool {
        self == Decision::Granted
    }
}

impl From<bool> for Decision {
    fn from(granted: bool) -> Self {
        if granted {
            Decision::Granted
        } else {
            Decision::Denied
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ArbiterError {
    /// No entry for the resource and no free slot to create one.
    #[strum(serialize = "arbitration table is full")]
    NoCapacity,
    /// The backing region could not be obtained; the arbiter fails closed.
    #[strum(serialize = "arbiter backing region is unavailable")]
    Unavailable,
    /// Owner 0 marks free entries and cannot request anything.
    #[strum(serialize = "requester 0 is reserved for free entries")]
    InvalidRequester,
    /// Taking the cross-process lock failed.
    #[strum(serialize = "region lock failed")]
    Io(io::ErrorKind),
}

impl std::error::Error for ArbiterError {}

/// Why a backing region could not be set up.
#[derive(Debug)]
pub enum RegionError {
    Io { path: PathBuf, source: io::Error },
    /// The file exists with a size that does not match the configured geometry.
    LayoutMismatch { path: PathBuf, expected: u64, found: u64 },
    InvalidGeometry { table_capacity: usize, log_capacity: usize },
    Map(io::Error),
    Lock(io::Error),
}

impl fmt::Display for RegionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionError::Io { path, source } => {
                write!(f, "cannot open region {}: {}", path.display(), source)
            }
            RegionError::LayoutMismatch { path, expected, found } => write!(
                f,
                "region {} is {} bytes, layout needs {}",
                path.display(),
                found,
                expected
            ),
            RegionError::InvalidGeometry { table_capacity, log_capacity } => write!(
                f,
                "invalid geometry: {} table entries, {} log entries",
                table_capacity, log_capacity
            ),
            RegionError::Map(err) => write!(f, "mmap failed: {}", err),
            RegionError::Lock(err) => write!(f, "flock failed: {}", err),
        }
    }
}

impl std::error::Error for RegionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegionError::Io { source, .. } => Some(source),
            RegionError::Map(err) | RegionError::Lock(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RegionError> for ArbiterError {
    fn from(err: RegionError) -> Self {
        match err {
            RegionError::Lock(err) | RegionError::Map(err) | RegionError::Io { source: err, .. } => {
                ArbiterError::Io(err.kind())
            }
            _ => ArbiterError::Unavailable,
        }
    }
}
