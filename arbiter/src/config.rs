//! Build-time constants and the runtime arbiter configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use lazy_static::lazy_static;
use strum_macros::EnumString;

pub const DEFAULT_TABLE_CAPACITY: usize = 32;   // Arbitration entries per region
pub const DEFAULT_LOG_CAPACITY: usize = 16;     // Audit ring slots per region
pub const MAX_TABLE_CAPACITY: usize = 4096;
pub const MAX_LOG_CAPACITY: usize = 4096;
pub const BACKOFF_MAX_SPINS: u32 = 256;         // Upper bound of one backoff pause burst
pub const LOCK_TRACE_DEPTH: usize = 4;          // Call sites kept per lock in debug builds

/// Environment variable naming a region file; unset means a private heap region.
pub const ENV_REGION: &str = "ARBITER_REGION";
pub const ENV_TABLE_CAPACITY: &str = "ARBITER_TABLE_CAPACITY";
pub const ENV_LOG_CAPACITY: &str = "ARBITER_LOG_CAPACITY";

/// Where the shared arbiter state lives.
#[derive(Debug, Clone, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Backing {
    /// Process-private memory, serialized by the in-process lock only.
    Heap,
    /// A file mapped `MAP_SHARED` and serialized across processes with `flock`.
    #[strum(disabled)]
    File(PathBuf),
}

// Inverse of `Backing::parse`.
impl fmt::Display for Backing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backing::Heap => f.write_str("heap"),
            Backing::File(path) => write!(f, "file:{}", path.display()),
        }
    }
}

impl Backing {
    /// Parses `heap` or a file path (optionally prefixed with `file:`).
    pub fn parse(value: &str) -> Self {
        Backing::from_str(value).unwrap_or_else(|_: strum::ParseError| {
            Backing::File(PathBuf::from(value.strip_prefix("file:").unwrap_or(value)))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArbiterConfig {
    pub backing: Backing,
    pub table_capacity: usize,
    pub log_capacity: usize,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            backing: Backing::Heap,
            table_capacity: DEFAULT_TABLE_CAPACITY,
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

impl ArbiterConfig {
    pub fn heap() -> Self {
        Self::default()
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            backing: Backing::File(path.into()),
            ..Self::default()
        }
    }

    pub fn with_table_capacity(mut self, capacity: usize) -> Self {
        self.table_capacity = capacity;
        self
    }

    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    /// Reads `ARBITER_REGION`, `ARBITER_TABLE_CAPACITY` and `ARBITER_LOG_CAPACITY`.
    ///
    /// Unparsable capacities fall back to the defaults with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(region) = std::env::var(ENV_REGION) {
            if !region.is_empty() {
                config.backing = Backing::parse(&region);
            }
        }
        if let Some(capacity) = capacity_from_env(ENV_TABLE_CAPACITY) {
            config.table_capacity = capacity;
        }
        if let Some(capacity) = capacity_from_env(ENV_LOG_CAPACITY) {
            config.log_capacity = capacity;
        }
        config
    }
}

fn capacity_from_env(key: &str) -> Option<usize> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<usize>() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("ignoring {}={:?}: not a capacity", key, raw);
            None
        }
    }
}

lazy_static! {
    /// Configuration derived from the process environment, read once.
    pub static ref ENV_CONFIG: ArbiterConfig = ArbiterConfig::from_env();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backing_parses_heap_and_paths() {
        assert_eq!(Backing::parse("heap"), Backing::Heap);
        assert_eq!(
            Backing::parse("/tmp/arb.region"),
            Backing::File(PathBuf::from("/tmp/arb.region"))
        );
        assert_eq!(
            Backing::parse("file:heap"),
            Backing::File(PathBuf::from("heap"))
        );
        for backing in [Backing::Heap, Backing::File(PathBuf::from("heap"))] {
            assert_eq!(Backing::parse(&backing.to_string()), backing);
        }
    }

    #[test]
    fn builder_overrides_capacities() {
        let config = ArbiterConfig::file("/tmp/x").with_table_capacity(64).with_log_capacity(8);
        assert_eq!(config.table_capacity, 64);
        assert_eq!(config.log_capacity, 8);
        assert_eq!(config.backing, Backing::File(PathBuf::from("/tmp/x")));
    }
}
