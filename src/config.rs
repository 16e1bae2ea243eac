//! Runtime settings, read from the environment once at startup.

use std::path::PathBuf;

pub const DATA_DIR_VAR: &str = "MEETSLOT_DATA_DIR";
pub const METRICS_PORT_VAR: &str = "MEETSLOT_METRICS_PORT";
pub const COMPACT_THRESHOLD_VAR: &str = "MEETSLOT_COMPACT_THRESHOLD";

const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_COMPACT_THRESHOLD: u64 = 1000;
const WAL_FILE_NAME: &str = "meetslot.wal";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    /// WAL records since the last compaction before the compactor rewrites it.
    pub compact_threshold: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            data_dir: lookup(DATA_DIR_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            metrics_port: lookup(METRICS_PORT_VAR).and_then(|s| s.parse().ok()),
            compact_threshold: lookup(COMPACT_THRESHOLD_VAR)
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_COMPACT_THRESHOLD),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(WAL_FILE_NAME)
    }
}
