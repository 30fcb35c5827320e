//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Behavioural switches for statement execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Reject NULL writes into NOT NULL columns (default: true)
    pub strict_mode: bool,
    /// Reject non-aggregated columns that differ inside a group (default: false)
    pub only_full_group_by: bool,
    /// Seconds added to the wall clock by NOW() (default: 0)
    pub clock_offset_seconds: i64,
    /// Maximum number of rows read from a single table scan (default: unlimited)
    pub max_scan_rows: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strict_mode: true,
            only_full_group_by: false,
            clock_offset_seconds: 0,
            max_scan_rows: None,
        }
    }
}

impl EngineConfig {
    /// Non-strict configuration: NULL writes into NOT NULL columns fall back
    /// to the column's implicit default, like MySQL without STRICT_TRANS_TABLES.
    pub fn permissive() -> Self {
        Self {
            strict_mode: false,
            ..Self::default()
        }
    }

    pub fn with_clock_offset(mut self, seconds: i64) -> Self {
        self.clock_offset_seconds = seconds;
        self
    }

    pub fn with_only_full_group_by(mut self, enabled: bool) -> Self {
        self.only_full_group_by = enabled;
        self
    }

    pub fn with_max_scan_rows(mut self, limit: usize) -> Self {
        self.max_scan_rows = Some(limit);
        self
    }
}
