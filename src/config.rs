//! Engine configuration for EmberDB

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::IndexKind;

/// Row count below which a join always uses nested loops
pub const DEFAULT_SMALL_TABLE_THRESHOLD: u64 = 100;

/// Fixed cost added to a hash join for building the hash table
pub const DEFAULT_HASH_BUILD_OVERHEAD: u64 = 1000;

/// Engine tuning knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Join inputs smaller than this always use nested loops
    pub small_table_threshold: u64,
    /// Build cost charged to hash joins
    pub hash_build_overhead: u64,
    /// Index kind used when CREATE INDEX does not ask for one
    pub default_index_kind: IndexKind,
    /// Let SELECT seek through a registered index when the plan allows it
    pub use_index_seek: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            small_table_threshold: DEFAULT_SMALL_TABLE_THRESHOLD,
            hash_build_overhead: DEFAULT_HASH_BUILD_OVERHEAD,
            default_index_kind: IndexKind::Hash,
            use_index_seek: true,
        }
    }
}

impl EngineConfig {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the nested-loop cut-off
    pub fn small_table_threshold(mut self, rows: u64) -> Self {
        self.small_table_threshold = rows;
        self
    }

    /// Set the hash join build cost
    pub fn hash_build_overhead(mut self, cost: u64) -> Self {
        self.hash_build_overhead = cost;
        self
    }

    /// Set the default index kind
    pub fn default_index_kind(mut self, kind: IndexKind) -> Self {
        self.default_index_kind = kind;
        self
    }

    /// Enable or disable index seeks in SELECT
    pub fn use_index_seek(mut self, enabled: bool) -> Self {
        self.use_index_seek = enabled;
        self
    }

    /// Load from a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}
