//! Resource limits for documents and lifecycle scripts
//!
//! Script limits bound a single sandbox invocation; a breach cancels only
//! that invocation. Document limits bound what the engine will accept as
//! a document payload.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-invocation budget for a lifecycle script
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Wall-clock budget for one script invocation (default: 250ms)
    pub script_wall_clock: Duration,

    /// Evaluation-step ceiling for one script invocation (default: 100k)
    pub script_max_steps: u64,

    /// Ceiling on any value a script produces, serialized (default: 1MB)
    pub script_max_value_bytes: usize,

    /// Maximum document payload size, serialized (default: 16MB)
    pub max_document_bytes: usize,

    /// Maximum document nesting depth (default: 64)
    pub max_nesting_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            script_wall_clock: Duration::from_millis(250),
            script_max_steps: 100_000,
            script_max_value_bytes: 1024 * 1024,
            max_document_bytes: 16 * 1024 * 1024,
            max_nesting_depth: 64,
        }
    }
}

impl Limits {
    /// Tight limits for tests that exercise budget enforcement
    pub fn with_small_limits() -> Self {
        Limits {
            script_wall_clock: Duration::from_millis(20),
            script_max_steps: 500,
            script_max_value_bytes: 2048,
            max_document_bytes: 4096,
            max_nesting_depth: 8,
        }
    }
}
