//! The script engine contract
//!
//! Context variables exposed to a script are exactly those in
//! [`HookVars`]: the document's current data, the previous data (on
//! update/patch/delete), the entity/version/identifier names, and for
//! MIGRATE_VERSION the old and new version names plus pre-migration data.

use loam_core::{LifecycleEvent, Limits};
use serde_json::Value;
use thiserror::Error;

/// Errors raised inside a script invocation
///
/// These never cross the document-store boundary: the [`Sandbox`]
/// wrapper downgrades them to a null result and a log entry.
///
/// [`Sandbox`]: crate::sandbox::Sandbox
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),

    #[error("wall-clock budget exceeded")]
    WallClockExceeded,

    #[error("step budget exceeded")]
    StepBudgetExceeded,

    #[error("produced value exceeds {limit} bytes")]
    ValueTooLarge { limit: usize },
}

/// Fixed read-only/read-write context contract for one invocation
///
/// `data` is read-write from the script's point of view; everything else
/// is read-only. Fields that do not apply to the event are `None`.
#[derive(Debug, Clone, Default)]
pub struct HookVars {
    /// The document's current data (read-write)
    pub data: Value,
    /// Previous data, on update/patch/delete
    pub previous: Option<Value>,
    pub entity_name: String,
    pub version_name: String,
    pub unique_identifier: String,
    /// Source version name, MIGRATE_VERSION only
    pub old_version: Option<String>,
    /// Destination version name, MIGRATE_VERSION only
    pub new_version: Option<String>,
    /// Pre-migration data, MIGRATE_VERSION only
    pub old_data: Option<Value>,
}

impl HookVars {
    pub fn for_save(
        data: Value,
        entity_name: impl Into<String>,
        version_name: impl Into<String>,
        unique_identifier: impl Into<String>,
    ) -> Self {
        HookVars {
            data,
            entity_name: entity_name.into(),
            version_name: version_name.into(),
            unique_identifier: unique_identifier.into(),
            ..Default::default()
        }
    }

    pub fn with_previous(mut self, previous: Value) -> Self {
        self.previous = Some(previous);
        self
    }

    pub fn for_migration(
        data: Value,
        entity_name: impl Into<String>,
        unique_identifier: impl Into<String>,
        old_version: impl Into<String>,
        new_version: impl Into<String>,
    ) -> Self {
        let old_version = old_version.into();
        let new_version = new_version.into();
        HookVars {
            old_data: Some(data.clone()),
            data,
            entity_name: entity_name.into(),
            version_name: new_version.clone(),
            unique_identifier: unique_identifier.into(),
            old_version: Some(old_version),
            new_version: Some(new_version),
            previous: None,
        }
    }
}

/// A pluggable sandboxed interpreter
///
/// `run` executes one script synchronously within the given limits and
/// returns the script's explicit return value, if any. Implementations
/// must not expose I/O, process control, or global state to scripts.
pub trait ScriptEngine: Send + Sync {
    fn run(
        &self,
        source: &str,
        event: LifecycleEvent,
        vars: &HookVars,
        limits: &Limits,
    ) -> Result<Option<Value>, ScriptError>;
}
