//! Error types for the Loam document engine
//!
//! One taxonomy shared across the workspace. We use `thiserror` for
//! automatic `Display` and `Error` trait implementations.
//!
//! Propagation policy (enforced by the engine crate):
//! - Validation and not-found errors surface to the caller verbatim.
//! - Audit and event-publish failures are logged and swallowed.
//! - Sandbox failures downgrade to a null hook result; `Error::Sandbox`
//!   never crosses the document-store boundary.

use thiserror::Error;

/// Result type alias for Loam operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the document engine
#[derive(Debug, Error)]
pub enum Error {
    /// Schema or document absent
    #[error("not found: {0}")]
    NotFound(String),

    /// Schema validation failure, with the violated rules
    #[error("validation failed: {}", violations.join("; "))]
    Validation {
        /// Human-readable rule violations, one per failed check
        violations: Vec<String>,
    },

    /// Malformed json-path, surfaced before any query executes
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Uniqueness race on create
    #[error("duplicate identifier '{identifier}' for entity '{entity}'")]
    DuplicateIdentifier { entity: String, identifier: String },

    /// Request-scoped tenant identity missing
    #[error("no tenant in request context")]
    NoTenantContext,

    /// Request-scoped application identity missing
    #[error("no application in request context")]
    NoApplicationContext,

    /// Tenant exists but is deactivated; all document operations blocked
    #[error("tenant '{0}' is deactivated")]
    TenantDeactivated(String),

    /// Schema's own validation document is malformed; rejected at upsert
    #[error("invalid schema document: {0}")]
    InvalidSchema(String),

    /// Lifecycle script failure. Internal only: the sandbox downgrades this
    /// to a null result before it can reach a caller.
    #[error("sandbox error: {0}")]
    Sandbox(String),

    /// Underlying column-store failure
    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    pub fn validation(violations: Vec<String>) -> Self {
        Error::Validation { violations }
    }

    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
