//! The column-store interface
//!
//! The engine does not implement its own storage; it relies on an ordered,
//! indexable, JSON-capable column store reachable through this trait. A
//! production deployment backs it with a JSONB-capable SQL engine; the
//! in-memory implementation in [`crate::memory`] backs embedded operation
//! and tests.

use crate::predicate::Condition;
use chrono::{DateTime, Utc};
use loam_core::{EntityScope, Page, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// One stored document row
///
/// Identified by (tenant, application, entity, version, unique_identifier);
/// the identifier is derived at creation time and immutable thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub scope: EntityScope,
    /// The schema version that last validated this document
    pub version: String,
    pub unique_identifier: String,
    pub data: Value,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredDocument {
    pub fn new(
        scope: EntityScope,
        version: impl Into<String>,
        unique_identifier: impl Into<String>,
        data: Value,
    ) -> Self {
        let now = Utc::now();
        StoredDocument {
            scope,
            version: version.into(),
            unique_identifier: unique_identifier.into(),
            data,
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A compiled, scoped, paginated query
///
/// The entity scope always narrows first; predicates apply within it.
#[derive(Debug, Clone)]
pub struct Query {
    pub scope: EntityScope,
    pub condition: Condition,
    pub page: Page,
    pub include_deleted: bool,
}

impl Query {
    pub fn scoped(scope: EntityScope) -> Self {
        Query {
            scope,
            condition: Condition::empty(),
            page: Page::default(),
            include_deleted: false,
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    pub fn with_page(mut self, page: Page) -> Self {
        self.page = page;
        self
    }
}

/// Narrow interface to the underlying JSON-capable column store
///
/// Row operations enforce the (scope, unique_identifier) uniqueness
/// constraint; DDL operations cover partition attachment and expression
/// index creation/removal.
pub trait ColumnStore: Send + Sync {
    /// Insert a new row; fails with `DuplicateIdentifier` on a uniqueness
    /// collision
    fn insert(&self, document: StoredDocument) -> Result<()>;

    /// Fetch one row, soft-deleted rows included
    fn fetch(&self, scope: &EntityScope, unique_identifier: &str)
        -> Result<Option<StoredDocument>>;

    /// Replace an existing row; fails with `NotFound` when absent
    fn replace(&self, document: StoredDocument) -> Result<()>;

    /// Soft-delete a row (reversible)
    fn mark_deleted(&self, scope: &EntityScope, unique_identifier: &str) -> Result<()>;

    /// Reverse a soft delete
    fn restore(&self, scope: &EntityScope, unique_identifier: &str) -> Result<()>;

    /// Permanently remove a row
    fn purge(&self, scope: &EntityScope, unique_identifier: &str) -> Result<()>;

    /// Run a scoped, filtered, paginated query
    fn query(&self, query: &Query) -> Result<Vec<StoredDocument>>;

    // --- DDL ---

    /// Attach a time-bounded partition; returns false when it already
    /// existed
    fn create_partition(
        &self,
        table: &str,
        partition: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<bool>;

    /// Create an expression index over the JSON column
    fn create_index(&self, table: &str, name: &str, expression: &str) -> Result<()>;

    /// Remove an expression index
    fn drop_index(&self, table: &str, name: &str) -> Result<()>;

    /// Names of the indexes currently defined on a table
    fn index_names(&self, table: &str) -> Result<BTreeSet<String>>;
}
