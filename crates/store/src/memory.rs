//! In-memory reference column store
//!
//! Backs embedded operation and tests. Rows live in a dashmap keyed by
//! entity scope, with a BTreeMap per scope so listings are deterministic
//! by unique identifier. DDL calls are recorded verbatim, which is what
//! the reconciliation-idempotence tests assert against.

use crate::column::{ColumnStore, Query, StoredDocument};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use loam_core::{EntityScope, Error, Result};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Default)]
struct Ddl {
    /// Every DDL statement issued, in order
    log: Vec<String>,
    /// table → partition names
    partitions: BTreeMap<String, BTreeSet<String>>,
    /// table → index name → expression
    indexes: BTreeMap<String, BTreeMap<String, String>>,
}

/// Dashmap-backed [`ColumnStore`] implementation
#[derive(Default)]
pub struct MemoryColumnStore {
    tables: DashMap<EntityScope, BTreeMap<String, StoredDocument>>,
    ddl: Mutex<Ddl>,
}

impl MemoryColumnStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every DDL statement issued so far, in order
    pub fn ddl_log(&self) -> Vec<String> {
        self.ddl.lock().log.clone()
    }

    /// Partition names attached to a table
    pub fn partitions(&self, table: &str) -> BTreeSet<String> {
        self.ddl
            .lock()
            .partitions
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Expression behind a named index, if defined
    pub fn index_expression(&self, table: &str, name: &str) -> Option<String> {
        self.ddl
            .lock()
            .indexes
            .get(table)
            .and_then(|m| m.get(name))
            .cloned()
    }

    fn with_row<T>(
        &self,
        scope: &EntityScope,
        unique_identifier: &str,
        f: impl FnOnce(&mut StoredDocument) -> T,
    ) -> Result<T> {
        let mut table = self
            .tables
            .get_mut(scope)
            .ok_or_else(|| Error::not_found(format!("document {scope}/{unique_identifier}")))?;
        let row = table
            .get_mut(unique_identifier)
            .ok_or_else(|| Error::not_found(format!("document {scope}/{unique_identifier}")))?;
        Ok(f(row))
    }
}

impl ColumnStore for MemoryColumnStore {
    fn insert(&self, document: StoredDocument) -> Result<()> {
        let mut table = self.tables.entry(document.scope.clone()).or_default();
        if table.contains_key(&document.unique_identifier) {
            return Err(Error::DuplicateIdentifier {
                entity: document.scope.entity.clone(),
                identifier: document.unique_identifier.clone(),
            });
        }
        table.insert(document.unique_identifier.clone(), document);
        Ok(())
    }

    fn fetch(
        &self,
        scope: &EntityScope,
        unique_identifier: &str,
    ) -> Result<Option<StoredDocument>> {
        Ok(self
            .tables
            .get(scope)
            .and_then(|table| table.get(unique_identifier).cloned()))
    }

    fn replace(&self, document: StoredDocument) -> Result<()> {
        let scope = document.scope.clone();
        let uid = document.unique_identifier.clone();
        self.with_row(&scope, &uid, move |row| *row = document)
    }

    fn mark_deleted(&self, scope: &EntityScope, unique_identifier: &str) -> Result<()> {
        self.with_row(scope, unique_identifier, |row| {
            row.deleted = true;
            row.updated_at = Utc::now();
        })
    }

    fn restore(&self, scope: &EntityScope, unique_identifier: &str) -> Result<()> {
        self.with_row(scope, unique_identifier, |row| {
            row.deleted = false;
            row.updated_at = Utc::now();
        })
    }

    fn purge(&self, scope: &EntityScope, unique_identifier: &str) -> Result<()> {
        let mut table = self
            .tables
            .get_mut(scope)
            .ok_or_else(|| Error::not_found(format!("document {scope}/{unique_identifier}")))?;
        table
            .remove(unique_identifier)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("document {scope}/{unique_identifier}")))
    }

    fn query(&self, query: &Query) -> Result<Vec<StoredDocument>> {
        let rows = match self.tables.get(&query.scope) {
            Some(table) => table
                .values()
                .filter(|row| query.include_deleted || !row.deleted)
                .filter(|row| query.condition.matches(&row.data))
                .skip(query.page.offset)
                .take(query.page.limit)
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        Ok(rows)
    }

    fn create_partition(
        &self,
        table: &str,
        partition: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<bool> {
        let mut ddl = self.ddl.lock();
        let created = ddl
            .partitions
            .entry(table.to_string())
            .or_default()
            .insert(partition.to_string());
        if created {
            ddl.log.push(format!(
                "CREATE TABLE {partition} PARTITION OF {table} FOR VALUES FROM ('{}') TO ('{}')",
                from.format("%Y-%m-%d"),
                to.format("%Y-%m-%d"),
            ));
        }
        Ok(created)
    }

    fn create_index(&self, table: &str, name: &str, expression: &str) -> Result<()> {
        let mut ddl = self.ddl.lock();
        ddl.indexes
            .entry(table.to_string())
            .or_default()
            .insert(name.to_string(), expression.to_string());
        ddl.log
            .push(format!("CREATE INDEX {name} ON {table} (({expression}))"));
        Ok(())
    }

    fn drop_index(&self, table: &str, name: &str) -> Result<()> {
        let mut ddl = self.ddl.lock();
        if let Some(indexes) = ddl.indexes.get_mut(table) {
            indexes.remove(name);
        }
        ddl.log.push(format!("DROP INDEX IF EXISTS {name}"));
        Ok(())
    }

    fn index_names(&self, table: &str) -> Result<BTreeSet<String>> {
        Ok(self
            .ddl
            .lock()
            .indexes
            .get(table)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default())
    }
}
