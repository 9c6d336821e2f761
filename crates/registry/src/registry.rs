//! The schema version catalog
//!
//! Read-mostly, safe for concurrent lookup with copy-on-write update
//! semantics: readers take an `Arc` snapshot of the catalog map, writers
//! build a new map and swap it in. Upserts validate the schema's own
//! validation document and notify observers with the symmetric difference
//! of declared index paths; observers are expected to defer real work so
//! the registry write never blocks on index DDL.

use crate::schema::{SchemaDefinition, SchemaKey};
use crate::validate::CompiledSchema;
use loam_core::{ApplicationId, Error, PathChain, Result, TenantId};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// Observer of schema lifecycle changes, implemented by the partition and
/// index manager
pub trait SchemaObserver: Send + Sync {
    /// A schema version was created or updated
    fn schema_upserted(&self, schema: &SchemaDefinition);

    /// The declared index paths of a schema version changed
    ///
    /// `added` and `removed` are the symmetric difference of the old and
    /// new declared sets. Called after the catalog write; implementations
    /// must not block.
    fn index_paths_changed(
        &self,
        schema: &SchemaDefinition,
        added: BTreeSet<String>,
        removed: BTreeSet<String>,
    );
}

/// One catalog entry: the definition plus its pre-compiled validator
#[derive(Clone)]
pub struct CatalogEntry {
    pub definition: Arc<SchemaDefinition>,
    pub compiled: Arc<CompiledSchema>,
}

type Catalog = BTreeMap<SchemaKey, CatalogEntry>;

/// Versioned schema registry
pub struct SchemaRegistry {
    catalog: RwLock<Arc<Catalog>>,
    observers: RwLock<Vec<Arc<dyn SchemaObserver>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self {
            catalog: RwLock::new(Arc::new(BTreeMap::new())),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Register an observer for schema/index lifecycle changes
    pub fn subscribe(&self, observer: Arc<dyn SchemaObserver>) {
        self.observers.write().push(observer);
    }

    fn snapshot(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog.read())
    }

    /// Look up one schema version
    pub fn get(
        &self,
        tenant: &TenantId,
        application: &ApplicationId,
        entity: &str,
        version: &str,
    ) -> Result<CatalogEntry> {
        let key = SchemaKey::new(tenant.clone(), application.clone(), entity, version);
        self.snapshot()
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("schema {key}")))
    }

    /// Whether an entity (or a specific version of it) is registered
    pub fn exists(
        &self,
        tenant: &TenantId,
        application: &ApplicationId,
        entity: &str,
        version: Option<&str>,
    ) -> bool {
        let catalog = self.snapshot();
        match version {
            Some(v) => {
                let key = SchemaKey::new(tenant.clone(), application.clone(), entity, v);
                catalog.contains_key(&key)
            }
            None => catalog.keys().any(|k| {
                k.tenant == *tenant && k.application == *application && k.entity == entity
            }),
        }
    }

    /// Create or update a schema version
    ///
    /// The validation document is compiled here and every declared index
    /// path must parse, so malformed definitions are rejected before any
    /// document can reference them or any DDL is queued. If declared index
    /// paths changed, observers receive the added/removed sets.
    pub fn upsert(&self, definition: SchemaDefinition) -> Result<Arc<SchemaDefinition>> {
        let compiled = Arc::new(CompiledSchema::compile(&definition.validation)?);
        for path in &definition.indexed_paths {
            PathChain::parse(path)?;
        }
        let key = definition.key();
        let definition = Arc::new(definition);

        let old_paths = {
            let mut catalog_guard = self.catalog.write();
            let mut next: Catalog = (**catalog_guard).clone();
            let previous = next.insert(
                key.clone(),
                CatalogEntry {
                    definition: Arc::clone(&definition),
                    compiled,
                },
            );
            *catalog_guard = Arc::new(next);
            previous.map(|entry| entry.definition.indexed_paths.clone())
        };

        let old_paths = old_paths.unwrap_or_default();
        let added: BTreeSet<String> = definition
            .indexed_paths
            .difference(&old_paths)
            .cloned()
            .collect();
        let removed: BTreeSet<String> = old_paths
            .difference(&definition.indexed_paths)
            .cloned()
            .collect();

        debug!(schema = %key, added = added.len(), removed = removed.len(), "schema upserted");

        let observers = self.observers.read().clone();
        for observer in &observers {
            observer.schema_upserted(&definition);
            if !added.is_empty() || !removed.is_empty() {
                observer.index_paths_changed(&definition, added.clone(), removed.clone());
            }
        }

        Ok(definition)
    }

    /// Soft-delete a schema version: blocks new writes against it, keeps
    /// its documents readable
    pub fn soft_delete(
        &self,
        tenant: &TenantId,
        application: &ApplicationId,
        entity: &str,
        version: &str,
    ) -> Result<()> {
        let key = SchemaKey::new(tenant.clone(), application.clone(), entity, version);
        let mut catalog_guard = self.catalog.write();
        let entry = catalog_guard
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("schema {key}")))?;

        let mut definition = (*entry.definition).clone();
        definition.deleted = true;

        let mut next: Catalog = (**catalog_guard).clone();
        next.insert(
            key,
            CatalogEntry {
                definition: Arc::new(definition),
                compiled: entry.compiled,
            },
        );
        *catalog_guard = Arc::new(next);
        Ok(())
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}
