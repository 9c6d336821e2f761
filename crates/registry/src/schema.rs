//! Versioned schema definitions
//!
//! A schema is identified by (tenant, application, entity, version), unique
//! together. Multiple versions of the same entity may coexist; each is
//! independently validated and indexed.

use loam_core::{ApplicationId, LifecycleEvent, PartitionGranularity, TenantId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Catalog key for one schema version
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaKey {
    pub tenant: TenantId,
    pub application: ApplicationId,
    pub entity: String,
    pub version: String,
}

impl SchemaKey {
    pub fn new(
        tenant: impl Into<TenantId>,
        application: impl Into<ApplicationId>,
        entity: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            application: application.into(),
            entity: entity.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for SchemaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}@{}",
            self.tenant, self.application, self.entity, self.version
        )
    }
}

/// One versioned schema for a named entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub tenant: TenantId,
    pub application: ApplicationId,
    pub entity: String,
    pub version: String,

    /// JSON-Schema-compatible validation document
    pub validation: Value,

    /// Unique-identifier format template, e.g. `"{email}-{timestamp}"`
    pub identifier_format: String,

    /// Declared indexed json-paths
    pub indexed_paths: BTreeSet<String>,

    /// Lifecycle-event → script source bindings
    pub scripts: BTreeMap<LifecycleEvent, String>,

    /// When false, documents bypass JSON-Schema checks entirely
    pub validation_enabled: bool,

    /// Time granularity of this schema's physical partitions
    pub partition_granularity: PartitionGranularity,

    /// Soft-delete marker; a deleted version blocks new writes but keeps
    /// its documents
    pub deleted: bool,
}

impl SchemaDefinition {
    pub fn new(
        tenant: impl Into<TenantId>,
        application: impl Into<ApplicationId>,
        entity: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            application: application.into(),
            entity: entity.into(),
            version: version.into(),
            validation: Value::Object(serde_json::Map::new()),
            identifier_format: "{uuid}".to_string(),
            indexed_paths: BTreeSet::new(),
            scripts: BTreeMap::new(),
            validation_enabled: true,
            partition_granularity: PartitionGranularity::default(),
            deleted: false,
        }
    }

    /// Builder: set the validation document
    pub fn with_validation(mut self, validation: Value) -> Self {
        self.validation = validation;
        self
    }

    /// Builder: set the identifier format template
    pub fn with_identifier_format(mut self, format: impl Into<String>) -> Self {
        self.identifier_format = format.into();
        self
    }

    /// Builder: declare an indexed path
    pub fn with_indexed_path(mut self, path: impl Into<String>) -> Self {
        self.indexed_paths.insert(path.into());
        self
    }

    /// Builder: bind a lifecycle script
    pub fn with_script(mut self, event: LifecycleEvent, source: impl Into<String>) -> Self {
        self.scripts.insert(event, source.into());
        self
    }

    /// Builder: disable schema validation for this version
    pub fn with_validation_disabled(mut self) -> Self {
        self.validation_enabled = false;
        self
    }

    /// Builder: set partition granularity
    pub fn with_partition_granularity(mut self, granularity: PartitionGranularity) -> Self {
        self.partition_granularity = granularity;
        self
    }

    pub fn key(&self) -> SchemaKey {
        SchemaKey {
            tenant: self.tenant.clone(),
            application: self.application.clone(),
            entity: self.entity.clone(),
            version: self.version.clone(),
        }
    }

    pub fn script_for(&self, event: LifecycleEvent) -> Option<&str> {
        self.scripts.get(&event).map(String::as_str)
    }
}
