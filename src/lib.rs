//! LoamDB - Multi-tenant, schema-driven JSON document engine
//!
//! LoamDB stores JSON documents under versioned, tenant-scoped schemas.
//! Every document operation runs through a fixed pipeline: identifier
//! derivation, lifecycle scripts in a resource-bounded sandbox, schema
//! validation, persistence in a JSON-capable column store, audit, and
//! change events. Declared index paths reconcile asynchronously into
//! expression indexes; documents land in time-bounded partitions.
//!
//! # Quick Start
//!
//! ```ignore
//! use loamdb::{Loam, RequestContext, SchemaDefinition};
//! use serde_json::json;
//!
//! let loam = Loam::in_memory();
//! loam.registry().upsert(
//!     SchemaDefinition::new("acme", "crm", "user", "v1")
//!         .with_validation(json!({"type": "object", "required": ["email"]}))
//!         .with_identifier_format("{email}"),
//! )?;
//!
//! let ctx = RequestContext::new("acme", "crm");
//! let doc = loam
//!     .documents()
//!     .create(&ctx, "user", "v1", json!({"email": "jane@example.com"}))?;
//! ```
//!
//! # Architecture
//!
//! The workspace splits along the seams a deployment would swap at:
//! `loam-core` (types), `loam-registry` (schemas), `loam-sandbox`
//! (scripts), `loam-store` (column store, partitions, indexes), and
//! `loam-engine` (orchestration). This facade wires them together.

use loam_engine::DocumentStore;
use loam_registry::{SchemaObserver, SchemaRegistry};
use loam_sandbox::Sandbox;
use loam_store::PartitionIndexManager;
use serde::Deserialize;
use std::sync::Arc;

pub use loam_core::{
    deep_merge, Application, ApplicationId, DeletionMode, EntityScope, Error, Filter, FilterOp,
    LifecycleEvent, Limits, LogicalOp, Page, PartitionGranularity, PathChain, RequestContext,
    Result, Tenant, TenantId,
};
pub use loam_engine::{
    AuditAction, AuditEntry, AuditSink, ChangeEvent, ChangeEventKind, ChangeEventPublisher,
    IdentifierFormatter, InMemoryTenantDirectory, NullAuditSink, NullPublisher,
    RecordingAuditSink, RecordingPublisher, TenantDirectory,
};
pub use loam_registry::{SchemaDefinition, SchemaKey};
pub use loam_sandbox::{HookVars, ScriptEngine, ScriptError};
pub use loam_store::{table_name, ColumnStore, MemoryColumnStore, StoredDocument};

/// Engine-level configuration, deserializable from TOML
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoamConfig {
    /// Sandbox and document resource limits
    pub limits: Limits,
}

impl LoamConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Storage(format!("config parse error: {e}")))
    }
}

/// The assembled engine: registry, sandbox, store, and document pipeline
pub struct Loam {
    registry: Arc<SchemaRegistry>,
    store: Arc<dyn ColumnStore>,
    manager: Arc<PartitionIndexManager>,
    documents: DocumentStore,
    tenants: Arc<dyn TenantDirectory>,
}

impl Loam {
    /// Fully in-memory engine with null audit/event sinks
    pub fn in_memory() -> Self {
        Self::with_config(LoamConfig::default())
    }

    pub fn with_config(config: LoamConfig) -> Self {
        Self::assemble(
            config,
            Arc::new(MemoryColumnStore::new()),
            Arc::new(NullAuditSink),
            Arc::new(NullPublisher),
            Arc::new(InMemoryTenantDirectory::new()),
        )
    }

    /// Wire an engine over caller-supplied backend and collaborators
    ///
    /// Callers that manage tenants keep their own handle to the directory
    /// they pass in, the same way they keep their audit/event sinks.
    pub fn assemble(
        config: LoamConfig,
        store: Arc<dyn ColumnStore>,
        audit: Arc<dyn AuditSink>,
        events: Arc<dyn ChangeEventPublisher>,
        tenants: Arc<dyn TenantDirectory>,
    ) -> Self {
        let registry = Arc::new(SchemaRegistry::new());
        let manager = Arc::new(PartitionIndexManager::new(Arc::clone(&store)));
        registry.subscribe(Arc::clone(&manager) as Arc<dyn SchemaObserver>);

        let documents = DocumentStore::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            Arc::new(Sandbox::new(config.limits.clone())),
            config.limits,
            audit,
            events,
            Arc::clone(&tenants),
        );

        Self {
            registry,
            store,
            manager,
            documents,
            tenants,
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    pub fn tenants(&self) -> &Arc<dyn TenantDirectory> {
        &self.tenants
    }

    pub fn store(&self) -> &Arc<dyn ColumnStore> {
        &self.store
    }

    /// Block until queued index reconciliations have been applied
    pub fn settle_indexes(&self) {
        self.manager.reconciler().drain();
    }
}
