//! The document store
//!
//! Orchestrates every document operation: schema lookup, identifier
//! derivation, lifecycle scripts, validation, persistence, audit, and
//! change events. The write sequence is fixed:
//!
//!   BEFORE_SAVE → validate → persist → AFTER_SAVE → audit → event
//!
//! and fail-closed: a validation failure stops the sequence before
//! persistence, so no AFTER_* hook runs, nothing is audited, and no event
//! is emitted. Audit failures after a successful persist are logged and
//! swallowed.

use crate::collab::{
    AuditAction, AuditEntry, AuditSink, ChangeEvent, ChangeEventKind, ChangeEventPublisher,
    TenantDirectory,
};
use crate::identifier::IdentifierFormatter;
use loam_core::{
    deep_merge, DeletionMode, EntityScope, Error, Filter, LifecycleEvent, Limits, LogicalOp, Page,
    RequestContext, Result,
};
use loam_registry::{CatalogEntry, SchemaRegistry};
use loam_sandbox::{HookVars, Sandbox};
use loam_store::{ColumnStore, Condition, Query, StoredDocument};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Multi-tenant, schema-driven document store
pub struct DocumentStore {
    registry: Arc<SchemaRegistry>,
    store: Arc<dyn ColumnStore>,
    sandbox: Arc<Sandbox>,
    limits: Limits,
    audit: Arc<dyn AuditSink>,
    events: Arc<dyn ChangeEventPublisher>,
    tenants: Arc<dyn TenantDirectory>,
}

impl DocumentStore {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<SchemaRegistry>,
        store: Arc<dyn ColumnStore>,
        sandbox: Arc<Sandbox>,
        limits: Limits,
        audit: Arc<dyn AuditSink>,
        events: Arc<dyn ChangeEventPublisher>,
        tenants: Arc<dyn TenantDirectory>,
    ) -> Self {
        Self {
            registry,
            store,
            sandbox,
            limits,
            audit,
            events,
            tenants,
        }
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Create a document under one schema version
    pub fn create(
        &self,
        ctx: &RequestContext,
        entity: &str,
        version: &str,
        data: Value,
    ) -> Result<StoredDocument> {
        let scope = self.guard(ctx, entity)?;
        let entry = self.schema_for_write(ctx, entity, version)?;
        let definition = &entry.definition;

        let unique_identifier = IdentifierFormatter::derive(&definition.identifier_format, &data);

        let vars = HookVars::for_save(data.clone(), entity, version, unique_identifier.clone());
        let data = match self.run_hook(&entry, LifecycleEvent::BeforeSave, &vars) {
            Some(rewritten) => rewritten,
            None => data,
        };

        self.check_payload(&data)?;
        if definition.validation_enabled {
            entry.compiled.validate(&data)?;
        }

        let document =
            StoredDocument::new(scope.clone(), version, unique_identifier.clone(), data.clone());
        self.store.insert(document.clone())?;

        let vars = HookVars::for_save(data.clone(), entity, version, unique_identifier.clone());
        self.run_hook(&entry, LifecycleEvent::AfterSave, &vars);

        self.record_audit(AuditEntry::new(
            AuditAction::Create,
            scope.clone(),
            unique_identifier.clone(),
            None,
            Some(data),
        ));
        self.events.publish(ChangeEvent::new(
            ChangeEventKind::Created,
            scope,
            unique_identifier,
            version,
        ));
        Ok(document)
    }

    /// Replace a document's data wholesale, re-pointing it at `version`
    pub fn update(
        &self,
        ctx: &RequestContext,
        entity: &str,
        version: &str,
        unique_identifier: &str,
        data: Value,
    ) -> Result<StoredDocument> {
        let scope = self.guard(ctx, entity)?;
        let existing = self.fetch_live(&scope, unique_identifier)?;
        self.save_over(
            ctx,
            &scope,
            entity,
            version,
            existing,
            data,
            AuditAction::Update,
            ChangeEventKind::Updated,
        )
    }

    /// Deep-merge a partial document into the stored data
    ///
    /// Nested objects merge recursively; arrays and scalars replace.
    pub fn patch(
        &self,
        ctx: &RequestContext,
        entity: &str,
        version: &str,
        unique_identifier: &str,
        partial: Value,
    ) -> Result<StoredDocument> {
        let scope = self.guard(ctx, entity)?;
        let existing = self.fetch_live(&scope, unique_identifier)?;
        let merged = deep_merge(existing.data.clone(), partial);
        self.save_over(
            ctx,
            &scope,
            entity,
            version,
            existing,
            merged,
            AuditAction::Patch,
            ChangeEventKind::Patched,
        )
    }

    /// Delete a document, soft (reversible) or permanently
    ///
    /// Hook failure never blocks deletion.
    pub fn delete(
        &self,
        ctx: &RequestContext,
        entity: &str,
        unique_identifier: &str,
        mode: DeletionMode,
    ) -> Result<()> {
        let scope = self.guard(ctx, entity)?;
        // Permanent deletion is also the cleanup path for rows that were
        // soft-deleted earlier.
        let existing = match self.store.fetch(&scope, unique_identifier)? {
            Some(document) if !document.deleted || mode == DeletionMode::Permanent => document,
            _ => {
                return Err(Error::not_found(format!(
                    "document {scope}/{unique_identifier}"
                )))
            }
        };
        let entry = self
            .registry
            .get(
                ctx.tenant()?,
                ctx.application()?,
                entity,
                &existing.version,
            )
            .ok();

        let vars = HookVars::for_save(
            existing.data.clone(),
            entity,
            existing.version.clone(),
            unique_identifier,
        )
        .with_previous(existing.data.clone());

        if let Some(entry) = &entry {
            self.run_hook(entry, LifecycleEvent::BeforeDelete, &vars);
        }

        match mode {
            DeletionMode::Soft => self.store.mark_deleted(&scope, unique_identifier)?,
            DeletionMode::Permanent => self.store.purge(&scope, unique_identifier)?,
        }
        debug!(%scope, uid = %unique_identifier, ?mode, "document deleted");

        if let Some(entry) = &entry {
            self.run_hook(entry, LifecycleEvent::AfterDelete, &vars);
        }

        self.record_audit(AuditEntry::new(
            AuditAction::Delete,
            scope.clone(),
            unique_identifier,
            Some(existing.data),
            None,
        ));
        self.events.publish(ChangeEvent::new(
            ChangeEventKind::Deleted,
            scope,
            unique_identifier,
            existing.version,
        ));
        Ok(())
    }

    /// Bring a soft-deleted document back
    ///
    /// Only works on documents that are actually soft-deleted; a live or
    /// absent document is NotFound.
    pub fn restore(
        &self,
        ctx: &RequestContext,
        entity: &str,
        unique_identifier: &str,
    ) -> Result<StoredDocument> {
        let scope = self.guard(ctx, entity)?;
        let existing = match self.store.fetch(&scope, unique_identifier)? {
            Some(document) if document.deleted => document,
            _ => {
                return Err(Error::not_found(format!(
                    "deleted document {scope}/{unique_identifier}"
                )))
            }
        };
        self.store.restore(&scope, unique_identifier)?;
        debug!(%scope, uid = %unique_identifier, "document restored");

        self.record_audit(AuditEntry::new(
            AuditAction::Restore,
            scope.clone(),
            unique_identifier,
            None,
            Some(existing.data.clone()),
        ));
        self.events.publish(ChangeEvent::new(
            ChangeEventKind::Restored,
            scope,
            unique_identifier,
            existing.version.clone(),
        ));

        let mut document = existing;
        document.deleted = false;
        Ok(document)
    }

    /// Fetch one document; soft-deleted documents are invisible here
    ///
    /// An AFTER_LOAD script may rewrite the returned data; the rewrite is
    /// not persisted.
    pub fn get(
        &self,
        ctx: &RequestContext,
        entity: &str,
        unique_identifier: &str,
    ) -> Result<Option<StoredDocument>> {
        let scope = self.guard(ctx, entity)?;
        let mut document = match self.store.fetch(&scope, unique_identifier)? {
            Some(document) if !document.deleted => document,
            _ => return Ok(None),
        };

        if let Ok(entry) = self.registry.get(
            ctx.tenant()?,
            ctx.application()?,
            entity,
            &document.version,
        ) {
            let vars = HookVars::for_save(
                document.data.clone(),
                entity,
                document.version.clone(),
                unique_identifier,
            );
            if let Some(rewritten) = self.run_hook(&entry, LifecycleEvent::AfterLoad, &vars) {
                document.data = rewritten;
            }
        }
        Ok(Some(document))
    }

    /// Move a document to another schema version
    ///
    /// The destination's MIGRATE_VERSION script sees both versions and the
    /// pre-migration data; an object return replaces the data, anything
    /// else keeps it. The result must validate against the destination.
    pub fn migrate(
        &self,
        ctx: &RequestContext,
        entity: &str,
        unique_identifier: &str,
        to_version: &str,
    ) -> Result<StoredDocument> {
        let scope = self.guard(ctx, entity)?;
        let existing = self.fetch_live(&scope, unique_identifier)?;
        let entry = self.schema_for_write(ctx, entity, to_version)?;

        let vars = HookVars::for_migration(
            existing.data.clone(),
            entity,
            unique_identifier,
            existing.version.clone(),
            to_version,
        );
        let data = match self.run_hook(&entry, LifecycleEvent::MigrateVersion, &vars) {
            Some(rewritten) => rewritten,
            None => existing.data.clone(),
        };

        self.check_payload(&data)?;
        if entry.definition.validation_enabled {
            entry.compiled.validate(&data)?;
        }

        let mut document = existing.clone();
        document.version = to_version.to_string();
        document.data = data.clone();
        document.updated_at = chrono::Utc::now();
        self.store.replace(document.clone())?;

        self.record_audit(
            AuditEntry::new(
                AuditAction::Migrate,
                scope.clone(),
                unique_identifier,
                Some(existing.data),
                Some(data),
            )
            .with_note(format!("{} -> {}", existing.version, to_version)),
        );
        self.events.publish(ChangeEvent::new(
            ChangeEventKind::Migrated,
            scope,
            unique_identifier,
            to_version,
        ));
        Ok(document)
    }

    /// Search within the request's (tenant, application, entity) scope
    ///
    /// Filters compile to predicates combined under `logical_op`; an empty
    /// filter list is a scoped listing. The scope always narrows first.
    pub fn search(
        &self,
        ctx: &RequestContext,
        entity: &str,
        filters: &[Filter],
        logical_op: LogicalOp,
        page: Page,
    ) -> Result<Vec<StoredDocument>> {
        let scope = self.guard(ctx, entity)?;
        let condition = Condition::compile(filters, logical_op)?;
        self.store
            .query(&Query::scoped(scope).with_condition(condition).with_page(page))
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Resolve the request scope and enforce tenant activation
    fn guard(&self, ctx: &RequestContext, entity: &str) -> Result<EntityScope> {
        let scope = ctx.scope(entity)?;
        if let Some(tenant) = self.tenants.tenant(&scope.tenant) {
            if !tenant.active {
                return Err(Error::TenantDeactivated(tenant.id.to_string()));
            }
        }
        Ok(scope)
    }

    /// Schema lookup for a write path; a soft-deleted version blocks new
    /// writes as if it were gone
    fn schema_for_write(
        &self,
        ctx: &RequestContext,
        entity: &str,
        version: &str,
    ) -> Result<CatalogEntry> {
        let entry = self
            .registry
            .get(ctx.tenant()?, ctx.application()?, entity, version)?;
        if entry.definition.deleted {
            return Err(Error::not_found(format!(
                "schema {}",
                entry.definition.key()
            )));
        }
        Ok(entry)
    }

    /// Payload bounds, checked after any BEFORE_SAVE rewrite and before
    /// the validation gate; a breach is fail-closed like a schema violation
    fn check_payload(&self, data: &Value) -> Result<()> {
        let bytes = serde_json::to_vec(data)
            .map_err(|e| Error::Storage(format!("unserializable document: {e}")))?
            .len();
        if bytes > self.limits.max_document_bytes {
            return Err(Error::validation(vec![format!(
                "document is {bytes} bytes, over the {} byte limit",
                self.limits.max_document_bytes
            )]));
        }
        let depth = nesting_depth(data);
        if depth > self.limits.max_nesting_depth {
            return Err(Error::validation(vec![format!(
                "document nests {depth} levels deep, over the {} level limit",
                self.limits.max_nesting_depth
            )]));
        }
        Ok(())
    }

    /// Fetch a document that is present and not soft-deleted
    fn fetch_live(&self, scope: &EntityScope, unique_identifier: &str) -> Result<StoredDocument> {
        match self.store.fetch(scope, unique_identifier)? {
            Some(document) if !document.deleted => Ok(document),
            _ => Err(Error::not_found(format!(
                "document {scope}/{unique_identifier}"
            ))),
        }
    }

    /// Shared update/patch tail: hooks, validation, replace, audit, event
    #[allow(clippy::too_many_arguments)]
    fn save_over(
        &self,
        ctx: &RequestContext,
        scope: &EntityScope,
        entity: &str,
        version: &str,
        existing: StoredDocument,
        data: Value,
        action: AuditAction,
        kind: ChangeEventKind,
    ) -> Result<StoredDocument> {
        let entry = self.schema_for_write(ctx, entity, version)?;

        let vars = HookVars::for_save(
            data.clone(),
            entity,
            version,
            existing.unique_identifier.clone(),
        )
        .with_previous(existing.data.clone());
        let data = match self.run_hook(&entry, LifecycleEvent::BeforeSave, &vars) {
            Some(rewritten) => rewritten,
            None => data,
        };

        self.check_payload(&data)?;
        if entry.definition.validation_enabled {
            entry.compiled.validate(&data)?;
        }

        let mut document = existing.clone();
        document.version = version.to_string();
        document.data = data.clone();
        document.updated_at = chrono::Utc::now();
        self.store.replace(document.clone())?;

        let vars = HookVars::for_save(
            data.clone(),
            entity,
            version,
            existing.unique_identifier.clone(),
        )
        .with_previous(existing.data.clone());
        self.run_hook(&entry, LifecycleEvent::AfterSave, &vars);

        self.record_audit(AuditEntry::new(
            action,
            scope.clone(),
            existing.unique_identifier.clone(),
            Some(existing.data),
            Some(data),
        ));
        self.events.publish(ChangeEvent::new(
            kind,
            scope.clone(),
            existing.unique_identifier,
            version,
        ));
        Ok(document)
    }

    /// Run the schema's script for `event`, if bound; only an object return
    /// counts as a data rewrite
    fn run_hook(
        &self,
        entry: &CatalogEntry,
        event: LifecycleEvent,
        vars: &HookVars,
    ) -> Option<Value> {
        let result = self
            .sandbox
            .run(entry.definition.script_for(event), event, vars);
        match result {
            Some(value @ Value::Object(_)) => Some(value),
            _ => None,
        }
    }

    /// Best-effort audit write; failure is logged, never propagated
    fn record_audit(&self, entry: AuditEntry) {
        if let Err(error) = self.audit.record(entry) {
            warn!(%error, "audit write failed; operation already persisted");
        }
    }
}

fn nesting_depth(value: &Value) -> usize {
    match value {
        Value::Object(map) => 1 + map.values().map(nesting_depth).max().unwrap_or(0),
        Value::Array(items) => 1 + items.iter().map(nesting_depth).max().unwrap_or(0),
        _ => 0,
    }
}
