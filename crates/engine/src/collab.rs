//! Audit, change-event, and tenant-directory collaborators
//!
//! The document store talks to these through traits so deployments can
//! wire real sinks (an audit table, a message bus, a tenant service)
//! without the engine knowing about them. Audit writes are best-effort and
//! event publication is fire-and-forget: neither may fail a document
//! operation that already persisted.

use chrono::{DateTime, Utc};
use loam_core::{EntityScope, Result, Tenant, TenantId};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// What a document operation did, for the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    Create,
    Update,
    Patch,
    Delete,
    Restore,
    Migrate,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Patch => "PATCH",
            AuditAction::Delete => "DELETE",
            AuditAction::Restore => "RESTORE",
            AuditAction::Migrate => "MIGRATE",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One audit trail entry: the action plus both sides of the change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action: AuditAction,
    pub scope: EntityScope,
    pub unique_identifier: String,
    pub old: Option<Value>,
    pub new: Option<Value>,
    /// Free-form annotation, e.g. a migration's version transition
    pub note: Option<String>,
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        action: AuditAction,
        scope: EntityScope,
        unique_identifier: impl Into<String>,
        old: Option<Value>,
        new: Option<Value>,
    ) -> Self {
        Self {
            action,
            scope,
            unique_identifier: unique_identifier.into(),
            old,
            new,
            note: None,
            at: Utc::now(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Best-effort audit trail
///
/// A failing sink is logged and swallowed by the caller; it never rolls
/// back or fails the document operation it describes.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry) -> Result<()>;
}

/// The kind of change a [`ChangeEvent`] announces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeEventKind {
    Created,
    Updated,
    Patched,
    Deleted,
    Restored,
    Migrated,
}

/// Notification emitted after a successful document mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub id: Uuid,
    pub kind: ChangeEventKind,
    pub scope: EntityScope,
    pub unique_identifier: String,
    pub version: String,
    pub at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(
        kind: ChangeEventKind,
        scope: EntityScope,
        unique_identifier: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            scope,
            unique_identifier: unique_identifier.into(),
            version: version.into(),
            at: Utc::now(),
        }
    }
}

/// Fire-and-forget change notification
pub trait ChangeEventPublisher: Send + Sync {
    fn publish(&self, event: ChangeEvent);
}

/// Source of tenant records for activation checks
///
/// An unknown tenant is treated as active; deployments that manage tenants
/// out of band simply wire the null directory.
pub trait TenantDirectory: Send + Sync {
    fn tenant(&self, id: &TenantId) -> Option<Tenant>;
}

// ============================================================================
// Null implementations
// ============================================================================

/// Discards every audit entry
#[derive(Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _entry: AuditEntry) -> Result<()> {
        Ok(())
    }
}

/// Discards every change event
#[derive(Default)]
pub struct NullPublisher;

impl ChangeEventPublisher for NullPublisher {
    fn publish(&self, _event: ChangeEvent) {}
}

/// Knows no tenants; every tenant passes the activation check
#[derive(Default)]
pub struct NullTenantDirectory;

impl TenantDirectory for NullTenantDirectory {
    fn tenant(&self, _id: &TenantId) -> Option<Tenant> {
        None
    }
}

// ============================================================================
// In-memory implementations, used embedded and in tests
// ============================================================================

/// Collects audit entries in memory
#[derive(Default)]
pub struct RecordingAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, entry: AuditEntry) -> Result<()> {
        self.entries.lock().push(entry);
        Ok(())
    }
}

/// Collects change events in memory
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<ChangeEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events.lock().clone()
    }
}

impl ChangeEventPublisher for RecordingPublisher {
    fn publish(&self, event: ChangeEvent) {
        self.events.lock().push(event);
    }
}

/// Map-backed tenant directory
#[derive(Default)]
pub struct InMemoryTenantDirectory {
    tenants: RwLock<BTreeMap<TenantId, Tenant>>,
}

impl InMemoryTenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, tenant: Tenant) {
        self.tenants.write().insert(tenant.id.clone(), tenant);
    }

    /// Flip a tenant's activation flag; unknown tenants are ignored
    pub fn set_active(&self, id: &TenantId, active: bool) {
        if let Some(tenant) = self.tenants.write().get_mut(id) {
            tenant.active = active;
        }
    }
}

impl TenantDirectory for InMemoryTenantDirectory {
    fn tenant(&self, id: &TenantId) -> Option<Tenant> {
        self.tenants.read().get(id).cloned()
    }
}
