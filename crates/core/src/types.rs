//! Identity and scoping types
//!
//! This module defines the foundational types:
//! - TenantId / ApplicationId: isolation boundaries
//! - RequestContext: explicit per-call identity (no ambient globals)
//! - EntityScope: the (tenant, application, entity) narrowing key
//! - LifecycleEvent: the points at which user scripts may run
//! - DeletionMode: soft versus permanent document removal

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier for a tenant, the top-level isolation boundary
///
/// Tenant identity is immutable once created. Deactivating a tenant blocks
/// all document operations for its applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier for an application, a sub-boundary within a tenant
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId(String);

impl ApplicationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ApplicationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A tenant record
///
/// Tenants own applications. The IP allow-list is carried here but enforced
/// by the HTTP layer; the core engine enforces only the activation flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub active: bool,
    pub ip_allow_list: Vec<String>,
}

impl Tenant {
    pub fn new(id: impl Into<TenantId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            active: true,
            ip_allow_list: Vec::new(),
        }
    }
}

impl From<&str> for Tenant {
    fn from(id: &str) -> Self {
        Tenant::new(TenantId::new(id), id)
    }
}

/// An application record, unique by name within its tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub tenant: TenantId,
    pub name: String,
}

/// Request-scoped identity, passed explicitly through every engine call
///
/// There is deliberately no thread-local or global fallback: an operation
/// without a resolvable tenant or application fails with
/// [`Error::NoTenantContext`] / [`Error::NoApplicationContext`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    tenant: Option<TenantId>,
    application: Option<ApplicationId>,
}

impl RequestContext {
    pub fn new(tenant: impl Into<TenantId>, application: impl Into<ApplicationId>) -> Self {
        Self {
            tenant: Some(tenant.into()),
            application: Some(application.into()),
        }
    }

    /// A context with no resolved identity; every scoped call will fail
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn tenant(&self) -> Result<&TenantId> {
        self.tenant.as_ref().ok_or(Error::NoTenantContext)
    }

    pub fn application(&self) -> Result<&ApplicationId> {
        self.application.as_ref().ok_or(Error::NoApplicationContext)
    }

    /// Resolve the (tenant, application, entity) scope for this request
    pub fn scope(&self, entity: impl Into<String>) -> Result<EntityScope> {
        Ok(EntityScope {
            tenant: self.tenant()?.clone(),
            application: self.application()?.clone(),
            entity: entity.into(),
        })
    }
}

/// The (tenant, application, entity) triple every query narrows by first
///
/// Format: "tenant/app/entity"
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityScope {
    pub tenant: TenantId,
    pub application: ApplicationId,
    pub entity: String,
}

impl EntityScope {
    pub fn new(
        tenant: impl Into<TenantId>,
        application: impl Into<ApplicationId>,
        entity: impl Into<String>,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            application: application.into(),
            entity: entity.into(),
        }
    }
}

impl fmt::Display for EntityScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.tenant, self.application, self.entity)
    }
}

/// Named points in a document's lifecycle at which a user script may run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LifecycleEvent {
    BeforeSave,
    AfterSave,
    AfterLoad,
    BeforeDelete,
    AfterDelete,
    MigrateVersion,
}

impl LifecycleEvent {
    /// Stable wire name used in schema definitions and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::BeforeSave => "BEFORE_SAVE",
            LifecycleEvent::AfterSave => "AFTER_SAVE",
            LifecycleEvent::AfterLoad => "AFTER_LOAD",
            LifecycleEvent::BeforeDelete => "BEFORE_DELETE",
            LifecycleEvent::AfterDelete => "AFTER_DELETE",
            LifecycleEvent::MigrateVersion => "MIGRATE_VERSION",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "BEFORE_SAVE" => Some(LifecycleEvent::BeforeSave),
            "AFTER_SAVE" => Some(LifecycleEvent::AfterSave),
            "AFTER_LOAD" => Some(LifecycleEvent::AfterLoad),
            "BEFORE_DELETE" => Some(LifecycleEvent::BeforeDelete),
            "AFTER_DELETE" => Some(LifecycleEvent::AfterDelete),
            "MIGRATE_VERSION" => Some(LifecycleEvent::MigrateVersion),
            _ => None,
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Time granularity of a schema's physical partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PartitionGranularity {
    #[default]
    Month,
    Year,
}

/// How a document is removed
///
/// Soft deletion is reversible and is what the public delete operation uses;
/// permanent deletion is the internal cleanup path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionMode {
    Soft,
    Permanent,
}
