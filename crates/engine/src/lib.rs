//! Document engine for the Loam workspace
//!
//! This crate orchestrates all lower layers:
//! - DocumentStore: the full lifecycle of every document operation
//! - IdentifierFormatter: unique-identifier derivation from schema formats
//! - Collaborator traits: audit trail, change events, tenant directory
//!
//! The engine is the only component that knows about:
//! - The write sequence (hooks, validation, persistence, audit, events)
//! - Tenant activation enforcement
//! - Cross-crate coordination (registry + sandbox + store)

pub mod collab;
pub mod identifier;
pub mod store;

pub use collab::{
    AuditAction, AuditEntry, AuditSink, ChangeEvent, ChangeEventKind, ChangeEventPublisher,
    InMemoryTenantDirectory, NullAuditSink, NullPublisher, NullTenantDirectory,
    RecordingAuditSink, RecordingPublisher, TenantDirectory,
};
pub use identifier::IdentifierFormatter;
pub use store::DocumentStore;
