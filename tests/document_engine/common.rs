//! Shared harness for the document engine scenarios

use loamdb::{
    InMemoryTenantDirectory, Loam, LoamConfig, MemoryColumnStore, RecordingAuditSink,
    RecordingPublisher, RequestContext, SchemaDefinition,
};
use serde_json::json;
use std::sync::Arc;

pub struct Harness {
    pub loam: Loam,
    pub backend: Arc<MemoryColumnStore>,
    pub audit: Arc<RecordingAuditSink>,
    pub events: Arc<RecordingPublisher>,
    pub tenants: Arc<InMemoryTenantDirectory>,
}

pub fn harness() -> Harness {
    init_tracing();
    let backend = Arc::new(MemoryColumnStore::new());
    let audit = Arc::new(RecordingAuditSink::new());
    let events = Arc::new(RecordingPublisher::new());
    let tenants = Arc::new(InMemoryTenantDirectory::new());
    let loam = Loam::assemble(
        LoamConfig::default(),
        backend.clone(),
        audit.clone(),
        events.clone(),
        tenants.clone(),
    );
    Harness {
        loam,
        backend,
        audit,
        events,
        tenants,
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn ctx() -> RequestContext {
    RequestContext::new("acme", "crm")
}

/// The user schema: email required and indexed, identifier derived from it
pub fn user_schema() -> SchemaDefinition {
    SchemaDefinition::new("acme", "crm", "user", "v1")
        .with_validation(json!({
            "type": "object",
            "required": ["email"],
            "properties": {
                "email": {"type": "string"},
                "age": {"type": "number"},
                "profile": {"type": "object"}
            }
        }))
        .with_identifier_format("{email}")
        .with_indexed_path("email")
}
