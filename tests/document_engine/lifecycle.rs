//! Document lifecycle scenarios: create, patch, delete, hooks, audit

use crate::common::{ctx, harness, user_schema};
use loamdb::{
    AuditAction, ChangeEventKind, ColumnStore, DeletionMode, Error, LifecycleEvent, LogicalOp,
    Page, Tenant, TenantId,
};
use serde_json::json;

#[test]
fn valid_document_is_created_and_invalid_is_rejected() {
    let h = harness();
    h.loam.registry().upsert(user_schema()).unwrap();

    let doc = h
        .loam
        .documents()
        .create(&ctx(), "user", "v1", json!({"email": "jane@example.com"}))
        .unwrap();
    assert_eq!(doc.unique_identifier, "JANE-EXAMPLE-COM");

    let err = h
        .loam
        .documents()
        .create(&ctx(), "user", "v1", json!({"age": 30}))
        .unwrap_err();
    match err {
        Error::Validation { violations } => {
            assert!(violations.iter().any(|v| v.contains("email")));
        }
        other => panic!("expected validation error, got {other}"),
    }
}

#[test]
fn identifier_derivation_is_deterministic_for_field_formats() {
    let h = harness();
    let h2 = harness();
    h.loam.registry().upsert(user_schema()).unwrap();
    h2.loam.registry().upsert(user_schema()).unwrap();

    let data = json!({"email": "same@example.com"});
    let a = h
        .loam
        .documents()
        .create(&ctx(), "user", "v1", data.clone())
        .unwrap();
    let b = h2
        .loam
        .documents()
        .create(&ctx(), "user", "v1", data)
        .unwrap();
    assert_eq!(a.unique_identifier, b.unique_identifier);
}

#[test]
fn patch_merges_recursively_and_replaces_arrays() {
    let h = harness();
    h.loam.registry().upsert(user_schema()).unwrap();
    h.loam
        .documents()
        .create(
            &ctx(),
            "user",
            "v1",
            json!({
                "email": "jane@example.com",
                "profile": {"city": "Oslo", "zip": "0150"},
                "tags": ["a", "b"]
            }),
        )
        .unwrap();

    let patched = h
        .loam
        .documents()
        .patch(
            &ctx(),
            "user",
            "v1",
            "JANE-EXAMPLE-COM",
            json!({"profile": {"city": "Bergen"}, "tags": ["c"]}),
        )
        .unwrap();

    assert_eq!(patched.data["profile"], json!({"city": "Bergen", "zip": "0150"}));
    assert_eq!(patched.data["tags"], json!(["c"]));
    assert_eq!(patched.data["email"], json!("jane@example.com"));
}

#[test]
fn soft_delete_is_reversible_in_storage_terms() {
    let h = harness();
    h.loam.registry().upsert(user_schema()).unwrap();
    h.loam
        .documents()
        .create(&ctx(), "user", "v1", json!({"email": "jane@example.com"}))
        .unwrap();

    h.loam
        .documents()
        .delete(&ctx(), "user", "JANE-EXAMPLE-COM", DeletionMode::Soft)
        .unwrap();

    // Invisible to reads and searches, but the row survives underneath.
    assert!(h
        .loam
        .documents()
        .get(&ctx(), "user", "JANE-EXAMPLE-COM")
        .unwrap()
        .is_none());
    let scope = ctx().scope("user").unwrap();
    let row = h.backend.fetch(&scope, "JANE-EXAMPLE-COM").unwrap().unwrap();
    assert!(row.deleted);

    // Permanent deletion purges the soft-deleted row.
    h.loam
        .documents()
        .delete(&ctx(), "user", "JANE-EXAMPLE-COM", DeletionMode::Permanent)
        .unwrap();
    assert!(h.backend.fetch(&scope, "JANE-EXAMPLE-COM").unwrap().is_none());
}

#[test]
fn soft_deleted_document_can_be_restored() {
    let h = harness();
    h.loam.registry().upsert(user_schema()).unwrap();
    h.loam
        .documents()
        .create(&ctx(), "user", "v1", json!({"email": "jane@example.com"}))
        .unwrap();
    h.loam
        .documents()
        .delete(&ctx(), "user", "JANE-EXAMPLE-COM", DeletionMode::Soft)
        .unwrap();

    let restored = h
        .loam
        .documents()
        .restore(&ctx(), "user", "JANE-EXAMPLE-COM")
        .unwrap();
    assert!(!restored.deleted);

    let fetched = h
        .loam
        .documents()
        .get(&ctx(), "user", "JANE-EXAMPLE-COM")
        .unwrap()
        .unwrap();
    assert_eq!(fetched.data["email"], json!("jane@example.com"));
    assert_eq!(
        h.events.events().last().unwrap().kind,
        ChangeEventKind::Restored
    );
}

#[test]
fn supplied_tenant_directory_gates_operations() {
    let h = harness();
    h.loam.registry().upsert(user_schema()).unwrap();
    h.tenants.upsert(Tenant::new("acme", "Acme Corp"));

    h.loam
        .documents()
        .create(&ctx(), "user", "v1", json!({"email": "jane@example.com"}))
        .unwrap();

    h.tenants.set_active(&TenantId::new("acme"), false);
    let err = h
        .loam
        .documents()
        .get(&ctx(), "user", "JANE-EXAMPLE-COM")
        .unwrap_err();
    assert!(matches!(err, Error::TenantDeactivated(_)));
}

#[test]
fn audit_trail_and_events_follow_the_operations() {
    let h = harness();
    h.loam.registry().upsert(user_schema()).unwrap();
    let docs = h.loam.documents();

    docs.create(&ctx(), "user", "v1", json!({"email": "jane@example.com", "age": 30}))
        .unwrap();
    docs.patch(&ctx(), "user", "v1", "JANE-EXAMPLE-COM", json!({"age": 31}))
        .unwrap();
    docs.delete(&ctx(), "user", "JANE-EXAMPLE-COM", DeletionMode::Soft)
        .unwrap();

    let actions: Vec<AuditAction> = h.audit.entries().iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![AuditAction::Create, AuditAction::Patch, AuditAction::Delete]
    );

    let kinds: Vec<ChangeEventKind> = h.events.events().iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ChangeEventKind::Created,
            ChangeEventKind::Patched,
            ChangeEventKind::Deleted
        ]
    );
}

#[test]
fn validation_gate_can_be_disabled_per_version() {
    let h = harness();
    h.loam
        .registry()
        .upsert(user_schema().with_validation_disabled())
        .unwrap();

    // Fails the schema, passes the engine: the gate is off.
    h.loam
        .documents()
        .create(&ctx(), "user", "v1", json!({"age": "thirty"}))
        .unwrap();
}

#[test]
fn before_save_script_rewrites_before_validation() {
    let h = harness();
    h.loam
        .registry()
        .upsert(user_schema().with_script(
            LifecycleEvent::BeforeSave,
            "data.email = \"derived@example.com\"; return data;",
        ))
        .unwrap();

    // Incoming data has no email; the script supplies it before the gate.
    let doc = h
        .loam
        .documents()
        .create(&ctx(), "user", "v1", json!({"age": 30}))
        .unwrap();
    assert_eq!(doc.data["email"], json!("derived@example.com"));
}

#[test]
fn failed_validation_leaves_no_trace() {
    let h = harness();
    h.loam.registry().upsert(user_schema()).unwrap();

    let _ = h
        .loam
        .documents()
        .create(&ctx(), "user", "v1", json!({"age": 1}))
        .unwrap_err();

    assert!(h.audit.entries().is_empty());
    assert!(h.events.events().is_empty());
    assert!(h
        .loam
        .documents()
        .search(&ctx(), "user", &[], LogicalOp::And, Page::default())
        .unwrap()
        .is_empty());
}
