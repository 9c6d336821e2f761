//! Version migration scenarios

use crate::common::{ctx, harness, user_schema};
use loamdb::{AuditAction, Error, LifecycleEvent, SchemaDefinition};
use serde_json::json;

#[test]
fn migration_without_script_keeps_data_byte_for_byte() {
    let h = harness();
    h.loam.registry().upsert(user_schema()).unwrap();
    h.loam
        .registry()
        .upsert(SchemaDefinition::new("acme", "crm", "user", "v2"))
        .unwrap();

    let original = json!({"email": "jane@example.com", "age": 30, "tags": ["a"]});
    h.loam
        .documents()
        .create(&ctx(), "user", "v1", original.clone())
        .unwrap();

    let migrated = h
        .loam
        .documents()
        .migrate(&ctx(), "user", "JANE-EXAMPLE-COM", "v2")
        .unwrap();
    assert_eq!(migrated.version, "v2");
    assert_eq!(migrated.data, original);

    // The identifier survives the version move.
    let fetched = h
        .loam
        .documents()
        .get(&ctx(), "user", "JANE-EXAMPLE-COM")
        .unwrap()
        .unwrap();
    assert_eq!(fetched.version, "v2");
}

#[test]
fn scriptless_migration_round_trips() {
    let h = harness();
    h.loam.registry().upsert(user_schema()).unwrap();
    h.loam
        .registry()
        .upsert(SchemaDefinition::new("acme", "crm", "user", "v2"))
        .unwrap();

    let original = json!({"email": "jane@example.com", "age": 30});
    h.loam
        .documents()
        .create(&ctx(), "user", "v1", original.clone())
        .unwrap();

    h.loam
        .documents()
        .migrate(&ctx(), "user", "JANE-EXAMPLE-COM", "v2")
        .unwrap();
    let back = h
        .loam
        .documents()
        .migrate(&ctx(), "user", "JANE-EXAMPLE-COM", "v1")
        .unwrap();

    assert_eq!(back.version, "v1");
    assert_eq!(back.data, original);

    let notes: Vec<String> = h
        .audit
        .entries()
        .iter()
        .filter(|e| e.action == AuditAction::Migrate)
        .filter_map(|e| e.note.clone())
        .collect();
    assert_eq!(notes, vec!["v1 -> v2".to_string(), "v2 -> v1".to_string()]);
}

#[test]
fn migration_script_reshapes_and_destination_revalidates() {
    let h = harness();
    h.loam.registry().upsert(user_schema()).unwrap();
    h.loam
        .registry()
        .upsert(
            SchemaDefinition::new("acme", "crm", "user", "v2")
                .with_validation(json!({
                    "type": "object",
                    "required": ["contact"],
                    "properties": {"contact": {"type": "object"}}
                }))
                .with_script(
                    LifecycleEvent::MigrateVersion,
                    "data.contact = {}; data.contact.email = oldData.email; return data;",
                ),
        )
        .unwrap();
    h.loam
        .documents()
        .create(&ctx(), "user", "v1", json!({"email": "jane@example.com"}))
        .unwrap();

    let migrated = h
        .loam
        .documents()
        .migrate(&ctx(), "user", "JANE-EXAMPLE-COM", "v2")
        .unwrap();
    assert_eq!(
        migrated.data["contact"],
        json!({"email": "jane@example.com"})
    );

    let entry = h.audit.entries().pop().unwrap();
    assert_eq!(entry.action, AuditAction::Migrate);
    assert_eq!(entry.note.as_deref(), Some("v1 -> v2"));
}

#[test]
fn failed_destination_validation_leaves_the_document_on_its_version() {
    let h = harness();
    h.loam.registry().upsert(user_schema()).unwrap();
    // v2 demands a field no script supplies.
    h.loam
        .registry()
        .upsert(SchemaDefinition::new("acme", "crm", "user", "v2").with_validation(json!({
            "type": "object",
            "required": ["contact"]
        })))
        .unwrap();
    h.loam
        .documents()
        .create(&ctx(), "user", "v1", json!({"email": "jane@example.com"}))
        .unwrap();

    let err = h
        .loam
        .documents()
        .migrate(&ctx(), "user", "JANE-EXAMPLE-COM", "v2")
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));

    let doc = h
        .loam
        .documents()
        .get(&ctx(), "user", "JANE-EXAMPLE-COM")
        .unwrap()
        .unwrap();
    assert_eq!(doc.version, "v1");
}

#[test]
fn migration_to_an_unknown_version_is_not_found() {
    let h = harness();
    h.loam.registry().upsert(user_schema()).unwrap();
    h.loam
        .documents()
        .create(&ctx(), "user", "v1", json!({"email": "jane@example.com"}))
        .unwrap();

    let err = h
        .loam
        .documents()
        .migrate(&ctx(), "user", "JANE-EXAMPLE-COM", "v9")
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}
