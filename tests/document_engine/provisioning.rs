//! Partition provisioning and index reconciliation through the facade

use crate::common::{ctx, harness, user_schema};
use loamdb::{table_name, ColumnStore, PartitionGranularity, SchemaKey};
use serde_json::json;

fn user_table() -> String {
    table_name(&SchemaKey::new("acme", "crm", "user", "v1"))
}

#[test]
fn schema_upsert_provisions_current_and_next_partition() {
    let h = harness();
    h.loam.registry().upsert(user_schema()).unwrap();

    let partitions = h.backend.partitions(&user_table());
    assert_eq!(partitions.len(), 2, "current and next period");
    for name in &partitions {
        assert!(name.starts_with(&format!("{}_p", user_table())));
    }
}

#[test]
fn yearly_granularity_provisions_year_partitions() {
    let h = harness();
    h.loam
        .registry()
        .upsert(user_schema().with_partition_granularity(PartitionGranularity::Year))
        .unwrap();

    let partitions = h.backend.partitions(&user_table());
    assert_eq!(partitions.len(), 2);
    // Year partition names carry a 4-digit suffix.
    for name in &partitions {
        let suffix = name.rsplit("_p").next().unwrap();
        assert_eq!(suffix.len(), 4, "partition {name}");
    }
}

#[test]
fn declared_index_paths_become_expression_indexes() {
    let h = harness();
    h.loam
        .registry()
        .upsert(user_schema().with_indexed_path("profile.age"))
        .unwrap();
    h.loam.settle_indexes();

    let names = h.backend.index_names(&user_table()).unwrap();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&format!("ix_{}_email", user_table())));
    assert!(names.contains(&format!("ix_{}_profile_age", user_table())));
}

#[test]
fn re_upserting_the_same_schema_issues_no_index_ddl() {
    let h = harness();
    h.loam.registry().upsert(user_schema()).unwrap();
    h.loam.settle_indexes();
    let before = h.backend.ddl_log().len();

    h.loam.registry().upsert(user_schema()).unwrap();
    h.loam.settle_indexes();
    assert_eq!(h.backend.ddl_log().len(), before);
}

#[test]
fn changed_index_paths_drop_removed_before_creating_added() {
    let h = harness();
    h.loam.registry().upsert(user_schema()).unwrap();
    h.loam.settle_indexes();

    // Replace the declared set: email out, age in.
    let mut next = user_schema().with_indexed_path("age");
    next.indexed_paths.remove("email");
    h.loam.registry().upsert(next).unwrap();
    h.loam.settle_indexes();

    let names = h.backend.index_names(&user_table()).unwrap();
    assert!(names.contains(&format!("ix_{}_age", user_table())));
    assert!(!names.contains(&format!("ix_{}_email", user_table())));

    let log = h.backend.ddl_log();
    let drop_pos = log
        .iter()
        .position(|s| s.starts_with("DROP INDEX"))
        .unwrap();
    let create_age = log.iter().position(|s| s.contains("_age")).unwrap();
    assert!(drop_pos < create_age);
}
