//! Scoped search scenarios

use crate::common::{ctx, harness, user_schema};
use loamdb::{Filter, FilterOp, LogicalOp, Page, RequestContext};
use serde_json::json;

#[test]
fn or_combined_age_filters() {
    let h = harness();
    h.loam
        .registry()
        .upsert(user_schema().with_identifier_format("{email}-{age}"))
        .unwrap();
    for (email, age) in [("a@x.com", 16), ("b@x.com", 30), ("c@x.com", 70), ("d@x.com", 17)] {
        h.loam
            .documents()
            .create(&ctx(), "user", "v1", json!({"email": email, "age": age}))
            .unwrap();
    }

    let minors_or_seniors = h
        .loam
        .documents()
        .search(
            &ctx(),
            "user",
            &[
                Filter::new("age", FilterOp::LessThan, json!(18)),
                Filter::new("age", FilterOp::GreaterThan, json!(65)),
            ],
            LogicalOp::Or,
            Page::default(),
        )
        .unwrap();
    assert_eq!(minors_or_seniors.len(), 3);

    let adults_named_b = h
        .loam
        .documents()
        .search(
            &ctx(),
            "user",
            &[
                Filter::new("age", FilterOp::GreaterOrEqual, json!(18)),
                Filter::new("email", FilterOp::SubstringMatch, json!("b@")),
            ],
            LogicalOp::And,
            Page::default(),
        )
        .unwrap();
    assert_eq!(adults_named_b.len(), 1);
    assert_eq!(adults_named_b[0].data["email"], json!("b@x.com"));
}

#[test]
fn empty_filters_list_the_scope_with_pagination() {
    let h = harness();
    h.loam
        .registry()
        .upsert(user_schema().with_identifier_format("{email}"))
        .unwrap();
    for i in 0..5 {
        h.loam
            .documents()
            .create(&ctx(), "user", "v1", json!({"email": format!("u{i}@x.com")}))
            .unwrap();
    }

    let first_two = h
        .loam
        .documents()
        .search(&ctx(), "user", &[], LogicalOp::And, Page::new(0, 2))
        .unwrap();
    assert_eq!(first_two.len(), 2);

    let rest = h
        .loam
        .documents()
        .search(&ctx(), "user", &[], LogicalOp::And, Page::new(2, 10))
        .unwrap();
    assert_eq!(rest.len(), 3);
}

#[test]
fn scope_always_narrows_first() {
    let h = harness();
    h.loam.registry().upsert(user_schema()).unwrap();
    h.loam
        .documents()
        .create(&ctx(), "user", "v1", json!({"email": "jane@example.com"}))
        .unwrap();

    // Same entity name under another application sees nothing.
    let other_app = RequestContext::new("acme", "billing");
    let hits = h
        .loam
        .documents()
        .search(&other_app, "user", &[], LogicalOp::And, Page::default())
        .unwrap();
    assert!(hits.is_empty());
}

#[test]
fn wildcard_paths_filter_on_the_container() {
    let h = harness();
    h.loam
        .registry()
        .upsert(user_schema().with_identifier_format("{email}"))
        .unwrap();
    h.loam
        .documents()
        .create(
            &ctx(),
            "user",
            "v1",
            json!({"email": "a@x.com", "items": [{"value": 1}]}),
        )
        .unwrap();
    h.loam
        .documents()
        .create(&ctx(), "user", "v1", json!({"email": "b@x.com"}))
        .unwrap();

    // `items[*].value` truncates to the `items` container, so the two
    // spellings match the same documents.
    for path in ["items[*].value", "items"] {
        let hits = h
            .loam
            .documents()
            .search(
                &ctx(),
                "user",
                &[Filter::new(path, FilterOp::PathExists, json!(null))],
                LogicalOp::And,
                Page::default(),
            )
            .unwrap();
        assert_eq!(hits.len(), 1, "path {path}");
        assert_eq!(hits[0].data["email"], json!("a@x.com"));
    }
}

#[test]
fn malformed_filter_path_fails_before_querying() {
    let h = harness();
    h.loam.registry().upsert(user_schema()).unwrap();

    let err = h
        .loam
        .documents()
        .search(
            &ctx(),
            "user",
            &[Filter::new("items[x]", FilterOp::Equals, json!(1))],
            LogicalOp::And,
            Page::default(),
        )
        .unwrap_err();
    assert!(matches!(err, loamdb::Error::InvalidPath { .. }));
}
