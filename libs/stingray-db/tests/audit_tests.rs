//! Audit edit body tests

use serde_json::json;
use stingray_db::audit::{edit_body, edit_body_by_relation, EditOp};
use stingray_db::{one_to_many_sync, Record, Value};

mod common;
use common::{order_line_descriptor, print_test_header, row, MockExecutor};

fn line(json: serde_json::Value) -> Record {
    Record::from_json(order_line_descriptor(), &json)
}

/// Answer guid lookups starting with `select` with `<prefix>-<id>`
fn respond_guids(db: &MockExecutor, select: &'static str, prefix: &'static str) {
    db.respond(move |query| {
        if !query.sql.starts_with(select) {
            return None;
        }
        let id = query.params().first().and_then(Value::to_id_string)?;
        Some(vec![row(&[("guid", Value::Text(format!("{prefix}-{id}")))])])
    });
}

#[tokio::test]
async fn test_edit_body_reports_changes_and_foreign_guids() {
    print_test_header(
        "test_edit_body_reports_changes_and_foreign_guids",
        &[
            "Changed plain fields are reported as old/new values, changed foreign",
            "keys by the guid of the referenced row.",
        ],
    );

    let db = MockExecutor::new();
    respond_guids(&db, "SELECT \"order\".\"guid\"", "order");

    let existing = line(json!({"id": "7", "orderId": "1", "qty": 2, "note": "a"}));
    let desirable = line(json!({"id": "7", "orderId": "2", "qty": 3, "note": "a"}));

    let body = edit_body(
        &db,
        Some(&existing),
        Some(&desirable),
        &["ol.qty", "ol.order_id", "ol.note"],
    )
    .await
    .unwrap();

    assert_eq!(
        serde_json::to_value(&body).unwrap(),
        json!({
            "qty": {"old": 2, "new": 3},
            "orderGuid": {"old": "order-1", "new": "order-2"}
        })
    );
    assert_eq!(
        db.sql()[0],
        "SELECT \"order\".\"guid\" AS \"guid\" FROM \"order\" AS \"order\" WHERE \"order\".\"id\" = $1"
    );
}

#[tokio::test]
async fn test_edit_body_for_insert_and_unchanged() {
    print_test_header(
        "test_edit_body_for_insert_and_unchanged",
        &["A missing side is reported as null; equal or absent values produce no entry."],
    );

    let db = MockExecutor::new();
    let created = line(json!({"qty": 5}));

    let body = edit_body(&db, None, Some(&created), &["ol.qty", "ol.note"])
        .await
        .unwrap();
    assert_eq!(
        serde_json::to_value(&body).unwrap(),
        json!({"qty": {"old": null, "new": 5}})
    );

    let same = edit_body(&db, Some(&created), Some(&created), &["ol.qty"])
        .await
        .unwrap();
    assert!(same.is_empty());
    assert!(db.statements().is_empty());
}

#[tokio::test]
async fn test_edit_body_by_relation() {
    print_test_header(
        "test_edit_body_by_relation",
        &[
            "Sync results become add/remove/edit entries keyed by the item guid;",
            "untouched items are skipped.",
        ],
    );

    let db = MockExecutor::new();
    respond_guids(&db, "SELECT \"ol\".\"guid\"", "line");

    let mut existing = vec![
        line(json!({"id": "1", "qty": 2, "dateDeleted": null})),
        line(json!({"id": "3", "qty": 7, "dateDeleted": null})),
        line(json!({"id": "4", "qty": 1, "dateDeleted": null})),
    ];
    let mut desirable = vec![
        line(json!({"id": "1", "qty": 3})),
        line(json!({"id": "3", "qty": 7})),
        line(json!({"qty": 5})),
    ];

    let results = one_to_many_sync(&db, &mut existing, &mut desirable, None, &["ol.qty"])
        .await
        .unwrap();
    let edits = edit_body_by_relation(&db, &results, &["ol.qty"]).await.unwrap();

    let ops: Vec<EditOp> = edits.iter().map(|edit| edit.op).collect();
    assert_eq!(ops, vec![EditOp::Edit, EditOp::Add, EditOp::Remove]);

    assert_eq!(
        serde_json::to_value(&edits).unwrap(),
        json!([
            {"guid": "line-1", "op": "edit", "entity": {"qty": {"old": 2, "new": 3}}},
            {"guid": "line-100", "op": "add", "entity": {"qty": {"old": null, "new": 5}}},
            {"guid": "line-4", "op": "remove", "entity": {}}
        ])
    );
}
