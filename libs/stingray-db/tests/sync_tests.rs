//! Relation synchronizer tests

use serde_json::json;
use std::collections::HashSet;
use stingray_db::{many_to_many_sync, one_to_many_sync, Record, SyncState};

mod common;
use common::{order_line_descriptor, order_tag_descriptor, print_test_header, MockExecutor};

const DELETED_AT: &str = "2024-01-01T00:00:00.000Z";

fn line(id: Option<&str>, qty: i64, deleted: bool) -> Record {
    let mut json = json!({"orderId": "9", "qty": qty, "dateDeleted": null});
    if let Some(id) = id {
        json["id"] = json!(id);
    }
    if deleted {
        json["dateDeleted"] = json!(DELETED_AT);
    }
    Record::from_json(order_line_descriptor(), &json)
}

fn tag(id: Option<&str>, name: &str, deleted: bool) -> Record {
    let mut json = json!({"orderId": "9", "tag": name, "dateDeleted": null});
    if let Some(id) = id {
        json["id"] = json!(id);
    }
    if deleted {
        json["dateDeleted"] = json!(DELETED_AT);
    }
    Record::from_json(order_tag_descriptor(), &json)
}

// ===== One to many =====

#[tokio::test]
async fn test_one_to_many_sync_states() {
    print_test_header(
        "test_one_to_many_sync_states",
        &[
            "Desirable entries are reported first in order, then existing entries",
            "without a match: updated, untouched, inserted, untouched, deleted.",
        ],
    );

    let db = MockExecutor::new();
    let mut existing = vec![
        line(Some("1"), 2, false),
        line(Some("2"), 5, false),
        line(Some("3"), 1, true),
        line(Some("4"), 1, false),
    ];
    let mut desirable = vec![
        line(Some("1"), 3, false),
        line(Some("2"), 5, false),
        line(None, 8, false),
    ];

    let result = one_to_many_sync(&db, &mut existing, &mut desirable, Some("42"), &["ol.qty"])
        .await
        .unwrap();

    let states: Vec<SyncState> = result.iter().map(|item| item.state).collect();
    assert_eq!(
        states,
        vec![
            SyncState::Updated,
            SyncState::Untouched,
            SyncState::Inserted,
            SyncState::Untouched,
            SyncState::Deleted,
        ]
    );

    let indexes: Vec<(Option<usize>, Option<usize>)> = result
        .iter()
        .map(|item| (item.index_in_desirable, item.index_in_existing))
        .collect();
    assert_eq!(
        indexes,
        vec![
            (Some(0), Some(0)),
            (Some(1), Some(1)),
            (Some(2), None),
            (None, Some(2)),
            (None, Some(3)),
        ]
    );

    // the inserted record carries its new id, the deleted one its timestamp
    assert_eq!(result[2].to.as_ref().unwrap().id(), Some("100"));
    assert!(desirable[2].id().is_some());
    assert!(existing[3].is_deleted());
    assert!(!result[4].from.as_ref().unwrap().is_deleted());

    let sql = db.sql();
    assert_eq!(sql.len(), 4);
    assert!(sql[0].starts_with("SELECT COUNT(*)"));
    assert!(sql[1].starts_with("UPDATE \"order_line\" SET \"qty\" = $1"));
    assert!(sql[2].starts_with("INSERT INTO \"order_line\""));
    assert!(sql[3].starts_with("UPDATE \"order_line\" SET \"date_deleted\""));
}

#[tokio::test]
async fn test_one_to_many_sync_completeness() {
    print_test_header(
        "test_one_to_many_sync_completeness",
        &[
            "Every dropped existing id is reported once as deleted or untouched and",
            "every desirable entry is reported once.",
        ],
    );

    let db = MockExecutor::new();
    let mut existing = vec![
        line(Some("1"), 1, false),
        line(Some("2"), 1, true),
        line(Some("3"), 1, false),
        line(Some("5"), 1, false),
    ];
    let mut desirable = vec![line(Some("3"), 1, false), line(None, 2, false)];

    let result = one_to_many_sync(&db, &mut existing, &mut desirable, None, &["ol.qty"])
        .await
        .unwrap();

    let dropped: Vec<(&str, SyncState)> = result
        .iter()
        .filter(|item| item.index_in_desirable.is_none())
        .map(|item| (item.from.as_ref().unwrap().id().unwrap(), item.state))
        .collect();
    assert_eq!(
        dropped,
        vec![
            ("1", SyncState::Deleted),
            ("2", SyncState::Untouched),
            ("5", SyncState::Deleted),
        ]
    );

    let desirable_indexes: HashSet<usize> = result
        .iter()
        .filter_map(|item| item.index_in_desirable)
        .collect();
    assert_eq!(desirable_indexes, HashSet::from([0, 1]));
    assert_eq!(result.len(), 5);
}

#[tokio::test]
async fn test_one_to_many_sync_empty_sets() {
    print_test_header(
        "test_one_to_many_sync_empty_sets",
        &["Nothing to reconcile means no statements and no results."],
    );

    let db = MockExecutor::new();
    let result = one_to_many_sync(&db, &mut [], &mut [], None, &["ol.qty"])
        .await
        .unwrap();
    assert!(result.is_empty());
    assert!(db.statements().is_empty());
}

// ===== Many to many =====

#[tokio::test]
async fn test_many_to_many_sync_states() {
    print_test_header(
        "test_many_to_many_sync_states",
        &[
            "Values define identity: equal live rows stay, equal deleted rows are",
            "restored, new values are inserted, dropped values are deleted.",
        ],
    );

    let db = MockExecutor::new();
    let mut existing = vec![
        tag(Some("1"), "red", false),
        tag(Some("2"), "blue", true),
        tag(Some("3"), "green", false),
    ];
    let mut desirable = vec![
        tag(None, "red", false),
        tag(None, "blue", false),
        tag(None, "black", false),
    ];

    let columns = ["otg.order_id", "otg.tag"];
    let result = many_to_many_sync(&db, &mut existing, &mut desirable, None, &columns)
        .await
        .unwrap();

    let states: Vec<SyncState> = result.iter().map(|item| item.state).collect();
    assert_eq!(
        states,
        vec![
            SyncState::Untouched,
            SyncState::Restored,
            SyncState::Inserted,
            SyncState::Deleted,
        ]
    );
    assert!(!existing[1].is_deleted());
    assert!(existing[2].is_deleted());
    assert_eq!(result[1].to.as_ref().unwrap().id(), Some("2"));

    let sql = db.sql();
    assert_eq!(sql.len(), 3);
    assert_eq!(
        sql[0],
        "UPDATE \"order_tag\" SET \"date_deleted\" = NULL WHERE \"id\" = $1 RETURNING \"date_deleted\""
    );
    assert_eq!(
        sql[1],
        "INSERT INTO \"order_tag\" (\"order_id\", \"tag\") VALUES ($1, $2) RETURNING \"id\""
    );
    assert!(sql[2].starts_with("UPDATE \"order_tag\" SET \"date_deleted\" = timezone("));
}

#[tokio::test]
async fn test_many_to_many_duplicates_match_first_existing() {
    print_test_header(
        "test_many_to_many_duplicates_match_first_existing",
        &[
            "Known limitation: equal desirable entries all match the first equal",
            "existing row, and the second equal existing row is left alone.",
        ],
    );

    let db = MockExecutor::new();
    let mut existing = vec![tag(Some("1"), "red", false), tag(Some("2"), "red", false)];
    let mut desirable = vec![tag(None, "red", false), tag(None, "red", false)];

    let result = many_to_many_sync(&db, &mut existing, &mut desirable, None, &["otg.tag"])
        .await
        .unwrap();

    let matched: Vec<Option<usize>> = result.iter().map(|item| item.index_in_existing).collect();
    assert_eq!(matched, vec![Some(0), Some(0)]);
    assert!(result.iter().all(|item| item.state == SyncState::Untouched));
    assert!(db.statements().is_empty());
}
