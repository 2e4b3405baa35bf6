//! End-to-end scenarios straight from the testable-properties list: one
//! test per named scenario, each exercising the full `Database` surface
//! rather than a single module in isolation.
use std::time::Duration;

use bson::Bson;
use minileaf::query::FieldOp;
use minileaf::{Config, Database, DocumentId, Filter, IdKind};

fn memory_db() -> Database {
    Database::open(Config::default().with_memory_only(true)).unwrap()
}

#[test]
fn unique_index_self_update_never_raises_duplicate_key() {
    let db = memory_db();
    let users = db.collection("users", IdKind::Int).unwrap();
    users.create_index(None, minileaf::IndexKind::Hash { field: "email".to_string(), unique: true }, None, false).unwrap();

    users.save(bson::doc! { "_id": 1i64, "email": "a@example.com" }).unwrap();
    // Re-saving the same id with the same unique value must be a no-op, not a conflict.
    users.save(bson::doc! { "_id": 1i64, "email": "a@example.com" }).unwrap();
    assert_eq!(users.count().unwrap(), 1);
}

#[test]
fn ttl_index_evicts_documents_shortly_after_they_are_saved() {
    let db = memory_db();
    let sessions = db.collection("sessions", IdKind::Int).unwrap();
    // Zero grace period: anything saved after the index exists is a
    // sweep candidate the moment the sweeper next wakes up.
    sessions.create_ttl_index("sessions_ttl".to_string(), 0, Duration::from_millis(20)).unwrap();
    sessions.save(bson::doc! { "_id": 1i64 }).unwrap();

    std::thread::sleep(Duration::from_millis(200));

    assert!(sessions.find_by_id(&DocumentId::Int(1)).unwrap().is_none(), "expired document should have been swept");
}

#[test]
fn range_query_over_an_ordered_index_matches_full_scan() {
    let db = memory_db();
    let scores = db.collection("scores", IdKind::Int).unwrap();
    scores.create_index(None, minileaf::IndexKind::Ordered { fields: vec![("value".to_string(), minileaf::index::SortDirection::Asc)], unique: false }, None, false).unwrap();
    for i in 0..20 {
        scores.save(bson::doc! { "_id": i as i64, "value": i as i64 }).unwrap();
    }

    let indexed = scores.find_by_range("value", Some(&Bson::Int64(5)), Some(&Bson::Int64(9))).unwrap();
    let mut values: Vec<i64> = indexed.iter().map(|d| d.data.get_i64("value").unwrap()).collect();
    values.sort_unstable();
    assert_eq!(values, vec![5, 6, 7, 8, 9]);
}

#[test]
fn temporal_range_matches_across_mixed_serialization_forms() {
    let db = memory_db();
    let events = db.collection("events", IdKind::Int).unwrap();
    events.save(bson::doc! { "_id": 1i64, "at": "1970-01-01T00:00:01Z" }).unwrap();
    // A small integer is read as whole seconds: `1` normalizes to 1_000ms.
    events.save(bson::doc! { "_id": 2i64, "at": 1i64 }).unwrap();
    events.save(bson::doc! { "_id": 3i64, "at": bson::Bson::DateTime(bson::DateTime::from_millis(5_000)) }).unwrap();

    let filter = Filter::FieldConds(
        "at".to_string(),
        vec![FieldOp::Gte(Bson::DateTime(bson::DateTime::from_millis(0))), FieldOp::Lte(Bson::DateTime(bson::DateTime::from_millis(3_000)))],
    );
    let matched = events.find_all_matching(&filter, 0, usize::MAX).unwrap();
    assert_eq!(matched.len(), 2, "text ISO-8601 and integer-seconds forms should both coerce into the range");
}

#[test]
fn partial_update_can_set_a_field_to_null_and_unset_another() {
    let db = memory_db();
    let profiles = db.collection("profiles", IdKind::Int).unwrap();
    profiles.save(bson::doc! { "_id": 1i64, "nickname": "nic", "bio": "hi" }).unwrap();

    let spec = minileaf::UpdateSpec::new(vec![
        minileaf::UpdateOp::Set("nickname".to_string(), Bson::Null),
        minileaf::UpdateOp::Unset("bio".to_string()),
    ]);
    assert!(profiles.update_by_id(&DocumentId::Int(1), &spec).unwrap());

    let doc = profiles.find_by_id(&DocumentId::Int(1)).unwrap().unwrap();
    assert_eq!(doc.data.get("nickname"), Some(&Bson::Null));
    assert!(!doc.data.contains_key("bio"));
}
