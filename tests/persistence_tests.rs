//! Persistence adapter round-trips and sortable id properties.

use agentcore::ids::SortableIdGen;
use agentcore::persist::{FileKvStore, KvStore, MemoryKvStore, SqliteKvStore};
use serde_json::json;

fn nested_value() -> serde_json::Value {
    json!({
        "session": "s-1",
        "counts": { "tokens": 1234, "calls": 7 },
        "tags": ["a", "b", "c"],
        "nested": { "map": { "x": { "deep": true } } },
    })
}

async fn exercise_store(store: &dyn KvStore) {
    let value = nested_value();

    store.save("sessions", "alpha", &value).await.expect("save alpha");
    store.save("sessions", "beta", &json!({"k": 1})).await.expect("save beta");
    store.save("other", "gamma", &json!(null)).await.expect("save in another namespace");

    let loaded = store.load("sessions", "alpha").await.expect("load").expect("present");
    assert_eq!(loaded, value, "round-trip must preserve nested mappings exactly");

    assert!(store.exists("sessions", "alpha").await.unwrap());
    assert!(!store.exists("sessions", "missing").await.unwrap());

    let keys = store.list("sessions").await.expect("list");
    assert_eq!(keys, vec!["alpha".to_string(), "beta".to_string()], "list returns every saved key");

    assert!(store.delete("sessions", "alpha").await.unwrap(), "deleting a saved key reports true");
    assert!(
        !store.delete("sessions", "alpha").await.unwrap(),
        "deleting a missing key reports not-found without error"
    );
    assert!(store.load("sessions", "alpha").await.unwrap().is_none());

    // Overwrite semantics.
    store.save("sessions", "beta", &json!({"k": 2})).await.unwrap();
    assert_eq!(
        store.load("sessions", "beta").await.unwrap().unwrap(),
        json!({"k": 2}),
        "save overwrites silently"
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Store implementations
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_memory_store_roundtrip() {
    let store = MemoryKvStore::new();
    exercise_store(&store).await;
}

#[tokio::test]
async fn test_file_store_roundtrip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileKvStore::new(dir.path());
    exercise_store(&store).await;
}

#[tokio::test]
async fn test_sqlite_store_roundtrip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SqliteKvStore::new(dir.path().join("state.db")).expect("open sqlite");
    exercise_store(&store).await;
}

#[tokio::test]
async fn test_file_store_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let store = FileKvStore::new(dir.path());
        store.save("ns", "persisted", &json!({"v": 42})).await.unwrap();
    }
    let reopened = FileKvStore::new(dir.path());
    assert_eq!(
        reopened.load("ns", "persisted").await.unwrap().unwrap(),
        json!({"v": 42}),
        "values must survive a store reopen"
    );
}

#[tokio::test]
async fn test_sqlite_store_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("state.db");
    {
        let store = SqliteKvStore::new(&path).expect("open");
        store.save("ns", "persisted", &json!({"v": 42})).await.unwrap();
    }
    let reopened = SqliteKvStore::new(&path).expect("reopen");
    assert_eq!(reopened.load("ns", "persisted").await.unwrap().unwrap(), json!({"v": 42}));
}

// ─────────────────────────────────────────────────────────────────────────────
// Sortable ids
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_sortable_id_parse_recovers_timestamp() {
    let gen = SortableIdGen::new();
    let before = chrono::Utc::now().timestamp_millis();
    let id = gen.generate();
    let after = chrono::Utc::now().timestamp_millis();

    let parts = SortableIdGen::parse(&id).expect("generated ids must parse");
    assert!(
        parts.timestamp_ms >= before && parts.timestamp_ms <= after,
        "the embedded timestamp is the generation time"
    );
    assert_eq!(parts.random.len(), 8, "8 hex chars of randomness");
}

#[test]
fn test_sortable_ids_preserve_generation_order() {
    let gen = SortableIdGen::new();
    let ids: Vec<String> = (0..200).map(|_| gen.generate()).collect();

    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted, "lexicographic order must match generation order");
}

#[test]
fn test_sortable_id_rejects_malformed_input() {
    assert!(SortableIdGen::parse("short").is_none(), "wrong length");
    assert!(SortableIdGen::parse("zzzzzzzzzzzzzzzzzzzzzzzz").is_none(), "not hex");
}
