//! Integration tests for AliasStore
//!
//! These tests check that the file on disk tracks the in-memory table across
//! arbitrary operation sequences, restarts and concurrent writers.

use proptest::prelude::*;
use std::sync::Arc;
use tagbridge_core::{AliasTable, Identifier};
use tagbridge_storage::{AliasStore, StoreConfig};

fn read_file(store: &AliasStore) -> AliasTable {
    let contents = std::fs::read_to_string(store.path()).unwrap();
    serde_json::from_str(&contents).unwrap()
}

#[derive(Debug, Clone)]
enum Op {
    Assign(String, String),
    AssignBatch(Vec<String>, String),
    Remove(String),
    RemoveBatch(Vec<String>),
}

fn key() -> impl Strategy<Value = String> {
    // Small key space so removals regularly hit existing entries
    prop::sample::select(vec!["A1", "B2", "C3", "D4", "E5", "barcode-1"]).prop_map(String::from)
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (key(), "[a-z ]{0,8}").prop_map(|(k, v)| Op::Assign(k, v)),
        (prop::collection::vec(key(), 1..4), "[a-z]{1,6}")
            .prop_map(|(ks, v)| Op::AssignBatch(ks, v)),
        key().prop_map(Op::Remove),
        prop::collection::vec(key(), 1..4).prop_map(Op::RemoveBatch),
    ]
}

fn ids(keys: &[String]) -> Vec<Identifier> {
    keys.iter().map(|k| Identifier::new(k.as_str()).unwrap()).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn persisted_table_matches_memory_after_every_op(ops in prop::collection::vec(op(), 1..20)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let store = AliasStore::open(StoreConfig::new(dir.path().join("aliases.json"))).unwrap();
            let mut model = AliasTable::new();

            for op in ops {
                match op {
                    Op::Assign(k, v) => {
                        store.assign(Identifier::new(k.as_str()).unwrap(), v.clone()).await.unwrap();
                        model.insert(Identifier::new(k).unwrap(), v);
                    }
                    Op::AssignBatch(ks, v) => {
                        store.assign_batch(ids(&ks), v.clone()).await.unwrap();
                        for id in ids(&ks) {
                            model.insert(id, v.clone());
                        }
                    }
                    Op::Remove(k) => {
                        let id = Identifier::new(k).unwrap();
                        let expected = model.remove(&id).is_some();
                        assert_eq!(store.remove(&id).await.unwrap(), expected);
                    }
                    Op::RemoveBatch(ks) => {
                        let mut expected = false;
                        for id in ids(&ks) {
                            expected |= model.remove(&id).is_some();
                        }
                        assert_eq!(store.remove_batch(ids(&ks)).await.unwrap(), expected);
                    }
                }

                assert_eq!(store.snapshot(), model);
                assert_eq!(read_file(&store), model);
            }
        });
    }
}

#[tokio::test]
async fn test_table_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("aliases.json");

    {
        let store = AliasStore::open(StoreConfig::new(&path)).unwrap();
        store
            .assign(Identifier::new("04ABCDEF").unwrap(), "Front door")
            .await
            .unwrap();
        store
            .assign(Identifier::new("9780306406157").unwrap(), "Book")
            .await
            .unwrap();
    }

    let reopened = AliasStore::open(StoreConfig::new(&path)).unwrap();
    assert_eq!(reopened.len(), 2);
    assert_eq!(
        reopened.get(&Identifier::new("9780306406157").unwrap()).as_deref(),
        Some("Book")
    );
}

#[tokio::test]
async fn test_existing_file_from_older_bridge_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("aliases.json");
    std::fs::write(&path, "{\n  \"A1B2C3D4\": \"Maria\",\n  \"0011\": \"Spare\"\n}").unwrap();

    let store = AliasStore::open(StoreConfig::new(&path)).unwrap();

    assert_eq!(store.len(), 2);
    assert_eq!(
        store.get(&Identifier::new("A1B2C3D4").unwrap()).as_deref(),
        Some("Maria")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_do_not_lose_updates() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(AliasStore::open(StoreConfig::new(dir.path().join("aliases.json"))).unwrap());

    let mut tasks = Vec::new();
    for i in 0..32 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            store
                .assign(Identifier::new(format!("CARD{i:02}")).unwrap(), format!("user {i}"))
                .await
                .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(store.len(), 32);
    assert_eq!(read_file(&store), store.snapshot());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_readers_never_see_partial_batch() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(AliasStore::open(StoreConfig::new(dir.path().join("aliases.json"))).unwrap());
    let batch: Vec<Identifier> = (0..50)
        .map(|i| Identifier::new(format!("K{i}")).unwrap())
        .collect();

    let reader = {
        let store = store.clone();
        tokio::spawn(async move {
            for _ in 0..200 {
                let n = store.len();
                assert!(n == 0 || n == 50, "saw partial batch of {n}");
                tokio::task::yield_now().await;
            }
        })
    };

    store.assign_batch(batch, "bulk").await.unwrap();
    reader.await.unwrap();
    assert_eq!(store.len(), 50);
}
