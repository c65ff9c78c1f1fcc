use std::collections::BTreeSet;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use tabrelay_engine::{latest_run_file, read_entries, IncrementalStore};
use tempfile::TempDir;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_runs_never_interleave() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().to_path_buf();

    let mut handles = Vec::new();
    for run in 0..4 {
        let dir = dir.clone();
        handles.push(tokio::spawn(async move {
            let store = Arc::new(IncrementalStore::create(&dir, "site").unwrap());
            for n in 0..100 {
                store.append_item(json!({ "run": run, "n": n })).unwrap();
                if n % 10 == 0 {
                    tokio::task::yield_now().await;
                }
            }
            store.path().to_path_buf()
        }));
    }

    let mut paths = BTreeSet::new();
    for handle in handles {
        paths.insert(handle.await.unwrap());
    }
    assert_eq!(paths.len(), 4);

    let mut runs_seen = BTreeSet::new();
    for path in &paths {
        let log = read_entries(path).unwrap();
        assert_eq!(log.skipped_lines, 0);
        let items: Vec<_> = log.items().cloned().collect();
        assert_eq!(items.len(), 100);
        let run = items[0]["run"].clone();
        for (n, item) in items.iter().enumerate() {
            assert_eq!(item["run"], run);
            assert_eq!(item["n"], n);
        }
        runs_seen.insert(run.as_u64().unwrap());
    }
    assert_eq!(runs_seen, (0..4).collect());
}

#[test]
fn one_store_shared_across_threads_keeps_lines_whole() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(IncrementalStore::create(temp.path(), "shared").unwrap());
    let payload = "x".repeat(4096);

    std::thread::scope(|scope| {
        for writer in 0..4 {
            let store = store.clone();
            let payload = payload.clone();
            scope.spawn(move || {
                for n in 0..50 {
                    store
                        .append_item(json!({ "writer": writer, "n": n, "pad": payload }))
                        .unwrap();
                }
            });
        }
    });

    let log = read_entries(store.path()).unwrap();
    assert_eq!(log.skipped_lines, 0);
    assert_eq!(log.counts().items, 200);
    for writer in 0..4 {
        let order: Vec<u64> = log
            .items()
            .filter(|item| item["writer"] == writer)
            .filter_map(|item| item["n"].as_u64())
            .collect();
        assert_eq!(order, (0..50).collect::<Vec<_>>());
    }
}

#[test]
fn reopened_store_appends_after_existing_records() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("manual.jsonl");
    IncrementalStore::open(&path, "p")
        .unwrap()
        .append_item(json!(1))
        .unwrap();
    IncrementalStore::open(&path, "p")
        .unwrap()
        .append_summary(json!({"total_items": 1}))
        .unwrap();

    let log = read_entries(&path).unwrap();
    assert_eq!(log.counts().total(), 2);
    assert_eq!(latest_run_file(temp.path(), None).unwrap(), Some(path));
}
