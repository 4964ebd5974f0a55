//! Integration tests for storage: snapshots, loading, and edge maintenance.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use lineage::{Entry, Error, Snapshot, Storage};

fn entry(path: &str, deps: &[&str]) -> Entry {
    Entry::new(path, deps.iter().map(PathBuf::from))
}

fn set(paths: &[&str]) -> BTreeSet<PathBuf> {
    paths.iter().map(PathBuf::from).collect()
}

async fn storage_with(entries: &[Entry]) -> Storage {
    let storage = Storage::new();
    for entry in entries {
        storage.put(entry).await.expect("put should succeed");
    }
    storage
}

// === Snapshot round-trip ===

#[tokio::test]
async fn snapshot_round_trips_through_load() {
    let original = storage_with(&[
        entry("/t/page.tpl", &["/t/layout.tpl", "/t/nav.tpl"]),
        entry("/t/layout.tpl", &["/t/nav.tpl"]),
        entry("/t/nav.tpl", &["/t/missing.tpl"]),
        entry("/t/loop.tpl", &["/t/loop.tpl"]),
    ])
    .await;
    let snapshot = original.snapshot().await;

    let restored = Storage::new();
    restored.load(&snapshot).await.unwrap();

    assert_eq!(restored.snapshot().await, snapshot);
}

#[tokio::test]
async fn snapshot_survives_json() {
    let storage = storage_with(&[
        entry("/t/a.tpl", &["/t/b.tpl"]),
        entry("/t/b.tpl", &[]),
    ])
    .await;
    let snapshot = storage.snapshot().await;

    let json = serde_json::to_string(&snapshot).unwrap();
    let parsed: Snapshot = serde_json::from_str(&json).unwrap();
    let restored = Storage::from_snapshot(&parsed).unwrap();

    assert_eq!(restored.snapshot().await, snapshot);
}

#[tokio::test]
async fn snapshot_is_isolated_from_later_mutation() {
    let storage = storage_with(&[entry("/t/a.tpl", &["/t/b.tpl"])]).await;
    let snapshot = storage.snapshot().await;

    storage.put(&entry("/t/a.tpl", &["/t/c.tpl"])).await.unwrap();
    storage.put(&entry("/t/b.tpl", &[])).await.unwrap();

    assert_eq!(snapshot.len(), 1);
    let a = snapshot.get(Path::new("/t/a.tpl")).unwrap();
    assert_eq!(a.dependencies, set(&["/t/b.tpl"]));
}

// === Load ===

#[tokio::test]
async fn load_rebuilds_dependents_and_clears_stale() {
    let mut a = entry("/t/a.tpl", &["/t/b.tpl"]);
    a.stale = true;
    let mut b = entry("/t/b.tpl", &[]);
    // Bogus reverse edge; must be ignored
    b.dependents = set(&["/t/nobody.tpl"]);
    let snapshot: Snapshot = [a, b].into_iter().collect();

    let storage = Storage::new();
    storage.load(&snapshot).await.unwrap();

    let b = storage.get(Path::new("/t/b.tpl")).await.unwrap();
    assert_eq!(b.dependents, set(&["/t/a.tpl"]));
    assert!(!storage.get(Path::new("/t/a.tpl")).await.unwrap().stale);
}

#[tokio::test]
async fn load_preserves_last_seen() {
    let seen = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let snapshot: Snapshot = std::iter::once(entry("/t/a.tpl", &[]).seen_at(seen)).collect();

    let storage = Storage::from_snapshot(&snapshot).unwrap();

    assert_eq!(
        storage.get(Path::new("/t/a.tpl")).await.unwrap().last_seen,
        seen
    );
}

#[tokio::test]
async fn load_rejects_malformed_dependency_and_keeps_graph() {
    let storage = storage_with(&[entry("/t/keep.tpl", &[])]).await;
    let snapshot: Snapshot = std::iter::once(entry("/t/a.tpl", &["relative/b.tpl"])).collect();

    let result = storage.load(&snapshot).await;

    assert!(matches!(result, Err(Error::InvalidSnapshot { .. })));
    assert_eq!(storage.keys().await, vec![PathBuf::from("/t/keep.tpl")]);
}

#[tokio::test]
async fn load_rejects_unnormalized_key() {
    let snapshot: Snapshot = std::iter::once(entry("/t/x/../a.tpl", &[])).collect();

    let result = Storage::from_snapshot(&snapshot);

    assert!(matches!(result, Err(Error::InvalidSnapshot { .. })));
}

// === Edge maintenance ===

#[tokio::test]
async fn put_diffs_old_and_new_dependencies() {
    let storage = storage_with(&[
        entry("/t/a.tpl", &["/t/b.tpl", "/t/c.tpl"]),
        entry("/t/b.tpl", &[]),
        entry("/t/c.tpl", &[]),
        entry("/t/d.tpl", &[]),
    ])
    .await;

    storage
        .put(&entry("/t/a.tpl", &["/t/c.tpl", "/t/d.tpl"]))
        .await
        .unwrap();

    let dependents = |path: &'static str| {
        let storage = storage.clone();
        async move { storage.get(Path::new(path)).await.unwrap().dependents }
    };
    assert!(dependents("/t/b.tpl").await.is_empty());
    assert_eq!(dependents("/t/c.tpl").await, set(&["/t/a.tpl"]));
    assert_eq!(dependents("/t/d.tpl").await, set(&["/t/a.tpl"]));
}

#[tokio::test]
async fn put_ignores_supplied_dependents() {
    let storage = Storage::new();
    let mut a = entry("/t/a.tpl", &[]);
    a.dependents = set(&["/t/fake.tpl"]);

    let stored = storage.put(&a).await.unwrap();

    assert!(stored.dependents.is_empty());
}

#[tokio::test]
async fn put_links_new_entry_to_existing_referrers() {
    let storage = storage_with(&[entry("/t/a.tpl", &["/t/b.tpl"])]).await;

    let b = storage.put(&entry("/t/b.tpl", &[])).await.unwrap();

    assert_eq!(b.dependents, set(&["/t/a.tpl"]));
}

#[tokio::test]
async fn put_rejects_relative_path() {
    let storage = Storage::new();

    let result = storage.put(&entry("a.tpl", &[])).await;

    assert!(matches!(result, Err(Error::InvalidArgument(_))));
    assert!(storage.is_empty().await);
}

#[tokio::test]
async fn remove_returns_entry_and_leaves_referrers_dangling() {
    let storage = storage_with(&[
        entry("/t/a.tpl", &["/t/b.tpl"]),
        entry("/t/b.tpl", &["/t/c.tpl"]),
    ])
    .await;

    let removed = storage.remove(Path::new("/t/b.tpl")).await.unwrap();

    assert_eq!(removed.dependencies, set(&["/t/c.tpl"]));
    assert!(!storage.contains(Path::new("/t/b.tpl")).await);
    assert_eq!(
        storage.get(Path::new("/t/a.tpl")).await.unwrap().dependencies,
        set(&["/t/b.tpl"])
    );
    assert!(storage.remove(Path::new("/t/b.tpl")).await.is_none());
}

#[tokio::test]
async fn keys_are_sorted() {
    let storage = storage_with(&[
        entry("/t/c.tpl", &[]),
        entry("/t/a.tpl", &[]),
        entry("/t/b.tpl", &[]),
    ])
    .await;

    assert_eq!(
        storage.keys().await,
        vec![
            PathBuf::from("/t/a.tpl"),
            PathBuf::from("/t/b.tpl"),
            PathBuf::from("/t/c.tpl"),
        ]
    );
}
