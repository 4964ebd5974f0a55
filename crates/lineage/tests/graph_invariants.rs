//! Property tests for graph invariants under random mutation.

use std::collections::BTreeSet;
use std::path::PathBuf;

use lineage::{Entry, Storage};
use proptest::prelude::*;

const NODES: usize = 6;

#[derive(Debug, Clone)]
enum Op {
    Put(usize, Vec<usize>),
    Remove(usize),
}

fn path(index: usize) -> PathBuf {
    PathBuf::from(format!("/g/n{index}.tpl"))
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..NODES, proptest::collection::vec(0..NODES, 0..4))
            .prop_map(|(node, deps)| Op::Put(node, deps)),
        1 => (0..NODES).prop_map(Op::Remove),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("should build runtime")
}

async fn apply(storage: &Storage, ops: &[Op]) {
    for op in ops {
        match op {
            Op::Put(node, deps) => {
                storage
                    .put(&Entry::new(path(*node), deps.iter().map(|&d| path(d))))
                    .await
                    .expect("put should succeed");
            }
            Op::Remove(node) => {
                storage.remove(&path(*node)).await;
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn dependents_are_always_the_transpose(ops in proptest::collection::vec(op(), 0..40)) {
        let snapshot = runtime().block_on(async {
            let storage = Storage::new();
            apply(&storage, &ops).await;
            storage.snapshot().await
        });

        for (key, entry) in snapshot.iter() {
            for dependent in &entry.dependents {
                let includer = snapshot.get(dependent);
                prop_assert!(includer.is_some(), "dependent {} is not tracked", dependent.display());
                prop_assert!(includer.unwrap().dependencies.contains(key));
            }
            for dependency in &entry.dependencies {
                if let Some(target) = snapshot.get(dependency) {
                    prop_assert!(target.dependents.contains(key));
                }
            }
        }
    }

    #[test]
    fn dependencies_match_the_last_put(ops in proptest::collection::vec(op(), 1..40)) {
        let snapshot = runtime().block_on(async {
            let storage = Storage::new();
            apply(&storage, &ops).await;
            storage.snapshot().await
        });

        for index in 0..NODES {
            let last = ops.iter().rev().find(|op| match op {
                Op::Put(node, _) | Op::Remove(node) => *node == index,
            });
            match last {
                Some(Op::Put(_, deps)) => {
                    let expected: BTreeSet<PathBuf> = deps.iter().map(|&d| path(d)).collect();
                    prop_assert_eq!(&snapshot.get(&path(index)).unwrap().dependencies, &expected);
                }
                Some(Op::Remove(_)) | None => prop_assert!(snapshot.get(&path(index)).is_none()),
            }
        }
    }

    #[test]
    fn snapshot_round_trips(ops in proptest::collection::vec(op(), 0..40)) {
        let (original, restored) = runtime().block_on(async {
            let storage = Storage::new();
            apply(&storage, &ops).await;
            let original = storage.snapshot().await;

            let restored = Storage::new();
            restored.load(&original).await.expect("load should succeed");
            (original, restored.snapshot().await)
        });

        prop_assert_eq!(original, restored);
    }
}
