//! Read-only graph queries.
//!
//! Answers "what does X include", "what includes X" and, the question a
//! build tool actually asks, "X changed, which roots do I rebuild".
//!
//! ## Root policy
//!
//! A root is a tracked file that nothing depends on. Inside a cycle every
//! member has a dependent, so the policy is applied to strongly connected
//! components instead: a component with no dependents outside itself is a
//! root component, and all of its members are roots. On an acyclic graph
//! this is the same as "no dependents". Consequently:
//!
//! - a tracked file nobody includes is its own root
//! - `a <-> b` with nothing else including either yields `{a, b}`
//! - an untracked, unreferenced path yields the empty set

use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use petgraph::stable_graph::NodeIndex;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::trace;

use crate::storage::{DependencyGraph, Storage};
use crate::types::{Cycle, Impact};

/// Query interface over a [`Storage`].
///
/// Queries never mutate the graph and never trigger a scan. Unknown paths
/// produce empty results.
#[derive(Debug, Clone)]
pub struct Resolver {
    storage: Storage,
}

impl Resolver {
    /// Create a resolver reading from `storage`.
    #[must_use]
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// The storage this resolver reads.
    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Direct dependencies of `path`, empty if untracked.
    pub async fn dependencies_of(&self, path: &Path) -> BTreeSet<PathBuf> {
        let graph = self.storage.read().await;
        if !graph.contains(path) {
            return BTreeSet::new();
        }
        graph.dependencies(path)
    }

    /// Tracked files that include `path` directly.
    ///
    /// Also answers for a dangling path that is referenced but not tracked.
    pub async fn dependents_of(&self, path: &Path) -> BTreeSet<PathBuf> {
        self.storage.read().await.dependents(path)
    }

    /// Roots that transitively depend on `path`. See the module docs for the
    /// policy on isolated files and cycles.
    pub async fn roots_affected_by(&self, path: &Path) -> BTreeSet<PathBuf> {
        let graph = self.storage.read().await;
        let Some(start) = graph.node(path) else {
            return BTreeSet::new();
        };

        let reachable = reverse_reachable(&graph, start);
        let roots = roots_among(&graph, &reachable);
        trace!(
            path = %path.display(),
            reachable = reachable.len(),
            roots = roots.len(),
            "Resolved affected roots"
        );
        roots
    }

    /// Direct and transitive dependents of `path`.
    pub async fn impact(&self, path: &Path) -> Impact {
        let graph = self.storage.read().await;
        let target = path.to_path_buf();

        let Some(start) = graph.node(path) else {
            return Impact {
                target,
                direct_dependents: Vec::new(),
                transitive_dependents: Vec::new(),
            };
        };

        let direct_dependents: Vec<PathBuf> = graph.dependents(path).into_iter().collect();
        let mut transitive_dependents: Vec<PathBuf> = reverse_reachable(&graph, start)
            .into_iter()
            .filter(|&node| node != start)
            .map(|node| graph.graph()[node].clone())
            .collect();
        transitive_dependents.sort();

        Impact {
            target,
            direct_dependents,
            transitive_dependents,
        }
    }

    /// Every include cycle in the graph, self-includes included.
    ///
    /// Cycles are sorted by their first file; files within a cycle are sorted.
    pub async fn detect_cycles(&self) -> Vec<Cycle> {
        let graph = self.storage.read().await;
        let inner = graph.graph();

        let mut cycles: Vec<Cycle> = tarjan_scc(inner)
            .into_iter()
            .filter(|component| match component.as_slice() {
                [single] => inner.find_edge(*single, *single).is_some(),
                _ => true,
            })
            .map(|component| {
                let mut files: Vec<PathBuf> =
                    component.iter().map(|&node| inner[node].clone()).collect();
                files.sort();
                Cycle { files }
            })
            .collect();

        cycles.sort_by(|a, b| a.files.cmp(&b.files));
        cycles
    }
}

/// Breadth-first walk over incoming edges, `start` included.
fn reverse_reachable(graph: &DependencyGraph, start: NodeIndex) -> HashSet<NodeIndex> {
    let inner = graph.graph();
    let mut visited = HashSet::from([start]);
    let mut queue = VecDeque::from([start]);

    while let Some(node) = queue.pop_front() {
        for dependent in inner.neighbors_directed(node, Direction::Incoming) {
            if visited.insert(dependent) {
                queue.push_back(dependent);
            }
        }
    }

    visited
}

/// Members of root components within a set closed under incoming edges.
fn roots_among(graph: &DependencyGraph, reachable: &HashSet<NodeIndex>) -> BTreeSet<PathBuf> {
    let inner = graph.graph();

    let mut subgraph: DiGraphMap<NodeIndex, ()> = DiGraphMap::new();
    for &node in reachable {
        subgraph.add_node(node);
        for dependency in inner.neighbors_directed(node, Direction::Outgoing) {
            if reachable.contains(&dependency) {
                subgraph.add_edge(node, dependency, ());
            }
        }
    }

    let mut roots = BTreeSet::new();
    for component in tarjan_scc(&subgraph) {
        let members: HashSet<NodeIndex> = component.iter().copied().collect();
        let has_outside_dependent = component.iter().any(|&node| {
            inner
                .neighbors_directed(node, Direction::Incoming)
                .any(|dependent| !members.contains(&dependent))
        });
        if has_outside_dependent {
            continue;
        }

        roots.extend(
            component
                .iter()
                .map(|&node| &inner[node])
                .filter(|path| graph.contains(path))
                .cloned(),
        );
    }
    roots
}
