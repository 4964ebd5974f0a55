//! Dependency graph data structure.
//!
//! Edges point from **includer to included** (source depends on target), so
//! `dependencies` are outgoing neighbors and `dependents` are incoming
//! neighbors of the same edge set. The reverse view is never stored
//! separately and cannot drift from the forward view.
//!
//! Graph nodes exist for tracked entries and for dangling targets: paths
//! some entry references but nobody has scanned. A dangling node is dropped
//! as soon as its last referrer lets go of it.

use chrono::{DateTime, Utc};
use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::paths::is_normalized;
use crate::types::{Entry, Snapshot};

/// Per-entry metadata that isn't an edge.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Record {
    pub(crate) last_seen: DateTime<Utc>,
    pub(crate) stale: bool,
}

/// Graph of tracked files (not thread-safe).
///
/// Wrapped in a `tokio::sync::RwLock` by [`Storage`](super::Storage).
#[derive(Debug, Default)]
pub(crate) struct DependencyGraph {
    /// Edge direction: source (includer) -> target (included).
    graph: StableDiGraph<PathBuf, ()>,

    /// Mapping from path to graph node, for both tracked and dangling paths.
    node_map: HashMap<PathBuf, NodeIndex>,

    /// Tracked entries. Every key has a node in `node_map`.
    records: HashMap<PathBuf, Record>,
}

impl DependencyGraph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a snapshot, validating every path.
    ///
    /// Supplied `dependents` are ignored and stale markers are cleared.
    pub(crate) fn from_snapshot(snapshot: &Snapshot) -> Result<Self> {
        for (key, entry) in snapshot.iter() {
            validate_path(key)?;
            if &entry.path != key {
                return Err(Error::invalid_snapshot(
                    key.clone(),
                    format!("entry path {} does not match its key", entry.path.display()),
                ));
            }
            for dep in &entry.dependencies {
                validate_path(dep).map_err(|_| {
                    Error::invalid_snapshot(
                        dep.clone(),
                        format!("malformed dependency of {}", key.display()),
                    )
                })?;
            }
        }

        let mut graph = Self::new();
        for (_, entry) in snapshot.iter() {
            graph.insert(&entry.path, &entry.dependencies, entry.last_seen, false);
        }
        Ok(graph)
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn contains(&self, path: &Path) -> bool {
        self.records.contains_key(path)
    }

    pub(crate) fn record(&self, path: &Path) -> Option<Record> {
        self.records.get(path).copied()
    }

    pub(crate) fn records(&self) -> impl Iterator<Item = (&PathBuf, &Record)> {
        self.records.iter()
    }

    /// Tracked paths, sorted.
    pub(crate) fn keys(&self) -> Vec<PathBuf> {
        let mut keys: Vec<PathBuf> = self.records.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Read an entry with its current edges.
    pub(crate) fn get(&self, path: &Path) -> Option<Entry> {
        let record = self.records.get(path)?;
        Some(Entry {
            path: path.to_path_buf(),
            last_seen: record.last_seen,
            dependencies: self.dependencies(path),
            dependents: self.dependents(path),
            stale: record.stale,
        })
    }

    /// Insert or replace an entry, diffing its outgoing edges.
    pub(crate) fn put(&mut self, entry: &Entry) -> Result<Entry> {
        if !is_normalized(&entry.path) {
            return Err(Error::InvalidArgument(format!(
                "entry path is not absolute and normalized: {}",
                entry.path.display()
            )));
        }
        if let Some(dep) = entry.dependencies.iter().find(|d| !is_normalized(d)) {
            return Err(Error::InvalidArgument(format!(
                "dependency of {} is not absolute and normalized: {}",
                entry.path.display(),
                dep.display()
            )));
        }

        self.insert(&entry.path, &entry.dependencies, entry.last_seen, entry.stale);
        // The entry was just inserted, so `get` always finds it.
        Ok(self.get(&entry.path).unwrap_or_else(|| entry.clone()))
    }

    /// Remove an entry. Incoming edges survive on a dangling node.
    pub(crate) fn remove(&mut self, path: &Path) -> Option<Entry> {
        let removed = self.get(path)?;
        self.records.remove(path);

        if let Some(&node) = self.node_map.get(path) {
            let targets = self.drop_outgoing(node);
            self.prune(node);
            for target in targets {
                self.prune(target);
            }
        }

        Some(removed)
    }

    pub(crate) fn mark_stale(&mut self, path: &Path) -> bool {
        match self.records.get_mut(path) {
            Some(record) => {
                record.stale = true;
                true
            }
            None => false,
        }
    }

    /// Direct dependencies of a tracked path.
    pub(crate) fn dependencies(&self, path: &Path) -> BTreeSet<PathBuf> {
        self.neighbors(path, Direction::Outgoing)
    }

    /// Direct dependents of a tracked or dangling path.
    pub(crate) fn dependents(&self, path: &Path) -> BTreeSet<PathBuf> {
        self.neighbors(path, Direction::Incoming)
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        self.records
            .keys()
            .filter_map(|path| self.get(path))
            .collect()
    }

    pub(crate) fn node(&self, path: &Path) -> Option<NodeIndex> {
        self.node_map.get(path).copied()
    }

    pub(crate) fn graph(&self) -> &StableDiGraph<PathBuf, ()> {
        &self.graph
    }

    fn neighbors(&self, path: &Path, direction: Direction) -> BTreeSet<PathBuf> {
        let Some(&node) = self.node_map.get(path) else {
            return BTreeSet::new();
        };
        self.graph
            .neighbors_directed(node, direction)
            .map(|n| self.graph[n].clone())
            .collect()
    }

    fn insert(
        &mut self,
        path: &Path,
        dependencies: &BTreeSet<PathBuf>,
        last_seen: DateTime<Utc>,
        stale: bool,
    ) {
        let node = self.ensure_node(path);

        let current: BTreeSet<PathBuf> = self.dependencies(path);

        let mut released = Vec::new();
        for old in current.difference(dependencies) {
            if let Some(&target) = self.node_map.get(old) {
                if let Some(edge) = self.graph.find_edge(node, target) {
                    self.graph.remove_edge(edge);
                }
                released.push(target);
            }
        }

        for new in dependencies.difference(&current) {
            let target = self.ensure_node(new);
            self.graph.add_edge(node, target, ());
        }

        self.records
            .insert(path.to_path_buf(), Record { last_seen, stale });

        for target in released {
            self.prune(target);
        }
    }

    fn ensure_node(&mut self, path: &Path) -> NodeIndex {
        if let Some(&node) = self.node_map.get(path) {
            return node;
        }
        let node = self.graph.add_node(path.to_path_buf());
        self.node_map.insert(path.to_path_buf(), node);
        node
    }

    /// Remove every outgoing edge of `node`, returning the former targets.
    fn drop_outgoing(&mut self, node: NodeIndex) -> Vec<NodeIndex> {
        let targets: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(node, Direction::Outgoing)
            .collect();
        for &target in &targets {
            if let Some(edge) = self.graph.find_edge(node, target) {
                self.graph.remove_edge(edge);
            }
        }
        targets
    }

    /// Drop a node that is neither tracked nor referenced.
    fn prune(&mut self, node: NodeIndex) {
        let Some(path) = self.graph.node_weight(node) else {
            return;
        };
        if self.records.contains_key(path) {
            return;
        }
        let referenced = self
            .graph
            .neighbors_directed(node, Direction::Incoming)
            .next()
            .is_some();
        if referenced {
            return;
        }
        if let Some(path) = self.graph.remove_node(node) {
            self.node_map.remove(&path);
        }
    }
}

fn validate_path(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::invalid_snapshot(path, "path is empty"));
    }
    if !path.is_absolute() {
        return Err(Error::invalid_snapshot(path, "path is not absolute"));
    }
    if !is_normalized(path) {
        return Err(Error::invalid_snapshot(path, "path is not normalized"));
    }
    Ok(())
}
