//! Shared, in-memory dependency graph storage.
//!
//! [`Storage`] is a cheap-to-clone handle to one graph. The scanner writes
//! through it, the resolver reads through it, and an optional background
//! sweep evicts entries whose files have disappeared.
//!
//! # Thread Safety
//!
//! The graph lives behind a `tokio::sync::RwLock`: queries share the read
//! half, mutations take the write half, and `load`/`snapshot` are therefore
//! atomic with respect to scans and sweeps.
//!
//! Scans mark the path they are working on with an [`InFlightGuard`]. The
//! sweep never evicts or marks a path with a live marker, so a rescan and an
//! eviction of the same file cannot interleave.
//!
//! # Invalidation
//!
//! Nothing is swept until [`Storage::start_invalidation`] is called. Each
//! sweep looks at entries last seen at least one interval ago: entries whose
//! file is gone are removed, the rest are marked stale so the next scan that
//! reaches them reads them again. The sweep task holds only a weak reference
//! to the graph and is aborted when the last handle is dropped.

mod graph;

pub(crate) use graph::DependencyGraph;

use chrono::{TimeDelta, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{RwLock, RwLockReadGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::types::{Entry, Snapshot, SweepReport};

/// Handle to a shared dependency graph.
#[derive(Clone)]
pub struct Storage {
    shared: Arc<Shared>,
}

struct Shared {
    graph: RwLock<DependencyGraph>,
    in_flight: Mutex<HashMap<PathBuf, usize>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.sweeper).take() {
            task.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("sweeping", &self.is_sweeping())
            .finish_non_exhaustive()
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::with_graph(DependencyGraph::new())
    }

    /// Create storage preloaded with a snapshot.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidSnapshot` if any entry is malformed.
    pub fn from_snapshot(snapshot: &Snapshot) -> Result<Self> {
        Ok(Self::with_graph(DependencyGraph::from_snapshot(snapshot)?))
    }

    fn with_graph(graph: DependencyGraph) -> Self {
        Self {
            shared: Arc::new(Shared {
                graph: RwLock::new(graph),
                in_flight: Mutex::new(HashMap::new()),
                sweeper: Mutex::new(None),
            }),
        }
    }

    // === Whole-graph operations ===

    /// Replace the whole graph with `snapshot`.
    ///
    /// Reverse edges are rebuilt from the dependency sets and stale markers
    /// are cleared. On error the current graph is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidSnapshot` if any key or dependency path is
    /// empty, relative or not normalized, or if an entry's path disagrees
    /// with its key.
    pub async fn load(&self, snapshot: &Snapshot) -> Result<()> {
        let replacement = DependencyGraph::from_snapshot(snapshot)?;
        let mut graph = self.shared.graph.write().await;
        *graph = replacement;
        debug!(entries = graph.len(), "Loaded snapshot");
        Ok(())
    }

    /// Deep copy of every entry.
    pub async fn snapshot(&self) -> Snapshot {
        self.shared.graph.read().await.snapshot()
    }

    /// All tracked paths, sorted.
    pub async fn keys(&self) -> Vec<PathBuf> {
        self.shared.graph.read().await.keys()
    }

    /// Number of tracked entries.
    pub async fn len(&self) -> usize {
        self.shared.graph.read().await.len()
    }

    /// Returns `true` if nothing is tracked.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    // === Single-entry operations ===

    /// Read one entry with its current edges.
    pub async fn get(&self, path: &Path) -> Option<Entry> {
        self.shared.graph.read().await.get(path)
    }

    /// Insert or replace an entry.
    ///
    /// The old and new dependency sets are diffed: dropped references lose
    /// their reverse edge, new references gain one. Any `dependents` on the
    /// supplied entry are ignored. Returns the entry as stored.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if the path or a dependency is not
    /// absolute and normalized.
    pub async fn put(&self, entry: &Entry) -> Result<Entry> {
        self.shared.graph.write().await.put(entry)
    }

    /// Remove an entry. Returns the removed entry, if it was tracked.
    pub async fn remove(&self, path: &Path) -> Option<Entry> {
        self.shared.graph.write().await.remove(path)
    }

    /// Returns `true` if `path` is tracked.
    pub async fn contains(&self, path: &Path) -> bool {
        self.shared.graph.read().await.contains(path)
    }

    /// Returns `true` if `path` is untracked or stale.
    pub async fn needs_scan(&self, path: &Path) -> bool {
        self.shared
            .graph
            .read()
            .await
            .record(path)
            .is_none_or(|record| record.stale)
    }

    pub(crate) async fn read(&self) -> RwLockReadGuard<'_, DependencyGraph> {
        self.shared.graph.read().await
    }

    // === In-flight markers ===

    /// Mark `path` as being scanned until the guard is dropped.
    ///
    /// Markers are counted, so overlapping guards for one path are fine.
    pub async fn begin_scan(&self, path: &Path) -> InFlightGuard {
        // Holding the read half orders the marker against a sweep's
        // write-locked eviction pass.
        let _graph = self.shared.graph.read().await;
        *lock(&self.shared.in_flight)
            .entry(path.to_path_buf())
            .or_insert(0) += 1;

        InFlightGuard {
            shared: Arc::downgrade(&self.shared),
            path: path.to_path_buf(),
        }
    }

    /// Returns `true` if a scan of `path` is in flight.
    #[must_use]
    pub fn is_in_flight(&self, path: &Path) -> bool {
        lock(&self.shared.in_flight).contains_key(path)
    }

    // === Invalidation ===

    /// Start sweeping every `interval`, replacing any previous sweep task.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `interval` is zero or if called outside a
    /// Tokio runtime.
    pub fn start_invalidation(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(Error::Config(
                "invalidation interval must be greater than zero".to_string(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            Error::Config("invalidation requires a running Tokio runtime".to_string())
        })?;

        let task = runtime.spawn(sweep_loop(Arc::downgrade(&self.shared), interval));
        if let Some(previous) = lock(&self.shared.sweeper).replace(task) {
            previous.abort();
        }

        info!(interval_ms = interval.as_millis(), "Started invalidation sweep");
        Ok(())
    }

    /// Stop the background sweep, if one is running.
    pub fn stop_invalidation(&self) {
        if let Some(task) = lock(&self.shared.sweeper).take() {
            task.abort();
            debug!("Stopped invalidation sweep");
        }
    }

    /// Returns `true` if a sweep task is running.
    #[must_use]
    pub fn is_sweeping(&self) -> bool {
        lock(&self.shared.sweeper)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Run one sweep over entries last seen at least `max_age` ago.
    ///
    /// File existence is checked without holding the graph lock. Before an
    /// entry is evicted or marked stale it is checked again: entries rescanned
    /// in the meantime, or with a scan in flight, are left alone. An entry
    /// whose existence check fails is logged and kept for the next sweep.
    pub async fn sweep(&self, max_age: Duration) -> SweepReport {
        let max_age = TimeDelta::from_std(max_age).unwrap_or(TimeDelta::MAX);
        let now = Utc::now();
        let mut report = SweepReport::default();

        let expired: Vec<(PathBuf, chrono::DateTime<Utc>)> = {
            let graph = self.shared.graph.read().await;
            let in_flight = lock(&self.shared.in_flight);
            let mut expired = Vec::new();
            for (path, record) in graph.records() {
                if now.signed_duration_since(record.last_seen) < max_age {
                    continue;
                }
                if in_flight.contains_key(path) {
                    report.skipped_in_flight.push(path.clone());
                } else {
                    expired.push((path.clone(), record.last_seen));
                }
            }
            expired
        };

        let mut verdicts = Vec::with_capacity(expired.len());
        for (path, last_seen) in expired {
            match tokio::fs::try_exists(&path).await {
                Ok(exists) => verdicts.push((path, last_seen, exists)),
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "Cannot check file existence, keeping entry"
                ),
            }
        }

        let mut graph = self.shared.graph.write().await;
        for (path, last_seen, exists) in verdicts {
            let Some(record) = graph.record(&path) else {
                continue;
            };
            if record.last_seen != last_seen {
                continue;
            }
            if lock(&self.shared.in_flight).contains_key(&path) {
                report.skipped_in_flight.push(path);
                continue;
            }

            if exists {
                if !record.stale {
                    graph.mark_stale(&path);
                    report.marked_stale.push(path);
                }
            } else {
                graph.remove(&path);
                debug!(path = %path.display(), "Evicted deleted file");
                report.evicted.push(path);
            }
        }

        report.evicted.sort();
        report.marked_stale.sort();
        report.skipped_in_flight.sort();
        report
    }
}

async fn sweep_loop(shared: Weak<Shared>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        let storage = Storage { shared };
        let report = storage.sweep(interval).await;
        if !report.is_empty() {
            info!(
                evicted = report.evicted.len(),
                marked_stale = report.marked_stale.len(),
                skipped_in_flight = report.skipped_in_flight.len(),
                "Invalidation sweep completed"
            );
        }
    }
}

/// Marks a path as being scanned. Released on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    shared: Weak<Shared>,
    path: PathBuf,
}

impl InFlightGuard {
    /// The path being scanned.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let mut in_flight = lock(&shared.in_flight);
        if let Some(count) = in_flight.get_mut(&self.path) {
            *count -= 1;
            if *count == 0 {
                in_flight.remove(&self.path);
            }
        }
    }
}
