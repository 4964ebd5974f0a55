//! Core types for Lineage.
//!
//! This module contains the public types used throughout the crate:
//! - [`Entry`]: one tracked file and its edges
//! - [`Snapshot`]: a point-in-time copy of the whole graph
//! - [`ScanStats`], [`SweepReport`]: operation summaries
//! - [`Impact`], [`Cycle`], [`ScannedFile`]: query and stream results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ScanError;

// ============================================================================
// Graph Types
// ============================================================================

/// A tracked file.
///
/// `dependents` is derived by [`Storage`](crate::Storage): whatever a caller
/// puts there is ignored on `put` and `load`, and every entry read back from
/// storage carries the current reverse edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Absolute, normalized path (unique key)
    pub path: PathBuf,
    /// When this file was last scanned successfully
    pub last_seen: DateTime<Utc>,
    /// Paths this file references (may not be tracked yet)
    #[serde(default)]
    pub dependencies: BTreeSet<PathBuf>,
    /// Tracked files whose dependencies contain this path
    #[serde(default)]
    pub dependents: BTreeSet<PathBuf>,
    /// Invalidated by the sweep and awaiting a rescan
    #[serde(default)]
    pub stale: bool,
}

impl Entry {
    /// Create a fresh entry seen now.
    pub fn new(path: impl Into<PathBuf>, dependencies: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_seen: Utc::now(),
            dependencies: dependencies.into_iter().collect(),
            dependents: BTreeSet::new(),
            stale: false,
        }
    }

    /// Override the `last_seen` timestamp.
    #[must_use]
    pub fn seen_at(mut self, last_seen: DateTime<Utc>) -> Self {
        self.last_seen = last_seen;
        self
    }
}

/// An immutable point-in-time copy of the dependency graph.
///
/// Serializes as a plain map from path to [`Entry`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    entries: BTreeMap<PathBuf, Entry>,
}

impl Snapshot {
    /// Create an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry keyed by its own path.
    pub fn insert(&mut self, entry: Entry) {
        self.entries.insert(entry.path.clone(), entry);
    }

    /// Look up an entry.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&Entry> {
        self.entries.get(path)
    }

    /// Tracked paths in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &PathBuf> {
        self.entries.keys()
    }

    /// Iterate over `(key, entry)` pairs in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &Entry)> {
        self.entries.iter()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the snapshot has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<Entry> for Snapshot {
    fn from_iter<I: IntoIterator<Item = Entry>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for entry in iter {
            snapshot.insert(entry);
        }
        snapshot
    }
}

impl From<BTreeMap<PathBuf, Entry>> for Snapshot {
    fn from(entries: BTreeMap<PathBuf, Entry>) -> Self {
        Self { entries }
    }
}

impl IntoIterator for Snapshot {
    type Item = (PathBuf, Entry);
    type IntoIter = std::collections::btree_map::IntoIter<PathBuf, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

// ============================================================================
// Operation Summaries
// ============================================================================

/// Statistics from a scan.
///
/// Returned by [`Scanner::scan`](crate::Scanner::scan).
#[derive(Debug, Clone, Default)]
pub struct ScanStats {
    /// Files read, parsed, and written to storage
    pub files_scanned: usize,
    /// Files seen during the walk that the language rules don't handle
    pub files_skipped: usize,
    /// Directories that could not be read (path, error reason)
    pub directories_skipped: Vec<(PathBuf, String)>,
    /// File-level errors (non-fatal)
    pub errors: Vec<ScanError>,
    /// How long the scan took
    pub duration: Duration,
}

/// Outcome of one invalidation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries removed because their file no longer exists
    pub evicted: Vec<PathBuf>,
    /// Entries whose file still exists, now awaiting a rescan
    pub marked_stale: Vec<PathBuf>,
    /// Expired entries left alone because a scan was in flight
    pub skipped_in_flight: Vec<PathBuf>,
}

impl SweepReport {
    /// Returns `true` if the sweep changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.evicted.is_empty() && self.marked_stale.is_empty()
    }
}

// ============================================================================
// Query Results
// ============================================================================

/// Result of impact analysis.
///
/// Shows which tracked files would be affected by a change to `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Impact {
    /// The file being analyzed
    pub target: PathBuf,
    /// Files that reference the target directly
    pub direct_dependents: Vec<PathBuf>,
    /// Every file that reaches the target through references, including
    /// the direct dependents
    pub transitive_dependents: Vec<PathBuf>,
}

/// A circular include chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
    /// Files involved in the cycle, sorted
    pub files: Vec<PathBuf>,
}

/// A file emitted by [`ScanStream`](crate::ScanStream) after its scan.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    /// The path that was pushed
    pub path: PathBuf,
    /// The entry as stored after the scan, `None` if the file was skipped
    pub entry: Option<Entry>,
    /// Root files that must be recompiled because of this file
    pub roots: BTreeSet<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_serializes_as_plain_map() {
        let entry = Entry::new("/proj/a.tpl", [PathBuf::from("/proj/b.tpl")]);
        let snapshot: Snapshot = std::iter::once(entry).collect();

        let json = serde_json::to_value(&snapshot).unwrap();

        let map = json.as_object().expect("snapshot should be a JSON object");
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("/proj/a.tpl"));
        assert_eq!(map["/proj/a.tpl"]["dependencies"][0], "/proj/b.tpl");
    }

    #[test]
    fn entry_deserializes_without_derived_fields() {
        let json = r#"{
            "path": "/proj/a.tpl",
            "last_seen": "2024-01-01T00:00:00Z",
            "dependencies": ["/proj/b.tpl"]
        }"#;

        let entry: Entry = serde_json::from_str(json).unwrap();

        assert!(entry.dependents.is_empty());
        assert!(!entry.stale);
        assert_eq!(entry.dependencies.len(), 1);
    }

    #[test]
    fn new_entry_is_fresh_and_has_no_dependents() {
        let entry = Entry::new("/proj/a.tpl", []);

        assert!(entry.dependents.is_empty());
        assert!(!entry.stale);
    }

    #[test]
    fn sweep_report_ignores_skipped_when_checking_empty() {
        let report = SweepReport {
            skipped_in_flight: vec![PathBuf::from("/proj/a.tpl")],
            ..SweepReport::default()
        };

        assert!(report.is_empty());
    }
}
