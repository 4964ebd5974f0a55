//! Directory walking and dependency extraction.
//!
//! A scan is a worklist of directories to list and files to read, drained by
//! at most `concurrency` futures at a time. Reading a file produces an
//! [`Entry`] that is written straight to [`Storage`]; its dependencies are
//! then queued if they are untracked or stale. Following dependencies is
//! bounded by the same exclusion and depth rules as the walk, and each path
//! is read at most once per scan.
//!
//! Concurrent reads of one path share a single future, so two callers racing
//! on the same file cause one read and observe the same entry.

use futures::future::{BoxFuture, FutureExt, Shared};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::error::{ScanError, ScanErrorKind};
use crate::languages::PathRules;
use crate::paths::{ExcludeSet, normalize};
use crate::storage::Storage;
use crate::types::{Entry, ScanStats};

/// Callback invoked with the path of every file that was read and parsed.
pub type OnScan = Arc<dyn Fn(&Path) + Send + Sync>;

/// Callback invoked with every file a scan had to skip, and why.
pub type OnSkip = Arc<dyn Fn(&Path, &ScanError) + Send + Sync>;

type SharedScan = Shared<BoxFuture<'static, FileOutcome>>;

/// Settings the scanner is built with.
#[derive(Clone)]
pub(crate) struct ScannerConfig {
    pub(crate) root: PathBuf,
    pub(crate) base_dir: Option<PathBuf>,
    pub(crate) max_depth: usize,
    pub(crate) excludes: ExcludeSet,
    pub(crate) concurrency: usize,
    pub(crate) on_scan: Option<OnScan>,
    pub(crate) on_skip: Option<OnSkip>,
}

/// Populates and refreshes [`Storage`] from the filesystem.
#[derive(Clone)]
pub struct Scanner {
    inner: Arc<ScannerInner>,
}

struct ScannerInner {
    storage: Storage,
    rules: Arc<dyn PathRules>,
    root: PathBuf,
    base_dir: PathBuf,
    max_depth: usize,
    excludes: ExcludeSet,
    concurrency: usize,
    on_scan: Option<OnScan>,
    on_skip: Option<OnSkip>,
    /// Reads in progress, keyed by path.
    pending: Mutex<HashMap<PathBuf, SharedScan>>,
}

#[derive(Debug, Clone)]
enum FileOutcome {
    Scanned(Entry),
    Skipped(ScanError),
}

/// Why a file is on the worklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Walk,
    Target,
    Dependency,
}

enum Work {
    Dir { path: PathBuf, depth: usize },
    File { path: PathBuf, origin: Origin },
}

enum Done {
    Listed {
        path: PathBuf,
        depth: usize,
        children: std::io::Result<Vec<Child>>,
    },
    Read {
        path: PathBuf,
        origin: Origin,
        outcome: FileOutcome,
        follow: Vec<PathBuf>,
    },
}

struct Child {
    path: PathBuf,
    is_dir: bool,
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("rules", &self.inner.rules.name())
            .field("root", &self.inner.root)
            .field("max_depth", &self.inner.max_depth)
            .field("concurrency", &self.inner.concurrency)
            .finish_non_exhaustive()
    }
}

impl Scanner {
    pub(crate) fn new(storage: Storage, rules: Arc<dyn PathRules>, config: ScannerConfig) -> Self {
        let base_dir = config
            .base_dir
            .map_or_else(|| config.root.clone(), |dir| normalize(&config.root.join(dir)));

        Self {
            inner: Arc::new(ScannerInner {
                storage,
                rules,
                root: config.root,
                base_dir,
                max_depth: config.max_depth,
                excludes: config.excludes,
                concurrency: config.concurrency.max(1),
                on_scan: config.on_scan,
                on_skip: config.on_skip,
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The directory full scans start from.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// `target` as the absolute, normalized path a scan of it would key on.
    /// Relative paths are taken relative to the root.
    #[must_use]
    pub fn absolute(&self, target: &Path) -> PathBuf {
        self.inner.absolute(target)
    }

    /// Scan the whole tree, a subtree, or one file.
    ///
    /// With no target the configured root is walked. A directory target
    /// (according to `stats`, or a fresh stat when `stats` is `None`) walks
    /// that subtree. Any other target is read as a file, whether or not it is
    /// already tracked. Relative targets are taken relative to the root.
    ///
    /// Every file read has its untracked or stale dependencies scanned before
    /// this returns. Per-file failures end up in [`ScanStats::errors`], are
    /// passed to the skip callback if one is set, and never abort the scan.
    pub async fn scan(&self, target: Option<&Path>, stats: Option<Metadata>) -> ScanStats {
        let start = Instant::now();
        let mut run = Run::default();

        match target {
            None => run.queue.push_back(Work::Dir {
                path: self.inner.root.clone(),
                depth: 0,
            }),
            Some(target) => {
                let path = self.inner.absolute(target);
                let is_dir = match stats {
                    Some(metadata) => metadata.is_dir(),
                    None => tokio::fs::metadata(&path)
                        .await
                        .is_ok_and(|metadata| metadata.is_dir()),
                };

                if is_dir {
                    let depth = self.inner.dir_depth(&path).unwrap_or(0);
                    run.queue.push_back(Work::Dir { path, depth });
                } else {
                    run.visited.insert(path.clone());
                    run.queue.push_back(Work::File {
                        path,
                        origin: Origin::Target,
                    });
                }
            }
        }

        self.drain(&mut run).await;

        run.stats.duration = start.elapsed();
        info!(
            files_scanned = run.stats.files_scanned,
            files_skipped = run.stats.files_skipped,
            errors = run.stats.errors.len(),
            duration_ms = run.stats.duration.as_millis(),
            "Scan complete"
        );
        run.stats
    }

    async fn drain(&self, run: &mut Run) {
        let mut running = FuturesUnordered::new();

        loop {
            while running.len() < self.inner.concurrency {
                let Some(work) = run.queue.pop_front() else {
                    break;
                };
                running.push(self.execute(work));
            }

            let Some(done) = running.next().await else {
                break;
            };

            match done {
                Done::Listed {
                    path,
                    depth,
                    children,
                } => self.on_listed(run, &path, depth, children),
                Done::Read {
                    path,
                    origin,
                    outcome,
                    follow,
                } => self.on_read(run, &path, origin, outcome, follow),
            }
        }
    }

    async fn execute(&self, work: Work) -> Done {
        match work {
            Work::Dir { path, depth } => {
                let children = list_dir(&path).await;
                Done::Listed {
                    path,
                    depth,
                    children,
                }
            }
            Work::File { path, origin } => {
                let outcome = self.scan_file(path.clone()).await;
                let follow = match &outcome {
                    FileOutcome::Scanned(entry) => self.inner.follow_ups(entry).await,
                    FileOutcome::Skipped(_) => Vec::new(),
                };
                Done::Read {
                    path,
                    origin,
                    outcome,
                    follow,
                }
            }
        }
    }

    fn on_listed(
        &self,
        run: &mut Run,
        dir: &Path,
        depth: usize,
        children: std::io::Result<Vec<Child>>,
    ) {
        let children = match children {
            Ok(children) => children,
            Err(e) => {
                warn!(
                    directory = %dir.display(),
                    error = %e,
                    "Cannot read directory, skipping"
                );
                run.stats
                    .directories_skipped
                    .push((dir.to_path_buf(), e.to_string()));
                return;
            }
        };

        for child in children {
            if self.inner.excludes.is_excluded(&child.path) {
                trace!(path = %child.path.display(), "Excluded");
                continue;
            }

            if child.is_dir {
                if depth < self.inner.max_depth {
                    run.queue.push_back(Work::Dir {
                        path: child.path,
                        depth: depth + 1,
                    });
                } else {
                    debug!(
                        directory = %child.path.display(),
                        max_depth = self.inner.max_depth,
                        "Directory beyond depth limit, skipping"
                    );
                }
            } else if !self.inner.rules.handles(&child.path) {
                run.stats.files_skipped += 1;
            } else if run.visited.insert(child.path.clone()) {
                run.queue.push_back(Work::File {
                    path: child.path,
                    origin: Origin::Walk,
                });
            }
        }
    }

    fn on_read(
        &self,
        run: &mut Run,
        path: &Path,
        origin: Origin,
        outcome: FileOutcome,
        follow: Vec<PathBuf>,
    ) {
        if let FileOutcome::Skipped(error) = outcome {
            // A reference to a file that doesn't exist yet is a dangling
            // edge, not a failure.
            if origin == Origin::Dependency && error.kind == ScanErrorKind::Missing {
                debug!(path = %path.display(), "Dependency not on disk, leaving edge dangling");
            } else {
                warn!(
                    path = %error.path.display(),
                    error = %error.message,
                    kind = %error.kind,
                    "Skipping file"
                );
                if let Some(on_skip) = &self.inner.on_skip {
                    on_skip(&error.path, &error);
                }
                run.stats.errors.push(error);
            }
            return;
        }

        run.stats.files_scanned += 1;
        for dependency in follow {
            if run.visited.insert(dependency.clone()) {
                run.queue.push_back(Work::File {
                    path: dependency,
                    origin: Origin::Dependency,
                });
            }
        }
    }

    /// Read one file, joining a read of the same path already in progress.
    fn scan_file(&self, path: PathBuf) -> SharedScan {
        let mut pending = self
            .inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(shared) = pending.get(&path) {
            trace!(path = %path.display(), "Joining scan in progress");
            return shared.clone();
        }

        let inner = Arc::clone(&self.inner);
        let key = path.clone();
        let shared = async move {
            let outcome = inner.read_file(&path).await;
            inner
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&path);
            outcome
        }
        .boxed()
        .shared();

        pending.insert(key, shared.clone());
        shared
    }
}

impl ScannerInner {
    async fn read_file(&self, path: &Path) -> FileOutcome {
        let _in_flight = self.storage.begin_scan(path).await;

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => return FileOutcome::Skipped(ScanError::from_io(path.to_path_buf(), &e)),
        };
        let Ok(content) = String::from_utf8(bytes) else {
            return FileOutcome::Skipped(ScanError::encoding(path.to_path_buf()));
        };

        let mut dependencies = BTreeSet::new();
        for reference in self.rules.extract(&content) {
            let resolved = self.resolve(path, &reference);
            dependencies.insert(self.locate(resolved).await);
        }

        let entry = match self
            .storage
            .put(&Entry::new(path, dependencies))
            .await
        {
            Ok(entry) => entry,
            Err(e) => {
                return FileOutcome::Skipped(ScanError::new(
                    path.to_path_buf(),
                    ScanErrorKind::Io,
                    e.to_string(),
                ));
            }
        };

        debug!(
            path = %path.display(),
            dependencies = entry.dependencies.len(),
            rules = self.rules.name(),
            "Scanned file"
        );
        if let Some(on_scan) = &self.on_scan {
            on_scan(path);
        }

        FileOutcome::Scanned(entry)
    }

    /// Dependencies of `entry` that should be scanned next.
    ///
    /// Checked inside the worker future so the drain loop never waits on the
    /// graph lock while other workers are parked.
    async fn follow_ups(&self, entry: &Entry) -> Vec<PathBuf> {
        let mut follow = Vec::new();
        for dependency in &entry.dependencies {
            if self.admissible(dependency) && self.storage.needs_scan(dependency).await {
                follow.push(dependency.clone());
            }
        }
        follow
    }

    /// Turn a raw reference into an absolute, normalized path.
    ///
    /// `/x` is relative to the base directory, anything else to the directory
    /// of the including file. A reference without an extension takes the
    /// including file's extension when the rules ask for it.
    fn resolve(&self, file: &Path, reference: &str) -> PathBuf {
        let joined = match reference.strip_prefix('/') {
            Some(from_base) => self.base_dir.join(from_base),
            None => file.parent().unwrap_or(&self.root).join(reference),
        };

        let mut resolved = normalize(&joined);
        if self.rules.infer_extension() && resolved.extension().is_none() {
            if let Some(extension) = file.extension() {
                resolved.set_extension(extension);
            }
        }
        resolved
    }

    /// Pick the first of the rules' candidate files that exists, falling
    /// back to `resolved` so a missing file stays a dangling edge.
    async fn locate(&self, resolved: PathBuf) -> PathBuf {
        let candidates = self.rules.candidates(&resolved);
        if candidates.len() < 2 {
            return resolved;
        }

        for candidate in candidates {
            if tokio::fs::metadata(&candidate)
                .await
                .is_ok_and(|metadata| metadata.is_file())
            {
                trace!(reference = %resolved.display(), found = %candidate.display(), "Located");
                return candidate;
            }
        }
        resolved
    }

    fn absolute(&self, target: &Path) -> PathBuf {
        if target.is_absolute() {
            normalize(target)
        } else {
            normalize(&self.root.join(target))
        }
    }

    /// Nesting of `dir` below the root (the root itself is 0).
    fn dir_depth(&self, dir: &Path) -> Option<usize> {
        dir.strip_prefix(&self.root)
            .ok()
            .map(|relative| relative.components().count())
    }

    /// Whether a discovered dependency may be followed.
    fn admissible(&self, path: &Path) -> bool {
        if self.excludes.is_excluded(path) || !self.rules.handles(path) {
            return false;
        }
        match path.parent().and_then(|dir| self.dir_depth(dir)) {
            Some(depth) => depth <= self.max_depth,
            None => true,
        }
    }
}

#[derive(Default)]
struct Run {
    queue: VecDeque<Work>,
    visited: HashSet<PathBuf>,
    stats: ScanStats,
}

async fn list_dir(dir: &Path) -> std::io::Result<Vec<Child>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut children = Vec::new();

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(
                    directory = %dir.display(),
                    error = %e,
                    "Failed to read directory entry, skipping"
                );
                continue;
            }
        };

        let path = entry.path();
        let file_type = match entry.file_type().await {
            Ok(file_type) => file_type,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot stat entry, skipping");
                continue;
            }
        };

        let is_dir = if file_type.is_symlink() {
            match tokio::fs::metadata(&path).await {
                Ok(metadata) => metadata.is_dir(),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Broken symlink, skipping");
                    continue;
                }
            }
        } else {
            file_type.is_dir()
        };

        children.push(Child { path, is_dir });
    }

    children.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages::FnRules;

    fn scanner(root: &Path, max_depth: usize) -> Scanner {
        let rules = FnRules::new("lines", &["tpl"], |content| {
            content
                .lines()
                .filter_map(|line| line.strip_prefix("include "))
                .map(str::to_string)
                .collect()
        });
        Scanner::new(
            Storage::new(),
            Arc::new(rules),
            ScannerConfig {
                root: root.to_path_buf(),
                base_dir: None,
                max_depth,
                excludes: ExcludeSet::defaults().unwrap().with_root(root),
                concurrency: 4,
                on_scan: None,
                on_skip: None,
            },
        )
    }

    #[test]
    fn resolve_relative_to_including_file() {
        let scanner = scanner(Path::new("/proj"), 30);

        let resolved = scanner
            .inner
            .resolve(Path::new("/proj/views/page.tpl"), "../partials/nav");

        assert_eq!(resolved, PathBuf::from("/proj/partials/nav.tpl"));
    }

    #[test]
    fn resolve_leading_slash_against_base_dir() {
        let scanner = scanner(Path::new("/proj"), 30);

        let resolved = scanner
            .inner
            .resolve(Path::new("/proj/views/deep/page.tpl"), "/layout.tpl");

        assert_eq!(resolved, PathBuf::from("/proj/layout.tpl"));
    }

    #[test]
    fn resolve_keeps_explicit_extension() {
        let scanner = scanner(Path::new("/proj"), 30);

        let resolved = scanner
            .inner
            .resolve(Path::new("/proj/page.tpl"), "notes.md");

        assert_eq!(resolved, PathBuf::from("/proj/notes.md"));
    }

    #[test]
    fn admissible_respects_depth_and_excludes() {
        let scanner = scanner(Path::new("/proj"), 1);

        assert!(scanner.inner.admissible(Path::new("/proj/a.tpl")));
        assert!(scanner.inner.admissible(Path::new("/proj/x/a.tpl")));
        assert!(!scanner.inner.admissible(Path::new("/proj/x/y/a.tpl")));
        assert!(!scanner.inner.admissible(Path::new("/proj/node_modules/a.tpl")));
        assert!(!scanner.inner.admissible(Path::new("/proj/a.less")));
        assert!(scanner.inner.admissible(Path::new("/elsewhere/deep/er/a.tpl")));
    }

    #[tokio::test]
    async fn missing_dependency_is_left_dangling_without_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.tpl"), "include gone\n").unwrap();
        let scanner = scanner(dir.path(), 30);

        let stats = scanner.scan(None, None).await;

        assert_eq!(stats.files_scanned, 1);
        assert!(stats.errors.is_empty(), "errors: {:?}", stats.errors);
        let entry = scanner
            .inner
            .storage
            .get(&dir.path().join("a.tpl"))
            .await
            .unwrap();
        assert!(entry.dependencies.contains(&dir.path().join("gone.tpl")));
    }

    #[tokio::test]
    async fn pending_map_is_empty_after_scan() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.tpl"), "").unwrap();
        let scanner = scanner(dir.path(), 30);

        scanner.scan(Some(&dir.path().join("a.tpl")), None).await;

        assert!(scanner.inner.pending.lock().unwrap().is_empty());
    }
}
