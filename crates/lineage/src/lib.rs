//! # Lineage: Incremental Include Graphs for Template Trees
//!
//! Lineage keeps a dependency graph of a directory of templates or
//! stylesheets (files that `include`, `extends` or `@import` one another) so
//! that a build or watch tool can answer, on every change, exactly which root
//! files need recompiling without rescanning the tree.
//!
//! ## Design Philosophy
//!
//! - **Incremental** - Rescans diff a file's edges in place; nothing is rebuilt from scratch
//! - **Paths, not content** - Only which file references which is tracked
//! - **Caller-driven** - No file watching; the caller says what changed
//! - **Embeddable** - Library first, CLI second
//!
//! ## Quick Start
//!
//! ```no_run
//! use lineage::{Language, Lineage, Options};
//! use std::path::Path;
//!
//! # async fn run() -> lineage::Result<()> {
//! let lineage = Lineage::new("/path/to/views", Language::preset("jade")?, Options::default())?;
//!
//! // Build the graph
//! let stats = lineage.scan(None, None).await;
//! println!("Scanned {} files", stats.files_scanned);
//!
//! // A partial changed: rescan it and find what to rebuild
//! let changed = Path::new("/path/to/views/partials/header.jade");
//! lineage.scan(Some(changed), None).await;
//! for root in lineage.resolver().roots_affected_by(changed).await {
//!     println!("rebuild {}", root.display());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
mod error;
pub mod languages;
pub mod paths;
mod resolver;
mod scanner;
mod storage;
mod stream;
mod types;

pub use config::{FileConfig, Options};
pub use error::{Error, Result, ScanError, ScanErrorKind};
pub use languages::{Language, PathRules, Preset};
pub use resolver::Resolver;
pub use scanner::{OnScan, OnSkip, Scanner};
pub use storage::{InFlightGuard, Storage};
pub use stream::ScanStream;
pub use types::{Cycle, Entry, Impact, ScanStats, ScannedFile, Snapshot, SweepReport};

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use paths::{ExcludeSet, normalize};
use scanner::ScannerConfig;

/// Incremental dependency graph over one directory tree.
///
/// `Lineage` owns a [`Storage`] and the [`Scanner`] and [`Resolver`] built
/// on it. All three share the same graph handle.
#[derive(Debug)]
pub struct Lineage {
    root: PathBuf,
    storage: Storage,
    scanner: Scanner,
    resolver: Resolver,
}

impl Lineage {
    /// Create an instance for the tree at `root`.
    ///
    /// The root and language are checked before anything else is built. If
    /// `options` configure an invalidation interval the sweep starts right
    /// away, which requires a running Tokio runtime.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidArgument` if `root` is empty or not a directory, or
    ///   if custom language rules have no name
    /// - `Error::DirectoryNotFound` if `root` does not exist
    /// - `Error::InvalidPattern` if an exclusion pattern is not a valid glob
    /// - `Error::InvalidSnapshot` if the preloaded snapshot is malformed
    /// - `Error::Config` for invalid option values, or an interval without a
    ///   runtime
    pub fn new(root: impl AsRef<Path>, language: Language, options: Options) -> Result<Self> {
        let root = validate_root(root.as_ref())?;
        let rules = language.into_rules()?;
        options.validate()?;

        let excludes = ExcludeSet::new(&options.exclude)?.with_root(&root);
        let storage = match &options.snapshot {
            Some(snapshot) => Storage::from_snapshot(snapshot)?,
            None => Storage::new(),
        };

        let scanner = Scanner::new(
            storage.clone(),
            rules,
            ScannerConfig {
                root: root.clone(),
                base_dir: options.base_dir.clone(),
                max_depth: options.max_depth,
                excludes,
                concurrency: options.concurrency,
                on_scan: options.on_scan.clone(),
                on_skip: options.on_skip.clone(),
            },
        );
        let resolver = Resolver::new(storage.clone());

        if let Some(interval) = options.invalidation_interval()? {
            storage.start_invalidation(interval)?;
        }

        info!(root = %root.display(), ?scanner, "Initialized");
        Ok(Self {
            root,
            storage,
            scanner,
            resolver,
        })
    }

    /// The normalized root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    // === Graph ===

    /// Current graph snapshot.
    pub async fn storage(&self) -> Snapshot {
        self.storage.snapshot().await
    }

    /// The shared storage handle, for invalidation control and raw access.
    #[must_use]
    pub fn handle(&self) -> &Storage {
        &self.storage
    }

    /// Tracked paths, sorted.
    pub async fn keys(&self) -> Vec<PathBuf> {
        self.storage.keys().await
    }

    /// Replace the graph with `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidSnapshot` if any entry is malformed; the
    /// current graph is kept in that case.
    pub async fn load(&self, snapshot: &Snapshot) -> Result<()> {
        self.storage.load(snapshot).await
    }

    // === Scanning ===

    /// Scan the whole tree (`None`), a subtree, or a single file.
    ///
    /// See [`Scanner::scan`].
    pub async fn scan(&self, path: Option<&Path>, stats: Option<Metadata>) -> ScanStats {
        self.scanner.scan(path, stats).await
    }

    /// The scanner.
    #[must_use]
    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    // === Queries ===

    /// The query interface.
    #[must_use]
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Returns `true` if `path` is tracked. Relative paths are taken relative
    /// to the root.
    pub async fn filter(&self, path: impl AsRef<Path>) -> bool {
        self.storage
            .contains(&self.scanner.absolute(path.as_ref()))
            .await
    }

    /// A push stream over this instance, optionally starting with `path`.
    ///
    /// # Errors
    ///
    /// Never fails for a freshly created stream; the `Result` mirrors
    /// [`ScanStream::push`].
    pub fn stream(&self, path: Option<&Path>, stats: Option<Metadata>) -> Result<ScanStream> {
        let stream = ScanStream::new(self.scanner.clone(), self.resolver.clone());
        if let Some(path) = path {
            stream.push(path, stats)?;
        }
        debug!(initial = ?path, "Opened scan stream");
        Ok(stream)
    }
}

fn validate_root(root: &Path) -> Result<PathBuf> {
    if root.as_os_str().is_empty() {
        return Err(Error::InvalidArgument(
            "root directory must be a non-empty path".to_string(),
        ));
    }

    let metadata = match std::fs::metadata(root) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::DirectoryNotFound(root.to_path_buf()));
        }
        Err(e) => return Err(Error::Io(e)),
    };
    if !metadata.is_dir() {
        return Err(Error::InvalidArgument(format!(
            "root is not a directory: {}",
            root.display()
        )));
    }

    Ok(normalize(&std::path::absolute(root)?))
}
