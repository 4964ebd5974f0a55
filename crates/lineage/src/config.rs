//! Configuration.
//!
//! [`Options`] is what the library is built with. [`FileConfig`] is the
//! on-disk form read by the binary: the same fields plus the language name,
//! stored as YAML.
//!
//! ```yaml
//! language: less
//! max_depth: 10
//! exclude: [".git", "node_modules", "dist"]
//! invalidation_interval_secs: 30
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;

use crate::error::{Error, Result, ScanError};
use crate::paths::DEFAULT_EXCLUDES;
use crate::scanner::{OnScan, OnSkip};
use crate::types::Snapshot;

/// Name of the config file looked up in the root directory.
pub const CONFIG_FILE_NAME: &str = "lineage.yaml";

/// Default maximum directory depth.
pub const DEFAULT_MAX_DEPTH: usize = 30;

/// Default number of files and directories processed at once.
pub const DEFAULT_CONCURRENCY: usize = 16;

/// Settings for a [`Lineage`](crate::Lineage) instance. Every field is
/// optional.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Graph to preload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,

    /// Sweep interval in seconds; no sweep runs when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalidation_interval_secs: Option<f64>,

    /// Deepest directory level entered below the root
    pub max_depth: usize,

    /// Exclusion patterns, matched against full paths
    pub exclude: Vec<String>,

    /// Base for `/`-style references; the root when unset. Relative values
    /// are taken relative to the root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,

    /// Maximum number of files and directories in flight at once
    pub concurrency: usize,

    /// Called with every file that was read and parsed
    #[serde(skip)]
    pub on_scan: Option<OnScan>,

    /// Called with every file a scan skipped because it could not be read
    #[serde(skip)]
    pub on_skip: Option<OnSkip>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            snapshot: None,
            invalidation_interval_secs: None,
            max_depth: DEFAULT_MAX_DEPTH,
            exclude: DEFAULT_EXCLUDES.iter().map(ToString::to_string).collect(),
            base_dir: None,
            concurrency: DEFAULT_CONCURRENCY,
            on_scan: None,
            on_skip: None,
        }
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("snapshot", &self.snapshot.as_ref().map(Snapshot::len))
            .field("invalidation_interval_secs", &self.invalidation_interval_secs)
            .field("max_depth", &self.max_depth)
            .field("exclude", &self.exclude)
            .field("base_dir", &self.base_dir)
            .field("concurrency", &self.concurrency)
            .field("on_scan", &self.on_scan.is_some())
            .field("on_skip", &self.on_skip.is_some())
            .finish()
    }
}

impl Options {
    /// Set the per-file callback.
    #[must_use]
    pub fn on_scan(mut self, callback: impl Fn(&Path) + Send + Sync + 'static) -> Self {
        self.on_scan = Some(Arc::new(callback));
        self
    }

    /// Set the callback for files that could not be read.
    #[must_use]
    pub fn on_skip(
        mut self,
        callback: impl Fn(&Path, &ScanError) + Send + Sync + 'static,
    ) -> Self {
        self.on_skip = Some(Arc::new(callback));
        self
    }

    /// The sweep interval, if one is configured.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the interval is not a positive, finite
    /// number of seconds.
    pub fn invalidation_interval(&self) -> Result<Option<Duration>> {
        let Some(secs) = self.invalidation_interval_secs else {
            return Ok(None);
        };
        match Duration::try_from_secs_f64(secs) {
            Ok(interval) if !interval.is_zero() => Ok(Some(interval)),
            _ => Err(Error::Config(format!(
                "invalidation_interval_secs must be a positive number of seconds, got {secs}"
            ))),
        }
    }

    /// Check values that would otherwise fail later.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for a zero concurrency or a bad interval.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }
        self.invalidation_interval()?;
        Ok(())
    }
}

/// On-disk configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    /// Preset name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Everything else
    #[serde(flatten)]
    pub options: Options,
}

impl FileConfig {
    /// Load configuration from a file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file can't be read and `Error::Config` if
    /// it isn't valid YAML for this structure.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Load `lineage.yaml` from `root` if it exists.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load), except that a missing file is not an
    /// error.
    pub async fn discover(root: &Path) -> Result<Option<Self>> {
        let path = root.join(CONFIG_FILE_NAME);
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }
        Self::load(&path).await.map(Some)
    }

    /// Parse YAML content.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the content isn't valid.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.options.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let options = Options::default();

        assert_eq!(options.max_depth, 30);
        assert_eq!(options.concurrency, 16);
        assert_eq!(options.exclude, vec![".git", "node_modules", "bower_components"]);
        assert!(options.invalidation_interval().unwrap().is_none());
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = FileConfig::parse("language: less\nmax_depth: 5\n").unwrap();

        assert_eq!(config.language.as_deref(), Some("less"));
        assert_eq!(config.options.max_depth, 5);
        assert_eq!(config.options.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.options.exclude.len(), DEFAULT_EXCLUDES.len());
    }

    #[test]
    fn fractional_interval_is_accepted() {
        let config = FileConfig::parse("invalidation_interval_secs: 0.5\n").unwrap();

        assert_eq!(
            config.options.invalidation_interval().unwrap(),
            Some(Duration::from_millis(500))
        );
    }

    #[test]
    fn non_positive_interval_is_rejected() {
        assert!(matches!(
            FileConfig::parse("invalidation_interval_secs: 0\n"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            FileConfig::parse("invalidation_interval_secs: -3\n"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let result = FileConfig::parse("concurrency: 0\n");

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn malformed_yaml_is_config_error() {
        let result = FileConfig::parse("max_depth: [not, a, number]\n");

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn callbacks_are_not_read_from_yaml() {
        let config = FileConfig::parse("language: pug
on_scan: yes
").unwrap();

        assert!(config.options.on_scan.is_none());
        assert!(config.options.on_skip.is_none());
    }

    #[tokio::test]
    async fn discover_without_file_is_none() {
        let dir = tempfile::tempdir().unwrap();

        assert!(FileConfig::discover(dir.path()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn discover_reads_file_in_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "language: stylus\n").unwrap();

        let config = FileConfig::discover(dir.path()).await.unwrap().unwrap();

        assert_eq!(config.language.as_deref(), Some("stylus"));
    }
}
