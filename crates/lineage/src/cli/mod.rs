//! CLI command implementations.

mod display;

pub mod cycles;
pub mod query;
pub mod scan;
pub mod snapshot;

use std::path::PathBuf;

use anyhow::{Context as _, bail};
use lineage::{FileConfig, Language, Lineage, ScanStats, Snapshot};

/// Global arguments shared by every command.
pub struct Context {
    pub root: PathBuf,
    pub language: Option<String>,
    pub config: Option<PathBuf>,
    pub load: Option<PathBuf>,
}

/// Build a [`Lineage`] from the arguments and config file, then scan.
pub async fn open(context: &Context) -> anyhow::Result<(Lineage, ScanStats)> {
    let config = match &context.config {
        Some(path) => FileConfig::load(path)
            .await
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => FileConfig::discover(&context.root)
            .await
            .context("failed to load lineage.yaml")?
            .unwrap_or_default(),
    };

    let Some(name) = context.language.as_deref().or(config.language.as_deref()) else {
        bail!("no language given; pass --language or set `language` in lineage.yaml");
    };
    let language = Language::preset(name)?;

    let mut options = config.options;
    if let Some(path) = &context.load {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read snapshot {}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse snapshot {}", path.display()))?;
        options.snapshot = Some(snapshot);
    }

    let lineage = Lineage::new(&context.root, language, options)?;
    let stats = lineage.scan(None, None).await;
    Ok((lineage, stats))
}
