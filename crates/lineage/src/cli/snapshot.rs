//! `lineage snapshot` command implementation.

use anyhow::Context as _;

use super::{Context, open};

/// Run the snapshot command.
pub async fn run(context: &Context) -> anyhow::Result<()> {
    let (lineage, _) = open(context).await?;

    let snapshot = lineage.storage().await;
    let json = serde_json::to_string_pretty(&snapshot).context("failed to serialize snapshot")?;
    println!("{json}");
    Ok(())
}
