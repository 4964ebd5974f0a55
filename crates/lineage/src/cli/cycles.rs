//! `lineage cycles` command implementation.

use colored::Colorize;

use super::display::relative;
use super::{Context, open};

/// Run the cycles command.
pub async fn run(context: &Context) -> anyhow::Result<()> {
    let (lineage, _) = open(context).await?;

    let cycles = lineage.resolver().detect_cycles().await;

    if cycles.is_empty() {
        println!("{}", "No circular includes detected.".green());
        return Ok(());
    }

    println!(
        "Found {} circular includes:",
        cycles.len().to_string().red().bold()
    );
    println!();

    for (i, cycle) in cycles.iter().enumerate() {
        println!("  {} {}:", "Cycle".yellow().bold(), i + 1);

        let mut files: Vec<String> = cycle
            .files
            .iter()
            .map(|p| relative(lineage.root(), p).display().to_string())
            .collect();

        // Repeat the first file to show the cycle closes
        if let Some(first) = files.first().cloned() {
            files.push(first);
        }

        println!("    {}", files.join(" → ").dimmed());
    }

    Ok(())
}
