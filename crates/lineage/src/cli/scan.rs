//! `lineage scan` command implementation.

use colored::Colorize;
use lineage::ScanError;

use super::{Context, open};

/// Run the scan command.
pub async fn run(context: &Context) -> anyhow::Result<()> {
    println!("{} {}...", "Scanning".cyan().bold(), context.root.display());

    let (lineage, stats) = open(context).await?;

    // Display results
    println!();
    println!(
        "{} {} files, tracking {} entries",
        "Scanned".green().bold(),
        stats.files_scanned,
        lineage.handle().len().await
    );
    println!("{}: {:.2?}", "Duration".dimmed(), stats.duration);

    if stats.files_skipped > 0 {
        println!(
            "{}: {} files (not handled by the language)",
            "Skipped".yellow(),
            stats.files_skipped
        );
    }

    if !stats.directories_skipped.is_empty() {
        println!(
            "{}: {} directories (unreadable)",
            "Skipped".yellow(),
            stats.directories_skipped.len()
        );
    }

    let (input, environment): (Vec<&ScanError>, Vec<&ScanError>) = stats
        .errors
        .iter()
        .partition(|err| err.kind.is_input_error());
    print_errors("Unreadable files", &input);
    print_errors("Environment errors", &environment);

    Ok(())
}

fn print_errors(heading: &str, errors: &[&ScanError]) {
    if errors.is_empty() {
        return;
    }

    println!();
    println!("{} ({}):", heading.red().bold(), errors.len());
    for err in errors.iter().take(5) {
        println!("  {} {}: {} ({})", "•".red(), err.path.display(), err.message, err.kind);
    }
    if errors.len() > 5 {
        println!("  ... and {} more", errors.len() - 5);
    }
}
