//! `lineage deps`, `dependents`, `affected` and `impact` implementations.

use std::path::Path;

use colored::{ColoredString, Colorize};

use super::display::{print_paths, relative};
use super::{Context, open};

/// Run the deps command.
pub async fn deps(context: &Context, file: &Path) -> anyhow::Result<()> {
    let (lineage, _) = open(context).await?;
    let target = lineage.scanner().absolute(file);

    let dependencies = lineage.resolver().dependencies_of(&target).await;

    println!("{} includes:", display_name(lineage.root(), &target));
    print_paths(lineage.root(), dependencies.iter(), "(nothing, or not tracked)");
    Ok(())
}

/// Run the dependents command.
pub async fn dependents(context: &Context, file: &Path) -> anyhow::Result<()> {
    let (lineage, _) = open(context).await?;
    let target = lineage.scanner().absolute(file);

    let dependents = lineage.resolver().dependents_of(&target).await;

    println!("{} is included by:", display_name(lineage.root(), &target));
    print_paths(lineage.root(), dependents.iter(), "(nothing)");
    Ok(())
}

/// Run the affected command.
pub async fn affected(context: &Context, file: &Path) -> anyhow::Result<()> {
    let (lineage, _) = open(context).await?;
    let target = lineage.scanner().absolute(file);

    let roots = lineage.resolver().roots_affected_by(&target).await;

    println!(
        "Rebuild for a change to {} ({} roots):",
        display_name(lineage.root(), &target),
        roots.len().to_string().green()
    );
    print_paths(lineage.root(), roots.iter(), "(not tracked)");
    Ok(())
}

/// Run the impact command.
pub async fn impact(context: &Context, file: &Path) -> anyhow::Result<()> {
    let (lineage, _) = open(context).await?;
    let target = lineage.scanner().absolute(file);

    let impact = lineage.resolver().impact(&target).await;

    println!(
        "Impact analysis for {}:",
        display_name(lineage.root(), &target)
    );
    println!();

    println!(
        "  {} ({} files):",
        "Direct dependents".white().bold(),
        impact.direct_dependents.len().to_string().green()
    );
    print_paths(lineage.root(), impact.direct_dependents.iter(), "(none)");

    println!();

    println!(
        "  {} ({} files total):",
        "Transitive dependents".white().bold(),
        impact.transitive_dependents.len().to_string().yellow()
    );
    print_paths(
        lineage.root(),
        impact.transitive_dependents.iter(),
        "(none beyond direct)",
    );
    Ok(())
}

fn display_name(root: &Path, target: &Path) -> ColoredString {
    relative(root, target).display().to_string().cyan().bold()
}
