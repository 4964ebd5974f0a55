//! Common display utilities for CLI commands.

use std::path::{Path, PathBuf};

use colored::Colorize;

const MAX_DISPLAY_ITEMS: usize = 10;

/// Display a list of paths relative to `root`, with truncation.
///
/// Shows up to `MAX_DISPLAY_ITEMS` paths with bullet points. If there are
/// more, shows "... and N more". If empty, shows the provided `empty_message`.
pub fn print_paths<'a>(
    root: &Path,
    paths: impl ExactSizeIterator<Item = &'a PathBuf>,
    empty_message: &str,
) {
    let total = paths.len();
    if total == 0 {
        println!("    {}", empty_message.dimmed());
        return;
    }

    for path in paths.take(MAX_DISPLAY_ITEMS) {
        println!("    {} {}", "•".dimmed(), relative(root, path).display());
    }

    if total > MAX_DISPLAY_ITEMS {
        println!(
            "    {} ... and {} more",
            "•".dimmed(),
            total - MAX_DISPLAY_ITEMS
        );
    }
}

/// `path` relative to `root` when it lies inside it.
pub fn relative<'a>(root: &Path, path: &'a Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(path)
}
