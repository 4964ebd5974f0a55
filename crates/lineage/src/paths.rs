//! Path normalization and exclusion patterns.
//!
//! Everything that becomes a graph key goes through [`normalize`] first, so
//! `a/./b/../c.tpl` and `a/c.tpl` land on the same entry. Normalization is
//! purely lexical: scanning must not depend on symlink resolution or on the
//! referenced file existing yet.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Component, Path, PathBuf};

use crate::error::Result;

/// Directories excluded when no patterns are configured.
pub const DEFAULT_EXCLUDES: &[&str] = &[".git", "node_modules", "bower_components"];

/// Lexically normalize a path: drop `.` components and fold `..` into the
/// preceding component.
///
/// A `..` at the root of an absolute path is discarded; in a relative path
/// with nothing left to pop it is kept.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last().copied() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                Some(Component::ParentDir | Component::CurDir) | None => parts.push(component),
            },
            other => parts.push(other),
        }
    }

    parts.iter().collect()
}

/// Returns `true` if `path` is usable as a graph key: non-empty, absolute,
/// and free of `.`/`..` components.
#[must_use]
pub fn is_normalized(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path.is_absolute()
        && path
            .components()
            .all(|c| !matches!(c, Component::CurDir | Component::ParentDir))
}

/// Compiled exclusion patterns.
///
/// Once anchored with [`with_root`](Self::with_root), paths under the root are
/// matched relative to it, so the root's own ancestors never count. Patterns
/// written as absolute paths are always matched against the full path.
#[derive(Debug, Clone)]
pub struct ExcludeSet {
    patterns: Vec<String>,
    relative: GlobSet,
    absolute: GlobSet,
    root: Option<PathBuf>,
}

impl ExcludeSet {
    /// Compile a list of user patterns.
    ///
    /// A bare name such as `vendor` excludes any file or directory with that
    /// name anywhere in the tree. A pattern with glob metacharacters or a
    /// separator is used as written, and also excludes everything beneath
    /// whatever it matches.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPattern` if a pattern is not a valid glob.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut relative = GlobSetBuilder::new();
        let mut absolute = GlobSetBuilder::new();
        let mut expanded = Vec::new();

        for pattern in patterns {
            for glob in expand_pattern(pattern.as_ref()) {
                let compiled = GlobBuilder::new(&glob).literal_separator(true).build()?;
                if glob.starts_with('/') {
                    absolute.add(compiled);
                } else {
                    relative.add(compiled);
                }
                expanded.push(glob);
            }
        }

        Ok(Self {
            patterns: expanded,
            relative: relative.build()?,
            absolute: absolute.build()?,
            root: None,
        })
    }

    /// Match paths under `root` relative to it.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Patterns excluding version control and package manager directories.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the defaults are valid globs.
    pub fn defaults() -> Result<Self> {
        Self::new(DEFAULT_EXCLUDES)
    }

    /// Returns `true` if `path` is excluded.
    #[must_use]
    pub fn is_excluded(&self, path: &Path) -> bool {
        let under_root = self
            .root
            .as_deref()
            .and_then(|root| path.strip_prefix(root).ok());

        self.absolute.is_match(path) || self.relative.is_match(under_root.unwrap_or(path))
    }

    /// The expanded glob patterns, in compile order.
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

fn expand_pattern(pattern: &str) -> Vec<String> {
    let trimmed = pattern.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Vec::new();
    }

    let is_glob = trimmed.contains(['*', '?', '[', '{']) || trimmed.contains('/');
    if is_glob {
        if trimmed.ends_with("/**") {
            vec![trimmed.to_string()]
        } else {
            vec![trimmed.to_string(), format!("{trimmed}/**")]
        }
    } else {
        vec![format!("**/{trimmed}"), format!("**/{trimmed}/**")]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/proj/a/./b.tpl", "/proj/a/b.tpl")]
    #[case("/proj/a/../b.tpl", "/proj/b.tpl")]
    #[case("/proj/a/b/../../c.tpl", "/proj/c.tpl")]
    #[case("/../a.tpl", "/a.tpl")]
    #[case("../a.tpl", "../a.tpl")]
    #[case("a/../../b.tpl", "../b.tpl")]
    fn normalize_folds_dot_components(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize(Path::new(input)), PathBuf::from(expected));
    }

    #[rstest]
    #[case("/proj/a.tpl", true)]
    #[case("proj/a.tpl", false)]
    #[case("/proj/../a.tpl", false)]
    #[case("/proj/./a.tpl", false)]
    #[case("", false)]
    fn is_normalized_requires_absolute_clean_paths(#[case] input: &str, #[case] expected: bool) {
        assert_eq!(is_normalized(Path::new(input)), expected);
    }

    #[test]
    fn defaults_exclude_vcs_and_package_directories() {
        let excludes = ExcludeSet::defaults().unwrap();

        assert!(excludes.is_excluded(Path::new("/proj/.git")));
        assert!(excludes.is_excluded(Path::new("/proj/.git/HEAD")));
        assert!(excludes.is_excluded(Path::new("/proj/node_modules/pkg/index.tpl")));
        assert!(excludes.is_excluded(Path::new("/proj/web/bower_components/x.less")));
        assert!(!excludes.is_excluded(Path::new("/proj/views/index.tpl")));
        assert!(!excludes.is_excluded(Path::new("/proj/my_node_modules/a.tpl")));
    }

    #[test]
    fn bare_name_expands_to_two_globs() {
        let excludes = ExcludeSet::new(&["vendor"]).unwrap();

        assert_eq!(excludes.patterns(), &["**/vendor", "**/vendor/**"]);
    }

    #[test]
    fn glob_pattern_also_excludes_children() {
        let excludes = ExcludeSet::new(&["**/build-*"]).unwrap();

        assert!(excludes.is_excluded(Path::new("/proj/build-cache")));
        assert!(excludes.is_excluded(Path::new("/proj/build-cache/a.tpl")));
        assert!(!excludes.is_excluded(Path::new("/proj/builder/a.tpl")));
    }

    #[test]
    fn root_ancestors_do_not_trigger_exclusion() {
        let excludes =
            ExcludeSet::defaults().unwrap().with_root("/home/dev/node_modules/site");

        assert!(!excludes.is_excluded(Path::new("/home/dev/node_modules/site/views/a.tpl")));
        assert!(excludes.is_excluded(Path::new(
            "/home/dev/node_modules/site/node_modules/pkg/a.tpl"
        )));
        assert!(excludes.is_excluded(Path::new("/elsewhere/node_modules/pkg/a.tpl")));
    }

    #[test]
    fn absolute_pattern_matches_full_path_under_root() {
        let excludes = ExcludeSet::new(&["/proj/dist"]).unwrap().with_root("/proj");

        assert!(excludes.is_excluded(Path::new("/proj/dist/a.tpl")));
        assert!(!excludes.is_excluded(Path::new("/proj/src/dist.tpl")));
    }

    #[test]
    fn invalid_glob_is_rejected() {
        assert!(ExcludeSet::new(&["**/[unclosed"]).is_err());
    }

    #[test]
    fn blank_patterns_are_ignored() {
        let excludes = ExcludeSet::new(&["", "  "]).unwrap();

        assert!(excludes.patterns().is_empty());
        assert!(!excludes.is_excluded(Path::new("/proj/a.tpl")));
    }
}
