//! Regex-driven rules for the built-in presets.

use regex::Regex;
use std::path::{Path, PathBuf};

use super::{PathRules, Preset, has_extension};
use crate::error::{Error, Result};

/// Rules backed by a list of regular expressions.
///
/// Capture group 1 of every match is a reference. When the capture holds
/// quoted strings (`"a", "b"`), each quoted string is one reference;
/// otherwise the trimmed capture is.
#[derive(Debug, Clone)]
pub struct RegexRules {
    name: String,
    extensions: Vec<String>,
    patterns: Vec<Regex>,
    quoted: Regex,
    partials: bool,
}

impl RegexRules {
    /// Build rules from patterns.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a pattern is not a valid regex or has no
    /// capture group.
    pub fn new(name: impl Into<String>, extensions: &[&str], patterns: &[&str]) -> Result<Self> {
        let name = name.into();
        let compiled = patterns
            .iter()
            .map(|p| {
                let regex = Regex::new(p)
                    .map_err(|e| Error::Config(format!("{name}: invalid pattern {p:?}: {e}")))?;
                if regex.captures_len() < 2 {
                    return Err(Error::Config(format!(
                        "{name}: pattern {p:?} has no capture group"
                    )));
                }
                Ok(regex)
            })
            .collect::<Result<Vec<_>>>()?;

        let quoted = Regex::new(r#""([^"]+)"|'([^']+)'"#)
            .map_err(|e| Error::Config(format!("{name}: {e}")))?;

        Ok(Self {
            name,
            extensions: extensions.iter().map(|e| e.to_lowercase()).collect(),
            patterns: compiled,
            quoted,
            partials: false,
        })
    }

    /// Rules for a built-in preset.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a built-in pattern fails to compile.
    pub fn for_preset(preset: Preset) -> Result<Self> {
        let rules = Self::new(preset.name(), preset.extensions(), preset_patterns(preset))?;
        Ok(match preset {
            Preset::Sass => rules.with_partials(),
            _ => rules,
        })
    }

    /// Also resolve `name` to the Sass partial `_name` and to the index files
    /// `name/_index` and `name/index`.
    #[must_use]
    pub fn with_partials(mut self) -> Self {
        self.partials = true;
        self
    }

    fn push_references(&self, capture: &str, out: &mut Vec<String>) {
        let mut found_quoted = false;
        for caps in self.quoted.captures_iter(capture) {
            if let Some(m) = caps.get(1).or_else(|| caps.get(2)) {
                found_quoted = true;
                push_if_local(m.as_str(), out);
            }
        }

        if !found_quoted {
            push_if_local(capture.trim().trim_end_matches(';'), out);
        }
    }
}

impl PathRules for RegexRules {
    fn name(&self) -> &str {
        &self.name
    }

    fn handles(&self, path: &Path) -> bool {
        has_extension(path, &self.extensions)
    }

    fn extract(&self, content: &str) -> Vec<String> {
        let mut references = Vec::new();
        for pattern in &self.patterns {
            for caps in pattern.captures_iter(content) {
                if let Some(m) = caps.get(1) {
                    self.push_references(m.as_str(), &mut references);
                }
            }
        }
        references
    }

    fn candidates(&self, resolved: &Path) -> Vec<PathBuf> {
        if self.partials {
            partial_candidates(resolved)
        } else {
            vec![resolved.to_path_buf()]
        }
    }
}

fn partial_candidates(resolved: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![resolved.to_path_buf()];
    let (Some(parent), Some(stem)) = (resolved.parent(), resolved.file_stem()) else {
        return candidates;
    };
    let stem = stem.to_string_lossy();
    let with_ext = |name: &str| match resolved.extension() {
        Some(ext) => format!("{name}.{}", ext.to_string_lossy()),
        None => name.to_string(),
    };

    if !stem.starts_with('_') {
        candidates.push(parent.join(with_ext(&format!("_{stem}"))));
    }
    let dir = parent.join(&*stem);
    candidates.push(dir.join(with_ext("_index")));
    candidates.push(dir.join(with_ext("index")));
    candidates
}

/// Skip references that can never be files on disk.
fn push_if_local(reference: &str, out: &mut Vec<String>) {
    let reference = reference.trim();
    if reference.is_empty()
        || reference.contains("://")
        || reference.starts_with("//")
        || reference.starts_with("url(")
        || reference.starts_with("sass:")
    {
        return;
    }
    out.push(reference.to_string());
}

fn preset_patterns(preset: Preset) -> &'static [&'static str] {
    match preset {
        Preset::Jade | Preset::Pug => &[r"(?m)^[ \t]*(?:include|extends)(?::[\w-]+)?[ \t]+(\S+)[ \t]*$"],
        Preset::Less => &[
            r#"@import\s*(?:\([\w\s,]*\)\s*)?((?:"[^"]+"|'[^']+')(?:\s*,\s*(?:"[^"]+"|'[^']+'))*)"#,
        ],
        Preset::Sass => &[
            r#"@(?:import|use|forward)\s+((?:"[^"]+"|'[^']+')(?:\s*,\s*(?:"[^"]+"|'[^']+'))*)"#,
            r"(?m)^[ \t]*@import[ \t]+([^\s'\x22;,]+)[ \t]*$",
        ],
        Preset::Stylus => &[r"(?m)^[ \t]*@(?:import|require)[ \t]+([^\n;]+)"],
        Preset::Template => &[
            r#"\{%-?\s*(?:include|extends|import|from|embed)\s+((?:"[^"]+"|'[^']+')(?:\s*,\s*(?:"[^"]+"|'[^']+'))*)"#,
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn extract(preset: Preset, content: &str) -> Vec<String> {
        RegexRules::for_preset(preset).unwrap().extract(content)
    }

    #[test]
    fn every_preset_compiles() {
        for preset in Preset::ALL {
            assert!(
                RegexRules::for_preset(preset).is_ok(),
                "{preset} patterns should compile"
            );
        }
    }

    #[test]
    fn jade_extracts_include_and_extends() {
        let refs = extract(
            Preset::Jade,
            "extends layout\nblock content\n  include partials/header\n  include:markdown notes.md\n",
        );

        assert_eq!(refs, vec!["layout", "partials/header", "notes.md"]);
    }

    #[test]
    fn less_extracts_imports_with_options_and_lists() {
        let refs = extract(
            Preset::Less,
            "@import (reference) \"mixins\";\n@import 'a', 'b';\n@import url(\"http://cdn/x.css\");\n",
        );

        assert_eq!(refs, vec!["mixins", "a", "b"]);
    }

    #[test]
    fn sass_skips_builtin_modules_and_remote_urls() {
        let refs = extract(
            Preset::Sass,
            "@use 'sass:math';\n@use \"theme\";\n@import \"http://fonts/x.css\";\n@forward 'tokens';\n",
        );

        assert_eq!(refs, vec!["theme", "tokens"]);
    }

    #[test]
    fn sass_indented_syntax_imports_unquoted() {
        let refs = extract(Preset::Sass, "@import variables\n.a\n  color: red\n");

        assert_eq!(refs, vec!["variables"]);
    }

    #[rstest]
    #[case("@import 'vars'", "vars")]
    #[case("@require mixins/grid", "mixins/grid")]
    #[case("@import \"base\";", "base")]
    fn stylus_extracts_import_and_require(#[case] content: &str, #[case] expected: &str) {
        assert_eq!(extract(Preset::Stylus, content), vec![expected]);
    }

    #[test]
    fn template_extracts_tag_references() {
        let refs = extract(
            Preset::Template,
            "{% extends \"base.tpl\" %}\n{%- include 'nav.tpl' -%}\n{% from \"macros.tpl\" import button %}\n{{ include_me }}\n",
        );

        assert_eq!(refs, vec!["base.tpl", "nav.tpl", "macros.tpl"]);
    }

    #[test]
    fn template_preset_handles_its_extensions() {
        let rules = RegexRules::for_preset(Preset::Template).unwrap();

        assert!(rules.handles(Path::new("/proj/a.tpl")));
        assert!(rules.handles(Path::new("/proj/a.njk")));
        assert!(!rules.handles(Path::new("/proj/a.less")));
    }

    #[test]
    fn sass_candidates_cover_partials_and_index_files() {
        let rules = RegexRules::for_preset(Preset::Sass).unwrap();

        assert_eq!(
            rules.candidates(Path::new("/proj/styles/theme.scss")),
            vec![
                PathBuf::from("/proj/styles/theme.scss"),
                PathBuf::from("/proj/styles/_theme.scss"),
                PathBuf::from("/proj/styles/theme/_index.scss"),
                PathBuf::from("/proj/styles/theme/index.scss"),
            ]
        );
    }

    #[test]
    fn explicit_partial_is_not_doubly_prefixed() {
        let rules = RegexRules::for_preset(Preset::Sass).unwrap();

        let candidates = rules.candidates(Path::new("/proj/_vars.sass"));

        assert_eq!(candidates[0], PathBuf::from("/proj/_vars.sass"));
        assert!(!candidates.contains(&PathBuf::from("/proj/__vars.sass")));
    }

    #[test]
    fn other_presets_have_a_single_candidate() {
        let rules = RegexRules::for_preset(Preset::Less).unwrap();

        assert_eq!(
            rules.candidates(Path::new("/proj/mixins.less")),
            vec![PathBuf::from("/proj/mixins.less")]
        );
    }

    #[test]
    fn pattern_without_capture_group_is_rejected() {
        let result = RegexRules::new("broken", &["x"], &[r"include \S+"]);

        assert!(matches!(result, Err(Error::Config(_))));
    }
}
