//! Dependency extraction rules.
//!
//! Each language implements the [`PathRules`] trait, which defines which files
//! the language handles and how referenced paths are pulled out of a file's
//! content. Extraction returns raw references exactly as written; resolving
//! them against the including file is the scanner's job.
//!
//! ## Adding a New Preset
//!
//! 1. Add the variant to [`Preset`]
//! 2. Register its extensions and name in `Preset::extensions()` / `Preset::name()`
//! 3. Add its patterns in `presets.rs`

mod presets;

pub use presets::RegexRules;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Rules for extracting referenced paths from one kind of file.
pub trait PathRules: Send + Sync {
    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    /// Returns `true` if files at `path` should be scanned with these rules.
    fn handles(&self, path: &Path) -> bool;

    /// Extract raw references from file content.
    fn extract(&self, content: &str) -> Vec<String>;

    /// Whether a reference without an extension inherits the including file's
    /// extension (`include header` in `page.jade` means `header.jade`).
    fn infer_extension(&self) -> bool {
        true
    }

    /// Files a resolved reference may stand for, most specific first.
    ///
    /// The scanner keeps the first candidate that exists on disk, or
    /// `resolved` itself when none does.
    fn candidates(&self, resolved: &Path) -> Vec<PathBuf> {
        vec![resolved.to_path_buf()]
    }
}

/// Built-in rule sets, selected by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    /// Jade templates (`include`, `extends`)
    Jade,
    /// Pug templates (`include`, `extends`)
    Pug,
    /// Less stylesheets (`@import`)
    Less,
    /// Sass and SCSS stylesheets (`@import`, `@use`, `@forward`)
    Sass,
    /// Stylus stylesheets (`@import`, `@require`)
    Stylus,
    /// Jinja-style templates: Nunjucks, Twig, Jinja (`{% include %}` and friends)
    Template,
}

impl Preset {
    /// Every preset, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Jade,
        Self::Pug,
        Self::Less,
        Self::Sass,
        Self::Stylus,
        Self::Template,
    ];

    /// Look up a preset by name (case-insensitive, a few aliases accepted).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "jade" => Some(Self::Jade),
            "pug" => Some(Self::Pug),
            "less" => Some(Self::Less),
            "sass" | "scss" => Some(Self::Sass),
            "stylus" | "styl" => Some(Self::Stylus),
            "template" | "tpl" | "nunjucks" | "njk" | "twig" | "jinja" => Some(Self::Template),
            _ => None,
        }
    }

    /// Canonical name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Jade => "jade",
            Self::Pug => "pug",
            Self::Less => "less",
            Self::Sass => "sass",
            Self::Stylus => "stylus",
            Self::Template => "template",
        }
    }

    /// File extensions handled by this preset.
    #[must_use]
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Jade => &["jade"],
            Self::Pug => &["pug"],
            Self::Less => &["less"],
            Self::Sass => &["scss", "sass"],
            Self::Stylus => &["styl"],
            Self::Template => &["tpl", "njk", "twig", "jinja", "j2"],
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which rules a [`Scanner`](crate::Scanner) applies.
///
/// Either a named [`Preset`] or caller-supplied [`PathRules`].
#[derive(Clone)]
pub enum Language {
    /// A built-in rule set
    Preset(Preset),
    /// Caller-supplied rules
    Custom(Arc<dyn PathRules>),
}

impl Language {
    /// Resolve a preset by name.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` for an empty or unknown name.
    pub fn preset(name: &str) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "language must be a non-empty name".to_string(),
            ));
        }

        Preset::from_name(name).map(Self::Preset).ok_or_else(|| {
            let known: Vec<&str> = Preset::ALL.iter().map(Preset::name).collect();
            Error::InvalidArgument(format!(
                "unknown language preset '{name}' (known: {})",
                known.join(", ")
            ))
        })
    }

    /// Wrap caller-supplied rules.
    pub fn custom(rules: impl PathRules + 'static) -> Self {
        Self::Custom(Arc::new(rules))
    }

    /// Build the rules this language stands for.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if custom rules have an empty name,
    /// or `Error::Config` if a preset pattern fails to compile.
    pub(crate) fn into_rules(self) -> Result<Arc<dyn PathRules>> {
        match self {
            Self::Preset(preset) => Ok(Arc::new(RegexRules::for_preset(preset)?)),
            Self::Custom(rules) => {
                if rules.name().trim().is_empty() {
                    return Err(Error::InvalidArgument(
                        "custom language rules must have a name".to_string(),
                    ));
                }
                Ok(rules)
            }
        }
    }
}

impl fmt::Debug for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preset(preset) => f.debug_tuple("Preset").field(preset).finish(),
            Self::Custom(rules) => f.debug_tuple("Custom").field(&rules.name()).finish(),
        }
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::preset(s)
    }
}

impl From<Preset> for Language {
    fn from(preset: Preset) -> Self {
        Self::Preset(preset)
    }
}

/// Custom rules built from a closure.
///
/// ```
/// use lineage::languages::{FnRules, Language};
///
/// let rules = FnRules::new("markdown", &["md"], |content| {
///     content
///         .lines()
///         .filter_map(|line| line.strip_prefix("!include "))
///         .map(str::to_string)
///         .collect()
/// });
/// let language = Language::custom(rules);
/// ```
pub struct FnRules<F> {
    name: String,
    extensions: Vec<String>,
    infer_extension: bool,
    extract: F,
}

impl<F> FnRules<F>
where
    F: Fn(&str) -> Vec<String> + Send + Sync,
{
    /// Create rules handling `extensions` (all files if empty).
    pub fn new(name: impl Into<String>, extensions: &[&str], extract: F) -> Self {
        Self {
            name: name.into(),
            extensions: extensions.iter().map(|e| e.to_lowercase()).collect(),
            infer_extension: true,
            extract,
        }
    }

    /// Keep references without an extension as written.
    #[must_use]
    pub fn without_extension_inference(mut self) -> Self {
        self.infer_extension = false;
        self
    }
}

impl<F> PathRules for FnRules<F>
where
    F: Fn(&str) -> Vec<String> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn handles(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        has_extension(path, &self.extensions)
    }

    fn extract(&self, content: &str) -> Vec<String> {
        (self.extract)(content)
    }

    fn infer_extension(&self) -> bool {
        self.infer_extension
    }
}

pub(crate) fn has_extension<S: AsRef<str>>(path: &Path, extensions: &[S]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            extensions
                .iter()
                .any(|known| known.as_ref().eq_ignore_ascii_case(ext))
        })
}
