//! Pattern registry
//!
//! Detection rules are data, not code: a versioned YAML document declares which file names,
//! content patterns and manifest dependencies point at which technology. The registry validates
//! that document once, compiles every glob and regex, and is then shared read-only between the
//! scanner workers.
//!
//! # Example
//!
//! ```no_run
//! use stackprobe::registry::{Category, LoadOptions, RegistrySource, RuleSet};
//!
//! # fn main() -> Result<(), stackprobe::ConfigError> {
//! let rules = RuleSet::load(&RegistrySource::Builtin, &LoadOptions::default())?;
//! for rule in rules.rules_for_category(Category::Container) {
//!     println!("{} <- {}", rule.candidate, rule.match_target);
//! }
//! # Ok(())
//! # }
//! ```

mod loader;

use globset::GlobSet;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

pub use loader::BUILTIN_RULES;

/// Technology category a rule votes for
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Language,
    Framework,
    Database,
    BuildSystem,
    Container,
    Testing,
    Platform,
}

impl Category {
    pub fn all() -> &'static [Category] {
        &[
            Category::Language,
            Category::Framework,
            Category::Database,
            Category::BuildSystem,
            Category::Container,
            Category::Testing,
            Category::Platform,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Category::Language => "language",
            Category::Framework => "framework",
            Category::Database => "database",
            Category::BuildSystem => "build-system",
            Category::Container => "container",
            Category::Testing => "testing",
            Category::Platform => "platform",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "language" => Some(Category::Language),
            "framework" => Some(Category::Framework),
            "database" => Some(Category::Database),
            "build-system" | "build_system" => Some(Category::BuildSystem),
            "container" => Some(Category::Container),
            "testing" => Some(Category::Testing),
            "platform" => Some(Category::Platform),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How authoritative a rule's signal is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Primary,
    Secondary,
    Tertiary,
    Negative,
}

impl Tier {
    pub fn weight(self) -> f64 {
        match self {
            Tier::Primary => 1.0,
            Tier::Secondary => 0.7,
            Tier::Tertiary => 0.4,
            Tier::Negative => -0.3,
        }
    }

    /// Scales a boost by the tier weight.
    ///
    /// Negative-tier boosts are already negative, so the magnitude of the weight is used; the
    /// product keeps the sign of the boost.
    pub fn contribution(self, boost: f64) -> f64 {
        boost * self.weight().abs()
    }

    /// Inclusive-exclusive bounds a boost must respect for this tier
    pub fn accepts_boost(self, boost: f64) -> bool {
        match self {
            Tier::Negative => (-1.0..0.0).contains(&boost),
            _ => (0.0..=1.0).contains(&boost),
        }
    }
}

/// One sub-rule of a manifest rule: fires when any listed dependency is declared
#[derive(Debug, Clone, PartialEq)]
pub struct FrameworkIndicator {
    pub dependencies: Vec<String>,
    pub boost: f64,
}

/// Rule body, discriminated by what the rule inspects
#[derive(Debug, Clone)]
pub enum RuleKind {
    /// Name or path match alone is the evidence
    Existence,
    /// Sampled content must match at least one pattern
    Content { patterns: Vec<Regex> },
    /// Structured manifest with optional field gates and dependency indicators
    Manifest {
        required_fields: Vec<Vec<String>>,
        indicators: Vec<FrameworkIndicator>,
    },
}

#[derive(Debug, Clone)]
pub struct DetectionRule {
    pub id: String,
    pub category: Category,
    pub candidate: String,
    /// File-name glob, or a root-relative path glob when it contains `/`
    pub match_target: String,
    pub tier: Tier,
    pub boost: f64,
    pub kind: RuleKind,
}

impl DetectionRule {
    pub fn needs_content(&self) -> bool {
        !matches!(self.kind, RuleKind::Existence)
    }

    pub fn matches_path(&self) -> bool {
        self.match_target.contains('/')
    }

    pub fn contribution(&self) -> f64 {
        self.tier.contribution(self.boost)
    }
}

/// Candidates that should not legitimately coexist inside one category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusiveGroup {
    pub category: Category,
    pub candidates: Vec<String>,
}

impl ExclusiveGroup {
    pub fn contains(&self, category: Category, candidate: &str) -> bool {
        self.category == category && self.candidates.iter().any(|c| c == candidate)
    }
}

/// Structured lookup of a version or config value
#[derive(Debug, Clone)]
pub struct FieldLookup {
    pub file: String,
    pub field: Vec<String>,
}

/// Textual lookup; capture group 1 (or the whole match) is the value
#[derive(Debug, Clone)]
pub struct PatternLookup {
    pub file: String,
    pub pattern: Regex,
}

#[derive(Debug, Clone)]
pub struct VersionSpec {
    pub fields: Vec<FieldLookup>,
    pub patterns: Vec<PatternLookup>,
    pub fallback: Option<String>,
}

/// Where the registry document comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrySource {
    /// Rule set compiled into the binary
    Builtin,
    Path(PathBuf),
    Inline(String),
}

impl Default for RegistrySource {
    fn default() -> Self {
        RegistrySource::Builtin
    }
}

impl fmt::Display for RegistrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrySource::Builtin => write!(f, "builtin"),
            RegistrySource::Path(path) => write!(f, "{}", path.display()),
            RegistrySource::Inline(_) => write!(f, "inline"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    pub case_sensitive: bool,
}

/// Validated, compiled, read-only rule set
#[derive(Debug)]
pub struct RuleSet {
    format_version: u32,
    case_sensitive: bool,
    rules: Vec<DetectionRule>,
    name_index: GlobSet,
    name_targets: Vec<usize>,
    path_index: GlobSet,
    path_targets: Vec<usize>,
    exclusive_groups: Vec<ExclusiveGroup>,
    versions: BTreeMap<String, VersionSpec>,
    confidence_base: BTreeMap<Category, f64>,
    dropped: usize,
}

impl RuleSet {
    pub fn load(source: &RegistrySource, options: &LoadOptions) -> Result<Self, crate::ConfigError> {
        loader::load(source, options)
    }

    pub fn builtin() -> Result<Self, crate::ConfigError> {
        Self::load(&RegistrySource::Builtin, &LoadOptions::default())
    }

    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub fn rules(&self) -> &[DetectionRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Number of rules rejected during validation
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn rules_for_category(&self, category: Category) -> Vec<&DetectionRule> {
        self.rules.iter().filter(|r| r.category == category).collect()
    }

    /// Cheap narrowing step: rules whose target matches the file name or relative path,
    /// in registry order.
    pub fn candidate_rules(&self, file_name: &str, relative_path: &str) -> Vec<&DetectionRule> {
        let mut indices: Vec<usize> = self
            .name_index
            .matches(file_name)
            .into_iter()
            .map(|i| self.name_targets[i])
            .chain(
                self.path_index
                    .matches(relative_path)
                    .into_iter()
                    .map(|i| self.path_targets[i]),
            )
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices.into_iter().map(|i| &self.rules[i]).collect()
    }

    pub fn exclusive_groups(&self) -> &[ExclusiveGroup] {
        &self.exclusive_groups
    }

    pub fn version_spec(&self, candidate: &str) -> Option<&VersionSpec> {
        self.versions.get(candidate)
    }

    /// Advisory per-category base confidence; never used in scoring
    pub fn confidence_base(&self, category: Category) -> Option<f64> {
        self.confidence_base.get(&category).copied()
    }
}
