//! Registry document parsing and per-rule validation

use super::{
    Category, DetectionRule, ExclusiveGroup, FieldLookup, FrameworkIndicator, LoadOptions,
    PatternLookup, RegistrySource, RuleKind, RuleSet, Tier, VersionSpec,
};
use crate::ConfigError;
use globset::{Glob, GlobBuilder, GlobSetBuilder};
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Rule set compiled into the binary
pub const BUILTIN_RULES: &str = include_str!("default_rules.yaml");

const SUPPORTED_VERSION: u32 = 1;
const REGEX_SIZE_LIMIT: usize = 1 << 20;

#[derive(Debug, Deserialize)]
struct RawRegistry {
    version: u32,
    #[serde(default)]
    confidence_base: BTreeMap<String, f64>,
    #[serde(default)]
    exclusive_groups: Vec<serde_yaml::Value>,
    rules: Vec<serde_yaml::Value>,
    #[serde(default)]
    versions: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRule {
    #[serde(default)]
    id: Option<String>,
    category: String,
    candidate: String,
    #[serde(rename = "match")]
    match_target: String,
    tier: Tier,
    boost: f64,
    #[serde(default)]
    content_patterns: Vec<String>,
    #[serde(default)]
    required_fields: Vec<String>,
    #[serde(default)]
    framework_indicators: Vec<RawIndicator>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawIndicator {
    dependencies: Vec<String>,
    boost: f64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawExclusiveGroup {
    category: String,
    candidates: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawVersionSpec {
    #[serde(default)]
    fields: Vec<RawFieldLookup>,
    #[serde(default)]
    patterns: Vec<RawPatternLookup>,
    #[serde(default)]
    fallback: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFieldLookup {
    file: String,
    field: RawFieldPath,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawFieldPath {
    Joined(String),
    Segments(Vec<String>),
}

impl RawFieldPath {
    fn into_segments(self) -> Vec<String> {
        match self {
            RawFieldPath::Joined(path) => split_field_path(&path),
            RawFieldPath::Segments(segments) => segments,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPatternLookup {
    file: String,
    pattern: String,
}

/// Why a single registry entry was rejected
#[derive(Debug, Error)]
enum RuleError {
    #[error("malformed entry: {0}")]
    Shape(#[from] serde_yaml::Error),

    #[error("unknown category '{0}'")]
    UnknownCategory(String),

    #[error("candidate name is empty")]
    EmptyCandidate,

    #[error("match target is empty")]
    EmptyTarget,

    #[error("boost {boost} out of range for {tier:?} tier")]
    BoostOutOfRange { tier: Tier, boost: f64 },

    #[error("invalid glob '{target}': {message}")]
    InvalidGlob { target: String, message: String },

    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("content_patterns cannot be combined with manifest fields")]
    MixedKinds,

    #[error("framework indicator lists no dependencies")]
    EmptyIndicator,

    #[error("duplicate rule id '{0}'")]
    DuplicateId(String),
}

pub(super) fn load(source: &RegistrySource, options: &LoadOptions) -> Result<RuleSet, ConfigError> {
    let text: Cow<'_, str> = match source {
        RegistrySource::Builtin => Cow::Borrowed(BUILTIN_RULES),
        RegistrySource::Inline(text) => Cow::Borrowed(text.as_str()),
        RegistrySource::Path(path) => {
            Cow::Owned(
                std::fs::read_to_string(path).map_err(|source| ConfigError::RegistryIo {
                    path: path.clone(),
                    source,
                })?,
            )
        }
    };

    parse(&text, &source.to_string(), options)
}

fn parse(text: &str, source_name: &str, options: &LoadOptions) -> Result<RuleSet, ConfigError> {
    let raw: RawRegistry =
        serde_yaml::from_str(text).map_err(|e| ConfigError::RegistryParse {
            source_name: source_name.to_string(),
            message: e.to_string(),
        })?;

    if raw.version != SUPPORTED_VERSION {
        return Err(ConfigError::UnsupportedVersion {
            found: raw.version,
            supported: SUPPORTED_VERSION,
        });
    }

    let mut rules = Vec::with_capacity(raw.rules.len());
    let mut seen_ids = HashSet::new();
    let mut dropped = 0;

    for (index, value) in raw.rules.into_iter().enumerate() {
        let compiled = compile_rule(index, value, options).and_then(|rule| {
            if seen_ids.insert(rule.id.clone()) {
                Ok(rule)
            } else {
                Err(RuleError::DuplicateId(rule.id))
            }
        });

        match compiled {
            Ok(rule) => rules.push(rule),
            Err(reason) => {
                dropped += 1;
                warn!(
                    source = source_name,
                    index,
                    reason = %reason,
                    "Dropping malformed detection rule"
                );
            }
        }
    }

    let exclusive_groups: Vec<ExclusiveGroup> = raw
        .exclusive_groups
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match compile_group(value) {
            Ok(group) => Some(group),
            Err(reason) => {
                warn!(source = source_name, index, reason = %reason, "Dropping exclusive group");
                None
            }
        })
        .collect();

    let mut versions = BTreeMap::new();
    for (candidate, value) in raw.versions {
        match compile_version_spec(value, options) {
            Ok(spec) => {
                versions.insert(candidate, spec);
            }
            Err(reason) => {
                warn!(source = source_name, candidate = %candidate, reason = %reason, "Dropping version spec");
            }
        }
    }

    let mut confidence_base = BTreeMap::new();
    for (name, value) in raw.confidence_base {
        match Category::from_name(&name) {
            Some(category) => {
                confidence_base.insert(category, value);
            }
            None => warn!(source = source_name, category = %name, "Ignoring confidence_base for unknown category"),
        }
    }

    let (name_index, name_targets) = build_index(&rules, options, |r| !r.matches_path())?;
    let (path_index, path_targets) = build_index(&rules, options, |r| r.matches_path())?;

    info!(
        source = source_name,
        rules = rules.len(),
        dropped,
        exclusive_groups = exclusive_groups.len(),
        "Loaded rule registry"
    );

    Ok(RuleSet {
        format_version: raw.version,
        case_sensitive: options.case_sensitive,
        rules,
        name_index,
        name_targets,
        path_index,
        path_targets,
        exclusive_groups,
        versions,
        confidence_base,
        dropped,
    })
}

fn compile_rule(
    index: usize,
    value: serde_yaml::Value,
    options: &LoadOptions,
) -> Result<DetectionRule, RuleError> {
    let raw: RawRule = serde_yaml::from_value(value)?;

    let category = Category::from_name(&raw.category)
        .ok_or_else(|| RuleError::UnknownCategory(raw.category.clone()))?;

    let candidate = raw.candidate.trim().to_string();
    if candidate.is_empty() {
        return Err(RuleError::EmptyCandidate);
    }

    let match_target = raw.match_target.trim().to_string();
    if match_target.is_empty() {
        return Err(RuleError::EmptyTarget);
    }
    compile_glob(&match_target, options)?;

    if !raw.tier.accepts_boost(raw.boost) {
        return Err(RuleError::BoostOutOfRange {
            tier: raw.tier,
            boost: raw.boost,
        });
    }

    let has_manifest_fields =
        !raw.required_fields.is_empty() || !raw.framework_indicators.is_empty();

    let kind = if !raw.content_patterns.is_empty() {
        if has_manifest_fields {
            return Err(RuleError::MixedKinds);
        }
        let patterns = raw
            .content_patterns
            .iter()
            .map(|p| compile_regex(p, options))
            .collect::<Result<Vec<_>, _>>()?;
        RuleKind::Content { patterns }
    } else if has_manifest_fields {
        let mut indicators = Vec::with_capacity(raw.framework_indicators.len());
        for indicator in raw.framework_indicators {
            if indicator.dependencies.is_empty() {
                return Err(RuleError::EmptyIndicator);
            }
            if !raw.tier.accepts_boost(indicator.boost) {
                return Err(RuleError::BoostOutOfRange {
                    tier: raw.tier,
                    boost: indicator.boost,
                });
            }
            indicators.push(FrameworkIndicator {
                dependencies: indicator
                    .dependencies
                    .iter()
                    .map(|d| normalize_dependency(d, options))
                    .collect(),
                boost: indicator.boost,
            });
        }
        RuleKind::Manifest {
            required_fields: raw
                .required_fields
                .iter()
                .map(|f| split_field_path(f))
                .filter(|segments| !segments.is_empty())
                .collect(),
            indicators,
        }
    } else {
        RuleKind::Existence
    };

    let id = raw
        .id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| format!("{}/{}/#{}", category, candidate, index));

    debug!(id = %id, target = %match_target, "Compiled detection rule");

    Ok(DetectionRule {
        id,
        category,
        candidate,
        match_target,
        tier: raw.tier,
        boost: raw.boost,
        kind,
    })
}

fn compile_group(value: serde_yaml::Value) -> Result<ExclusiveGroup, RuleError> {
    let raw: RawExclusiveGroup = serde_yaml::from_value(value)?;
    let category = Category::from_name(&raw.category)
        .ok_or_else(|| RuleError::UnknownCategory(raw.category.clone()))?;
    Ok(ExclusiveGroup {
        category,
        candidates: raw
            .candidates
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect(),
    })
}

fn compile_version_spec(
    value: serde_yaml::Value,
    options: &LoadOptions,
) -> Result<VersionSpec, RuleError> {
    let raw: RawVersionSpec = serde_yaml::from_value(value)?;

    let fields = raw
        .fields
        .into_iter()
        .map(|f| FieldLookup {
            file: f.file,
            field: f.field.into_segments(),
        })
        .collect();

    let patterns = raw
        .patterns
        .into_iter()
        .map(|p| {
            Ok(PatternLookup {
                pattern: compile_regex(&p.pattern, options)?,
                file: p.file,
            })
        })
        .collect::<Result<Vec<_>, RuleError>>()?;

    Ok(VersionSpec {
        fields,
        patterns,
        fallback: raw.fallback,
    })
}

fn build_index(
    rules: &[DetectionRule],
    options: &LoadOptions,
    include: impl Fn(&DetectionRule) -> bool,
) -> Result<(globset::GlobSet, Vec<usize>), ConfigError> {
    let mut builder = GlobSetBuilder::new();
    let mut targets = Vec::new();

    for (index, rule) in rules.iter().enumerate().filter(|(_, r)| include(r)) {
        // Already validated in compile_rule
        if let Ok(glob) = compile_glob(&rule.match_target, options) {
            builder.add(glob);
            targets.push(index);
        }
    }

    let set = builder.build().map_err(|e| ConfigError::RegistryParse {
        source_name: "glob index".to_string(),
        message: e.to_string(),
    })?;
    Ok((set, targets))
}

fn compile_glob(target: &str, options: &LoadOptions) -> Result<Glob, RuleError> {
    GlobBuilder::new(target)
        .case_insensitive(!options.case_sensitive)
        .literal_separator(true)
        .build()
        .map_err(|e| RuleError::InvalidGlob {
            target: target.to_string(),
            message: e.to_string(),
        })
}

fn compile_regex(pattern: &str, options: &LoadOptions) -> Result<Regex, RuleError> {
    RegexBuilder::new(pattern)
        .case_insensitive(!options.case_sensitive)
        .multi_line(true)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .map_err(|e| RuleError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

fn normalize_dependency(name: &str, options: &LoadOptions) -> String {
    let name = name.trim();
    if options.case_sensitive {
        name.to_string()
    } else {
        name.to_lowercase()
    }
}

fn split_field_path(path: &str) -> Vec<String> {
    path.split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
