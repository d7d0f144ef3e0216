//! Signal matcher
//!
//! Evaluates one file against the rules whose match target it satisfies and emits the
//! resulting [`Signal`]s. The matcher holds no mutable state and is shared by every worker.

mod sample;

pub use sample::SampleLimits;

use crate::config::DetectorConfig;
use crate::manifest::{DependencyParsers, ManifestDocument};
use crate::registry::{Category, DetectionRule, FrameworkIndicator, RuleKind, RuleSet};
use crate::scanner::FileDescriptor;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Evidence value for rules that fire on a name or path match alone
pub const EXISTENCE: &str = "existence";

/// One piece of evidence for a candidate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub rule_ref: String,
    pub category: Category,
    pub candidate: String,
    /// Root-relative, `/`-separated
    pub file_path: String,
    /// Matched line, `dependency:<name>` or `existence`
    pub evidence: String,
    pub contribution: f64,
}

impl Signal {
    fn new(rule: &DetectionRule, file: &FileDescriptor, evidence: String, contribution: f64) -> Self {
        Self {
            rule_ref: rule.id.clone(),
            category: rule.category,
            candidate: rule.candidate.clone(),
            file_path: file.relative_path.clone(),
            evidence,
            contribution,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MatchOptions {
    pub sampling: SampleLimits,
    pub max_file_size: u64,
}

impl From<&DetectorConfig> for MatchOptions {
    fn from(config: &DetectorConfig) -> Self {
        Self {
            sampling: SampleLimits {
                max_bytes: config.content_sampling_max_bytes,
                max_lines: config.content_sampling_max_lines,
            },
            max_file_size: config.max_file_size,
        }
    }
}

pub struct Matcher {
    rules: Arc<RuleSet>,
    parsers: DependencyParsers,
    options: MatchOptions,
}

/// File content read on demand, at most once per file
enum Content {
    NotRead,
    Unavailable,
    Text(String),
}

impl Matcher {
    pub fn new(rules: Arc<RuleSet>, options: MatchOptions) -> Self {
        Self {
            rules,
            parsers: DependencyParsers::new(),
            options,
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn match_file(&self, file: &FileDescriptor) -> Vec<Signal> {
        let candidates = self
            .rules
            .candidate_rules(file.file_name(), &file.relative_path);
        if candidates.is_empty() {
            return Vec::new();
        }

        trace!(path = %file.relative_path, rules = candidates.len(), "Evaluating file");

        // Manifests are read whole, so content rules on the same file reuse that text
        let whole_file = candidates
            .iter()
            .any(|r| matches!(r.kind, RuleKind::Manifest { .. }));
        let mut content = Content::NotRead;
        let mut signals = Vec::new();

        for rule in candidates {
            match &rule.kind {
                RuleKind::Existence => {
                    signals.push(Signal::new(
                        rule,
                        file,
                        EXISTENCE.to_string(),
                        rule.contribution(),
                    ));
                }
                RuleKind::Content { patterns } => {
                    let Some(text) = self.content(file, whole_file, &mut content) else {
                        continue;
                    };
                    let text = sample::bounded(text, self.options.sampling);
                    if let Some(found) = patterns.iter().find_map(|p| p.find(text)) {
                        signals.push(Signal::new(
                            rule,
                            file,
                            sample::snippet(text, found.start(), found.end()),
                            rule.contribution(),
                        ));
                    }
                }
                RuleKind::Manifest {
                    required_fields,
                    indicators,
                } => {
                    let Some(text) = self.content(file, whole_file, &mut content) else {
                        continue;
                    };
                    signals.extend(self.match_manifest(
                        rule,
                        file,
                        text,
                        required_fields,
                        indicators,
                    ));
                }
            }
        }

        if !signals.is_empty() {
            debug!(
                path = %file.relative_path,
                signals = signals.len(),
                "File produced signals"
            );
        }
        signals
    }

    fn match_manifest(
        &self,
        rule: &DetectionRule,
        file: &FileDescriptor,
        text: &str,
        required_fields: &[Vec<String>],
        indicators: &[FrameworkIndicator],
    ) -> Vec<Signal> {
        if !required_fields.is_empty() {
            let Some(document) = ManifestDocument::parse(file.file_name(), text) else {
                trace!(path = %file.relative_path, rule = %rule.id, "Manifest not parseable");
                return Vec::new();
            };
            if let Some(missing) = required_fields.iter().find(|f| !document.has_field(f)) {
                trace!(
                    path = %file.relative_path,
                    rule = %rule.id,
                    field = %missing.join("/"),
                    "Required field missing, rule suppressed"
                );
                return Vec::new();
            }
        }

        if indicators.is_empty() {
            return vec![Signal::new(
                rule,
                file,
                EXISTENCE.to_string(),
                rule.contribution(),
            )];
        }

        // Indicators were normalized when the rule set was compiled
        let declared: BTreeSet<String> =
            match self
                .parsers
                .dependencies(file.file_name(), text, self.rules.case_sensitive())
            {
                Some(declared) => declared,
                None => {
                    debug!(
                        path = %file.relative_path,
                        rule = %rule.id,
                        "No dependency parser for manifest"
                    );
                    return Vec::new();
                }
            };

        indicators
            .iter()
            .filter_map(|indicator| {
                indicator
                    .dependencies
                    .iter()
                    .find(|d| declared.contains(d.as_str()))
                    .map(|dependency| {
                        Signal::new(
                            rule,
                            file,
                            format!("dependency:{}", dependency),
                            rule.tier.contribution(indicator.boost),
                        )
                    })
            })
            .collect()
    }

    /// Reads the file on first use; `None` when it is too large, binary or unreadable
    fn content<'a>(
        &self,
        file: &FileDescriptor,
        whole_file: bool,
        content: &'a mut Content,
    ) -> Option<&'a str> {
        if let Content::NotRead = content {
            *content = if !file.content_eligible {
                trace!(path = %file.relative_path, size = file.size, "File too large for content rules");
                Content::Unavailable
            } else {
                let limit = if whole_file {
                    self.options.max_file_size
                } else {
                    self.options.sampling.max_bytes as u64
                };
                match sample::read_prefix(&file.path, limit) {
                    Ok(Some(text)) => Content::Text(text),
                    Ok(None) => {
                        trace!(path = %file.relative_path, "Binary content, skipping content rules");
                        Content::Unavailable
                    }
                    Err(err) => {
                        warn!(path = %file.relative_path, error = %err, "Failed to read file");
                        Content::Unavailable
                    }
                }
            };
        }

        match content {
            Content::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }
}
