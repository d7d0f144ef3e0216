//! Output formatting for detection results and rule listings
//!
//! JSON and YAML are stable, machine-readable renderings of the serialized types; the
//! human format is meant for terminals and may change between releases.
//!
//! # Example
//!
//! ```no_run
//! use stackprobe::cli::output::{OutputFormat, OutputFormatter};
//! use stackprobe::{detect, DetectorConfig};
//! use std::path::Path;
//!
//! let result = detect(Path::new("."), &DetectorConfig::default()).unwrap();
//! let formatter = OutputFormatter::new(OutputFormat::Json);
//! println!("{}", formatter.format(&result).unwrap());
//! ```

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::detection::types::DetectionResult;
use crate::registry::{Category, DetectionRule, RuleKind, RuleSet, Tier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// YAML format (human-friendly, version-control friendly)
    Yaml,
    /// Human-readable formatted text
    Human,
}

/// Flattened view of a rule for listings
#[derive(Debug, Serialize)]
pub struct RuleSummary<'a> {
    pub id: &'a str,
    pub category: Category,
    pub candidate: &'a str,
    #[serde(rename = "match")]
    pub match_target: &'a str,
    pub tier: Tier,
    pub boost: f64,
    pub kind: &'static str,
}

impl<'a> From<&'a DetectionRule> for RuleSummary<'a> {
    fn from(rule: &'a DetectionRule) -> Self {
        Self {
            id: &rule.id,
            category: rule.category,
            candidate: &rule.candidate,
            match_target: &rule.match_target,
            tier: rule.tier,
            boost: rule.boost,
            kind: match rule.kind {
                RuleKind::Existence => "existence",
                RuleKind::Content { .. } => "content",
                RuleKind::Manifest { .. } => "manifest",
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct RuleListing<'a> {
    version: u32,
    confidence_base: BTreeMap<Category, f64>,
    rules: Vec<RuleSummary<'a>>,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a detection result according to the configured format
    pub fn format(&self, result: &DetectionResult) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(result)
                .map(|mut s| {
                    s.push('\n');
                    s
                })
                .context("Failed to serialize detection result to JSON"),
            OutputFormat::Yaml => {
                serde_yaml::to_string(result).context("Failed to serialize detection result to YAML")
            }
            OutputFormat::Human => Ok(self.format_human(result)),
        }
    }

    /// Formats the rules of a rule set, optionally restricted to one category
    pub fn format_rules(&self, rules: &RuleSet, category: Option<Category>) -> Result<String> {
        let categories: Vec<Category> = match category {
            Some(c) => vec![c],
            None => Category::all().to_vec(),
        };
        let listing = RuleListing {
            version: rules.format_version(),
            confidence_base: categories
                .iter()
                .filter_map(|c| rules.confidence_base(*c).map(|base| (*c, base)))
                .collect(),
            rules: rules
                .rules()
                .iter()
                .filter(|r| categories.contains(&r.category))
                .map(RuleSummary::from)
                .collect(),
        };

        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&listing)
                .map(|mut s| {
                    s.push('\n');
                    s
                })
                .context("Failed to serialize rules to JSON"),
            OutputFormat::Yaml => {
                serde_yaml::to_string(&listing).context("Failed to serialize rules to YAML")
            }
            OutputFormat::Human => Ok(self.format_rules_human(&listing)),
        }
    }

    fn format_human(&self, result: &DetectionResult) -> String {
        let mut output = String::new();

        output.push_str("Detected Stack\n");
        output.push_str(&"\u{2501}".repeat(42));
        output.push_str("\n\n");

        if result.is_empty() {
            output.push_str("No technologies detected\n");
        }

        for (category, candidates) in &result.categories {
            output.push_str(&format!("{}:\n", title(*category)));
            for (i, candidate) in candidates.iter().enumerate() {
                let connector = if i == candidates.len() - 1 {
                    "\u{2514}\u{2500}"
                } else {
                    "\u{251C}\u{2500}"
                };
                let version = result
                    .version(&candidate.candidate)
                    .map(|v| {
                        if v.inferred {
                            format!(" {} (assumed)", v.value)
                        } else {
                            format!(" {}", v.value)
                        }
                    })
                    .unwrap_or_default();
                let flag = if candidate.low_confidence {
                    " (low confidence)"
                } else {
                    ""
                };
                output.push_str(&format!(
                    "{} {:<16} {} {:>3}%{}{}\n",
                    connector,
                    candidate.candidate,
                    confidence_bar(candidate.confidence),
                    (candidate.confidence * 100.0).round() as u32,
                    version,
                    flag
                ));
            }
            output.push('\n');
        }

        if !result.versions.is_empty() {
            output.push_str("Version Sources:\n");
            for (candidate, info) in &result.versions {
                output.push_str(&format!("  {:<16} {}\n", candidate, info.source));
            }
            output.push('\n');
        }

        output.push_str(&format!(
            "Scanned {} files, {} signals\n",
            result.stats.files_scanned, result.stats.signals
        ));
        if result.stats.truncated {
            output.push_str("\u{26A0} File limit reached, results may be incomplete\n");
        }
        if result.stats.cancelled {
            output.push_str("\u{26A0} Detection was cancelled, results are partial\n");
        }

        output
    }

    fn format_rules_human(&self, listing: &RuleListing<'_>) -> String {
        let mut output = format!(
            "Registry v{} ({} rules)\n\n",
            listing.version,
            listing.rules.len()
        );

        let mut current: Option<Category> = None;
        let mut sorted: Vec<&RuleSummary<'_>> = listing.rules.iter().collect();
        sorted.sort_by(|a, b| a.category.cmp(&b.category).then(a.id.cmp(b.id)));

        for rule in sorted {
            if current != Some(rule.category) {
                if current.is_some() {
                    output.push('\n');
                }
                current = Some(rule.category);
                match listing.confidence_base.get(&rule.category) {
                    Some(base) => output.push_str(&format!(
                        "{} (base {:.2}):\n",
                        title(rule.category),
                        base
                    )),
                    None => output.push_str(&format!("{}:\n", title(rule.category))),
                }
            }
            output.push_str(&format!(
                "  {:<28} {:<16} {:<10} {:<9} {:>5.2}  {}\n",
                rule.id,
                rule.candidate,
                format!("{:?}", rule.tier).to_lowercase(),
                rule.kind,
                rule.boost,
                rule.match_target
            ));
        }

        output
    }
}

fn title(category: Category) -> &'static str {
    match category {
        Category::Language => "Languages",
        Category::Framework => "Frameworks",
        Category::Database => "Databases",
        Category::BuildSystem => "Build Systems",
        Category::Container => "Containers",
        Category::Testing => "Testing",
        Category::Platform => "Platforms",
    }
}

fn confidence_bar(confidence: f64) -> String {
    let filled = ((confidence * 10.0).round() as usize).min(10);
    "\u{2588}".repeat(filled) + &"\u{2591}".repeat(10 - filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::VersionInfo;
    use crate::resolve::RankedCandidate;

    fn create_test_result() -> DetectionResult {
        let mut result = DetectionResult::default();
        result.categories.insert(
            Category::Language,
            vec![RankedCandidate {
                candidate: "python".to_string(),
                confidence: 0.95,
                evidence_count: 3,
                low_confidence: false,
            }],
        );
        result.categories.insert(
            Category::Framework,
            vec![
                RankedCandidate {
                    candidate: "django".to_string(),
                    confidence: 0.64,
                    evidence_count: 1,
                    low_confidence: false,
                },
                RankedCandidate {
                    candidate: "flask".to_string(),
                    confidence: 0.64,
                    evidence_count: 1,
                    low_confidence: false,
                },
            ],
        );
        result.versions.insert(
            "python".to_string(),
            VersionInfo {
                value: "3.11".to_string(),
                source: ".python-version".to_string(),
                inferred: false,
            },
        );
        result.stats.files_scanned = 4;
        result.stats.signals = 5;
        result
    }

    #[test]
    fn test_json_format() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let output = formatter.format(&create_test_result()).unwrap();

        let parsed: DetectionResult = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed, create_test_result());
        assert!(output.contains("\"python\""));
        assert!(output.ends_with('\n'));
    }

    #[test]
    fn test_yaml_format() {
        let formatter = OutputFormatter::new(OutputFormat::Yaml);
        let output = formatter.format(&create_test_result()).unwrap();

        assert!(output.contains("categories:"));
        assert!(output.contains("candidate: django"));
        assert!(output.contains("files_scanned: 4"));
    }

    #[test]
    fn test_human_format() {
        let formatter = OutputFormatter::new(OutputFormat::Human);
        let output = formatter.format(&create_test_result()).unwrap();

        assert!(output.contains("Languages:"));
        assert!(output.contains("python"));
        assert!(output.contains(" 95% 3.11"));
        assert!(output.contains("Frameworks:"));
        assert!(output.contains("\u{251C}\u{2500} django"));
        assert!(output.contains("\u{2514}\u{2500} flask"));
        assert!(output.contains("Scanned 4 files, 5 signals"));
        assert!(!output.contains("cancelled"));
    }

    #[test]
    fn test_human_format_empty() {
        let formatter = OutputFormatter::new(OutputFormat::Human);
        let mut result = DetectionResult::default();
        result.stats.cancelled = true;
        let output = formatter.format(&result).unwrap();

        assert!(output.contains("No technologies detected"));
        assert!(output.contains("cancelled"));
    }

    #[test]
    fn test_confidence_bar() {
        assert_eq!(confidence_bar(0.0), "\u{2591}".repeat(10));
        assert_eq!(confidence_bar(1.0), "\u{2588}".repeat(10));
        assert_eq!(
            confidence_bar(0.64),
            "\u{2588}".repeat(6) + &"\u{2591}".repeat(4)
        );
    }

    #[test]
    fn test_rules_listing_filters_category() {
        let rules = RuleSet::builtin().unwrap();
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let output = formatter
            .format_rules(&rules, Some(Category::Container))
            .unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        let listed = parsed["rules"].as_array().unwrap();
        assert!(!listed.is_empty());
        assert!(listed.iter().all(|r| r["category"] == "container"));
        assert!(listed.iter().any(|r| r["candidate"] == "docker"));
        assert!(parsed["confidence_base"]["container"].is_number());
    }

    #[test]
    fn test_rules_listing_human() {
        let rules = RuleSet::builtin().unwrap();
        let formatter = OutputFormatter::new(OutputFormat::Human);
        let output = formatter.format_rules(&rules, None).unwrap();

        assert!(output.starts_with("Registry v1"));
        assert!(output.contains("Languages"));
        assert!(output.contains("docker-dockerfile"));
    }
}
