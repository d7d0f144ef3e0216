use crate::extract::VersionInfo;
use crate::registry::Category;
use crate::resolve::RankedCandidate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Counters describing how a detection run went
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub files_scanned: usize,
    pub signals: usize,
    /// The run was cancelled; results reflect the files processed before that
    pub cancelled: bool,
    /// The file limit was reached before the walk finished
    pub truncated: bool,
}

/// Outcome of a detection run
///
/// Only categories with at least one candidate are present, in category order. Identical
/// trees and configuration serialize to identical JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub categories: BTreeMap<Category, Vec<RankedCandidate>>,
    /// Keyed by candidate name
    pub versions: BTreeMap<String, VersionInfo>,
    pub stats: ScanStats,
}

impl DetectionResult {
    pub fn candidates(&self, category: Category) -> &[RankedCandidate] {
        self.categories
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Highest-ranked candidate of a category
    pub fn top(&self, category: Category) -> Option<&RankedCandidate> {
        self.candidates(category).first()
    }

    pub fn confidence(&self, category: Category, candidate: &str) -> Option<f64> {
        self.candidates(category)
            .iter()
            .find(|r| r.candidate == candidate)
            .map(|r| r.confidence)
    }

    pub fn version(&self, candidate: &str) -> Option<&VersionInfo> {
        self.versions.get(candidate)
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

impl fmt::Display for DetectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.categories.is_empty() {
            return writeln!(f, "No technologies detected");
        }
        for (category, candidates) in &self.categories {
            let names: Vec<String> = candidates
                .iter()
                .map(|c| format!("{} ({:.0}%)", c.candidate, c.confidence * 100.0))
                .collect();
            writeln!(f, "{}: {}", category, names.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DetectionResult {
        let mut result = DetectionResult::default();
        result.categories.insert(
            Category::Framework,
            vec![
                RankedCandidate {
                    candidate: "react".to_string(),
                    confidence: 0.95,
                    evidence_count: 2,
                    low_confidence: false,
                },
                RankedCandidate {
                    candidate: "vue".to_string(),
                    confidence: 0.7,
                    evidence_count: 1,
                    low_confidence: false,
                },
            ],
        );
        result.categories.insert(
            Category::BuildSystem,
            vec![RankedCandidate {
                candidate: "npm".to_string(),
                confidence: 0.2,
                evidence_count: 1,
                low_confidence: true,
            }],
        );
        result
    }

    #[test]
    fn test_accessors() {
        let result = sample();
        assert_eq!(result.top(Category::Framework).unwrap().candidate, "react");
        assert_eq!(result.confidence(Category::Framework, "vue"), Some(0.7));
        assert!(result.candidates(Category::Database).is_empty());
        assert!(!result.is_empty());
    }

    #[test]
    fn test_serialization_uses_category_order_and_names() {
        let json = serde_json::to_string(&sample()).unwrap();
        let framework = json.find("\"framework\"").unwrap();
        let build_system = json.find("\"build-system\"").unwrap();
        assert!(framework < build_system);
        assert!(json.contains("\"low_confidence\":true"));
        assert!(!json.contains("\"database\""));
    }

    #[test]
    fn test_display() {
        let text = sample().to_string();
        assert!(text.contains("framework: react (95%), vue (70%)"));
        assert_eq!(
            DetectionResult::default().to_string(),
            "No technologies detected\n"
        );
    }
}
