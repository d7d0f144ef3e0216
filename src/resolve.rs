//! Conflict resolution and ranking

use crate::aggregate::{CategoryScore, ScoreKey};
use crate::config::DetectorConfig;
use crate::registry::{Category, ExclusiveGroup};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// A reported candidate within its category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub candidate: String,
    pub confidence: f64,
    pub evidence_count: usize,
    /// Below the threshold; reported only because nothing in the category cleared it
    pub low_confidence: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolveParams {
    pub minimum_confidence_threshold: f64,
    pub conflicting_indicators_penalty: f64,
    pub conflict_ambiguity_band: f64,
}

impl From<&DetectorConfig> for ResolveParams {
    fn from(config: &DetectorConfig) -> Self {
        Self {
            minimum_confidence_threshold: config.minimum_confidence_threshold,
            conflicting_indicators_penalty: config.conflicting_indicators_penalty,
            conflict_ambiguity_band: config.conflict_ambiguity_band,
        }
    }
}

pub struct Resolver<'a> {
    groups: &'a [ExclusiveGroup],
    params: ResolveParams,
}

impl<'a> Resolver<'a> {
    pub fn new(groups: &'a [ExclusiveGroup], params: ResolveParams) -> Self {
        Self { groups, params }
    }

    /// Applies exclusive-group penalties in place
    ///
    /// Conflicts are decided on the unpenalized scores, and a candidate is penalized at
    /// most once even if it sits in several conflicting groups.
    pub fn apply_penalties(&self, scores: &mut BTreeMap<ScoreKey, CategoryScore>) {
        let mut conflicted: BTreeSet<ScoreKey> = BTreeSet::new();

        for group in self.groups {
            let ambiguous: Vec<ScoreKey> = group
                .candidates
                .iter()
                .map(|c| (group.category, c.clone()))
                .filter(|key| {
                    scores
                        .get(key)
                        .map_or(false, |s| s.final_confidence >= self.params.conflict_ambiguity_band)
                })
                .collect();

            if ambiguous.len() >= 2 {
                debug!(
                    category = %group.category,
                    candidates = ?ambiguous.iter().map(|k| k.1.as_str()).collect::<Vec<_>>(),
                    "Exclusive candidates in conflict"
                );
                conflicted.extend(ambiguous);
            }
        }

        for key in conflicted {
            if let Some(score) = scores.get_mut(&key) {
                score.final_confidence *= self.params.conflicting_indicators_penalty;
                score.penalty_applied = true;
            }
        }
    }

    /// Penalizes, thresholds and orders the scores of every category
    ///
    /// Categories with no candidate above zero are absent from the result.
    pub fn resolve(
        &self,
        mut scores: BTreeMap<ScoreKey, CategoryScore>,
    ) -> BTreeMap<Category, Vec<RankedCandidate>> {
        self.apply_penalties(&mut scores);

        let mut by_category: BTreeMap<Category, Vec<CategoryScore>> = BTreeMap::new();
        for ((category, _), score) in scores {
            by_category.entry(category).or_default().push(score);
        }

        by_category
            .into_iter()
            .filter_map(|(category, scores)| {
                let ranked = self.rank(scores);
                if ranked.is_empty() {
                    None
                } else {
                    Some((category, ranked))
                }
            })
            .collect()
    }

    /// Keeps candidates at or above the threshold, best first
    ///
    /// A candidate must also score strictly above zero, so with a threshold of 0 a
    /// candidate whose negative evidence cancels its positive evidence is still dropped.
    fn rank(&self, scores: Vec<CategoryScore>) -> Vec<RankedCandidate> {
        let threshold = self.params.minimum_confidence_threshold;

        let mut kept: Vec<RankedCandidate> = scores
            .iter()
            .filter(|s| s.final_confidence > 0.0 && s.final_confidence >= threshold)
            .map(|s| ranked(s, false))
            .collect();

        if kept.is_empty() {
            // Best below-threshold candidate, ties broken by name
            return scores
                .iter()
                .filter(|s| s.final_confidence > 0.0)
                .min_by(|a, b| by_rank(a.final_confidence, &a.candidate, b.final_confidence, &b.candidate))
                .map(|s| vec![ranked(s, true)])
                .unwrap_or_default();
        }

        kept.sort_by(|a, b| by_rank(a.confidence, &a.candidate, b.confidence, &b.candidate));
        kept
    }
}

/// Confidence descending, then name ascending
fn by_rank(a_conf: f64, a_name: &str, b_conf: f64, b_name: &str) -> Ordering {
    b_conf.total_cmp(&a_conf).then_with(|| a_name.cmp(b_name))
}

fn ranked(score: &CategoryScore, low_confidence: bool) -> RankedCandidate {
    RankedCandidate {
        candidate: score.candidate.clone(),
        confidence: round(score.final_confidence),
        evidence_count: score.evidence_count,
        low_confidence,
    }
}

/// Four decimal places keep reports readable without reordering candidates
fn round(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS: ResolveParams = ResolveParams {
        minimum_confidence_threshold: 0.6,
        conflicting_indicators_penalty: 0.8,
        conflict_ambiguity_band: 0.3,
    };

    fn score(category: Category, candidate: &str, confidence: f64) -> (ScoreKey, CategoryScore) {
        (
            (category, candidate.to_string()),
            CategoryScore {
                category,
                candidate: candidate.to_string(),
                raw_sum: confidence,
                multiplier_applied: false,
                penalty_applied: false,
                final_confidence: confidence,
                evidence_count: 1,
                distinct_rules: 1,
            },
        )
    }

    fn python_web_group() -> Vec<ExclusiveGroup> {
        vec![ExclusiveGroup {
            category: Category::Framework,
            candidates: vec!["django".into(), "flask".into(), "fastapi".into()],
        }]
    }

    #[test]
    fn test_threshold_and_ordering() {
        let scores = BTreeMap::from([
            score(Category::Language, "python", 0.7),
            score(Category::Language, "shell", 0.12),
            score(Category::Language, "go", 0.9),
            score(Category::Language, "rust", 0.7),
        ]);

        let ranked = Resolver::new(&[], PARAMS).resolve(scores);
        let names: Vec<&str> = ranked[&Category::Language]
            .iter()
            .map(|r| r.candidate.as_str())
            .collect();

        assert_eq!(names, vec!["go", "python", "rust"]);
        assert!(ranked[&Category::Language].iter().all(|r| !r.low_confidence));
    }

    #[test]
    fn test_low_confidence_fallback_breaks_ties_by_name() {
        let scores = BTreeMap::from([
            score(Category::Testing, "vitest", 0.4),
            score(Category::Testing, "jest", 0.4),
            score(Category::Testing, "mocha", 0.2),
        ]);

        let ranked = Resolver::new(&[], PARAMS).resolve(scores);
        let testing = &ranked[&Category::Testing];

        assert_eq!(testing.len(), 1);
        assert_eq!(testing[0].candidate, "jest");
        assert!(testing[0].low_confidence);
    }

    #[test]
    fn test_zero_scores_produce_no_category() {
        let scores = BTreeMap::from([score(Category::Database, "redis", 0.0)]);
        let ranked = Resolver::new(&[], PARAMS).resolve(scores);
        assert!(ranked.is_empty());
    }

    #[test]
    fn test_zero_threshold_still_drops_cancelled_out_candidates() {
        let params = ResolveParams {
            minimum_confidence_threshold: 0.0,
            ..PARAMS
        };
        let scores = BTreeMap::from([
            score(Category::Testing, "jest", 0.0),
            score(Category::Testing, "vitest", 0.05),
        ]);

        let ranked = Resolver::new(&[], params).resolve(scores);
        let testing = &ranked[&Category::Testing];

        assert_eq!(testing.len(), 1);
        assert_eq!(testing[0].candidate, "vitest");
        assert!(!testing[0].low_confidence);
    }

    #[test]
    fn test_conflict_penalty() {
        let groups = python_web_group();
        let mut scores = BTreeMap::from([
            score(Category::Framework, "django", 0.8),
            score(Category::Framework, "flask", 0.8),
            score(Category::Framework, "fastapi", 0.1),
        ]);

        Resolver::new(&groups, PARAMS).apply_penalties(&mut scores);

        let django = &scores[&(Category::Framework, "django".to_string())];
        assert!(django.penalty_applied);
        assert!((django.final_confidence - 0.64).abs() < 1e-9);
        assert!(!scores[&(Category::Framework, "fastapi".to_string())].penalty_applied);
    }

    #[test]
    fn test_single_member_above_band_is_not_penalized() {
        let groups = python_web_group();
        let mut scores = BTreeMap::from([
            score(Category::Framework, "django", 0.8),
            score(Category::Framework, "flask", 0.29),
        ]);

        Resolver::new(&groups, PARAMS).apply_penalties(&mut scores);

        assert!(!scores[&(Category::Framework, "django".to_string())].penalty_applied);
    }

    #[test]
    fn test_penalty_applied_once_across_overlapping_groups() {
        let groups = vec![
            ExclusiveGroup {
                category: Category::Framework,
                candidates: vec!["a".into(), "b".into()],
            },
            ExclusiveGroup {
                category: Category::Framework,
                candidates: vec!["a".into(), "c".into()],
            },
        ];
        let mut scores = BTreeMap::from([
            score(Category::Framework, "a", 0.9),
            score(Category::Framework, "b", 0.9),
            score(Category::Framework, "c", 0.9),
        ]);

        Resolver::new(&groups, PARAMS).apply_penalties(&mut scores);

        assert!((scores[&(Category::Framework, "a".to_string())].final_confidence - 0.72).abs() < 1e-9);
    }

    #[test]
    fn test_group_in_other_category_is_ignored() {
        let groups = python_web_group();
        let mut scores = BTreeMap::from([
            score(Category::Language, "django", 0.8),
            score(Category::Language, "flask", 0.8),
        ]);

        Resolver::new(&groups, PARAMS).apply_penalties(&mut scores);

        assert!(scores.values().all(|s| !s.penalty_applied));
    }

    #[test]
    fn test_confidence_is_rounded() {
        let scores = BTreeMap::from([score(Category::Framework, "django", 0.8 * 0.8)]);
        let ranked = Resolver::new(&[], PARAMS).resolve(scores);
        assert_eq!(ranked[&Category::Framework][0].confidence, 0.64);
    }
}
