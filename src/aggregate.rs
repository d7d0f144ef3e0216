//! Confidence aggregation
//!
//! Signals are grouped per `(category, candidate)` and reduced to a [`CategoryScore`]:
//!
//! 1. `raw_sum` is the sum of contributions, added in a canonical order (rule, file,
//!    evidence) so the result does not depend on which worker saw which file;
//! 2. if positive signals come from more than one distinct rule, the sum is scaled by the
//!    multiple-indicators multiplier;
//! 3. the result is clamped to `[0, cap]`.
//!
//! [`Aggregator`]s are partial accumulators: each worker folds into its own and the partials
//! are combined with [`Aggregator::merge`], a multiset union.

use crate::config::DetectorConfig;
use crate::matcher::Signal;
use crate::registry::Category;
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

pub type ScoreKey = (Category, String);

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryScore {
    pub category: Category,
    pub candidate: String,
    pub raw_sum: f64,
    pub multiplier_applied: bool,
    /// Set by the resolver when an exclusive-group conflict lowered the score
    pub penalty_applied: bool,
    pub final_confidence: f64,
    pub evidence_count: usize,
    pub distinct_rules: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringParams {
    pub multiple_indicators_multiplier: f64,
    pub maximum_confidence_cap: f64,
}

impl From<&DetectorConfig> for ScoringParams {
    fn from(config: &DetectorConfig) -> Self {
        Self {
            multiple_indicators_multiplier: config.multiple_indicators_multiplier,
            maximum_confidence_cap: config.maximum_confidence_cap,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    groups: BTreeMap<ScoreKey, Vec<Signal>>,
    signals: usize,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, signal: Signal) {
        self.signals += 1;
        self.groups
            .entry((signal.category, signal.candidate.clone()))
            .or_default()
            .push(signal);
    }

    pub fn extend(&mut self, signals: impl IntoIterator<Item = Signal>) {
        for signal in signals {
            self.push(signal);
        }
    }

    /// Combines two partial accumulators
    pub fn merge(mut self, other: Aggregator) -> Aggregator {
        self.signals += other.signals;
        for (key, signals) in other.groups {
            self.groups.entry(key).or_default().extend(signals);
        }
        self
    }

    pub fn signal_count(&self) -> usize {
        self.signals
    }

    pub fn is_empty(&self) -> bool {
        self.signals == 0
    }

    pub fn finish(&self, params: ScoringParams) -> BTreeMap<ScoreKey, CategoryScore> {
        self.groups
            .iter()
            .map(|(key, signals)| (key.clone(), score(key, signals, params)))
            .collect()
    }
}

/// One-shot aggregation of a signal list
pub fn aggregate(
    signals: impl IntoIterator<Item = Signal>,
    params: ScoringParams,
) -> BTreeMap<ScoreKey, CategoryScore> {
    let mut aggregator = Aggregator::new();
    aggregator.extend(signals);
    aggregator.finish(params)
}

fn score(key: &ScoreKey, signals: &[Signal], params: ScoringParams) -> CategoryScore {
    let mut ordered: Vec<&Signal> = signals.iter().collect();
    ordered.sort_by(|a, b| {
        a.rule_ref
            .cmp(&b.rule_ref)
            .then_with(|| a.file_path.cmp(&b.file_path))
            .then_with(|| a.evidence.cmp(&b.evidence))
            .then_with(|| a.contribution.total_cmp(&b.contribution))
    });

    let raw_sum: f64 = ordered.iter().map(|s| s.contribution).sum();

    let positive_rules: BTreeSet<&str> = ordered
        .iter()
        .filter(|s| s.contribution > 0.0)
        .map(|s| s.rule_ref.as_str())
        .collect();
    let distinct_rules = ordered
        .iter()
        .map(|s| s.rule_ref.as_str())
        .collect::<BTreeSet<_>>()
        .len();

    let multiplier_applied = positive_rules.len() > 1;
    let scaled = if multiplier_applied {
        raw_sum * params.multiple_indicators_multiplier
    } else {
        raw_sum
    };
    let final_confidence = scaled.clamp(0.0, params.maximum_confidence_cap);

    trace!(
        category = %key.0,
        candidate = %key.1,
        raw_sum,
        multiplier_applied,
        final_confidence,
        "Scored candidate"
    );

    CategoryScore {
        category: key.0,
        candidate: key.1.clone(),
        raw_sum,
        multiplier_applied,
        penalty_applied: false,
        final_confidence,
        evidence_count: ordered.len(),
        distinct_rules,
    }
}
