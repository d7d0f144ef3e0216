use super::types::{DetectionResult, ScanStats};
use crate::aggregate::{Aggregator, ScoringParams};
use crate::config::DetectorConfig;
use crate::error::DetectError;
use crate::extract::Extractor;
use crate::matcher::{MatchOptions, Matcher};
use crate::registry::{LoadOptions, RuleSet};
use crate::resolve::{ResolveParams, Resolver};
use crate::scanner::{CancellationToken, FileDescriptor, ScanOptions, Scanner};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Descriptors buffered between the walker and the matcher pool
const CHANNEL_CAPACITY: usize = 1024;

/// Runs the detection pipeline: scan, match, aggregate, resolve, extract
///
/// A `Detector` owns a validated configuration and a loaded rule set and can be reused
/// for any number of projects.
pub struct Detector {
    config: DetectorConfig,
    rules: Arc<RuleSet>,
}

struct WalkSummary {
    files: usize,
    truncated: bool,
    cancelled: bool,
}

impl Detector {
    pub fn new(config: DetectorConfig) -> Result<Self, DetectError> {
        config.validate()?;
        let rules = RuleSet::load(
            &config.registry,
            &LoadOptions {
                case_sensitive: config.case_sensitive,
            },
        )?;
        Self::with_rules(config, Arc::new(rules))
    }

    /// Uses an already loaded rule set; `config.registry` is ignored
    ///
    /// Globs, patterns and dependency names match with the rule set's own case
    /// sensitivity, whatever `config.case_sensitive` says.
    pub fn with_rules(config: DetectorConfig, rules: Arc<RuleSet>) -> Result<Self, DetectError> {
        config.validate()?;
        Ok(Self { config, rules })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn detect(&self, root: &Path) -> Result<DetectionResult, DetectError> {
        self.detect_with_cancel(root, &CancellationToken::new())
    }

    /// Like [`detect`](Self::detect), stopping early once `cancel` is triggered
    ///
    /// A cancelled run still returns the scores of the files matched so far, with
    /// `stats.cancelled` set and no version extraction.
    pub fn detect_with_cancel(
        &self,
        root: &Path,
        cancel: &CancellationToken,
    ) -> Result<DetectionResult, DetectError> {
        let start = Instant::now();
        let scanner = Scanner::new(root, ScanOptions::from(&self.config))?;
        let matcher = Matcher::new(Arc::clone(&self.rules), MatchOptions::from(&self.config));

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .thread_name(|i| format!("stackprobe-match-{}", i))
            .build()
            .map_err(|e| DetectError::ThreadPool(e.to_string()))?;

        info!(
            root = %scanner.root().display(),
            workers = pool.current_num_threads(),
            rules = self.rules.len(),
            "Starting detection"
        );

        let (aggregator, walk) = self.collect(&scanner, &matcher, &pool, cancel)?;
        let cancelled = walk.cancelled || cancel.is_cancelled();

        let scores = aggregator.finish(ScoringParams::from(&self.config));
        let categories = Resolver::new(
            self.rules.exclusive_groups(),
            ResolveParams::from(&self.config),
        )
        .resolve(scores);

        let mut versions = BTreeMap::new();
        if cancelled {
            warn!("Detection cancelled, returning partial result");
        } else {
            let extractor = Extractor::new(&self.rules, self.config.max_file_size);
            for candidate in categories
                .values()
                .flatten()
                .filter(|c| !c.low_confidence)
            {
                if let Some(info) = extractor.extract(&candidate.candidate, scanner.root()) {
                    versions.insert(candidate.candidate.clone(), info);
                }
            }
        }

        let result = DetectionResult {
            categories,
            versions,
            stats: ScanStats {
                files_scanned: walk.files,
                signals: aggregator.signal_count(),
                cancelled,
                truncated: walk.truncated,
            },
        };

        info!(
            categories = result.categories.len(),
            files_scanned = result.stats.files_scanned,
            signals = result.stats.signals,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Detection completed"
        );

        Ok(result)
    }

    /// Streams descriptors from a scoped walker thread into the pool and folds the
    /// signals into per-worker aggregators
    fn collect(
        &self,
        scanner: &Scanner,
        matcher: &Matcher,
        pool: &rayon::ThreadPool,
        cancel: &CancellationToken,
    ) -> Result<(Aggregator, WalkSummary), DetectError> {
        let (tx, rx) = crossbeam_channel::bounded::<FileDescriptor>(CHANNEL_CAPACITY);

        thread::scope(|scope| {
            let producer = thread::Builder::new()
                .name("stackprobe-walk".to_string())
                .spawn_scoped(scope, move || {
                    let mut files = scanner.scan(cancel);
                    for file in files.by_ref() {
                        if tx.send(file).is_err() {
                            break;
                        }
                    }
                    WalkSummary {
                        files: files.files_emitted(),
                        truncated: files.truncated(),
                        cancelled: files.cancelled(),
                    }
                })
                .map_err(|e| DetectError::ThreadPool(e.to_string()))?;

            let aggregator = pool.install(|| {
                rx.into_iter()
                    .par_bridge()
                    .fold(Aggregator::new, |mut aggregator, file| {
                        if !cancel.is_cancelled() {
                            aggregator.extend(matcher.match_file(&file));
                        }
                        aggregator
                    })
                    .reduce(Aggregator::new, Aggregator::merge)
            });

            let walk = producer
                .join()
                .map_err(|_| DetectError::ThreadPool("scanner thread panicked".to_string()))?;

            debug!(
                files = walk.files,
                signals = aggregator.signal_count(),
                "Matching finished"
            );
            Ok((aggregator, walk))
        })
    }
}

/// Detects the stack of `root` with a one-off [`Detector`]
pub fn detect(root: &Path, config: &DetectorConfig) -> Result<DetectionResult, DetectError> {
    Detector::new(config.clone())?.detect(root)
}
