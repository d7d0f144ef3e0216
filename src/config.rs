//! Configuration management for stackprobe
//!
//! Every tunable of the detection pipeline lives in [`DetectorConfig`]. Values start from
//! built-in defaults and can be overridden from `STACKPROBE_*` environment variables or
//! directly by the caller (the CLI layers its flags on top).
//!
//! # Environment Variables
//!
//! - `STACKPROBE_CASE_SENSITIVE`: Case-sensitive globs, patterns and dependency names - default: "false"
//! - `STACKPROBE_SAMPLE_MAX_BYTES`: Content sample byte limit - default: "65536"
//! - `STACKPROBE_SAMPLE_MAX_LINES`: Content sample line limit - default: "200"
//! - `STACKPROBE_EXCLUDE`: Extra comma-separated exclusion globs, appended to the defaults
//! - `STACKPROBE_THRESHOLD`: Minimum confidence to report - default: "0.6"
//! - `STACKPROBE_CAP`: Maximum confidence - default: "0.95"
//! - `STACKPROBE_MULTIPLIER`: Multiple-indicator multiplier - default: "1.2"
//! - `STACKPROBE_PENALTY`: Conflicting-indicator penalty - default: "0.8"
//! - `STACKPROBE_AMBIGUITY_BAND`: Score from which exclusive candidates conflict - default: "0.3"
//! - `STACKPROBE_MAX_FILE_SIZE`: Largest file whose content is read - default: "1048576" (1MB)
//! - `STACKPROBE_MAX_DEPTH`: Maximum traversal depth - default: "12"
//! - `STACKPROBE_MAX_FILES`: Maximum files visited - default: "50000"
//! - `STACKPROBE_RESPECT_GITIGNORE`: Honor `.gitignore` (true|false) - default: "true"
//! - `STACKPROBE_WORKERS`: Matcher threads, 0 for one per core - default: "0"
//! - `STACKPROBE_RULES`: Path to a custom rule registry - default: built-in rules
//!
//! # Example
//!
//! ```no_run
//! use stackprobe::DetectorConfig;
//!
//! let mut config = DetectorConfig::from_env().expect("invalid environment");
//! config.minimum_confidence_threshold = 0.5;
//! config.validate().expect("Invalid configuration");
//! ```

use crate::registry::RegistrySource;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

const DEFAULT_SAMPLE_MAX_BYTES: usize = 64 * 1024;
const DEFAULT_SAMPLE_MAX_LINES: usize = 200;
const DEFAULT_THRESHOLD: f64 = 0.6;
const DEFAULT_CAP: f64 = 0.95;
const DEFAULT_MULTIPLIER: f64 = 1.2;
const DEFAULT_PENALTY: f64 = 0.8;
const DEFAULT_AMBIGUITY_BAND: f64 = 0.3;
const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024; // 1MB
const DEFAULT_MAX_DEPTH: usize = 12;
const DEFAULT_MAX_FILES: usize = 50_000;

/// Exclusions applied to every scan: VCS metadata, dependency caches and build output
pub const DEFAULT_EXCLUSIONS: &[&str] = &[
    "**/.git",
    "**/.hg",
    "**/.svn",
    "**/node_modules",
    "**/bower_components",
    "**/vendor",
    "**/target",
    "**/dist",
    "**/build",
    "**/out",
    "**/.next",
    "**/.nuxt",
    "**/.output",
    "**/.svelte-kit",
    "**/venv",
    "**/.venv",
    "**/__pycache__",
    "**/.pytest_cache",
    "**/.mypy_cache",
    "**/.tox",
    "**/.gradle",
    "**/.idea",
    "**/.vscode",
    "**/.vs",
    "**/coverage",
    "**/bin/Debug",
    "**/bin/Release",
    "**/obj",
    "**/_build",
    "**/deps",
    "**/.terraform",
];

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Registry file could not be read
    #[error("Failed to read rule registry {path}: {source}")]
    RegistryIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Registry document is not valid YAML or lacks required keys
    #[error("Failed to parse rule registry ({source_name}): {message}")]
    RegistryParse { source_name: String, message: String },

    #[error("Unsupported rule registry version {found} (supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// Failed to parse configuration value
    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },
}

/// Tunables of a detection run
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Match globs, content patterns and dependency names case-sensitively
    pub case_sensitive: bool,

    /// Upper bound on bytes read for content rules
    pub content_sampling_max_bytes: usize,

    /// Upper bound on lines read for content rules
    pub content_sampling_max_lines: usize,

    /// Glob patterns (root-relative) pruned from the walk
    pub exclusions: Vec<String>,

    pub minimum_confidence_threshold: f64,

    pub maximum_confidence_cap: f64,

    /// Applied when positive signals come from more than one distinct rule
    pub multiple_indicators_multiplier: f64,

    /// Applied to every ambiguous member of an exclusive group
    pub conflicting_indicators_penalty: f64,

    /// Exclusive-group members at or above this score are considered in conflict
    pub conflict_ambiguity_band: f64,

    /// Files larger than this are still reported but never read
    pub max_file_size: u64,

    pub max_depth: usize,

    pub max_files: usize,

    pub respect_gitignore: bool,

    /// Matcher threads; 0 lets the pool size itself
    pub workers: usize,

    pub registry: RegistrySource,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            content_sampling_max_bytes: DEFAULT_SAMPLE_MAX_BYTES,
            content_sampling_max_lines: DEFAULT_SAMPLE_MAX_LINES,
            exclusions: DEFAULT_EXCLUSIONS.iter().map(|s| s.to_string()).collect(),
            minimum_confidence_threshold: DEFAULT_THRESHOLD,
            maximum_confidence_cap: DEFAULT_CAP,
            multiple_indicators_multiplier: DEFAULT_MULTIPLIER,
            conflicting_indicators_penalty: DEFAULT_PENALTY,
            conflict_ambiguity_band: DEFAULT_AMBIGUITY_BAND,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_depth: DEFAULT_MAX_DEPTH,
            max_files: DEFAULT_MAX_FILES,
            respect_gitignore: true,
            workers: 0,
            registry: RegistrySource::Builtin,
        }
    }
}

impl DetectorConfig {
    /// Loads defaults and applies `STACKPROBE_*` overrides
    ///
    /// Unset variables keep their default; a set but unparseable value is an error rather
    /// than being silently ignored.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = env_parse("STACKPROBE_CASE_SENSITIVE")? {
            config.case_sensitive = v;
        }
        if let Some(v) = env_parse("STACKPROBE_SAMPLE_MAX_BYTES")? {
            config.content_sampling_max_bytes = v;
        }
        if let Some(v) = env_parse("STACKPROBE_SAMPLE_MAX_LINES")? {
            config.content_sampling_max_lines = v;
        }
        if let Ok(extra) = env::var("STACKPROBE_EXCLUDE") {
            config.exclusions.extend(
                extra
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from),
            );
        }
        if let Some(v) = env_parse("STACKPROBE_THRESHOLD")? {
            config.minimum_confidence_threshold = v;
        }
        if let Some(v) = env_parse("STACKPROBE_CAP")? {
            config.maximum_confidence_cap = v;
        }
        if let Some(v) = env_parse("STACKPROBE_MULTIPLIER")? {
            config.multiple_indicators_multiplier = v;
        }
        if let Some(v) = env_parse("STACKPROBE_PENALTY")? {
            config.conflicting_indicators_penalty = v;
        }
        if let Some(v) = env_parse("STACKPROBE_AMBIGUITY_BAND")? {
            config.conflict_ambiguity_band = v;
        }
        if let Some(v) = env_parse("STACKPROBE_MAX_FILE_SIZE")? {
            config.max_file_size = v;
        }
        if let Some(v) = env_parse("STACKPROBE_MAX_DEPTH")? {
            config.max_depth = v;
        }
        if let Some(v) = env_parse("STACKPROBE_MAX_FILES")? {
            config.max_files = v;
        }
        if let Some(v) = env_parse("STACKPROBE_RESPECT_GITIGNORE")? {
            config.respect_gitignore = v;
        }
        if let Some(v) = env_parse("STACKPROBE_WORKERS")? {
            config.workers = v;
        }
        if let Ok(path) = env::var("STACKPROBE_RULES") {
            if !path.trim().is_empty() {
                config.registry = RegistrySource::Path(PathBuf::from(path));
            }
        }

        Ok(config)
    }

    /// Validates the configuration
    ///
    /// Checks that:
    /// - Confidence values are in `[0, 1]` and the threshold does not exceed the cap
    /// - The multiplier is at least 1 and the penalty is in `(0, 1]`
    /// - Sampling and traversal limits are non-zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("minimum_confidence_threshold", self.minimum_confidence_threshold),
            ("maximum_confidence_cap", self.maximum_confidence_cap),
            ("conflict_ambiguity_band", self.conflict_ambiguity_band),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} must be between 0 and 1, got {}",
                    name, value
                )));
            }
        }

        if self.minimum_confidence_threshold > self.maximum_confidence_cap {
            return Err(ConfigError::ValidationFailed(format!(
                "Threshold {} exceeds confidence cap {}",
                self.minimum_confidence_threshold, self.maximum_confidence_cap
            )));
        }

        if !(self.multiple_indicators_multiplier >= 1.0
            && self.multiple_indicators_multiplier.is_finite())
        {
            return Err(ConfigError::ValidationFailed(format!(
                "Multiple-indicator multiplier must be at least 1, got {}",
                self.multiple_indicators_multiplier
            )));
        }

        if !(self.conflicting_indicators_penalty > 0.0 && self.conflicting_indicators_penalty <= 1.0)
        {
            return Err(ConfigError::ValidationFailed(format!(
                "Conflicting-indicator penalty must be in (0, 1], got {}",
                self.conflicting_indicators_penalty
            )));
        }

        if self.content_sampling_max_bytes == 0 || self.content_sampling_max_lines == 0 {
            return Err(ConfigError::ValidationFailed(
                "Content sampling limits must be greater than zero".to_string(),
            ));
        }

        if self.max_depth == 0 {
            return Err(ConfigError::ValidationFailed(
                "Max depth must be at least 1".to_string(),
            ));
        }

        if self.max_files == 0 {
            return Err(ConfigError::ValidationFailed(
                "Max files must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

impl fmt::Display for DetectorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Detector Configuration:")?;
        writeln!(f, "  Rules: {}", self.registry)?;
        writeln!(f, "  Case Sensitive: {}", self.case_sensitive)?;
        writeln!(
            f,
            "  Content Sample: {} bytes / {} lines",
            self.content_sampling_max_bytes, self.content_sampling_max_lines
        )?;
        writeln!(f, "  Threshold: {}", self.minimum_confidence_threshold)?;
        writeln!(f, "  Cap: {}", self.maximum_confidence_cap)?;
        writeln!(f, "  Multiplier: {}", self.multiple_indicators_multiplier)?;
        writeln!(
            f,
            "  Penalty: {} (band {})",
            self.conflicting_indicators_penalty, self.conflict_ambiguity_band
        )?;
        writeln!(f, "  Max File Size: {} bytes", self.max_file_size)?;
        writeln!(f, "  Max Depth: {}", self.max_depth)?;
        writeln!(f, "  Max Files: {}", self.max_files)?;
        writeln!(f, "  Respect .gitignore: {}", self.respect_gitignore)?;
        writeln!(f, "  Workers: {}", self.workers)?;
        writeln!(f, "  Exclusions: {}", self.exclusions.len())?;
        Ok(())
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::ParseError {
                field: key.to_string(),
                error: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    /// Helper to temporarily set environment variables for testing
    struct EnvGuard {
        key: String,
        old_value: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let old_value = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                old_value,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.old_value {
                Some(v) => env::set_var(&self.key, v),
                None => env::remove_var(&self.key),
            }
        }
    }

    #[test]
    fn test_default_configuration() {
        let config = DetectorConfig::default();

        assert!(!config.case_sensitive);
        assert_eq!(config.minimum_confidence_threshold, DEFAULT_THRESHOLD);
        assert_eq!(config.maximum_confidence_cap, DEFAULT_CAP);
        assert_eq!(config.multiple_indicators_multiplier, DEFAULT_MULTIPLIER);
        assert_eq!(config.conflicting_indicators_penalty, DEFAULT_PENALTY);
        assert_eq!(config.workers, 0);
        assert_eq!(config.registry, RegistrySource::Builtin);
        assert!(config.exclusions.iter().any(|e| e == "**/node_modules"));
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_environment_variable_parsing() {
        let _guards = vec![
            EnvGuard::set("STACKPROBE_CASE_SENSITIVE", "true"),
            EnvGuard::set("STACKPROBE_THRESHOLD", "0.5"),
            EnvGuard::set("STACKPROBE_WORKERS", "4"),
            EnvGuard::set("STACKPROBE_MAX_FILES", "100"),
            EnvGuard::set("STACKPROBE_EXCLUDE", "fixtures/**, docs"),
            EnvGuard::set("STACKPROBE_RULES", "/etc/stackprobe/rules.yaml"),
        ];

        let config = DetectorConfig::from_env().unwrap();

        assert!(config.case_sensitive);
        assert_eq!(config.minimum_confidence_threshold, 0.5);
        assert_eq!(config.workers, 4);
        assert_eq!(config.max_files, 100);
        assert!(config.exclusions.iter().any(|e| e == "fixtures/**"));
        assert!(config.exclusions.iter().any(|e| e == "docs"));
        assert_eq!(
            config.registry,
            RegistrySource::Path(PathBuf::from("/etc/stackprobe/rules.yaml"))
        );
    }

    #[test]
    #[serial]
    fn test_environment_parse_error() {
        let _guard = EnvGuard::set("STACKPROBE_MAX_DEPTH", "deep");

        let result = DetectorConfig::from_env();
        assert!(matches!(
            result,
            Err(ConfigError::ParseError { ref field, .. }) if field == "STACKPROBE_MAX_DEPTH"
        ));
    }

    #[test]
    fn test_configuration_validation_threshold_above_cap() {
        let config = DetectorConfig {
            minimum_confidence_threshold: 0.97,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_configuration_validation_out_of_range() {
        let config = DetectorConfig {
            maximum_confidence_cap: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = DetectorConfig {
            multiple_indicators_multiplier: 0.9,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = DetectorConfig {
            conflicting_indicators_penalty: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = DetectorConfig {
            max_files: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_display() {
        let config = DetectorConfig::default();
        let display = format!("{}", config);
        assert!(display.contains("Detector Configuration:"));
        assert!(display.contains("Rules: builtin"));
    }
}
