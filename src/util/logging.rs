//! Structured logging setup for stackprobe
//!
//! Initializes a `tracing` subscriber writing to stderr, so that detection output on stdout
//! stays machine-readable. Supports pretty or JSON output and `RUST_LOG` filtering.
//!
//! # Example
//!
//! ```no_run
//! use stackprobe::util::logging;
//!
//! // Initialize from STACKPROBE_LOG_LEVEL / STACKPROBE_LOG_JSON
//! logging::init_from_env();
//!
//! use tracing::{debug, info};
//! info!("Application started");
//! debug!(root = "/srv/app", "Scanning project");
//! ```

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Ensures logging is only initialized once
static INIT: Once = Once::new();

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum log level for stackprobe's own events
    pub level: Level,

    /// Use JSON output format
    pub use_json: bool,

    /// Include the module target (e.g., stackprobe::scanner) in logs
    pub include_target: bool,

    /// Include file and line number information
    pub include_location: bool,

    /// Include thread ID and name in logs; useful when following matcher workers
    pub include_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            use_json: false,
            include_target: true,
            include_location: false,
            include_thread_ids: false,
        }
    }
}

/// Parses a log level from a string
///
/// Unknown values fall back to `Level::WARN` with a notice on stderr.
///
/// ```
/// use stackprobe::util::logging::parse_level;
/// use tracing::Level;
///
/// assert_eq!(parse_level("debug"), Level::DEBUG);
/// assert_eq!(parse_level("INFO"), Level::INFO);
/// assert_eq!(parse_level("invalid"), Level::WARN);
/// ```
pub fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to WARN. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::WARN
        }
    }
}

/// Initializes the logging system; later calls are ignored
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let mut filter = EnvFilter::from_default_env();
        if let Ok(directive) = format!("stackprobe={}", config.level).parse() {
            filter = filter.add_directive(directive);
        }

        // The walker is chatty at debug level
        if env::var("RUST_LOG").is_err() {
            for quiet in ["ignore=warn", "globset=warn"] {
                if let Ok(directive) = quiet.parse() {
                    filter = filter.add_directive(directive);
                }
            }
        }

        if config.use_json {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_thread_ids(config.include_thread_ids)
                        .with_thread_names(config.include_thread_ids),
                )
                .init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_thread_ids(config.include_thread_ids)
                        .with_thread_names(config.include_thread_ids),
                )
                .init();
        }
    });
}

/// Initializes logging from environment variables
///
/// This reads configuration from:
/// - `STACKPROBE_LOG_LEVEL` - Log level (trace, debug, info, warn, error)
/// - `STACKPROBE_LOG_JSON` - Use JSON output (true/false)
/// - `RUST_LOG` - Standard Rust log filtering
pub fn init_from_env() {
    init_logging(config_from_env());
}

/// Reads `STACKPROBE_LOG_LEVEL` and `STACKPROBE_LOG_JSON` without initializing anything
pub fn config_from_env() -> LoggingConfig {
    let level = env::var("STACKPROBE_LOG_LEVEL")
        .map(|s| parse_level(&s))
        .unwrap_or(Level::WARN);

    let use_json = env::var("STACKPROBE_LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    LoggingConfig {
        level,
        use_json,
        ..Default::default()
    }
}
