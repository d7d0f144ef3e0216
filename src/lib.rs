//! stackprobe - heuristic technology-stack detection
//!
//! Given a project directory, stackprobe infers which languages, frameworks, databases,
//! build systems, container tooling, test frameworks and platforms are in use, each with a
//! calibrated confidence score, plus best-effort version metadata.
//!
//! # Core Concepts
//!
//! - **Rules**: declarative detection rules loaded from a versioned YAML registry
//!   ([`registry`]); a default registry is compiled in
//! - **Signals**: individual pieces of evidence produced by matching files against rules
//!   ([`matcher`])
//! - **Scores**: signals are aggregated per candidate, penalized when mutually exclusive
//!   candidates compete, thresholded and ranked ([`aggregate`], [`resolve`])
//!
//! # Example Usage
//!
//! ```no_run
//! use stackprobe::{detect, Category, DetectorConfig};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), stackprobe::DetectError> {
//! let result = detect(Path::new("."), &DetectorConfig::default())?;
//!
//! if let Some(framework) = result.top(Category::Framework) {
//!     println!("{} ({:.2})", framework.candidate, framework.confidence);
//! }
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod detection;
pub mod error;
pub mod extract;
pub mod manifest;
pub mod matcher;
pub mod registry;
pub mod resolve;
pub mod scanner;
pub mod util;

pub use aggregate::{aggregate, Aggregator, CategoryScore};
pub use config::{ConfigError, DetectorConfig};
pub use detection::{detect, DetectionResult, Detector, ScanStats};
pub use error::DetectError;
pub use extract::VersionInfo;
pub use matcher::{Matcher, Signal};
pub use registry::{Category, RegistrySource, RuleSet, Tier};
pub use resolve::RankedCandidate;
pub use scanner::{CancellationToken, FileDescriptor, Scanner};
pub use util::{init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
