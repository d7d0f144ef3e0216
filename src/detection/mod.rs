//! Detection pipeline orchestration and result types

pub mod detector;
pub mod types;

pub use detector::{detect, Detector};
pub use types::{DetectionResult, ScanStats};
