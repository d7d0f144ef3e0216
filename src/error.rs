use crate::config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a detection run
///
/// Unreadable files, broken symlinks and failed version lookups are not errors; they are
/// logged and the run continues with whatever evidence remains.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Project root does not exist: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("Project root is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Failed to start worker pool: {0}")]
    ThreadPool(String),
}
