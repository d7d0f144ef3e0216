//! Exclusion globs applied while walking the project tree

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::config::ConfigError;

/// Compiled exclusion patterns
///
/// A pattern without `/` is matched against the entry name at any depth (`node_modules`,
/// `*.min.js`); a pattern with `/` is matched against the root-relative path
/// (`fixtures/**`, `**/bin/Debug`).
#[derive(Debug, Clone)]
pub struct ExclusionSet {
    names: GlobSet,
    paths: GlobSet,
}

impl ExclusionSet {
    pub fn new(patterns: &[String], case_sensitive: bool) -> Result<Self, ConfigError> {
        let mut names = GlobSetBuilder::new();
        let mut paths = GlobSetBuilder::new();

        for pattern in patterns {
            let pattern = pattern.trim().trim_end_matches('/');
            if pattern.is_empty() {
                continue;
            }
            let glob = GlobBuilder::new(pattern)
                .case_insensitive(!case_sensitive)
                .literal_separator(true)
                .build()
                .map_err(|e| {
                    ConfigError::ValidationFailed(format!(
                        "Invalid exclusion pattern '{}': {}",
                        pattern, e
                    ))
                })?;
            if pattern.contains('/') {
                paths.add(glob);
            } else {
                names.add(glob);
            }
        }

        let build = |builder: GlobSetBuilder| {
            builder
                .build()
                .map_err(|e| ConfigError::ValidationFailed(format!("Invalid exclusions: {}", e)))
        };

        Ok(Self {
            names: build(names)?,
            paths: build(paths)?,
        })
    }

    pub fn is_excluded(&self, relative_path: &str, name: &str) -> bool {
        self.names.is_match(name) || self.paths.is_match(relative_path)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.paths.is_empty()
    }
}
