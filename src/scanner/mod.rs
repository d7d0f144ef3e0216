//! Filesystem scanner
//!
//! Walks the project tree with the `ignore` walker and yields one [`FileDescriptor`] per
//! regular file. Excluded directories are pruned before descent, symlinks are followed with
//! a seen-set of canonical directories guarding against cycles, and the walk stops early on
//! the file limit or on cancellation.

mod exclusions;

pub use exclusions::ExclusionSet;

use crate::config::DetectorConfig;
use crate::error::DetectError;
use ignore::WalkBuilder;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Shared flag a caller flips to stop a running detection
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A file discovered by the scanner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub path: PathBuf,
    /// Root-relative, `/`-separated
    pub relative_path: String,
    pub size: u64,
    /// Lowercased, without the dot
    pub extension: Option<String>,
    /// False when the file exceeds `max_file_size`; existence rules still apply
    pub content_eligible: bool,
}

impl FileDescriptor {
    pub fn file_name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub exclusions: Vec<String>,
    pub max_file_size: u64,
    pub max_depth: usize,
    pub max_files: usize,
    pub respect_gitignore: bool,
    pub case_sensitive: bool,
}

impl From<&DetectorConfig> for ScanOptions {
    fn from(config: &DetectorConfig) -> Self {
        Self {
            exclusions: config.exclusions.clone(),
            max_file_size: config.max_file_size,
            max_depth: config.max_depth,
            max_files: config.max_files,
            respect_gitignore: config.respect_gitignore,
            case_sensitive: config.case_sensitive,
        }
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::from(&DetectorConfig::default())
    }
}

pub struct Scanner {
    root: PathBuf,
    options: ScanOptions,
    exclusions: Arc<ExclusionSet>,
}

impl Scanner {
    pub fn new(root: &Path, options: ScanOptions) -> Result<Self, DetectError> {
        if !root.exists() {
            return Err(DetectError::RootNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(DetectError::NotADirectory(root.to_path_buf()));
        }

        let root = root
            .canonicalize()
            .map_err(|_| DetectError::RootNotFound(root.to_path_buf()))?;

        let exclusions = ExclusionSet::new(&options.exclusions, options.case_sensitive)?;

        debug!(
            root = %root.display(),
            exclusions = options.exclusions.len(),
            "Scanner initialized"
        );

        Ok(Self {
            root,
            options,
            exclusions: Arc::new(exclusions),
        })
    }

    /// Canonical project root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Starts a walk; descriptors are produced lazily as the iterator is advanced
    pub fn scan(&self, cancel: &CancellationToken) -> ScanIter {
        info!(
            root = %self.root.display(),
            max_depth = self.options.max_depth,
            max_files = self.options.max_files,
            "Starting scan"
        );

        let seen = Arc::new(Mutex::new(HashSet::from([self.root.clone()])));
        let filter_root = self.root.clone();
        let exclusions = Arc::clone(&self.exclusions);

        let walk = WalkBuilder::new(&self.root)
            .max_depth(Some(self.options.max_depth))
            .follow_links(true)
            .hidden(false)
            .parents(false)
            .ignore(self.options.respect_gitignore)
            .git_ignore(self.options.respect_gitignore)
            .git_exclude(self.options.respect_gitignore)
            .git_global(false)
            .require_git(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                if entry.depth() == 0 {
                    return true;
                }
                let relative = relative_path(&filter_root, entry.path());
                let name = entry.file_name().to_string_lossy();
                if exclusions.is_excluded(&relative, &name) {
                    debug!(path = %relative, "Skipping excluded entry");
                    return false;
                }
                if entry.file_type().map_or(false, |t| t.is_dir()) {
                    return first_visit(&seen, entry.path(), &relative);
                }
                true
            })
            .build();

        ScanIter {
            walk,
            root: self.root.clone(),
            max_file_size: self.options.max_file_size,
            max_files: self.options.max_files,
            cancel: cancel.clone(),
            emitted: 0,
            warnings: 0,
            truncated: false,
            cancelled: false,
            finished: false,
        }
    }
}

/// Iterator over the files of one walk, with counters readable once it is exhausted
pub struct ScanIter {
    walk: ignore::Walk,
    root: PathBuf,
    max_file_size: u64,
    max_files: usize,
    cancel: CancellationToken,
    emitted: usize,
    warnings: usize,
    truncated: bool,
    cancelled: bool,
    finished: bool,
}

impl ScanIter {
    pub fn files_emitted(&self) -> usize {
        self.emitted
    }

    /// Entries skipped because they could not be read
    pub fn warnings(&self) -> usize {
        self.warnings
    }

    /// True once the walk stopped on the `max_files` limit
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    fn finish(&mut self) -> Option<FileDescriptor> {
        if !self.finished {
            self.finished = true;
            info!(
                files = self.emitted,
                warnings = self.warnings,
                truncated = self.truncated,
                cancelled = self.cancelled,
                "Scan completed"
            );
        }
        None
    }
}

impl Iterator for ScanIter {
    type Item = FileDescriptor;

    fn next(&mut self) -> Option<FileDescriptor> {
        if self.finished {
            return None;
        }

        loop {
            if self.cancel.is_cancelled() {
                self.cancelled = true;
                return self.finish();
            }

            let entry = match self.walk.next() {
                Some(Ok(entry)) => entry,
                Some(Err(err)) => {
                    self.warnings += 1;
                    warn!(error = %err, "Failed to read directory entry");
                    continue;
                }
                None => return self.finish(),
            };

            if !entry.file_type().map_or(false, |t| t.is_file()) {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(err) => {
                    self.warnings += 1;
                    warn!(path = %entry.path().display(), error = %err, "Failed to stat file");
                    continue;
                }
            };

            if self.emitted >= self.max_files {
                warn!(
                    files_scanned = self.emitted,
                    max_files = self.max_files,
                    "Reached file limit, stopping scan"
                );
                self.truncated = true;
                return self.finish();
            }
            self.emitted += 1;

            let size = metadata.len();
            let path = entry.into_path();
            let extension = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_lowercase());

            return Some(FileDescriptor {
                relative_path: relative_path(&self.root, &path),
                extension,
                size,
                content_eligible: size <= self.max_file_size,
                path,
            });
        }
    }
}

/// Records a directory's canonical identity; false if it was already visited through
/// another path (symlink alias or cycle)
fn first_visit(seen: &Mutex<HashSet<PathBuf>>, path: &Path, relative: &str) -> bool {
    let canonical = match path.canonicalize() {
        Ok(canonical) => canonical,
        Err(err) => {
            warn!(path = %relative, error = %err, "Failed to resolve directory, skipping");
            return false;
        }
    };

    let Ok(mut seen) = seen.lock() else {
        return true;
    };
    if seen.insert(canonical.clone()) {
        true
    } else {
        warn!(
            path = %relative,
            target = %canonical.display(),
            "Directory already visited through another path, skipping"
        );
        false
    }
}

/// Root-relative, `/`-separated form of `path`
pub fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
