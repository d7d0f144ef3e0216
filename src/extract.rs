//! Version and metadata extraction for confirmed candidates
//!
//! For a candidate with a version spec, structured field lookups are tried first, then
//! textual patterns, then the declared fallback (marked `inferred`). Lookups read files
//! relative to the project root; a missing file or value is never an error.

use crate::manifest::ManifestDocument;
use crate::registry::{RuleSet, VersionSpec};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Source recorded for declared fallbacks
pub const FALLBACK_SOURCE: &str = "fallback";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub value: String,
    /// `file#field/path`, `file` for pattern matches, or `fallback`
    pub source: String,
    pub inferred: bool,
}

pub struct Extractor<'a> {
    rules: &'a RuleSet,
    max_file_size: u64,
    /// File text per root-relative path; `None` when absent or unreadable
    files: RefCell<HashMap<String, Option<String>>>,
}

impl<'a> Extractor<'a> {
    pub fn new(rules: &'a RuleSet, max_file_size: u64) -> Self {
        Self {
            rules,
            max_file_size,
            files: RefCell::new(HashMap::new()),
        }
    }

    pub fn extract(&self, candidate: &str, root: &Path) -> Option<VersionInfo> {
        let spec = self.rules.version_spec(candidate)?;
        if let Some(info) = self.from_spec(spec, root) {
            debug!(candidate, value = %info.value, source = %info.source, "Extracted version");
            return Some(info);
        }

        match &spec.fallback {
            Some(fallback) => {
                debug!(candidate, value = %fallback, "Using fallback version");
                Some(VersionInfo {
                    value: fallback.clone(),
                    source: FALLBACK_SOURCE.to_string(),
                    inferred: true,
                })
            }
            None => {
                debug!(candidate, "No version found");
                None
            }
        }
    }

    fn from_spec(&self, spec: &VersionSpec, root: &Path) -> Option<VersionInfo> {
        for lookup in &spec.fields {
            let Some(text) = self.read(root, &lookup.file) else {
                continue;
            };
            let file_name = lookup.file.rsplit('/').next().unwrap_or(&lookup.file);
            let value = ManifestDocument::parse(file_name, &text)
                .and_then(|doc| doc.lookup(&lookup.field));
            if let Some(value) = value {
                return Some(VersionInfo {
                    value,
                    source: format!("{}#{}", lookup.file, lookup.field.join("/")),
                    inferred: false,
                });
            }
        }

        for lookup in &spec.patterns {
            let Some(text) = self.read(root, &lookup.file) else {
                continue;
            };
            let value = lookup.pattern.captures(&text).and_then(|caps| {
                caps.get(1)
                    .or_else(|| caps.get(0))
                    .map(|m| m.as_str().trim().to_string())
            });
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                return Some(VersionInfo {
                    value,
                    source: lookup.file.clone(),
                    inferred: false,
                });
            }
        }

        None
    }

    fn read(&self, root: &Path, relative: &str) -> Option<String> {
        let mut files = self.files.borrow_mut();
        files
            .entry(relative.to_string())
            .or_insert_with(|| {
                let path = root.join(relative);
                let metadata = std::fs::metadata(&path).ok()?;
                if !metadata.is_file() || metadata.len() > self.max_file_size {
                    return None;
                }
                std::fs::read_to_string(&path).ok()
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{LoadOptions, RegistrySource};
    use std::fs;
    use tempfile::TempDir;

    const REGISTRY: &str = r#"
version: 1
rules: []
versions:
  python:
    fields:
      - { file: pyproject.toml, field: project/requires-python }
    patterns:
      - { file: .python-version, pattern: '^\s*(\d+\.\d+(?:\.\d+)?)' }
    fallback: "3"
  go:
    patterns:
      - { file: go.mod, pattern: '^go\s+(\d+\.\d+(?:\.\d+)?)' }
  java:
    fields:
      - { file: pom.xml, field: project/properties/java.version }
  angular:
    fields:
      - { file: package.json, field: ["dependencies", "@angular/core"] }
"#;

    fn rules() -> RuleSet {
        RuleSet::load(
            &RegistrySource::Inline(REGISTRY.to_string()),
            &LoadOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_field_lookup_first() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("pyproject.toml"),
            "[project]\nrequires-python = \">=3.11\"\n",
        )
        .unwrap();
        fs::write(dir.path().join(".python-version"), "3.12.1\n").unwrap();

        let rules = rules();
        let info = Extractor::new(&rules, 1 << 20)
            .extract("python", dir.path())
            .unwrap();

        assert_eq!(info.value, ">=3.11");
        assert_eq!(info.source, "pyproject.toml#project/requires-python");
        assert!(!info.inferred);
    }

    #[test]
    fn test_pattern_when_field_missing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".python-version"), "3.12.1\n").unwrap();

        let rules = rules();
        let info = Extractor::new(&rules, 1 << 20)
            .extract("python", dir.path())
            .unwrap();

        assert_eq!(info.value, "3.12.1");
        assert_eq!(info.source, ".python-version");
    }

    #[test]
    fn test_fallback_is_inferred() {
        let dir = TempDir::new().unwrap();
        let rules = rules();
        let info = Extractor::new(&rules, 1 << 20)
            .extract("python", dir.path())
            .unwrap();

        assert_eq!(info.value, "3");
        assert_eq!(info.source, FALLBACK_SOURCE);
        assert!(info.inferred);
    }

    #[test]
    fn test_no_match_without_fallback() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("go.mod"), "module example.com/x\n").unwrap();

        let rules = rules();
        assert!(Extractor::new(&rules, 1 << 20)
            .extract("go", dir.path())
            .is_none());
    }

    #[test]
    fn test_no_spec() {
        let dir = TempDir::new().unwrap();
        let rules = rules();
        assert!(Extractor::new(&rules, 1 << 20)
            .extract("docker", dir.path())
            .is_none());
    }

    #[test]
    fn test_go_mod_pattern() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("go.mod"),
            "module example.com/x\n\ngo 1.22.1\n",
        )
        .unwrap();

        let rules = rules();
        let info = Extractor::new(&rules, 1 << 20)
            .extract("go", dir.path())
            .unwrap();
        assert_eq!(info.value, "1.22.1");
    }

    #[test]
    fn test_xml_and_scoped_json_fields() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("pom.xml"),
            "<project><properties><java.version>21</java.version></properties></project>",
        )
        .unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{"dependencies": {"@angular/core": "^17.1.0"}}"#,
        )
        .unwrap();

        let rules = rules();
        let extractor = Extractor::new(&rules, 1 << 20);
        assert_eq!(extractor.extract("java", dir.path()).unwrap().value, "21");
        assert_eq!(
            extractor.extract("angular", dir.path()).unwrap().value,
            "^17.1.0"
        );
    }

    #[test]
    fn test_oversized_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("go.mod"), "go 1.22\n").unwrap();

        let rules = rules();
        assert!(Extractor::new(&rules, 4).extract("go", dir.path()).is_none());
    }
}
