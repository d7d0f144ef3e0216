//! Structured manifest access
//!
//! Manifests are parsed by file extension (JSON, TOML, YAML, XML) and queried by
//! slash-separated field paths. Dependency extraction for the ecosystems the registry knows
//! about lives in [`dependencies`].

pub mod dependencies;

pub use dependencies::{DependencyParser, DependencyParsers};

use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Json,
    Toml,
    Yaml,
    Xml,
}

impl ManifestFormat {
    /// Format implied by a file name, if it is a structured document at all
    pub fn for_file_name(file_name: &str) -> Option<Self> {
        let lower = file_name.to_lowercase();
        if lower == "pipfile" {
            return Some(ManifestFormat::Toml);
        }
        let extension = Path::new(&lower).extension()?.to_str()?.to_string();
        match extension.as_str() {
            "json" => Some(ManifestFormat::Json),
            "toml" => Some(ManifestFormat::Toml),
            "yaml" | "yml" => Some(ManifestFormat::Yaml),
            "xml" | "pom" | "csproj" | "fsproj" | "vbproj" | "props" => Some(ManifestFormat::Xml),
            _ => None,
        }
    }
}

/// A parsed manifest
#[derive(Debug, Clone)]
pub enum ManifestDocument {
    Json(serde_json::Value),
    Toml(toml::Value),
    Yaml(serde_yaml::Value),
    /// XML is kept as text; `roxmltree` documents borrow their input
    Xml(String),
}

impl ManifestDocument {
    /// Parses `text` according to the format implied by `file_name`
    ///
    /// Returns `None` for unstructured files and for documents that fail to parse.
    pub fn parse(file_name: &str, text: &str) -> Option<Self> {
        match ManifestFormat::for_file_name(file_name)? {
            ManifestFormat::Json => serde_json::from_str(text).ok().map(ManifestDocument::Json),
            ManifestFormat::Toml => toml::from_str(text).ok().map(ManifestDocument::Toml),
            ManifestFormat::Yaml => serde_yaml::from_str(text).ok().map(ManifestDocument::Yaml),
            ManifestFormat::Xml => roxmltree::Document::parse(text)
                .ok()
                .map(|_| ManifestDocument::Xml(text.to_string())),
        }
    }

    pub fn format(&self) -> ManifestFormat {
        match self {
            ManifestDocument::Json(_) => ManifestFormat::Json,
            ManifestDocument::Toml(_) => ManifestFormat::Toml,
            ManifestDocument::Yaml(_) => ManifestFormat::Yaml,
            ManifestDocument::Xml(_) => ManifestFormat::Xml,
        }
    }

    /// True if the path resolves to any value, scalar or nested
    pub fn has_field(&self, path: &[String]) -> bool {
        if path.is_empty() {
            return false;
        }
        match self {
            ManifestDocument::Json(value) => json_get(value, path).is_some(),
            ManifestDocument::Toml(value) => toml_get(value, path).is_some(),
            ManifestDocument::Yaml(value) => yaml_get(value, path).is_some(),
            ManifestDocument::Xml(text) => xml_text(text, path).is_some(),
        }
    }

    /// Scalar value at `path`, rendered as a string
    ///
    /// For XML the first segment names the root element
    /// (`project/properties/java.version`).
    pub fn lookup(&self, path: &[String]) -> Option<String> {
        if path.is_empty() {
            return None;
        }
        let value = match self {
            ManifestDocument::Json(value) => match json_get(value, path)? {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                _ => return None,
            },
            ManifestDocument::Toml(value) => match toml_get(value, path)? {
                toml::Value::String(s) => s.clone(),
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                toml::Value::Datetime(d) => d.to_string(),
                // `python = { version = "^3.11" }` style entries
                toml::Value::Table(table) => table.get("version")?.as_str()?.to_string(),
                toml::Value::Array(_) => return None,
            },
            ManifestDocument::Yaml(value) => match yaml_get(value, path)? {
                serde_yaml::Value::String(s) => s.clone(),
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                _ => return None,
            },
            ManifestDocument::Xml(text) => xml_text(text, path)?,
        };

        let value = value.trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }
}

fn json_get<'a>(value: &'a serde_json::Value, path: &[String]) -> Option<&'a serde_json::Value> {
    path.iter().try_fold(value, |current, key| match current {
        serde_json::Value::Object(map) => map.get(key),
        serde_json::Value::Array(items) => items.get(key.parse::<usize>().ok()?),
        _ => None,
    })
}

fn toml_get<'a>(value: &'a toml::Value, path: &[String]) -> Option<&'a toml::Value> {
    path.iter().try_fold(value, |current, key| match current {
        toml::Value::Table(table) => table.get(key),
        toml::Value::Array(items) => items.get(key.parse::<usize>().ok()?),
        _ => None,
    })
}

fn yaml_get<'a>(value: &'a serde_yaml::Value, path: &[String]) -> Option<&'a serde_yaml::Value> {
    path.iter().try_fold(value, |current, key| match current {
        serde_yaml::Value::Mapping(map) => map.get(key.as_str()),
        serde_yaml::Value::Sequence(items) => items.get(key.parse::<usize>().ok()?),
        _ => None,
    })
}

/// Text of the element at `path`; namespaces are ignored
fn xml_text(text: &str, path: &[String]) -> Option<String> {
    let doc = roxmltree::Document::parse(text).ok()?;
    let (first, rest) = path.split_first()?;

    let mut node = doc.root_element();
    if node.tag_name().name() != first {
        return None;
    }
    for segment in rest {
        node = node
            .children()
            .find(|child| child.is_element() && child.tag_name().name() == segment)?;
    }

    Some(
        node.descendants()
            .filter(|n| n.is_text())
            .filter_map(|n| n.text())
            .collect::<String>(),
    )
}
