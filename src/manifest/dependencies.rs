//! Declared-dependency extraction per manifest type
//!
//! Each parser returns the dependency names a manifest declares. Names are what the
//! ecosystem uses to refer to a package: npm and composer package names, PyPI
//! distributions, crate names, Go module paths, gem names, and for Maven/Gradle both
//! `group:artifact` and the bare `artifact`.

use regex::Regex;
use std::collections::BTreeSet;

pub trait DependencyParser: Send + Sync {
    fn parse(&self, content: &str) -> BTreeSet<String>;
}

/// Object-valued keys of a JSON manifest (`dependencies`, `require`, ...)
pub struct JsonDependencyParser {
    pub dependencies_keys: &'static [&'static str],
}

impl DependencyParser for JsonDependencyParser {
    fn parse(&self, content: &str) -> BTreeSet<String> {
        let parsed: serde_json::Value = match serde_json::from_str(content) {
            Ok(v) => v,
            Err(_) => return BTreeSet::new(),
        };

        self.dependencies_keys
            .iter()
            .filter_map(|key| parsed.get(key).and_then(|v| v.as_object()))
            .flat_map(|deps| deps.keys().cloned())
            .collect()
    }
}

/// Table-valued sections of a TOML manifest, addressed by dotted path
///
/// Array-valued sections (`project.dependencies`) hold PEP 508 requirement strings.
pub struct TomlDependencyParser {
    pub dependencies_keys: &'static [&'static str],
}

impl DependencyParser for TomlDependencyParser {
    fn parse(&self, content: &str) -> BTreeSet<String> {
        let parsed: toml::Value = match toml::from_str(content) {
            Ok(v) => v,
            Err(_) => return BTreeSet::new(),
        };

        let mut names = BTreeSet::new();
        for key in self.dependencies_keys {
            let section = key
                .split('.')
                .try_fold(&parsed, |current, segment| current.get(segment));

            match section {
                Some(toml::Value::Table(table)) => {
                    names.extend(table.keys().cloned());
                }
                Some(toml::Value::Array(items)) => {
                    names.extend(
                        items
                            .iter()
                            .filter_map(|v| v.as_str())
                            .filter_map(requirement_name),
                    );
                }
                _ => {}
            }
        }

        // Inline tables under optional-dependencies group several lists
        if let Some(toml::Value::Table(groups)) = parsed
            .get("project")
            .and_then(|p| p.get("optional-dependencies"))
        {
            for items in groups.values().filter_map(|v| v.as_array()) {
                names.extend(
                    items
                        .iter()
                        .filter_map(|v| v.as_str())
                        .filter_map(requirement_name),
                );
            }
        }

        // Cargo renames: `web = { package = "actix-web" }`
        for key in self.dependencies_keys {
            if let Some(toml::Value::Table(table)) = parsed.get(*key) {
                names.extend(
                    table
                        .values()
                        .filter_map(|v| v.get("package"))
                        .filter_map(|v| v.as_str())
                        .map(String::from),
                );
            }
        }

        names
    }
}

/// One dependency per matching line; capture group 1 is the name
pub struct RegexDependencyParser {
    pub line_pattern: Regex,
    /// Lines starting with this prefix are skipped
    pub comment_prefix: &'static str,
}

impl DependencyParser for RegexDependencyParser {
    fn parse(&self, content: &str) -> BTreeSet<String> {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with(self.comment_prefix))
            .filter_map(|line| self.line_pattern.captures(line))
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .collect()
    }
}

/// `go.mod`: single-line `require` and `require ( ... )` blocks
pub struct GoModParser;

impl DependencyParser for GoModParser {
    fn parse(&self, content: &str) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        let mut in_block = false;

        for line in content.lines() {
            let line = line.split("//").next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            if in_block {
                if line.starts_with(')') {
                    in_block = false;
                } else if let Some(module) = line.split_whitespace().next() {
                    names.insert(module.to_string());
                }
            } else if let Some(rest) = line.strip_prefix("require") {
                let rest = rest.trim();
                if rest.starts_with('(') {
                    in_block = true;
                } else if let Some(module) = rest.split_whitespace().next() {
                    names.insert(module.to_string());
                }
            }
        }

        names
    }
}

/// `pom.xml` `<dependency>` and `<plugin>` coordinates, plus the `<parent>`
pub struct PomDependencyParser;

impl DependencyParser for PomDependencyParser {
    fn parse(&self, content: &str) -> BTreeSet<String> {
        let doc = match roxmltree::Document::parse(content) {
            Ok(doc) => doc,
            Err(_) => return BTreeSet::new(),
        };

        let mut names = BTreeSet::new();
        for node in doc.descendants().filter(|n| {
            n.is_element() && matches!(n.tag_name().name(), "dependency" | "plugin" | "parent")
        }) {
            let Some(artifact) = child_text(node, "artifactId") else {
                continue;
            };
            if let Some(group) = child_text(node, "groupId") {
                names.insert(format!("{}:{}", group, artifact));
            }
            names.insert(artifact);
        }
        names
    }
}

fn child_text(node: roxmltree::Node<'_, '_>, name: &str) -> Option<String> {
    node.children()
        .find(|c| c.is_element() && c.tag_name().name() == name)
        .and_then(|c| c.text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Gradle `"group:artifact:version"` coordinates in either DSL
pub struct GradleDependencyParser {
    coordinate: Regex,
}

impl GradleDependencyParser {
    fn new() -> Self {
        Self {
            coordinate: Regex::new(r#"["']([\w.\-]+):([\w.\-]+)(?::[^"']*)?["']"#)
                .expect("valid regex"),
        }
    }
}

impl DependencyParser for GradleDependencyParser {
    fn parse(&self, content: &str) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for caps in self.coordinate.captures_iter(content) {
            let group = &caps[1];
            let artifact = &caps[2];
            names.insert(format!("{}:{}", group, artifact));
            names.insert(artifact.to_string());
        }
        names
    }
}

/// .NET project `<PackageReference Include="...">`
pub struct PackageReferenceParser;

impl DependencyParser for PackageReferenceParser {
    fn parse(&self, content: &str) -> BTreeSet<String> {
        let doc = match roxmltree::Document::parse(content) {
            Ok(doc) => doc,
            Err(_) => return BTreeSet::new(),
        };

        doc.descendants()
            .filter(|n| n.is_element() && n.tag_name().name() == "PackageReference")
            .filter_map(|n| n.attribute("Include").or_else(|| n.attribute("Update")))
            .map(String::from)
            .collect()
    }
}

/// Name part of a PEP 508 requirement (`Django[argon2]>=4.2; python_version>"3.8"`)
fn requirement_name(requirement: &str) -> Option<String> {
    let end = requirement
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'))
        .unwrap_or(requirement.len());
    let name = requirement[..end].trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// The set of known manifest parsers, selected by file name
pub struct DependencyParsers {
    package_json: JsonDependencyParser,
    composer_json: JsonDependencyParser,
    requirements: RegexDependencyParser,
    pyproject: TomlDependencyParser,
    pipfile: TomlDependencyParser,
    cargo: TomlDependencyParser,
    go_mod: GoModParser,
    gemfile: RegexDependencyParser,
    pom: PomDependencyParser,
    gradle: GradleDependencyParser,
    dotnet: PackageReferenceParser,
    mix: RegexDependencyParser,
}

impl DependencyParsers {
    pub fn new() -> Self {
        let line = |pattern: &str, comment_prefix: &'static str| RegexDependencyParser {
            line_pattern: Regex::new(pattern).expect("valid regex"),
            comment_prefix,
        };

        Self {
            package_json: JsonDependencyParser {
                dependencies_keys: &[
                    "dependencies",
                    "devDependencies",
                    "peerDependencies",
                    "optionalDependencies",
                ],
            },
            composer_json: JsonDependencyParser {
                dependencies_keys: &["require", "require-dev"],
            },
            requirements: line(r"^([A-Za-z0-9][A-Za-z0-9._\-]*)", "#"),
            pyproject: TomlDependencyParser {
                dependencies_keys: &[
                    "project.dependencies",
                    "tool.poetry.dependencies",
                    "tool.poetry.dev-dependencies",
                    "tool.poetry.group.dev.dependencies",
                ],
            },
            pipfile: TomlDependencyParser {
                dependencies_keys: &["packages", "dev-packages"],
            },
            cargo: TomlDependencyParser {
                dependencies_keys: &[
                    "dependencies",
                    "dev-dependencies",
                    "build-dependencies",
                    "workspace.dependencies",
                ],
            },
            go_mod: GoModParser,
            gemfile: line(r#"^gem\s+["']([^"']+)["']"#, "#"),
            pom: PomDependencyParser,
            gradle: GradleDependencyParser::new(),
            dotnet: PackageReferenceParser,
            mix: line(r"\{\s*:([a-z0-9_]+)\s*,", "#"),
        }
    }

    /// Parser for a manifest file name, if the file declares dependencies
    pub fn parser_for(&self, file_name: &str) -> Option<&dyn DependencyParser> {
        let lower = file_name.to_lowercase();
        let parser: &dyn DependencyParser = match lower.as_str() {
            "package.json" => &self.package_json,
            "composer.json" => &self.composer_json,
            "pyproject.toml" => &self.pyproject,
            "pipfile" => &self.pipfile,
            "cargo.toml" => &self.cargo,
            "go.mod" => &self.go_mod,
            "gemfile" => &self.gemfile,
            "pom.xml" => &self.pom,
            "build.gradle" | "build.gradle.kts" => &self.gradle,
            "mix.exs" => &self.mix,
            name if name.starts_with("requirements") && name.ends_with(".txt") => {
                &self.requirements
            }
            name if name.ends_with(".csproj")
                || name.ends_with(".fsproj")
                || name.ends_with(".vbproj") =>
            {
                &self.dotnet
            }
            _ => return None,
        };
        Some(parser)
    }

    /// Declared dependencies, normalized for comparison with registry indicators
    pub fn dependencies(
        &self,
        file_name: &str,
        content: &str,
        case_sensitive: bool,
    ) -> Option<BTreeSet<String>> {
        let parser = self.parser_for(file_name)?;
        let names = parser.parse(content);
        Some(if case_sensitive {
            names
        } else {
            names.into_iter().map(|n| n.to_lowercase()).collect()
        })
    }
}

impl Default for DependencyParsers {
    fn default() -> Self {
        Self::new()
    }
}
