//! Detection scenarios against the built-in registry

mod support;

use stackprobe::{detect, Category, DetectorConfig};
use support::{project, REACT_PACKAGE_JSON};
use yare::parameterized;

#[test]
fn test_react_package_json() {
    let dir = project(&[("package.json", REACT_PACKAGE_JSON)]);
    let result = detect(dir.path(), &DetectorConfig::default()).unwrap();

    let react = result.top(Category::Framework).unwrap();
    assert_eq!(react.candidate, "react");
    assert!(react.confidence >= 0.9);
    assert_eq!(react.confidence, 0.95);
    assert!(!react.low_confidence);

    let version = result.version("react").unwrap();
    assert_eq!(version.value, "^18.2.0");
    assert_eq!(version.source, "package.json#dependencies/react");
    assert!(!version.inferred);
}

#[test]
fn test_competing_python_frameworks_are_penalized() {
    let both = project(&[("requirements.txt", "flask\ndjango\n")]);
    let result = detect(both.path(), &DetectorConfig::default()).unwrap();

    let names: Vec<&str> = result
        .candidates(Category::Framework)
        .iter()
        .map(|c| c.candidate.as_str())
        .collect();
    assert_eq!(names, vec!["django", "flask"]);

    for name in ["django", "flask"] {
        let alone = project(&[("requirements.txt", name)]);
        let isolated = detect(alone.path(), &DetectorConfig::default()).unwrap();

        let competing = result.confidence(Category::Framework, name).unwrap();
        let single = isolated.confidence(Category::Framework, name).unwrap();
        assert!(
            competing < single,
            "{} should score lower next to a competitor ({} vs {})",
            name,
            competing,
            single
        );
        assert_eq!(competing, 0.64);
    }
}

#[test]
fn test_dockerfile_and_compose_reach_cap() {
    let dir = project(&[
        ("Dockerfile", "FROM python:3.12-slim\nCOPY . /app\n"),
        (
            "docker-compose.yml",
            "services:\n  web:\n    build: .\n    ports:\n      - \"8000:8000\"\n",
        ),
    ]);
    let result = detect(dir.path(), &DetectorConfig::default()).unwrap();

    let docker = result.top(Category::Container).unwrap();
    assert_eq!(docker.candidate, "docker");
    assert_eq!(docker.confidence, 0.95);
    assert_eq!(docker.evidence_count, 2);

    let version = result.version("docker").unwrap();
    assert_eq!(version.value, "python:3.12-slim");
    assert_eq!(version.source, "Dockerfile");
}

#[test]
fn test_empty_directory() {
    let dir = project(&[]);
    let result = detect(dir.path(), &DetectorConfig::default()).unwrap();

    assert!(result.is_empty());
    assert!(result.versions.is_empty());
    assert_eq!(result.stats.files_scanned, 0);
    assert_eq!(result.stats.signals, 0);

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["categories"], serde_json::json!({}));
}

#[parameterized(
    rust_axum = {
        "Cargo.toml",
        "[package]\nname = \"svc\"\nversion = \"0.1.0\"\nrust-version = \"1.75\"\n\n[dependencies]\naxum = \"0.7\"\ntokio = { version = \"1\", features = [\"full\"] }\n",
        "rust", "axum", "cargo",
    },
    go_gin = {
        "go.mod",
        "module example.com/app\n\ngo 1.22\n\nrequire (\n\tgithub.com/gin-gonic/gin v1.9.1\n)\n",
        "go", "gin", "go-modules",
    },
    ruby_rails = {
        "Gemfile",
        "source 'https://rubygems.org'\nruby '3.2.2'\n\ngem 'rails', '~> 7.1'\ngem 'puma'\n",
        "ruby", "rails", "bundler",
    },
    php_laravel = {
        "composer.json",
        "{\"require\": {\"php\": \"^8.2\", \"laravel/framework\": \"^11.0\"}}\n",
        "php", "laravel", "composer",
    },
    elixir_phoenix = {
        "mix.exs",
        "defmodule App.MixProject do\n  def project do\n    [app: :app, elixir: \"~> 1.15\", deps: deps()]\n  end\n\n  defp deps do\n    [\n      {:phoenix, \"~> 1.7\"},\n      {:jason, \"~> 1.2\"}\n    ]\n  end\nend\n",
        "elixir", "phoenix", "mix",
    },
)]
fn test_single_ecosystem(file: &str, content: &str, language: &str, framework: &str, build: &str) {
    let dir = project(&[(file, content)]);
    let result = detect(dir.path(), &DetectorConfig::default()).unwrap();

    assert_eq!(result.top(Category::Language).unwrap().candidate, language);
    assert_eq!(result.top(Category::Framework).unwrap().candidate, framework);
    assert_eq!(result.top(Category::BuildSystem).unwrap().candidate, build);
    assert!(result.version(language).is_some());
}

#[test]
fn test_maven_project_with_spring_boot() {
    let pom = r#"<?xml version="1.0" encoding="UTF-8"?>
<project xmlns="http://maven.apache.org/POM/4.0.0">
  <modelVersion>4.0.0</modelVersion>
  <parent>
    <groupId>org.springframework.boot</groupId>
    <artifactId>spring-boot-starter-parent</artifactId>
    <version>3.2.1</version>
  </parent>
  <artifactId>demo</artifactId>
  <properties>
    <java.version>21</java.version>
  </properties>
  <dependencies>
    <dependency>
      <groupId>org.springframework.boot</groupId>
      <artifactId>spring-boot-starter-web</artifactId>
    </dependency>
  </dependencies>
</project>
"#;
    let dir = project(&[("pom.xml", pom)]);
    let result = detect(dir.path(), &DetectorConfig::default()).unwrap();

    assert_eq!(result.top(Category::Framework).unwrap().candidate, "spring-boot");
    assert_eq!(result.top(Category::BuildSystem).unwrap().candidate, "maven");

    let java = result.version("java").unwrap();
    assert_eq!(java.value, "21");
    assert_eq!(java.source, "pom.xml#project/properties/java.version");

    let spring = result.version("spring-boot").unwrap();
    assert_eq!(spring.value, "3.2.1");
}

#[test]
fn test_negative_rule_suppresses_competitor() {
    let dir = project(&[
        (
            "package.json",
            "{\"devDependencies\": {\"jest\": \"^29.0.0\"}}\n",
        ),
        ("vitest.config.ts", "export default {}\n"),
    ]);
    let result = detect(dir.path(), &DetectorConfig::default()).unwrap();

    let testing: Vec<&str> = result
        .candidates(Category::Testing)
        .iter()
        .map(|c| c.candidate.as_str())
        .collect();
    assert_eq!(testing, vec!["vitest"]);
}

#[test]
fn test_inferred_version_fallback() {
    let dir = project(&[("requirements.txt", "requests==2.31.0\n")]);
    let result = detect(dir.path(), &DetectorConfig::default()).unwrap();

    assert_eq!(result.top(Category::Language).unwrap().candidate, "python");
    let python = result.version("python").unwrap();
    assert_eq!(python.value, "3");
    assert_eq!(python.source, "fallback");
    assert!(python.inferred);
}

#[test]
fn test_low_confidence_candidates_have_no_version() {
    let dir = project(&[("package.json", REACT_PACKAGE_JSON)]);
    let result = detect(dir.path(), &DetectorConfig::default()).unwrap();

    // npm is only a tertiary hint from package.json
    let npm = result.top(Category::BuildSystem).unwrap();
    assert_eq!(npm.candidate, "npm");
    assert!(npm.low_confidence);
    assert!(result.version("npm").is_none());
}

#[test]
fn test_monorepo_collects_nested_manifests() {
    let dir = project(&[
        ("frontend/package.json", REACT_PACKAGE_JSON),
        ("frontend/src/App.jsx", "import React from 'react';\n"),
        (
            "backend/requirements.txt",
            "fastapi==0.110.0\nuvicorn\npsycopg2-binary\n",
        ),
        ("backend/app/main.py", "from fastapi import FastAPI\napp = FastAPI()\n"),
        (".github/workflows/ci.yml", "on: push\njobs: {}\n"),
    ]);
    let result = detect(dir.path(), &DetectorConfig::default()).unwrap();

    let frameworks: Vec<&str> = result
        .candidates(Category::Framework)
        .iter()
        .map(|c| c.candidate.as_str())
        .collect();
    assert!(frameworks.contains(&"react"));
    assert!(frameworks.contains(&"fastapi"));
    assert_eq!(
        result.top(Category::Database).unwrap().candidate,
        "postgresql"
    );
    assert_eq!(
        result.top(Category::Platform).unwrap().candidate,
        "github-actions"
    );
}

#[test]
fn test_package_manager_version_belongs_to_named_manager() {
    let manifest = "{\"name\": \"web\", \"packageManager\": \"yarn@4.1.0\"}\n";

    let npm_lock = project(&[("package.json", manifest), ("package-lock.json", "{}\n")]);
    let result = detect(npm_lock.path(), &DetectorConfig::default()).unwrap();
    let npm = result.top(Category::BuildSystem).unwrap();
    assert_eq!(npm.candidate, "npm");
    assert!(!npm.low_confidence);
    assert!(result.version("npm").is_none());

    let yarn_lock = project(&[("package.json", manifest), ("yarn.lock", "# yarn lockfile v1\n")]);
    let result = detect(yarn_lock.path(), &DetectorConfig::default()).unwrap();
    assert_eq!(result.top(Category::BuildSystem).unwrap().candidate, "yarn");
    let yarn = result.version("yarn").unwrap();
    assert_eq!(yarn.value, "4.1.0");
    assert_eq!(yarn.source, "package.json");
}
