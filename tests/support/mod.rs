use stackprobe::DetectorConfig;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Creates a project tree from `(relative path, content)` pairs
#[allow(dead_code)]
pub fn project(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    write_files(dir.path(), files);
    dir
}

#[allow(dead_code)]
pub fn write_files(root: &Path, files: &[(&str, &str)]) {
    for (path, content) in files {
        let full = root.join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        fs::write(&full, content).expect("Failed to write file");
    }
}

/// Default configuration with a fixed worker count
#[allow(dead_code)]
pub fn config_with_workers(workers: usize) -> DetectorConfig {
    DetectorConfig {
        workers,
        ..DetectorConfig::default()
    }
}

#[allow(dead_code)]
pub fn stackprobe_bin() -> &'static str {
    env!("CARGO_BIN_EXE_stackprobe")
}

#[allow(dead_code)]
pub const REACT_PACKAGE_JSON: &str = r#"{
  "name": "web",
  "version": "1.0.0",
  "dependencies": {
    "react": "^18.2.0",
    "react-dom": "^18.2.0"
  }
}
"#;
