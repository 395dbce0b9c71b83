//! Common test utilities for rust-sqlfixture tests

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use rust_sqlfixture::config::{load_config, SetupConfig};
use rust_sqlfixture::setup::{build_plan, SetupPlan};

/// Test context with a temporary working directory
pub struct TestContext {
    /// Kept to prevent temp directory cleanup until TestContext is dropped
    _temp_dir: TempDir,
    pub root: PathBuf,
}

impl TestContext {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().to_path_buf();
        Self {
            _temp_dir: temp_dir,
            root,
        }
    }

    /// Write a file relative to the context root, creating parent directories
    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create directory");
        }
        fs::write(&path, content).expect("Failed to write file");
        path
    }

    /// Write several files at once
    pub fn write_all(&self, files: &[(&str, &str)]) {
        for (relative, content) in files {
            self.write(relative, content);
        }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Write `sqlfixture.yaml` and return its path
    pub fn write_config(&self, yaml: &str) -> PathBuf {
        self.write("sqlfixture.yaml", yaml)
    }

    pub fn load_config(&self) -> SetupConfig {
        load_config(&self.path("sqlfixture.yaml")).expect("Failed to load config")
    }

    pub fn plan(&self) -> SetupPlan {
        build_plan(&self.load_config()).expect("Failed to build plan")
    }
}

/// File names of `paths`, relative to `root`, with forward slashes
pub fn relative_names(paths: impl IntoIterator<Item = impl AsRef<Path>>, root: &Path) -> Vec<String> {
    paths
        .into_iter()
        .map(|p| {
            p.as_ref()
                .strip_prefix(root)
                .unwrap_or(p.as_ref())
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect()
}

/// An SDK-style project with no explicit Build items
pub const SDK_PROJECT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Project Sdk="Microsoft.Build.Sql/0.1.12-preview">
  <PropertyGroup>
    <Name>Impact</Name>
    <DSP>Microsoft.Data.Tools.Schema.Sql.Sql160DatabaseSchemaProvider</DSP>
  </PropertyGroup>
</Project>"#;
