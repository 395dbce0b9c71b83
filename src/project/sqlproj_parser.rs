//! Parser for .sqlproj files

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Result;
use roxmltree::{Document, Node};

use crate::error::FixtureError;
use crate::sqlcmd::SqlCmdVariables;

/// SQLCMD variable definition from sqlproj
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlCmdVariable {
    /// Variable name (e.g., "Environment")
    pub name: String,
    /// Default value (e.g., "Development")
    pub default_value: String,
}

/// Parsed SQL project
#[derive(Debug, Clone)]
pub struct SqlProject {
    /// Project name
    pub name: String,
    /// Build scripts, in the order the project lists them
    pub sql_files: Vec<PathBuf>,
    /// SQLCMD variables from sqlproj
    pub sqlcmd_variables: Vec<SqlCmdVariable>,
    /// Pre-deployment script file (optional, at most one)
    pub pre_deploy_script: Option<PathBuf>,
    /// Post-deployment script file (optional, at most one)
    pub post_deploy_script: Option<PathBuf>,
}

impl SqlProject {
    /// Variable defaults, keyed by name, for SQLCMD preprocessing
    pub fn variable_defaults(&self) -> SqlCmdVariables {
        self.sqlcmd_variables
            .iter()
            .filter(|v| !v.default_value.is_empty())
            .map(|v| (v.name.clone(), v.default_value.clone()))
            .collect()
    }
}

/// Parse a .sqlproj file
pub fn parse_sqlproj(path: &Path) -> Result<SqlProject> {
    let content = std::fs::read_to_string(path).map_err(|e| FixtureError::ProjectReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let doc = Document::parse(&content).map_err(|e| FixtureError::ProjectParseError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let project_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();

    let root = doc.root_element();

    let project_name = find_property_value(&root, "Name").unwrap_or_else(|| {
        path.file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Database")
            .to_string()
    });

    let (pre_deploy_script, post_deploy_script) = find_deployment_scripts(&root, &project_dir);

    let mut sql_files = find_sql_files(&root, &project_dir);

    // Deployment scripts run in their own phase, never as build scripts
    sql_files.retain(|file| {
        Some(file) != pre_deploy_script.as_ref() && Some(file) != post_deploy_script.as_ref()
    });

    let sqlcmd_variables = find_sqlcmd_variables(&root);

    Ok(SqlProject {
        name: project_name,
        sql_files,
        sqlcmd_variables,
        pre_deploy_script,
        post_deploy_script,
    })
}

fn find_property_value(root: &Node, property_name: &str) -> Option<String> {
    root.descendants()
        .find(|node| node.tag_name().name() == property_name)
        .and_then(|node| node.text())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn is_sql_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("sql"))
}

fn find_sql_files(root: &Node, project_dir: &Path) -> Vec<PathBuf> {
    let mut sql_files = Vec::new();
    let mut include_patterns: Vec<String> = Vec::new();
    let mut exclude_patterns: Vec<String> = Vec::new();

    // Collect Build Include and Remove patterns
    for node in root.descendants() {
        if node.tag_name().name() == "Build" {
            if let Some(include) = node.attribute("Include") {
                include_patterns.push(include.replace('\\', "/"));
            }
            if let Some(remove) = node.attribute("Remove") {
                exclude_patterns.push(remove.replace('\\', "/"));
            }
        }
    }

    for pattern in &include_patterns {
        if pattern.contains('*') {
            let glob_pattern = project_dir.join(pattern);
            if let Ok(paths) = glob::glob(&glob_pattern.to_string_lossy()) {
                sql_files.extend(paths.filter_map(|p| p.ok()).filter(|p| is_sql_path(p)));
            }
        } else {
            let sql_path = project_dir.join(pattern);
            if !is_sql_path(&sql_path) {
                continue;
            }
            if sql_path.exists() {
                sql_files.push(sql_path);
            } else {
                tracing::warn!("Build item not found, skipping: {}", sql_path.display());
            }
        }
    }

    // If no explicit Build items, glob for .sql files in project directory (SDK-style default)
    if include_patterns.is_empty() {
        let mut defaults: Vec<PathBuf> = walkdir::WalkDir::new(project_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_sql_path(e.path()))
            .filter(|e| !is_build_output(e.path(), project_dir))
            .map(|e| e.into_path())
            .collect();
        defaults.sort();
        sql_files = defaults;
    }

    if !exclude_patterns.is_empty() {
        sql_files.retain(|file| !is_excluded(file, &exclude_patterns, project_dir));
    }

    // A file matched by several patterns is deployed once
    let mut seen = HashSet::new();
    sql_files.retain(|file| seen.insert(file.clone()));

    sql_files
}

fn is_excluded(file: &Path, exclude_patterns: &[String], project_dir: &Path) -> bool {
    exclude_patterns.iter().any(|pattern| {
        let exclude_path = project_dir.join(pattern);
        if pattern.contains('*') {
            glob::Pattern::new(&exclude_path.to_string_lossy())
                .map(|matcher| matcher.matches_path(file))
                .unwrap_or(false)
        } else {
            file == exclude_path
        }
    })
}

/// Skip bin and obj directories
fn is_build_output(path: &Path, project_dir: &Path) -> bool {
    path.strip_prefix(project_dir)
        .map(|relative| {
            relative.components().any(|c| {
                let c = c.as_os_str();
                c.eq_ignore_ascii_case("bin") || c.eq_ignore_ascii_case("obj")
            })
        })
        .unwrap_or(false)
}

/// Find SqlCmdVariable items in the project file
/// Format:
/// ```xml
/// <SqlCmdVariable Include="Environment">
///   <Value>$(SqlCmdVar__1)</Value>
///   <DefaultValue>Development</DefaultValue>
/// </SqlCmdVariable>
/// ```
fn find_sqlcmd_variables(root: &Node) -> Vec<SqlCmdVariable> {
    let child_text = |node: &Node, name: &str| {
        node.children()
            .find(|n| n.tag_name().name() == name)
            .and_then(|n| n.text())
            .map(|s| s.to_string())
            .unwrap_or_default()
    };

    root.descendants()
        .filter(|node| node.tag_name().name() == "SqlCmdVariable")
        .filter_map(|node| {
            node.attribute("Include").map(|name| SqlCmdVariable {
                name: name.to_string(),
                default_value: child_text(&node, "DefaultValue"),
            })
        })
        .collect()
}

fn find_deployment_scripts(root: &Node, project_dir: &Path) -> (Option<PathBuf>, Option<PathBuf>) {
    let mut pre_deploy: Option<PathBuf> = None;
    let mut post_deploy: Option<PathBuf> = None;

    for node in root.descendants() {
        let slot = match node.tag_name().name() {
            "PreDeploy" => &mut pre_deploy,
            "PostDeploy" => &mut post_deploy,
            _ => continue,
        };
        let Some(include) = node.attribute("Include") else {
            continue;
        };
        let script_path = project_dir.join(include.replace('\\', "/"));
        if !script_path.exists() {
            continue;
        }
        if slot.is_some() {
            tracing::warn!(
                "Multiple {} scripts specified, using first one",
                node.tag_name().name()
            );
        } else {
            *slot = Some(script_path);
        }
    }

    (pre_deploy, post_deploy)
}
