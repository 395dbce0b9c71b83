//! Ordering and loading of a project's scripts for deployment
//!
//! A project is applied by running its scripts in three phases: the
//! pre-deployment script, the build scripts, then the post-deployment script.
//! Build scripts are ordered by the kind of object they create so that a view
//! never runs before the table it selects from; scripts of the same kind keep
//! path order. The skip prefix disables project scripts the same way it
//! disables setup scripts.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;

use tracing::debug;

use super::SqlProject;
use crate::discovery::{has_skip_prefix, path_order_key, sort_paths};
use crate::sqlcmd::{self, SqlCmdVariables};

static CREATE_KIND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bCREATE\s+(?:OR\s+ALTER\s+)?(?:UNIQUE\s+)?(?:(?:NON)?CLUSTERED\s+)?(USER|ROLE|LOGIN|SCHEMA|TYPE|SEQUENCE|TABLE|INDEX|FUNCTION|VIEW|SYNONYM|PROCEDURE|PROC|TRIGGER)\b",
    )
    .unwrap()
});

/// What a build script creates, in deployment order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectKind {
    Security,
    Schema,
    Type,
    Sequence,
    Table,
    Index,
    Function,
    View,
    Procedure,
    Trigger,
    Other,
}

impl ObjectKind {
    /// Classify a script by the first CREATE statement it contains
    pub fn of_script(sql: &str) -> Self {
        let Some(caps) = CREATE_KIND_RE.captures(sql) else {
            return ObjectKind::Other;
        };
        match caps[1].to_ascii_uppercase().as_str() {
            "USER" | "ROLE" | "LOGIN" => ObjectKind::Security,
            "SCHEMA" => ObjectKind::Schema,
            "TYPE" => ObjectKind::Type,
            "SEQUENCE" => ObjectKind::Sequence,
            "TABLE" => ObjectKind::Table,
            "INDEX" => ObjectKind::Index,
            "FUNCTION" => ObjectKind::Function,
            "VIEW" | "SYNONYM" => ObjectKind::View,
            "PROCEDURE" | "PROC" => ObjectKind::Procedure,
            "TRIGGER" => ObjectKind::Trigger,
            _ => ObjectKind::Other,
        }
    }
}

/// Deployment phase of a project script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployPhase {
    PreDeploy,
    Build(ObjectKind),
    PostDeploy,
}

/// A project script, preprocessed and ready to execute
#[derive(Debug, Clone)]
pub struct DeployScript {
    pub path: PathBuf,
    pub phase: DeployPhase,
    pub content: String,
}

/// A project's scripts in deployment order
#[derive(Debug, Clone, Default)]
pub struct DeployScripts {
    pub scripts: Vec<DeployScript>,
    /// Project scripts excluded by the skip prefix
    pub skipped: Vec<PathBuf>,
}

/// Load every script of `project` in deployment order.
///
/// `overrides` take precedence over the project's SQLCMD variable defaults.
/// Scripts whose file name starts with `skip_prefix` are left out, whichever
/// phase they belong to.
pub fn load_deploy_scripts(
    project: &SqlProject,
    overrides: &SqlCmdVariables,
    skip_prefix: &str,
) -> Result<DeployScripts> {
    let mut variables = project.variable_defaults();
    variables.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));

    let mut skipped = Vec::new();
    let mut enabled = |path: &Path| {
        if has_skip_prefix(path, skip_prefix) {
            debug!("Skipping disabled project script {}", path.display());
            skipped.push(path.to_path_buf());
            false
        } else {
            true
        }
    };

    let pre_deploy = project.pre_deploy_script.as_deref().filter(|p| enabled(p));
    let post_deploy = project.post_deploy_script.as_deref().filter(|p| enabled(p));
    let build_paths: Vec<&Path> = project
        .sql_files
        .iter()
        .map(PathBuf::as_path)
        .filter(|p| enabled(p))
        .collect();

    let load = |path: &Path| -> Result<String> {
        let raw = sqlcmd::read_sql_file(path)?;
        sqlcmd::preprocess(&raw, path, &variables)
    };

    let mut build = Vec::with_capacity(build_paths.len());
    for path in build_paths {
        let content = load(path)?;
        build.push(DeployScript {
            path: path.to_path_buf(),
            phase: DeployPhase::Build(ObjectKind::of_script(&content)),
            content,
        });
    }
    build.sort_by_cached_key(|s| (build_kind(s.phase), path_order_key(&s.path)));

    let mut scripts = Vec::with_capacity(build.len() + 2);
    if let Some(path) = pre_deploy {
        scripts.push(DeployScript {
            path: path.to_path_buf(),
            phase: DeployPhase::PreDeploy,
            content: load(path)?,
        });
    }
    scripts.extend(build);
    if let Some(path) = post_deploy {
        scripts.push(DeployScript {
            path: path.to_path_buf(),
            phase: DeployPhase::PostDeploy,
            content: load(path)?,
        });
    }

    sort_paths(&mut skipped);
    Ok(DeployScripts { scripts, skipped })
}

fn build_kind(phase: DeployPhase) -> ObjectKind {
    match phase {
        DeployPhase::Build(kind) => kind,
        _ => ObjectKind::Other,
    }
}
