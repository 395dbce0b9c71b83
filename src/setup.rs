//! Setup planning and execution
//!
//! [`build_plan`] resolves the configuration into concrete work without
//! touching a server: scripts are discovered, read once, preprocessed and
//! split so that batch counts are known. [`run_setup`] then executes the plan
//! strictly in order:
//!
//! 1. create every database (dropping it first when `recreate` is set)
//! 2. per database: deploy its project, run its scripts, run `post_setup`

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::info;

use crate::batch::count_batches;
use crate::config::{SetupConfig, TransactionScope};
use crate::connection::ServerConnection;
use crate::database::{create_database_if_missing, drop_database_if_exists, FileSpec};
use crate::discovery::discover_scripts;
use crate::error::FixtureError;
use crate::executor::{execute_script_file, execute_without_transaction, BatchExecutor};
use crate::project::{load_deploy_scripts, parse_sqlproj, DeployPhase};
use crate::sqlcmd;

/// A script with its content loaded
#[derive(Debug, Clone)]
pub struct PlannedScript {
    pub path: PathBuf,
    /// Content after SQLCMD preprocessing
    pub content: String,
    pub batch_count: usize,
    /// Set for project scripts
    pub phase: Option<DeployPhase>,
}

impl PlannedScript {
    fn new(path: PathBuf, content: String, phase: Option<DeployPhase>) -> Self {
        let batch_count = count_batches(&content);
        Self {
            path,
            content,
            batch_count,
            phase,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlannedProject {
    pub name: String,
    pub path: PathBuf,
    pub scripts: Vec<PlannedScript>,
    /// Project scripts excluded by the skip prefix
    pub skipped: Vec<PathBuf>,
}

/// A group of scripts executed under one transaction scope
#[derive(Debug, Clone)]
pub struct ScriptRun {
    /// Script directory or project file the scripts came from
    pub source: PathBuf,
    pub scripts: Vec<PlannedScript>,
    /// Scripts excluded by the skip prefix
    pub skipped: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct PlannedDatabase {
    pub name: String,
    pub recreate: bool,
    pub project: Option<PlannedProject>,
    pub scripts: Option<ScriptRun>,
    pub post_setup: Vec<String>,
}

/// Everything a setup run will do
#[derive(Debug, Clone)]
pub struct SetupPlan {
    pub databases: Vec<PlannedDatabase>,
    pub skip_prefix: String,
    pub transaction_scope: TransactionScope,
    pub file_spec: FileSpec,
}

impl SetupPlan {
    pub fn script_count(&self) -> usize {
        self.databases
            .iter()
            .map(|db| {
                db.project.as_ref().map_or(0, |p| p.scripts.len())
                    + db.scripts.as_ref().map_or(0, |r| r.scripts.len())
            })
            .sum()
    }
}

/// What a setup run did
#[derive(Debug, Clone, Default)]
pub struct SetupReport {
    /// Databases that did not exist before the run
    pub databases_created: Vec<String>,
    pub scripts_executed: usize,
    pub batches_executed: usize,
    pub admin_statements_executed: usize,
    pub elapsed: Duration,
}

/// Resolve a configuration into a plan; reads files but opens no connections
pub fn build_plan(config: &SetupConfig) -> Result<SetupPlan> {
    let mut databases = Vec::with_capacity(config.databases.len());

    for target in &config.databases {
        let project = target
            .project
            .as_deref()
            .map(|path| plan_project(path, config))
            .transpose()?;

        let scripts = target
            .scripts
            .as_deref()
            .map(|dir| plan_script_directory(dir, config))
            .transpose()?;

        databases.push(PlannedDatabase {
            name: target.name.clone(),
            recreate: target.recreate,
            project,
            scripts,
            post_setup: target.post_setup.clone(),
        });
    }

    Ok(SetupPlan {
        databases,
        skip_prefix: config.skip_prefix.clone(),
        transaction_scope: config.transaction_scope,
        file_spec: config.file_spec,
    })
}

fn plan_project(path: &Path, config: &SetupConfig) -> Result<PlannedProject> {
    let project = parse_sqlproj(path)
        .with_context(|| format!("Failed to load schema project {}", path.display()))?;
    let deploy = load_deploy_scripts(&project, &config.variables, &config.skip_prefix)?;
    let scripts = deploy
        .scripts
        .into_iter()
        .map(|s| PlannedScript::new(s.path, s.content, Some(s.phase)))
        .collect();

    Ok(PlannedProject {
        name: project.name,
        path: path.to_path_buf(),
        scripts,
        skipped: deploy.skipped,
    })
}

fn plan_script_directory(dir: &Path, config: &SetupConfig) -> Result<ScriptRun> {
    let discovered = discover_scripts(dir, &config.skip_prefix)?;

    let mut scripts = Vec::with_capacity(discovered.scripts.len());
    for path in discovered.scripts {
        let raw = sqlcmd::read_sql_file(&path)?;
        let content = if config.sqlcmd {
            sqlcmd::preprocess(&raw, &path, &config.variables)?
        } else {
            raw
        };
        scripts.push(PlannedScript::new(path, content, None));
    }

    Ok(ScriptRun {
        source: dir.to_path_buf(),
        scripts,
        skipped: discovered.skipped,
    })
}

/// Execute a plan against a server
pub async fn run_setup(plan: &SetupPlan, server: &ServerConnection) -> Result<SetupReport> {
    let started = Instant::now();
    let mut report = SetupReport::default();

    for db in &plan.databases {
        if db.recreate {
            drop_database_if_exists(server, &db.name).await?;
        }
        if create_database_if_missing(server, &db.name, &plan.file_spec).await? {
            report.databases_created.push(db.name.clone());
        }
    }

    for db in &plan.databases {
        if let Some(project) = &db.project {
            info!("Deploying Database Project {} to {}...", project.name, db.name);
            let batches = run_scripts(
                server,
                &db.name,
                &project.path,
                &project.scripts,
                plan.transaction_scope,
                &plan.skip_prefix,
            )
            .await?;
            report.scripts_executed += project.scripts.len();
            report.batches_executed += batches;
        }

        if let Some(run) = &db.scripts {
            info!("Deploying scripts on {}...", run.source.display());
            let batches = run_scripts(
                server,
                &db.name,
                &run.source,
                &run.scripts,
                plan.transaction_scope,
                &plan.skip_prefix,
            )
            .await?;
            report.scripts_executed += run.scripts.len();
            report.batches_executed += batches;
        }

        for statement in &db.post_setup {
            execute_without_transaction(server, &db.name, statement).await?;
            report.admin_statements_executed += 1;
        }
    }

    report.elapsed = started.elapsed();
    info!(
        "Setup finished: {} scripts, {} batches in {:.2?}",
        report.scripts_executed, report.batches_executed, report.elapsed
    );
    Ok(report)
}

/// Run scripts in order under the given transaction scope; returns the number
/// of batches executed
pub async fn run_scripts(
    server: &ServerConnection,
    database: &str,
    source: &Path,
    scripts: &[PlannedScript],
    scope: TransactionScope,
    skip_prefix: &str,
) -> Result<usize, FixtureError> {
    let mut batches = 0;
    match scope {
        TransactionScope::PerScript => {
            for script in scripts {
                let outcome =
                    execute_script_file(server, database, &script.path, &script.content, skip_prefix)
                        .await?;
                batches += outcome.batches;
            }
        }
        TransactionScope::PerRun => {
            if scripts.iter().all(|s| s.batch_count == 0) {
                return Ok(0);
            }
            let mut client = server.connect(database).await?;
            let mut executor = BatchExecutor::new(&mut client, skip_prefix);
            executor.begin(source).await?;
            for script in scripts {
                info!("Executing {}", script.path.display());
                batches += executor.execute_script(&script.path, &script.content).await?;
            }
            executor.commit(source).await?;
        }
    }
    Ok(batches)
}
