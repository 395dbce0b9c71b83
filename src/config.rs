//! Setup configuration
//!
//! The configuration file is YAML. Every field except `databases` is optional;
//! relative paths resolve against the directory holding the file.
//!
//! ```yaml
//! connection: "Server=localhost,1433;User Id=sa;Password=...;TrustServerCertificate=true"
//! skip_prefix: DISABLED_
//! transaction_scope: per-script
//! databases:
//!   - name: Frontiers_DB
//!     scripts: Deployment/01_FrontiersDB
//!   - name: Impact_DB_UnitTesting
//!     project: Impact/Impact.sqlproj
//!     scripts: Deployment/02_ImpactDB
//!     post_setup: [RECONFIGURE]
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::database::{validate_database_name, FileSpec};
use crate::error::FixtureError;
use crate::executor::DEFAULT_SKIP_PREFIX;
use crate::sqlcmd::SqlCmdVariables;

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "sqlfixture.yaml";

/// How far a transaction reaches when running a directory of scripts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionScope {
    /// One connection and transaction per script; earlier scripts stay
    /// committed when a later one fails
    #[default]
    PerScript,
    /// One connection and transaction for the whole directory (or project);
    /// any failure rolls back everything it ran
    PerRun,
}

/// Raw configuration input as written in the file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigInput {
    pub connection: Option<String>,
    pub skip_prefix: Option<String>,
    pub transaction_scope: Option<TransactionScope>,
    pub sqlcmd: Option<bool>,
    pub variables: Option<HashMap<String, String>>,
    pub file_spec: Option<FileSpec>,
    #[serde(default)]
    pub databases: Vec<DatabaseInput>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseInput {
    pub name: String,
    pub recreate: Option<bool>,
    pub project: Option<PathBuf>,
    pub scripts: Option<PathBuf>,
    #[serde(default)]
    pub post_setup: Vec<String>,
}

/// Values given on the command line; each one beats the file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub connection: Option<String>,
    pub skip_prefix: Option<String>,
    pub transaction_scope: Option<TransactionScope>,
}

/// Resolved configuration with all defaults applied
#[derive(Debug, Clone)]
pub struct SetupConfig {
    pub connection: Option<String>,
    pub skip_prefix: String,
    pub transaction_scope: TransactionScope,
    pub sqlcmd: bool,
    pub variables: SqlCmdVariables,
    pub file_spec: FileSpec,
    pub databases: Vec<DatabaseTarget>,
}

/// One database to bootstrap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseTarget {
    pub name: String,
    /// Drop the database before creating it
    pub recreate: bool,
    /// Schema project deployed before the scripts
    pub project: Option<PathBuf>,
    /// Directory of setup scripts
    pub scripts: Option<PathBuf>,
    /// Statements run outside any transaction after the scripts
    pub post_setup: Vec<String>,
}

impl SetupConfig {
    /// Apply defaults and resolve relative paths against `root_dir`
    pub fn from_input(input: ConfigInput, root_dir: &Path) -> Result<Self, FixtureError> {
        let resolve = |path: PathBuf| {
            if path.is_absolute() {
                path
            } else {
                root_dir.join(path)
            }
        };

        let databases = input
            .databases
            .into_iter()
            .map(|db| {
                validate_database_name(&db.name)?;
                Ok(DatabaseTarget {
                    name: db.name,
                    recreate: db.recreate.unwrap_or(false),
                    project: db.project.map(resolve),
                    scripts: db.scripts.map(resolve),
                    post_setup: db.post_setup,
                })
            })
            .collect::<Result<Vec<_>, FixtureError>>()?;

        Ok(Self {
            connection: input.connection,
            skip_prefix: input
                .skip_prefix
                .unwrap_or_else(|| DEFAULT_SKIP_PREFIX.to_string()),
            transaction_scope: input.transaction_scope.unwrap_or_default(),
            sqlcmd: input.sqlcmd.unwrap_or(true),
            variables: input.variables.unwrap_or_default(),
            file_spec: input.file_spec.unwrap_or_default(),
            databases,
        })
    }

    /// Layer command-line values over the file
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(connection) = overrides.connection {
            self.connection = Some(connection);
        }
        if let Some(skip_prefix) = overrides.skip_prefix {
            self.skip_prefix = skip_prefix;
        }
        if let Some(scope) = overrides.transaction_scope {
            self.transaction_scope = scope;
        }
    }

    /// The connection string, which setup cannot run without
    pub fn require_connection(&self) -> Result<&str, FixtureError> {
        self.connection
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or(FixtureError::MissingConnectionString)
    }
}

/// Parse configuration text
pub fn parse_config(contents: &str, path: &Path) -> Result<ConfigInput, FixtureError> {
    serde_yaml::from_str(contents).map_err(|source| FixtureError::ConfigParseError {
        path: path.to_path_buf(),
        source,
    })
}

/// Load and resolve a configuration file
pub fn load_config(path: &Path) -> Result<SetupConfig, FixtureError> {
    let contents = std::fs::read_to_string(path).map_err(|source| FixtureError::ConfigReadError {
        path: path.to_path_buf(),
        source,
    })?;
    let root_dir = path.parent().unwrap_or_else(|| Path::new("."));
    SetupConfig::from_input(parse_config(&contents, path)?, root_dir)
}
