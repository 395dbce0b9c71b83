//! Error types for rust-sqlfixture

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Where inside a script's transaction a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedStep {
    /// A batch failed; `index` is 0-based, `start_line` 1-based and counted in
    /// the script after SQLCMD preprocessing
    Batch { index: usize, start_line: usize },
    /// Every batch ran but the commit was refused
    Commit,
}

impl fmt::Display for FailedStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailedStep::Batch { index, start_line } => {
                write!(f, "batch {} (line {})", index + 1, start_line)
            }
            FailedStep::Commit => write!(f, "commit"),
        }
    }
}

/// Result of the rollback attempted after a failed batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    RolledBack,
    /// The rollback itself failed; holds the server's message
    Failed(String),
}

/// Errors that can occur while bootstrapping test databases
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Failed to read config file: {path}")]
    ConfigReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {path}")]
    ConfigParseError {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("No connection string configured (use --connection, SQLFIXTURE_CONNECTION or `connection:` in the config file)")]
    MissingConnectionString,

    #[error("Invalid connection string: {message}")]
    InvalidConnectionString { message: String },

    #[error("Failed to connect to database {database} on {server}")]
    ConnectionFailed {
        database: String,
        server: String,
        #[source]
        source: tiberius::error::Error,
    },

    #[error("Invalid database name '{name}': {reason}")]
    InvalidDatabaseName { name: String, reason: &'static str },

    #[error("Failed to check whether database {name} exists")]
    DatabaseQueryError {
        name: String,
        #[source]
        source: tiberius::error::Error,
    },

    #[error("Failed to create database {name}")]
    DatabaseCreationError {
        name: String,
        #[source]
        source: tiberius::error::Error,
    },

    #[error("Failed to drop database {name}")]
    DatabaseDropError {
        name: String,
        #[source]
        source: tiberius::error::Error,
    },

    #[error("Failed to read project file: {path}")]
    ProjectReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse project file: {path}")]
    ProjectParseError {
        path: PathBuf,
        #[source]
        source: roxmltree::Error,
    },

    #[error("Failed to read SQL file: {path}")]
    SqlFileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Script directory does not exist: {path}")]
    ScriptDirectoryMissing { path: PathBuf },

    #[error("Failed to scan script directory: {path}")]
    ScriptDirectoryScanError {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("SQLCMD include file not found: {path} (referenced from {source_file})")]
    SqlcmdIncludeNotFound { path: PathBuf, source_file: PathBuf },

    #[error("Circular SQLCMD include detected: {path} (include chain: {chain})")]
    SqlcmdCircularInclude { path: PathBuf, chain: String },

    #[error("Failed to begin transaction for {path}")]
    TransactionBeginError {
        path: PathBuf,
        #[source]
        source: tiberius::error::Error,
    },

    #[error(
        "Failed executing {path} at {step}. You can disable this file by prepending {skip_prefix} to its name."
    )]
    ScriptFailed {
        path: PathBuf,
        step: FailedStep,
        skip_prefix: String,
        rollback: RollbackOutcome,
        #[source]
        source: tiberius::error::Error,
    },

    #[error("Failed executing SQL on {database}: {statement}")]
    AdminStatementFailed {
        database: String,
        statement: String,
        #[source]
        source: tiberius::error::Error,
    },
}

impl FixtureError {
    /// Rollback outcome of a failed script, if this is one
    pub fn rollback_outcome(&self) -> Option<&RollbackOutcome> {
        match self {
            FixtureError::ScriptFailed { rollback, .. } => Some(rollback),
            _ => None,
        }
    }
}
