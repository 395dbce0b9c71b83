//! rust-sqlfixture: bootstrap SQL Server databases for integration tests
//!
//! Before a test run this library creates the test databases, deploys a
//! `.sqlproj` schema project, and runs directories of setup scripts. Each
//! script is split on `GO` and executed batch by batch inside one transaction
//! that commits only if every batch succeeds.

pub mod batch;
pub mod config;
pub mod connection;
pub mod database;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod project;
pub mod setup;
pub mod sqlcmd;

use std::path::PathBuf;

use anyhow::Result;

pub use error::{FailedStep, FixtureError, RollbackOutcome};
pub use setup::{SetupPlan, SetupReport};

use config::{ConfigOverrides, TransactionScope};
use connection::ServerConnection;

/// Options for a setup run
#[derive(Debug, Clone, Default)]
pub struct SetupOptions {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Connection string; overrides the config file
    pub connection: Option<String>,
    /// Transaction scope; overrides the config file
    pub transaction_scope: Option<TransactionScope>,
    /// Skip prefix; overrides the config file
    pub skip_prefix: Option<String>,
}

impl SetupOptions {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            connection: self.connection.clone(),
            skip_prefix: self.skip_prefix.clone(),
            transaction_scope: self.transaction_scope,
        }
    }
}

/// Load the configuration and resolve it into a plan without connecting
pub fn plan(options: &SetupOptions) -> Result<SetupPlan> {
    let mut config = config::load_config(&options.config_path)?;
    config.apply_overrides(options.overrides());
    setup::build_plan(&config)
}

/// Load the configuration, build the plan and execute it
pub async fn run(options: &SetupOptions) -> Result<SetupReport> {
    let mut config = config::load_config(&options.config_path)?;
    config.apply_overrides(options.overrides());

    let server = ServerConnection::parse(config.require_connection()?)?;
    tracing::info!("Using server {}", server.masked());

    // Step 1: Resolve scripts and projects before touching any database
    let plan = setup::build_plan(&config)?;

    tracing::info!(
        "Planned {} databases, {} scripts",
        plan.databases.len(),
        plan.script_count()
    );

    // Step 2: Create databases, deploy, run scripts
    setup::run_setup(&plan, &server).await
}
