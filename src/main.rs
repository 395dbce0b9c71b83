use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use rust_sqlfixture::batch::split_batches;
use rust_sqlfixture::config::{TransactionScope, DEFAULT_CONFIG_FILE};
use rust_sqlfixture::project::DeployPhase;
use rust_sqlfixture::setup::{PlannedScript, SetupPlan};
use rust_sqlfixture::{sqlcmd, SetupOptions};

#[derive(Parser)]
#[command(name = "rust-sqlfixture")]
#[command(author, version, about = "Bootstrap SQL Server databases for integration tests")]
struct Cli {
    /// Show debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only show errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConfigArgs {
    /// Path to the configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Script file name prefix that disables a script
    #[arg(long)]
    skip_prefix: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the databases, deploy projects and run setup scripts
    Setup {
        #[command(flatten)]
        config: ConfigArgs,

        /// ADO.NET connection string for the server
        #[arg(long, env = "SQLFIXTURE_CONNECTION", hide_env_values = true)]
        connection: Option<String>,

        /// Transaction per script, or one per script directory
        #[arg(long, value_enum)]
        transaction_scope: Option<TransactionScope>,
    },
    /// Show what setup would execute without connecting
    Plan {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Print the batches a script splits into
    Split {
        /// Path to the .sql file
        file: PathBuf,

        /// Apply SQLCMD directives before splitting
        #[arg(long = "sqlcmd")]
        expand_sqlcmd: bool,
    },
}

fn initialize_logging(cli: &Cli) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(level)
    };

    fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    initialize_logging(&cli);

    match cli.command {
        Commands::Setup {
            config,
            connection,
            transaction_scope,
        } => {
            let options = SetupOptions {
                config_path: config.config,
                connection,
                transaction_scope,
                skip_prefix: config.skip_prefix,
            };
            let report = rust_sqlfixture::run(&options).await?;
            println!(
                "Setup complete: {} databases created, {} scripts, {} batches, {} admin statements ({:.2?})",
                report.databases_created.len(),
                report.scripts_executed,
                report.batches_executed,
                report.admin_statements_executed,
                report.elapsed
            );
        }
        Commands::Plan { config } => {
            let options = SetupOptions {
                config_path: config.config,
                skip_prefix: config.skip_prefix,
                ..SetupOptions::default()
            };
            print_plan(&rust_sqlfixture::plan(&options)?);
        }
        Commands::Split {
            file,
            expand_sqlcmd,
        } => {
            let raw = sqlcmd::read_sql_file(&file)?;
            let content = if expand_sqlcmd {
                sqlcmd::preprocess(&raw, &file, &sqlcmd::SqlCmdVariables::new())?
            } else {
                raw
            };
            for batch in split_batches(&content) {
                println!("-- batch {} (line {})", batch.index + 1, batch.start_line);
                println!("{}", batch.sql);
                println!("GO");
            }
        }
    }

    Ok(())
}

fn print_plan(plan: &SetupPlan) {
    println!(
        "Transaction scope: {:?}, skip prefix: {}",
        plan.transaction_scope, plan.skip_prefix
    );
    for db in &plan.databases {
        let action = if db.recreate { "recreate" } else { "create if missing" };
        println!("\n{} ({})", db.name, action);

        if let Some(project) = &db.project {
            println!("  project {} ({})", project.name, project.path.display());
            for script in &project.scripts {
                print_script(script);
            }
            for skipped in &project.skipped {
                println!("    skipped  {}", skipped.display());
            }
        }
        if let Some(run) = &db.scripts {
            println!("  scripts {}", run.source.display());
            for script in &run.scripts {
                print_script(script);
            }
            for skipped in &run.skipped {
                println!("    skipped  {}", skipped.display());
            }
        }
        for statement in &db.post_setup {
            println!("  post-setup {}", statement);
        }
    }
}

fn print_script(script: &PlannedScript) {
    let phase = match script.phase {
        Some(DeployPhase::PreDeploy) => "pre   ",
        Some(DeployPhase::Build(_)) => "build ",
        Some(DeployPhase::PostDeploy) => "post  ",
        None => "",
    };
    println!(
        "    {}{} ({} batches)",
        phase,
        script.path.display(),
        script.batch_count
    );
}
