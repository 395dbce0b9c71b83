//! Transactional batch execution
//!
//! A script is split into batches and every batch runs on one connection
//! inside one named transaction. The transaction commits only when all
//! batches succeed. On the first failure the remaining batches are skipped,
//! a rollback is attempted, and the failure comes back as
//! [`FixtureError::ScriptFailed`] carrying the script path, the failing step,
//! the server error and what happened to the rollback.
//!
//! ```text
//! Idle -> Connected -> InTransaction -> Committed
//!                                    -> RolledBack -> Failed
//! ```

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::batch::split_batches;
use crate::connection::{ServerConnection, SqlClient};
use crate::error::{FailedStep, FixtureError, RollbackOutcome};

/// Name given to every setup transaction
pub const TRANSACTION_NAME: &str = "InitSqlPart";

/// File name prefix that keeps a script from running
pub const DEFAULT_SKIP_PREFIX: &str = "DISABLED_";

/// A connection that can run one statement batch at a time
#[async_trait]
pub trait SqlSession: Send {
    /// Run `sql` as a single batch, consuming every result it produces
    async fn execute_batch(&mut self, sql: &str) -> Result<(), tiberius::error::Error>;
}

#[async_trait]
impl SqlSession for SqlClient {
    async fn execute_batch(&mut self, sql: &str) -> Result<(), tiberius::error::Error> {
        self.simple_query(sql.to_string())
            .await?
            .into_results()
            .await?;
        Ok(())
    }
}

/// Lifecycle of an execution session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing was sent; a script with no batches never leaves this state
    Idle,
    Connected,
    InTransaction,
    Committed,
    RolledBack,
    Failed,
}

/// Summary of a script that committed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutcome {
    pub batches: usize,
    pub state: SessionState,
}

impl ScriptOutcome {
    fn empty() -> Self {
        Self {
            batches: 0,
            state: SessionState::Idle,
        }
    }
}

/// Runs scripts inside a single named transaction on a borrowed session
pub struct BatchExecutor<'a, S: SqlSession> {
    session: &'a mut S,
    skip_prefix: &'a str,
    state: SessionState,
}

impl<'a, S: SqlSession> BatchExecutor<'a, S> {
    /// Wrap an open session
    pub fn new(session: &'a mut S, skip_prefix: &'a str) -> Self {
        Self {
            session,
            skip_prefix,
            state: SessionState::Connected,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Start the named transaction
    pub async fn begin(&mut self, path: &Path) -> Result<(), FixtureError> {
        debug!("BEGIN TRANSACTION {} for {}", TRANSACTION_NAME, path.display());
        match self
            .session
            .execute_batch(&format!("BEGIN TRANSACTION {}", TRANSACTION_NAME))
            .await
        {
            Ok(()) => {
                self.state = SessionState::InTransaction;
                Ok(())
            }
            Err(source) => {
                self.state = SessionState::Failed;
                Err(FixtureError::TransactionBeginError {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }

    /// Run every batch of `script` in the open transaction.
    ///
    /// On failure the transaction is rolled back before returning, so the
    /// executor ends in [`SessionState::Failed`].
    pub async fn execute_script(&mut self, path: &Path, script: &str) -> Result<usize, FixtureError> {
        let batches = split_batches(script);
        for batch in &batches {
            debug!(
                "Executing batch {} of {} ({} line {})",
                batch.index + 1,
                batches.len(),
                path.display(),
                batch.start_line
            );
            if let Err(source) = self.session.execute_batch(batch.sql).await {
                let step = FailedStep::Batch {
                    index: batch.index,
                    start_line: batch.start_line,
                };
                return Err(self.fail(path, step, source).await);
            }
        }
        Ok(batches.len())
    }

    /// Commit the named transaction
    pub async fn commit(&mut self, path: &Path) -> Result<(), FixtureError> {
        match self
            .session
            .execute_batch(&format!("COMMIT TRANSACTION {}", TRANSACTION_NAME))
            .await
        {
            Ok(()) => {
                self.state = SessionState::Committed;
                Ok(())
            }
            Err(source) => Err(self.fail(path, FailedStep::Commit, source).await),
        }
    }

    /// Roll back after `source` and build the error to surface
    async fn fail(
        &mut self,
        path: &Path,
        step: FailedStep,
        source: tiberius::error::Error,
    ) -> FixtureError {
        error!("SQL EXCEPTION: {}", source);

        let rollback = match self
            .session
            .execute_batch(&format!("ROLLBACK TRANSACTION {}", TRANSACTION_NAME))
            .await
        {
            Ok(()) => {
                self.state = SessionState::RolledBack;
                RollbackOutcome::RolledBack
            }
            Err(rollback_error) => {
                error!("SQL EXCEPTION ON ROLLBACK: {}", rollback_error);
                RollbackOutcome::Failed(rollback_error.to_string())
            }
        };
        self.state = SessionState::Failed;

        FixtureError::ScriptFailed {
            path: path.to_path_buf(),
            step,
            skip_prefix: self.skip_prefix.to_string(),
            rollback,
            source,
        }
    }
}

/// Execute one script's batches in their own transaction on `session`.
///
/// A script with no batches is a no-op and opens no transaction.
pub async fn execute_batched_sql<S: SqlSession>(
    session: &mut S,
    path: &Path,
    script: &str,
    skip_prefix: &str,
) -> Result<ScriptOutcome, FixtureError> {
    if split_batches(script).is_empty() {
        debug!("Skipping empty script: {}", path.display());
        return Ok(ScriptOutcome::empty());
    }

    let mut executor = BatchExecutor::new(session, skip_prefix);
    executor.begin(path).await?;
    let batches = executor.execute_script(path, script).await?;
    executor.commit(path).await?;

    Ok(ScriptOutcome {
        batches,
        state: executor.state(),
    })
}

/// Open a connection to `database` and execute one script transactionally
pub async fn execute_script_file(
    server: &ServerConnection,
    database: &str,
    path: &Path,
    script: &str,
    skip_prefix: &str,
) -> Result<ScriptOutcome, FixtureError> {
    info!("Executing {}", path.display());
    if split_batches(script).is_empty() {
        debug!("Skipping empty script: {}", path.display());
        return Ok(ScriptOutcome::empty());
    }
    let mut client = server.connect(database).await?;
    execute_batched_sql(&mut client, path, script, skip_prefix).await
}

/// Run a statement on `session` outside any transaction
pub async fn execute_admin_statement<S: SqlSession>(
    session: &mut S,
    database: &str,
    sql: &str,
) -> Result<(), FixtureError> {
    session.execute_batch(sql).await.map_err(|source| {
        error!("SQL EXCEPTION: {}", source);
        FixtureError::AdminStatementFailed {
            database: database.to_string(),
            statement: sql.to_string(),
            source,
        }
    })
}

/// Run a statement on its own connection, outside any transaction
pub async fn execute_without_transaction(
    server: &ServerConnection,
    database: &str,
    sql: &str,
) -> Result<(), FixtureError> {
    info!("Executing {} on {}", sql, database);
    let mut client = server.connect(database).await?;
    execute_admin_statement(&mut client, database, sql).await
}
