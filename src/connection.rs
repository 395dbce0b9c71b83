//! SQL Server connections over tiberius
//!
//! The server is described by an ADO.NET connection string. Every connection
//! the bootstrapper opens is that string with the database overridden, so the
//! same settings serve `master` (for database creation) and each test database.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tiberius::{Client, Config};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

use crate::error::FixtureError;

/// Type alias for the SQL client
pub type SqlClient = Client<Compat<TcpStream>>;

/// Database used for server-level statements
pub const MASTER_DATABASE: &str = "master";

static PASSWORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(password|pwd)\s*=\s*(\{[^}]*\}|[^;]*)").unwrap());

/// Mask the password in a connection string for display
pub fn mask_connection_string(connection_string: &str) -> String {
    PASSWORD_RE
        .replace_all(connection_string, "$1=***")
        .into_owned()
}

/// A validated server connection string
#[derive(Clone)]
pub struct ServerConnection {
    connection_string: String,
}

impl fmt::Debug for ServerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConnection")
            .field("connection_string", &self.masked())
            .finish()
    }
}

impl ServerConnection {
    /// Validate an ADO.NET connection string
    pub fn parse(connection_string: &str) -> Result<Self, FixtureError> {
        Config::from_ado_string(connection_string).map_err(|e| {
            FixtureError::InvalidConnectionString {
                message: e.to_string(),
            }
        })?;

        Ok(Self {
            connection_string: connection_string.to_string(),
        })
    }

    /// Connection string with the password masked
    pub fn masked(&self) -> String {
        mask_connection_string(&self.connection_string)
    }

    /// Client config targeting `database`
    pub fn config_for(&self, database: &str) -> Result<Config, FixtureError> {
        let mut config = Config::from_ado_string(&self.connection_string).map_err(|e| {
            FixtureError::InvalidConnectionString {
                message: e.to_string(),
            }
        })?;
        config.database(database);
        Ok(config)
    }

    /// Open a connection to `database`
    pub async fn connect(&self, database: &str) -> Result<SqlClient, FixtureError> {
        let config = self.config_for(database)?;
        let connection_failed = |source: tiberius::error::Error| FixtureError::ConnectionFailed {
            database: database.to_string(),
            server: self.masked(),
            source,
        };

        debug!("Connecting to {} at {}", database, config.get_addr());
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| connection_failed(e.into()))?;
        tcp.set_nodelay(true)
            .map_err(|e| connection_failed(e.into()))?;

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(connection_failed)?;
        debug!("Connected to {}", database);
        Ok(client)
    }
}
