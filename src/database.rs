//! Test database creation and removal

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::connection::{ServerConnection, MASTER_DATABASE};
use crate::error::FixtureError;

/// Primary data file sizing for created databases, in megabytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FileSpec {
    pub size_mb: u32,
    pub max_size_mb: u32,
    pub growth_mb: u32,
}

impl Default for FileSpec {
    fn default() -> Self {
        Self {
            size_mb: 25,
            max_size_mb: 50,
            growth_mb: 5,
        }
    }
}

/// Check that a name can be bracket-quoted and embedded in a string literal
pub fn validate_database_name(name: &str) -> Result<(), FixtureError> {
    let invalid = |reason| FixtureError::InvalidDatabaseName {
        name: name.to_string(),
        reason,
    };

    if name.trim().is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.chars().count() > 128 {
        return Err(invalid("name is longer than 128 characters"));
    }
    if name.contains(']') || name.contains('\'') {
        return Err(invalid("name contains ']' or a single quote"));
    }
    if name.chars().any(char::is_control) {
        return Err(invalid("name contains control characters"));
    }
    Ok(())
}

/// Guarded CREATE DATABASE placing the data file in the server's default data path
pub fn create_database_sql(name: &str, spec: &FileSpec) -> Result<String, FixtureError> {
    validate_database_name(name)?;
    Ok(format!(
        "IF NOT EXISTS (SELECT * FROM sys.databases WHERE name = N'{name}')
BEGIN
    DECLARE @filename NVARCHAR(400);
    SET @filename = CONVERT(NVARCHAR(260), SERVERPROPERTY('InstanceDefaultDataPath')) + N'{name}.mdf';

    EXEC (N'CREATE DATABASE [{name}] ON PRIMARY
    (NAME = [{name}],
    FILENAME = ''' + @filename + N''',
    SIZE = {size}MB,
    MAXSIZE = {max}MB,
    FILEGROWTH = {growth}MB)');
END",
        name = name,
        size = spec.size_mb,
        max = spec.max_size_mb,
        growth = spec.growth_mb,
    ))
}

/// Drop a database, disconnecting other sessions first
pub fn drop_database_sql(name: &str) -> Result<String, FixtureError> {
    validate_database_name(name)?;
    Ok(format!(
        "IF EXISTS (SELECT 1 FROM sys.databases WHERE name = N'{name}')
BEGIN
    ALTER DATABASE [{name}] SET SINGLE_USER WITH ROLLBACK IMMEDIATE;
    DROP DATABASE [{name}];
END",
        name = name
    ))
}

/// Whether a database exists on the server
pub async fn database_exists(server: &ServerConnection, name: &str) -> Result<bool, FixtureError> {
    let mut client = server.connect(MASTER_DATABASE).await?;
    let row = client
        .query(
            "SELECT COUNT(*) FROM sys.databases WHERE name = @P1",
            &[&name],
        )
        .await
        .map_err(existence_check_failed(name))?
        .into_row()
        .await
        .map_err(existence_check_failed(name))?;

    Ok(row.and_then(|r| r.get::<i32, _>(0)).unwrap_or(0) > 0)
}

fn existence_check_failed(name: &str) -> impl Fn(tiberius::error::Error) -> FixtureError + '_ {
    move |source| FixtureError::DatabaseQueryError {
        name: name.to_string(),
        source,
    }
}

/// Create a database unless it already exists. Returns whether it was created.
pub async fn create_database_if_missing(
    server: &ServerConnection,
    name: &str,
    spec: &FileSpec,
) -> Result<bool, FixtureError> {
    let sql = create_database_sql(name, spec)?;
    if database_exists(server, name).await? {
        info!("Database {} already exists", name);
        return Ok(false);
    }

    info!("Creating {} Database...", name);
    let mut client = server.connect(MASTER_DATABASE).await?;
    let creation_failed = |source| FixtureError::DatabaseCreationError {
        name: name.to_string(),
        source,
    };
    client
        .simple_query(sql)
        .await
        .map_err(creation_failed)?
        .into_results()
        .await
        .map_err(creation_failed)?;
    Ok(true)
}

/// Drop a database if it exists
pub async fn drop_database_if_exists(
    server: &ServerConnection,
    name: &str,
) -> Result<(), FixtureError> {
    let sql = drop_database_sql(name)?;

    info!("Dropping {} Database...", name);
    let mut client = server.connect(MASTER_DATABASE).await?;
    let drop_failed = |source| FixtureError::DatabaseDropError {
        name: name.to_string(),
        source,
    };
    client
        .simple_query(sql)
        .await
        .map_err(drop_failed)?
        .into_results()
        .await
        .map_err(drop_failed)?;
    Ok(())
}
