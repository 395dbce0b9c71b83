//! Tests for the library entry points and their command-line overrides

use rust_sqlfixture::config::TransactionScope;
use rust_sqlfixture::{FixtureError, SetupOptions};

use crate::common::TestContext;

fn options(ctx: &TestContext) -> SetupOptions {
    SetupOptions {
        config_path: ctx.path("sqlfixture.yaml"),
        ..SetupOptions::default()
    }
}

#[test]
fn test_skip_prefix_override() {
    let ctx = TestContext::new();
    ctx.write_all(&[
        ("scripts/001.sql", "SELECT 1"),
        ("scripts/DISABLED_002.sql", "SELECT 2"),
        ("scripts/WIP_003.sql", "SELECT 3"),
    ]);
    ctx.write_config("databases:\n  - name: Frontiers_DB\n    scripts: scripts\n");

    let plan = rust_sqlfixture::plan(&SetupOptions {
        skip_prefix: Some("WIP_".to_string()),
        ..options(&ctx)
    })
    .unwrap();

    let run = plan.databases[0].scripts.as_ref().unwrap();
    assert_eq!(plan.skip_prefix, "WIP_");
    assert_eq!(run.scripts.len(), 2);
    assert_eq!(run.skipped, vec![ctx.path("scripts/WIP_003.sql")]);
}

#[test]
fn test_transaction_scope_override() {
    let ctx = TestContext::new();
    ctx.write_config("transaction_scope: per-script\ndatabases: []\n");

    let plan = rust_sqlfixture::plan(&SetupOptions {
        transaction_scope: Some(TransactionScope::PerRun),
        ..options(&ctx)
    })
    .unwrap();

    assert_eq!(plan.transaction_scope, TransactionScope::PerRun);
}

#[tokio::test]
async fn test_run_without_connection_string_fails_before_connecting() {
    let ctx = TestContext::new();
    ctx.write_config("databases:\n  - name: Frontiers_DB\n");

    let err = rust_sqlfixture::run(&options(&ctx)).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FixtureError>(),
        Some(FixtureError::MissingConnectionString)
    ));
}

#[tokio::test]
async fn test_run_rejects_malformed_connection_string() {
    let ctx = TestContext::new();
    ctx.write_config("databases:\n  - name: Frontiers_DB\n");

    let err = rust_sqlfixture::run(&SetupOptions {
        connection: Some("Server=localhost;TrustServerCertificate=maybe".to_string()),
        ..options(&ctx)
    })
    .await
    .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<FixtureError>(),
        Some(FixtureError::InvalidConnectionString { .. })
    ));
}
