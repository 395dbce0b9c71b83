//! Setup plan tests
//!
//! Build a script tree and config in a temp directory, then check what setup
//! would run and in which order.

use pretty_assertions::assert_eq;
use rust_sqlfixture::config::TransactionScope;
use rust_sqlfixture::project::{DeployPhase, ObjectKind};
use rust_sqlfixture::setup::build_plan;

use crate::common::{relative_names, TestContext, SDK_PROJECT};

const TWO_DATABASES: &str = r#"
connection: "Server=localhost,1433;User Id=sa;Password=Password1;TrustServerCertificate=true"
databases:
  - name: Frontiers_DB
    scripts: Deployment/01_FrontiersDB
  - name: Impact_DB_UnitTesting
    scripts: Deployment/02_ImpactDB
    post_setup: [RECONFIGURE]
"#;

fn write_deployment_tree(ctx: &TestContext) {
    ctx.write_all(&[
        (
            "Deployment/01_FrontiersDB/001_tables.sql",
            "CREATE TABLE T(id INT)\nGO\nINSERT INTO T VALUES(1)\nGO\n",
        ),
        ("Deployment/01_FrontiersDB/002_seed.sql", "INSERT INTO T VALUES(2)"),
        (
            "Deployment/01_FrontiersDB/DISABLED_003_slow.sql",
            "WAITFOR DELAY '00:10:00'",
        ),
        ("Deployment/02_ImpactDB/001_schema.sql", "CREATE SCHEMA impact\nGO\n"),
        ("Deployment/02_ImpactDB/empty.sql", "GO\n\nGO\n"),
    ]);
}

// ============================================================================
// Script Directory Tests
// ============================================================================

#[test]
fn test_plan_lists_databases_in_config_order() {
    let ctx = TestContext::new();
    write_deployment_tree(&ctx);
    ctx.write_config(TWO_DATABASES);

    let plan = ctx.plan();

    let names: Vec<&str> = plan.databases.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["Frontiers_DB", "Impact_DB_UnitTesting"]);
    assert_eq!(plan.transaction_scope, TransactionScope::PerScript);
    assert_eq!(plan.skip_prefix, "DISABLED_");
    assert_eq!(plan.databases[1].post_setup, vec!["RECONFIGURE"]);
}

#[test]
fn test_plan_scripts_batches_and_skipped() {
    let ctx = TestContext::new();
    write_deployment_tree(&ctx);
    ctx.write_config(TWO_DATABASES);

    let plan = ctx.plan();
    let run = plan.databases[0].scripts.as_ref().unwrap();

    assert_eq!(
        relative_names(run.scripts.iter().map(|s| &s.path), &run.source),
        vec!["001_tables.sql", "002_seed.sql"]
    );
    assert_eq!(
        run.scripts.iter().map(|s| s.batch_count).collect::<Vec<_>>(),
        vec![2, 1]
    );
    assert_eq!(
        relative_names(&run.skipped, &run.source),
        vec!["DISABLED_003_slow.sql"]
    );
    assert!(run.scripts.iter().all(|s| s.phase.is_none()));
}

#[test]
fn test_plan_keeps_empty_scripts_with_zero_batches() {
    let ctx = TestContext::new();
    write_deployment_tree(&ctx);
    ctx.write_config(TWO_DATABASES);

    let plan = ctx.plan();
    let run = plan.databases[1].scripts.as_ref().unwrap();

    assert_eq!(
        run.scripts.iter().map(|s| s.batch_count).collect::<Vec<_>>(),
        vec![1, 0]
    );
    assert_eq!(plan.script_count(), 4);
}

#[test]
fn test_plan_fails_on_missing_script_directory() {
    let ctx = TestContext::new();
    ctx.write_config("databases:\n  - name: Frontiers_DB\n    scripts: nowhere\n");

    let err = build_plan(&ctx.load_config()).unwrap_err();
    assert!(err.to_string().contains("nowhere"), "{err}");
}

// ============================================================================
// SQLCMD Tests
// ============================================================================

#[test]
fn test_plan_applies_sqlcmd_variables_and_includes() {
    let ctx = TestContext::new();
    ctx.write_all(&[
        (
            "scripts/001_seed.sql",
            ":setvar Table Customers\n:r ../shared/header.sql\nINSERT INTO $(Table) VALUES ('$(Environment)')\nGO\n",
        ),
        ("shared/header.sql", "PRINT 'seeding'\nGO\n"),
    ]);
    ctx.write_config(
        "variables:\n  Environment: Test\ndatabases:\n  - name: Frontiers_DB\n    scripts: scripts\n",
    );

    let plan = ctx.plan();
    let script = &plan.databases[0].scripts.as_ref().unwrap().scripts[0];

    assert!(script.content.contains("INSERT INTO Customers VALUES ('Test')"));
    assert!(script.content.contains("PRINT 'seeding'"));
    assert!(!script.content.contains(":setvar"));
    assert_eq!(script.batch_count, 2);
}

#[test]
fn test_plan_without_sqlcmd_leaves_scripts_untouched() {
    let ctx = TestContext::new();
    ctx.write("scripts/001.sql", "SELECT '$(NotAVariable)'");
    ctx.write_config(
        "sqlcmd: false\nvariables:\n  NotAVariable: x\ndatabases:\n  - name: Frontiers_DB\n    scripts: scripts\n",
    );

    let plan = ctx.plan();
    let script = &plan.databases[0].scripts.as_ref().unwrap().scripts[0];
    assert_eq!(script.content, "SELECT '$(NotAVariable)'");
}

// ============================================================================
// Schema Project Tests
// ============================================================================

#[test]
fn test_plan_orders_project_scripts() {
    let ctx = TestContext::new();
    ctx.write("Impact/Impact.sqlproj", SDK_PROJECT);
    ctx.write_all(&[
        (
            "Impact/Views/vw_Active.sql",
            "CREATE VIEW dbo.vw_Active AS SELECT Id FROM dbo.Accounts",
        ),
        ("Impact/Tables/Accounts.sql", "CREATE TABLE dbo.Accounts (Id INT)"),
        ("Impact/Schemas/impact.sql", "CREATE SCHEMA impact"),
    ]);
    ctx.write("seed/001.sql", "INSERT INTO dbo.Accounts VALUES (1)");
    ctx.write_config(
        "databases:\n  - name: Impact_DB_UnitTesting\n    recreate: true\n    project: Impact/Impact.sqlproj\n    scripts: seed\n",
    );

    let plan = ctx.plan();
    let db = &plan.databases[0];
    assert!(db.recreate);

    let project = db.project.as_ref().unwrap();
    assert_eq!(project.name, "Impact");
    assert_eq!(
        relative_names(project.scripts.iter().map(|s| &s.path), &ctx.path("Impact")),
        vec!["Schemas/impact.sql", "Tables/Accounts.sql", "Views/vw_Active.sql"]
    );
    assert_eq!(
        project.scripts.iter().map(|s| s.phase).collect::<Vec<_>>(),
        vec![
            Some(DeployPhase::Build(ObjectKind::Schema)),
            Some(DeployPhase::Build(ObjectKind::Table)),
            Some(DeployPhase::Build(ObjectKind::View)),
        ]
    );
    assert_eq!(plan.script_count(), 4);
}

#[test]
fn test_plan_skips_disabled_project_scripts() {
    let ctx = TestContext::new();
    ctx.write("Impact/Impact.sqlproj", SDK_PROJECT);
    ctx.write_all(&[
        ("Impact/Tables/Accounts.sql", "CREATE TABLE dbo.Accounts (Id INT)"),
        ("Impact/Tables/DISABLED_Broken.sql", "CREATE TABLE dbo.Broken (Id INT"),
    ]);
    ctx.write_config("databases:\n  - name: Impact_DB\n    project: Impact/Impact.sqlproj\n");

    let plan = ctx.plan();
    let project = plan.databases[0].project.as_ref().unwrap();
    assert_eq!(
        relative_names(project.scripts.iter().map(|s| &s.path), &ctx.path("Impact")),
        vec!["Tables/Accounts.sql"]
    );
    assert_eq!(
        relative_names(&project.skipped, &ctx.path("Impact")),
        vec!["Tables/DISABLED_Broken.sql"]
    );
    assert_eq!(plan.script_count(), 1);
}

#[test]
fn test_plan_fails_on_missing_project() {
    let ctx = TestContext::new();
    ctx.write_config("databases:\n  - name: Impact_DB\n    project: Missing/Missing.sqlproj\n");

    let err = build_plan(&ctx.load_config()).unwrap_err();
    assert!(format!("{err:#}").contains("Missing.sqlproj"), "{err:#}");
}
