//! Unit tests for GO batch splitting
//!
//! Covers the scripts setup directories actually contain: headers, comments,
//! trailing separators and Windows line endings.

use pretty_assertions::assert_eq;
use rust_sqlfixture::batch::{count_batches, split_batches};

fn sql_of(script: &str) -> Vec<&str> {
    split_batches(script).into_iter().map(|b| b.sql).collect()
}

// ============================================================================
// Separator Tests
// ============================================================================

#[test]
fn test_example_script() {
    let script = "CREATE TABLE T(id INT)\nGO\nINSERT INTO T VALUES(1)\nGO\n";
    assert_eq!(
        sql_of(script),
        vec!["CREATE TABLE T(id INT)", "INSERT INTO T VALUES(1)"]
    );
}

#[test]
fn test_go_with_trailing_comment_still_splits() {
    let script = "SELECT 1\nGO -- end of part one\nSELECT 2";
    assert_eq!(sql_of(script), vec!["SELECT 1", "-- end of part one\nSELECT 2"]);
}

#[test]
fn test_identifiers_containing_go_do_not_split() {
    let script = "SELECT GOAL, CATEGORY FROM dbo.GOODS WHERE ALGO = 1";
    assert_eq!(count_batches(script), 1);
}

#[test]
fn test_lowercase_go_in_comment_does_not_split() {
    let script = "-- let's go and seed the lookup tables\nINSERT INTO L VALUES (1)";
    assert_eq!(count_batches(script), 1);
}

#[test]
fn test_repeated_separators_collapse() {
    let script = "GO\nGO\nSELECT 1\nGO\n\nGO\n";
    assert_eq!(sql_of(script), vec!["SELECT 1"]);
}

#[test]
fn test_only_separators_yields_nothing() {
    assert_eq!(count_batches("GO\n  GO  \nGO"), 0);
    assert_eq!(count_batches(""), 0);
    assert_eq!(count_batches("   \n\t\n"), 0);
}

// ============================================================================
// Line Number Tests
// ============================================================================

#[test]
fn test_start_lines_point_at_first_statement_line() {
    let script = "-- header\nCREATE TABLE T(id INT)\nGO\n\n\nINSERT INTO T VALUES(1)\nGO\n";
    let lines: Vec<usize> = split_batches(script).iter().map(|b| b.start_line).collect();
    assert_eq!(lines, vec![1, 6]);
}

#[test]
fn test_start_lines_with_crlf() {
    let script = "SELECT 1\r\nGO\r\nSELECT 2\r\nGO\r\nSELECT 3";
    let batches = split_batches(script);
    assert_eq!(
        batches.iter().map(|b| (b.index, b.start_line)).collect::<Vec<_>>(),
        vec![(0, 1), (1, 3), (2, 5)]
    );
    assert_eq!(batches[1].sql, "SELECT 2");
}
