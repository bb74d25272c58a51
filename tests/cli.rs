mod common;

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use common::{TestWorkspace, fixture_path};
use predicates::prelude::*;
use predicates::str::contains;

fn ledger(db: &Path) -> Command {
    let mut cmd = Command::cargo_bin("quiz-ledger").expect("binary exists");
    cmd.arg("--db").arg(db);
    cmd
}

fn ingest_fixture(db: &Path) {
    ledger(db)
        .args(["ingest", "-i"])
        .arg(fixture_path("quiz_scenario.csv"))
        .assert()
        .success()
        .stdout(contains("quiz_scenario__raw_1"))
        .stdout(contains("quiz_scenario__cleaned_1"))
        .stdout(contains("quiz_scenario__formatted_1"));
}

#[test]
fn ingest_then_list_tables() {
    let workspace = TestWorkspace::new();
    let db = workspace.db_path();
    ingest_fixture(&db);

    ledger(&db)
        .arg("tables")
        .assert()
        .success()
        .stdout(contains("quiz_scenario__cleaned_1").and(contains("quiz_scenario__formatted_1")));
}

#[test]
fn repeated_ingest_allocates_a_new_run() {
    let workspace = TestWorkspace::new();
    let db = workspace.db_path();
    ingest_fixture(&db);
    ledger(&db)
        .args(["ingest", "-i"])
        .arg(fixture_path("quiz_scenario.csv"))
        .assert()
        .success()
        .stdout(contains("quiz_scenario__formatted_2"));
}

#[test]
fn export_writes_cleaned_columns() {
    let workspace = TestWorkspace::new();
    let db = workspace.db_path();
    ingest_fixture(&db);
    let output = workspace.path().join("cleaned.csv");

    ledger(&db)
        .args(["export", "quiz_scenario__cleaned_1", "-o"])
        .arg(&output)
        .assert()
        .success();

    let contents = fs::read_to_string(&output).expect("read export");
    let mut lines = contents.lines();
    assert_eq!(lines.next(), Some("student_id,score,Q1,score_2"));
    assert_eq!(lines.next(), Some("3,80,20,35"));
    assert_eq!(contents.lines().count(), 4);
}

#[test]
fn show_limits_rows() {
    let workspace = TestWorkspace::new();
    let db = workspace.db_path();
    ingest_fixture(&db);
    ledger(&db)
        .args(["show", "quiz_scenario__raw_1", "--rows", "2"])
        .assert()
        .success()
        .stdout(contains("Q1 /100").and(contains("... 2 more row(s)")));
}

#[test]
fn analyse_prints_json_and_writes_charts() {
    let workspace = TestWorkspace::new();
    let db = workspace.db_path();
    ingest_fixture(&db);
    let chart = workspace.path().join("analyse.json");

    let output = ledger(&db)
        .args(["analyse", "3", "--json", "--chart"])
        .arg(&chart)
        .output()
        .expect("run analyse");
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json report");
    assert_eq!(report["table"], "quiz_scenario__formatted_1");
    assert_eq!(report["questions"][0]["question"], "Q1");
    assert_eq!(report["questions"][0]["student_pct"], 20.0);

    let charts: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&chart).expect("read charts")).expect("json charts");
    assert_eq!(charts.as_array().map(Vec::len), Some(2));
}

#[test]
fn report_flags_students_below_threshold() {
    let workspace = TestWorkspace::new();
    let db = workspace.db_path();
    ingest_fixture(&db);
    let chart = workspace.path().join("report.json");

    ledger(&db)
        .args(["report", "--threshold", "70", "--only-flagged", "--chart"])
        .arg(&chart)
        .assert()
        .success()
        .stdout(contains("62.50").and(contains("87.50").not()));
    assert!(chart.exists());
}

#[test]
fn report_reads_threshold_from_config() {
    let workspace = TestWorkspace::new();
    let db = workspace.db_path();
    ingest_fixture(&db);
    let config = workspace.write(
        "ledger.yaml",
        &format!("database: '{}'\nthreshold: 90\n", db.display()),
    );

    let output = Command::cargo_bin("quiz-ledger")
        .expect("binary exists")
        .arg("--config")
        .arg(&config)
        .args(["report", "--json"])
        .output()
        .expect("run report");
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json report");
    assert_eq!(report["threshold"], 90.0);
    let flagged = report["rows"]
        .as_array()
        .expect("rows")
        .iter()
        .filter(|row| row["is_underperforming"] == true)
        .count();
    assert_eq!(flagged, 2);
}

#[test]
fn lookup_prints_matching_rows() {
    let workspace = TestWorkspace::new();
    let db = workspace.db_path();
    ingest_fixture(&db);
    ledger(&db)
        .args(["lookup", "2"])
        .assert()
        .success()
        .stdout(contains("== quiz_scenario__cleaned_1 (1 row(s))"));
}

#[test]
fn missing_database_is_reported() {
    let workspace = TestWorkspace::new();
    ledger(&workspace.path().join("absent.db"))
        .arg("tables")
        .assert()
        .failure()
        .stderr(contains("error:").and(contains("does not exist")));
}

#[test]
fn unknown_student_fails() {
    let workspace = TestWorkspace::new();
    let db = workspace.db_path();
    ingest_fixture(&db);
    ledger(&db)
        .args(["analyse", "999"])
        .assert()
        .failure()
        .stderr(contains("no row found for '999'"));
}
