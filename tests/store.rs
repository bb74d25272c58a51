mod common;

use common::{TestWorkspace, table};
use quiz_ledger::{
    data::Value,
    pipeline::SnapshotKind,
    store::{TableStore, latest_formatted_table, snapshot_table_name},
};

#[test]
fn replace_then_load_keeps_rows_and_columns() {
    let workspace = TestWorkspace::new();
    let store = workspace.store();
    let source = table(
        &["student", "Q1", "comment"],
        &[&["s-1", "50", "late"], &["s-2", "75.5", ""]],
    );
    store.replace_table("quiz", &source).unwrap();

    let loaded = store.load_table("quiz").unwrap();
    assert_eq!(loaded.columns, source.columns);
    assert_eq!(loaded.row_count(), 2);
    assert_eq!(loaded.rows[1][1], Value::Number(75.5));
    assert_eq!(loaded.rows[1][2], Value::Missing);
    assert_eq!(store.column_names("quiz").unwrap(), source.columns);
}

#[test]
fn replace_overwrites_existing_tables() {
    let workspace = TestWorkspace::new();
    let store = workspace.store();
    store
        .replace_table("quiz", &table(&["a"], &[&["1"], &["2"]]))
        .unwrap();
    store
        .replace_table("quiz", &table(&["b", "c"], &[&["3", "4"]]))
        .unwrap();
    let loaded = store.load_table("quiz").unwrap();
    assert_eq!(loaded.columns, vec!["b", "c"]);
    assert_eq!(loaded.row_count(), 1);
    assert_eq!(store.list_tables().unwrap(), vec!["quiz"]);
}

#[test]
fn case_insensitive_column_clashes_are_suffixed() {
    let workspace = TestWorkspace::new();
    let store = workspace.store();
    store
        .replace_table("t", &table(&["Score", "score"], &[&["1", "2"]]))
        .unwrap();
    assert_eq!(store.column_names("t").unwrap(), vec!["Score", "score_2"]);
}

#[test]
fn missing_tables_and_databases_are_not_found() {
    let workspace = TestWorkspace::new();
    let store = workspace.store();
    assert!(store.load_table("nope").unwrap_err().is_not_found());
    assert!(store.column_names("nope").unwrap_err().is_not_found());
    let err = TableStore::open_existing(workspace.path().join("absent.db")).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn matching_rows_compare_numeric_identities_numerically() {
    let workspace = TestWorkspace::new();
    let store = workspace.store();
    store
        .replace_table(
            "quiz",
            &table(
                &["student_id", "score"],
                &[&["156", "40"], &["157", "60"], &["156", "70"]],
            ),
        )
        .unwrap();
    let found = store.load_matching_rows("quiz", "student_id", "156.0").unwrap();
    assert_eq!(found.row_count(), 2);
    let none = store.load_matching_rows("quiz", "student_id", "999").unwrap();
    assert!(none.is_empty());
}

#[test]
fn matching_rows_trim_text_identities() {
    let workspace = TestWorkspace::new();
    let store = workspace.store();
    store
        .replace_table(
            "quiz",
            &table(&["Researcher", "score"], &[&[" r-7 ", "1"], &["r-8", "2"], &["abc", "3"]]),
        )
        .unwrap();
    let found = store.load_matching_rows("quiz", "Researcher", "r-7").unwrap();
    assert_eq!(found.row_count(), 1);
    assert_eq!(found.rows[0][1], Value::Number(1.0));
}

#[test]
fn run_ids_continue_after_stored_snapshots() {
    let workspace = TestWorkspace::new();
    let store = workspace.store();
    assert_eq!(store.next_run_id().unwrap(), 1);
    let one = table(&["Q1"], &[&["1"]]);
    store
        .replace_table(&snapshot_table_name("quiz", SnapshotKind::Formatted, 4), &one)
        .unwrap();
    store
        .replace_table(&snapshot_table_name("exam", SnapshotKind::Raw, 2), &one)
        .unwrap();
    store.replace_table("notes", &one).unwrap();
    assert_eq!(store.next_run_id().unwrap(), 5);

    let tables = store.list_tables().unwrap();
    assert_eq!(latest_formatted_table(&tables).as_deref(), Some("quiz__formatted_4"));
}
