mod common;

use common::{TestWorkspace, table};
use quiz_ledger::{
    chart::lookup_chart,
    lookup::{StudentLookup, TableBest},
};

#[test]
fn finds_rows_across_tables_and_skips_tables_without_identity() {
    let workspace = TestWorkspace::new();
    let store = workspace.store();
    store
        .replace_table(
            "exam",
            &table(&["Student ID", "score"], &[&["156", "40"], &["157", "60"], &["156", "70"]]),
        )
        .unwrap();
    store
        .replace_table(
            "quiz",
            &table(&["researcher", "Grade10"], &[&["156.0", "7"], &["200", "9"]]),
        )
        .unwrap();
    store
        .replace_table("misc", &table(&["comment"], &[&["156"]]))
        .unwrap();

    let report = StudentLookup::new(&store).find(" 156 ").unwrap();
    assert_eq!(report.identity, "156");
    assert_eq!(report.matches.len(), 3);
    assert_eq!(report.tables(), vec!["exam", "quiz"]);
    assert_eq!(
        report.best_scores(),
        vec![
            TableBest {
                table: "exam".into(),
                best_score: 70.0
            },
            TableBest {
                table: "quiz".into(),
                best_score: 7.0
            },
        ]
    );

    let chart = lookup_chart(&report).expect("chart");
    assert_eq!(chart.labels, vec!["exam", "quiz"]);
    assert_eq!(chart.series[0].values, vec![Some(70.0), Some(7.0)]);
}

#[test]
fn unknown_identity_is_not_found() {
    let workspace = TestWorkspace::new();
    let store = workspace.store();
    store
        .replace_table("exam", &table(&["student", "score"], &[&["a", "1"]]))
        .unwrap();
    let err = StudentLookup::new(&store).find("zz").unwrap_err();
    assert!(err.is_not_found());
}
