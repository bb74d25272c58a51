//! Chart descriptions handed to an external renderer.
//!
//! Reports are turned into labels plus one or two numeric series and a title,
//! then written as JSON. Nothing here changes the numbers.

use std::{fs::File, io::BufWriter, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    error::Result, lookup::LookupReport, performance::PerformanceReport,
    underperformance::UnderperformanceReport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesKind {
    Bar,
    Scatter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    pub kind: SeriesKind,
    /// `None` marks a label with no data point in this series.
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y_range: Option<(f64, f64)>,
    pub labels: Vec<String>,
    pub series: Vec<Series>,
}

fn bars(name: &str, values: impl IntoIterator<Item = f64>) -> Series {
    Series {
        name: name.to_string(),
        kind: SeriesKind::Bar,
        values: values.into_iter().map(Some).collect(),
    }
}

/// Absolute-vs-average and relative charts for one student.
pub fn performance_charts(report: &PerformanceReport) -> Vec<ChartSpec> {
    let labels = report
        .questions
        .iter()
        .map(|q| q.question.clone())
        .collect::<Vec<_>>();
    vec![
        ChartSpec {
            title: format!(
                "Absolute Performance per Question | Student {} | {}",
                report.identity, report.table
            ),
            x_label: "Question".into(),
            y_label: "Percentage".into(),
            y_range: Some((0.0, 105.0)),
            labels: labels.clone(),
            series: vec![
                bars(
                    "Student (Absolute %)",
                    report.questions.iter().map(|q| q.student_pct),
                ),
                bars(
                    "Class Average (%)",
                    report.questions.iter().map(|q| q.class_avg_pct),
                ),
            ],
        },
        ChartSpec {
            title: format!(
                "Relative Performance per Question (Student - Avg) | Student {} | {}",
                report.identity, report.table
            ),
            x_label: "Question".into(),
            y_label: "Points vs Average".into(),
            y_range: None,
            labels,
            series: vec![bars(
                "Relative (Student - Avg)",
                report.questions.iter().map(|q| q.relative_pct),
            )],
        },
    ]
}

/// Charts of the flagged rows only; empty when nobody is flagged.
pub fn underperformer_charts(report: &UnderperformanceReport) -> Vec<ChartSpec> {
    let flagged = report.flagged().collect::<Vec<_>>();
    if flagged.is_empty() {
        return Vec::new();
    }
    let labels = flagged
        .iter()
        .map(|row| row.identity.clone())
        .collect::<Vec<_>>();
    let summative = || flagged.iter().map(|row| row.summative_score);
    vec![
        ChartSpec {
            title: format!(
                "Underperforming Students (Summative: {}, Threshold < {})",
                report.summative_table, report.threshold
            ),
            x_label: "Student ID".into(),
            y_label: "Summative Score (%)".into(),
            y_range: None,
            labels: labels.clone(),
            series: vec![bars("Summative (%)", summative())],
        },
        ChartSpec {
            title: "Summative vs Lowest Formative (Underperforming Students)".into(),
            x_label: "Student ID".into(),
            y_label: "Score (%)".into(),
            y_range: None,
            labels,
            series: vec![
                bars("Summative (%)", summative()),
                Series {
                    name: "Lowest Formative (%)".into(),
                    kind: SeriesKind::Scatter,
                    values: flagged
                        .iter()
                        .map(|row| row.lowest_formative.as_ref().map(|low| low.score))
                        .collect(),
                },
            ],
        },
    ]
}

/// Best score per table for one student, if any table carries a score.
pub fn lookup_chart(report: &LookupReport) -> Option<ChartSpec> {
    let best = report.best_scores();
    if best.is_empty() {
        return None;
    }
    Some(ChartSpec {
        title: format!("Best score per assessment | Student {}", report.identity),
        x_label: "Assessment".into(),
        y_label: "Score".into(),
        y_range: None,
        labels: best.iter().map(|b| b.table.clone()).collect(),
        series: vec![bars("Score", best.iter().map(|b| b.best_score))],
    })
}

pub fn write_charts(path: &Path, charts: &[ChartSpec]) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, charts)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::performance::QuestionPerformance;
    use crate::underperformance::{FormativeLow, UnderperformanceRow};

    #[test]
    fn performance_charts_carry_both_series() {
        let report = PerformanceReport {
            identity: "7".into(),
            table: "quiz__formatted_1".into(),
            identity_column: "student".into(),
            questions: vec![QuestionPerformance {
                question: "Q1".into(),
                student_pct: 80.0,
                class_avg_pct: 60.0,
                relative_pct: 20.0,
            }],
        };
        let charts = performance_charts(&report);
        assert_eq!(charts.len(), 2);
        assert_eq!(charts[0].series.len(), 2);
        assert_eq!(charts[0].series[1].values, vec![Some(60.0)]);
        assert_eq!(charts[1].series[0].values, vec![Some(20.0)]);
    }

    #[test]
    fn underperformer_charts_only_plot_flagged_rows() {
        let row = |identity: &str, score: f64, flagged: bool| UnderperformanceRow {
            identity: identity.into(),
            summative_table: "final".into(),
            summative_score: score,
            lowest_formative: flagged.then(|| FormativeLow {
                score: 10.0,
                table: "quiz".into(),
            }),
            is_underperforming: flagged,
        };
        let report = UnderperformanceReport {
            summative_table: "final".into(),
            threshold: 40.0,
            rows: vec![row("a", 20.0, true), row("b", 90.0, false)],
        };
        let charts = underperformer_charts(&report);
        assert_eq!(charts[0].labels, vec!["a"]);
        assert_eq!(charts[1].series[1].kind, SeriesKind::Scatter);
        assert_eq!(charts[1].series[1].values, vec![Some(10.0)]);

        let json = serde_json::to_string(&charts[1]).unwrap();
        assert!(json.contains("\"kind\":\"scatter\""));
    }
}
