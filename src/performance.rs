//! Per-question performance of one student against the class.
//!
//! Stored tables may come from any pipeline stage (or from outside the
//! pipeline), so every question column is passed through
//! [`ensure_percent_scale`] before it is compared.

use log::{debug, info};
use serde::Serialize;

use crate::{
    data::{Table, normalize_identity},
    error::{LedgerError, Result},
    normalize::{ensure_percent_scale, percent_column},
    store::{TableStore, detect_identity_column, detect_question_columns, latest_formatted_table},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionPerformance {
    pub question: String,
    pub student_pct: f64,
    pub class_avg_pct: f64,
    /// Student minus class average; negative when below average.
    pub relative_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub identity: String,
    pub table: String,
    pub identity_column: String,
    pub questions: Vec<QuestionPerformance>,
}

impl PerformanceReport {
    pub fn headers() -> Vec<String> {
        ["question", "student_pct", "class_avg_pct", "relative_pct"]
            .iter()
            .map(|h| h.to_string())
            .collect()
    }

    pub fn render_rows(&self) -> Vec<Vec<String>> {
        self.questions
            .iter()
            .map(|q| {
                vec![
                    q.question.clone(),
                    format!("{:.2}", q.student_pct),
                    format!("{:.2}", q.class_avg_pct),
                    format!("{:+.2}", q.relative_pct),
                ]
            })
            .collect()
    }
}

/// The most recent formatted table, otherwise the first table.
pub fn default_table(tables: &[String]) -> Option<String> {
    latest_formatted_table(tables).or_else(|| tables.first().cloned())
}

pub struct PerformanceAnalyzer<'a> {
    store: &'a TableStore,
}

impl<'a> PerformanceAnalyzer<'a> {
    pub fn new(store: &'a TableStore) -> Self {
        Self { store }
    }

    pub fn analyse(&self, identity: &str, table: Option<&str>) -> Result<PerformanceReport> {
        let tables = self.store.list_tables()?;
        if tables.is_empty() {
            return Err(LedgerError::NotFound("no tables found in the database".into()));
        }
        let table_name = match table {
            Some(name) => name.to_string(),
            None => default_table(&tables)
                .ok_or_else(|| LedgerError::NotFound("no tables found in the database".into()))?,
        };
        if !tables.contains(&table_name) {
            return Err(LedgerError::NotFound(format!("table '{table_name}' not found")));
        }
        debug!("Analysing identity '{identity}' against '{table_name}'");
        let loaded = self.store.load_table(&table_name)?;
        let report = analyse_table(&table_name, &loaded, identity)?;
        info!(
            "Analysed {} question(s) for '{}' in '{}'",
            report.questions.len(),
            report.identity,
            table_name
        );
        Ok(report)
    }
}

/// Scores one identity against the rest of `table`.
pub fn analyse_table(table_name: &str, table: &Table, identity: &str) -> Result<PerformanceReport> {
    let identity_column = detect_identity_column(&table.columns)?;
    let id_idx = table
        .column_index(&identity_column)
        .ok_or_else(|| LedgerError::NotFound(format!("column '{identity_column}' not found")))?;
    let key = normalize_identity(identity);
    let student_rows = table
        .column_values(id_idx)
        .enumerate()
        .filter(|(_, value)| value.identity_key() == key)
        .map(|(idx, _)| idx)
        .collect::<Vec<_>>();
    if student_rows.is_empty() {
        return Err(LedgerError::NotFound(format!(
            "no row found for '{identity}' in '{table_name}'"
        )));
    }

    let questions = detect_question_columns(&table.columns)?;
    let indices = questions
        .iter()
        .filter_map(|q| table.column_index(q))
        .collect::<Vec<_>>();
    let class = indices
        .iter()
        .map(|&idx| percent_column(table, idx))
        .collect::<Vec<_>>();
    // The identity's rows are brought onto the 0-100 scale on their own.
    let student = indices
        .iter()
        .map(|&idx| {
            let values = table.numeric_column(idx);
            ensure_percent_scale(&student_rows.iter().map(|&row| values[row]).collect::<Vec<_>>())
        })
        .collect::<Vec<_>>();

    let best = (0..student_rows.len())
        .fold(None::<(usize, f64)>, |best, pos| {
            let total = student.iter().map(|column| column[pos]).sum::<f64>();
            match best {
                Some((_, best_total)) if best_total >= total => best,
                _ => Some((pos, total)),
            }
        })
        .map_or(0, |(pos, _)| pos);
    if student_rows.len() > 1 {
        debug!(
            "Identity '{identity}' has {} rows in '{table_name}'; using row {}",
            student_rows.len(),
            student_rows[best]
        );
    }

    let questions = questions
        .into_iter()
        .zip(class.iter().zip(&student))
        .map(|(question, (column, own))| {
            let student_pct = own[best];
            let class_avg_pct = column.iter().sum::<f64>() / column.len() as f64;
            QuestionPerformance {
                question,
                student_pct,
                class_avg_pct,
                relative_pct: student_pct - class_avg_pct,
            }
        })
        .collect();

    Ok(PerformanceReport {
        identity: key,
        table: table_name.to_string(),
        identity_column,
        questions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;

    fn sample() -> Table {
        Table::new(
            vec!["student_id".into(), "Q1".into(), "Q2".into()],
            vec![
                vec![1.0.into(), 80.0.into(), 40.0.into()],
                vec![2.0.into(), 40.0.into(), 60.0.into()],
                vec![3.0.into(), 60.0.into(), 20.0.into()],
            ],
        )
    }

    #[test]
    fn relative_scores_subtract_the_class_mean() {
        let report = analyse_table("t", &sample(), "1").unwrap();
        assert_eq!(report.questions.len(), 2);
        let q1 = &report.questions[0];
        assert_eq!(q1.question, "Q1");
        assert_eq!(q1.student_pct, 80.0);
        assert_eq!(q1.class_avg_pct, 60.0);
        assert_eq!(q1.relative_pct, 20.0);
        assert_eq!(report.questions[1].relative_pct, 0.0);
    }

    #[test]
    fn best_attempt_is_used_for_duplicate_identities() {
        let mut table = sample();
        table.rows.push(vec![1.0.into(), 100.0.into(), 100.0.into()]);
        let report = analyse_table("t", &table, "1.0").unwrap();
        assert_eq!(report.questions[0].student_pct, 100.0);
        assert_eq!(report.questions[0].class_avg_pct, 70.0);
    }

    #[test]
    fn student_rows_are_rescaled_on_their_own() {
        let proportion = Table::new(
            vec!["student_id".into(), "Q1".into()],
            vec![vec![1.0.into(), 0.5.into()], vec![2.0.into(), 80.0.into()]],
        );
        let report = analyse_table("t", &proportion, "1").unwrap();
        assert_eq!(report.questions[0].student_pct, 50.0);
        assert_eq!(report.questions[0].class_avg_pct, 40.25);

        let oversized = Table::new(
            vec!["student_id".into(), "Q1".into()],
            vec![vec![1.0.into(), 50.0.into()], vec![2.0.into(), 200.0.into()]],
        );
        let report = analyse_table("t", &oversized, "1").unwrap();
        let q1 = &report.questions[0];
        assert_eq!(q1.student_pct, 50.0);
        assert_eq!(q1.class_avg_pct, 62.5);
        assert_eq!(q1.relative_pct, -12.5);
    }

    #[test]
    fn unknown_identity_is_not_found() {
        let err = analyse_table("t", &sample(), "99").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn text_identities_match_trimmed() {
        let table = Table::new(
            vec!["Researcher".into(), "Q1".into()],
            vec![vec![Value::Text(" r-7 ".into()), 50.0.into()]],
        );
        let report = analyse_table("t", &table, "r-7").unwrap();
        assert_eq!(report.identity_column, "Researcher");
    }

    #[test]
    fn default_table_prefers_latest_formatted() {
        let tables = vec![
            "a__formatted_1".to_string(),
            "a__raw_3".to_string(),
            "b__formatted_3".to_string(),
        ];
        assert_eq!(default_table(&tables).as_deref(), Some("b__formatted_3"));
        assert_eq!(default_table(&["x".to_string()]).as_deref(), Some("x"));
    }
}
