//! Cross-test underperformance report.
//!
//! Each identity's best attempt on the summative table is paired with the
//! lowest of its best attempts across every other (formative) table, and
//! identities scoring strictly below the threshold are flagged.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    classify::{SCORE_COLUMN, identity_keyword_rank, is_question_column},
    data::Table,
    error::{LedgerError, Result},
    normalize::{ensure_percent_scale, percent_column},
    store::{TableStore, detect_identity_column, formatted_tables, latest_formatted_table},
};

pub const DEFAULT_THRESHOLD: f64 = 40.0;
pub const DEFAULT_SUMMATIVE_KEYWORDS: &[&str] = &["summative", "final", "online", "exam"];
/// Shown in place of a formative table when an identity has none.
pub const NO_FORMATIVE_TABLE: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormativeLow {
    pub score: f64,
    pub table: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnderperformanceRow {
    pub identity: String,
    pub summative_table: String,
    pub summative_score: f64,
    pub lowest_formative: Option<FormativeLow>,
    pub is_underperforming: bool,
}

impl UnderperformanceRow {
    pub fn lowest_formative_table(&self) -> &str {
        self.lowest_formative
            .as_ref()
            .map_or(NO_FORMATIVE_TABLE, |low| low.table.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UnderperformanceReport {
    pub summative_table: String,
    pub threshold: f64,
    pub rows: Vec<UnderperformanceRow>,
}

impl UnderperformanceReport {
    pub fn flagged(&self) -> impl Iterator<Item = &UnderperformanceRow> {
        self.rows.iter().filter(|row| row.is_underperforming)
    }

    pub fn headers() -> Vec<String> {
        [
            "identity",
            "summative_score",
            "lowest_formative_score",
            "lowest_formative_table",
            "is_underperforming",
        ]
        .iter()
        .map(|h| h.to_string())
        .collect()
    }

    pub fn render_rows(&self, only_flagged: bool) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .filter(|row| !only_flagged || row.is_underperforming)
            .map(|row| {
                vec![
                    row.identity.clone(),
                    format!("{:.2}", row.summative_score),
                    row.lowest_formative
                        .as_ref()
                        .map_or_else(|| "no formative data".to_string(), |low| format!("{:.2}", low.score)),
                    row.lowest_formative_table().to_string(),
                    row.is_underperforming.to_string(),
                ]
            })
            .collect()
    }
}

/// Row totals on a 0-100 scale: an explicit `score` column, else the sum of
/// `Q<n>` columns, else the sum of non-identity numeric columns, else zero.
pub fn derive_totals(table: &Table) -> Vec<f64> {
    if let Some(idx) = table
        .columns
        .iter()
        .position(|c| c.eq_ignore_ascii_case(SCORE_COLUMN))
    {
        return percent_column(table, idx);
    }

    let questions = table
        .columns
        .iter()
        .enumerate()
        .filter(|(_, name)| is_question_column(name))
        .map(|(idx, _)| percent_column(table, idx))
        .collect::<Vec<_>>();
    if !questions.is_empty() {
        return ensure_percent_scale(&sum_columns(&questions, table.row_count()));
    }

    let numeric = table
        .columns
        .iter()
        .enumerate()
        .filter(|(idx, name)| identity_keyword_rank(name).is_none() && table.is_numeric_column(*idx))
        .map(|(idx, _)| table.numeric_column(idx))
        .collect::<Vec<_>>();
    if numeric.is_empty() {
        return vec![0.0; table.row_count()];
    }
    ensure_percent_scale(&sum_columns(&numeric, table.row_count()))
}

fn sum_columns(columns: &[Vec<f64>], rows: usize) -> Vec<f64> {
    (0..rows)
        .map(|row| columns.iter().map(|column| column[row]).sum())
        .collect()
}

/// Best total per identity, ordered by descending total; the first row wins ties.
pub fn best_totals(table: &Table, identity_column: &str) -> Result<Vec<(String, f64)>> {
    let id_idx = table
        .column_index(identity_column)
        .ok_or_else(|| LedgerError::NotFound(format!("column '{identity_column}' not found")))?;
    let totals = derive_totals(table);
    let mut seen = HashSet::new();
    Ok((0..table.row_count())
        .sorted_by(|&a, &b| totals[b].total_cmp(&totals[a]))
        .map(|row| (table.rows[row][id_idx].identity_key(), totals[row]))
        .filter(|(identity, _)| seen.insert(identity.clone()))
        .collect())
}

/// Picks the summative table among `tables` when none is named.
pub fn detect_summative_table<S: AsRef<str>>(tables: &[String], keywords: &[S]) -> Option<String> {
    for keyword in keywords {
        let keyword = keyword.as_ref().to_lowercase();
        if let Some(found) = tables.iter().find(|t| t.to_lowercase().contains(&keyword)) {
            return Some(found.clone());
        }
    }
    latest_formatted_table(tables).or_else(|| tables.first().cloned())
}

/// Running minimum of per-table best totals, keyed by identity.
#[derive(Debug, Default)]
pub struct FormativeMinimums {
    lows: HashMap<String, FormativeLow>,
}

impl FormativeMinimums {
    pub fn record(&mut self, table: &str, identity: &str, score: f64) {
        match self.lows.get_mut(identity) {
            Some(low) if score < low.score => {
                low.score = score;
                low.table = table.to_string();
            }
            Some(_) => {}
            None => {
                self.lows.insert(
                    identity.to_string(),
                    FormativeLow {
                        score,
                        table: table.to_string(),
                    },
                );
            }
        }
    }

    pub fn get(&self, identity: &str) -> Option<&FormativeLow> {
        self.lows.get(identity)
    }
}

/// Builds report rows sorted ascending by summative score.
pub fn assemble_report(
    summative_table: &str,
    summative_best: &[(String, f64)],
    formative: &FormativeMinimums,
    threshold: f64,
) -> UnderperformanceReport {
    let rows = summative_best
        .iter()
        .map(|(identity, score)| UnderperformanceRow {
            identity: identity.clone(),
            summative_table: summative_table.to_string(),
            summative_score: *score,
            lowest_formative: formative.get(identity).cloned(),
            is_underperforming: *score < threshold,
        })
        .sorted_by(|a, b| a.summative_score.total_cmp(&b.summative_score))
        .collect();
    UnderperformanceReport {
        summative_table: summative_table.to_string(),
        threshold,
        rows,
    }
}

pub struct UnderperformanceReporter<'a> {
    store: &'a TableStore,
    summative_keywords: Vec<String>,
}

impl<'a> UnderperformanceReporter<'a> {
    pub fn new(store: &'a TableStore) -> Self {
        Self {
            store,
            summative_keywords: DEFAULT_SUMMATIVE_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.summative_keywords = keywords;
        self
    }

    pub fn build_report(
        &self,
        summative_table: Option<&str>,
        threshold: f64,
    ) -> Result<UnderperformanceReport> {
        if !threshold.is_finite() {
            return Err(LedgerError::InvalidArgument(format!(
                "threshold must be a finite number, got {threshold}"
            )));
        }
        let tables = self.store.list_tables()?;
        if tables.is_empty() {
            return Err(LedgerError::NotFound("no tables found in the database".into()));
        }
        let formatted = formatted_tables(&tables);
        let tests = if formatted.is_empty() { tables.clone() } else { formatted };

        let summative = match summative_table {
            Some(name) => {
                if !tables.iter().any(|t| t == name) {
                    return Err(LedgerError::InvalidArgument(format!(
                        "summative table '{name}' not found"
                    )));
                }
                name.to_string()
            }
            None => detect_summative_table(&tests, &self.summative_keywords)
                .ok_or_else(|| LedgerError::NotFound("no tables found in the database".into()))?,
        };
        info!("Using '{summative}' as the summative table");

        let summative_data = self.store.load_table(&summative)?;
        let summative_id = detect_identity_column(&summative_data.columns)?;
        let summative_best = best_totals(&summative_data, &summative_id)?;

        let mut formative = FormativeMinimums::default();
        for table in tests.iter().filter(|t| **t != summative) {
            match self.formative_best(table) {
                Ok(best) => {
                    debug!("Formative table '{table}' has {} identities", best.len());
                    for (identity, score) in best {
                        formative.record(table, &identity, score);
                    }
                }
                Err(err) => warn!("Skipping formative table '{table}': {err}"),
            }
        }

        let report = assemble_report(&summative, &summative_best, &formative, threshold);
        info!(
            "{} of {} identities below {threshold} in '{summative}'",
            report.flagged().count(),
            report.rows.len()
        );
        Ok(report)
    }

    fn formative_best(&self, table: &str) -> Result<Vec<(String, f64)>> {
        let data = self.store.load_table(table)?;
        let identity = detect_identity_column(&data.columns)?;
        best_totals(&data, &identity)
    }
}
