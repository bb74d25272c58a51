//! Every stored row for one identity, across all tables.
//!
//! Identity columns are detected from column metadata alone, so tables that
//! cannot be matched are skipped without reading their rows.

use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    data::{Value, normalize_identity},
    error::{LedgerError, Result},
    store::{TableStore, detect_identity_column},
};

#[derive(Debug, Clone, Serialize)]
pub struct StudentMatch {
    pub table: String,
    pub columns: Vec<String>,
    pub row: Vec<Value>,
}

impl StudentMatch {
    pub fn value(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.row[idx])
    }

    /// `score` when present, else the first column starting with `grade`,
    /// both compared case-insensitively.
    pub fn score_column(&self) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.eq_ignore_ascii_case("score"))
            .or_else(|| {
                self.columns
                    .iter()
                    .find(|c| c.to_lowercase().starts_with("grade"))
            })
            .map(String::as_str)
    }

    pub fn score(&self) -> Option<f64> {
        self.score_column()
            .and_then(|column| self.value(column))
            .and_then(Value::as_number)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableBest {
    pub table: String,
    pub best_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LookupReport {
    pub identity: String,
    pub matches: Vec<StudentMatch>,
}

impl LookupReport {
    pub fn tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = Vec::new();
        for m in &self.matches {
            if tables.last() != Some(&m.table.as_str()) {
                tables.push(&m.table);
            }
        }
        tables
    }

    /// Highest score per table, for tables whose matches carry one.
    pub fn best_scores(&self) -> Vec<TableBest> {
        self.tables()
            .into_iter()
            .filter_map(|table| {
                self.matches
                    .iter()
                    .filter(|m| m.table == table)
                    .filter_map(StudentMatch::score)
                    .reduce(f64::max)
                    .map(|best_score| TableBest {
                        table: table.to_string(),
                        best_score,
                    })
            })
            .collect()
    }
}

pub struct StudentLookup<'a> {
    store: &'a TableStore,
}

impl<'a> StudentLookup<'a> {
    pub fn new(store: &'a TableStore) -> Self {
        Self { store }
    }

    pub fn find(&self, identity: &str) -> Result<LookupReport> {
        let key = normalize_identity(identity);
        let mut matches = Vec::new();
        for table in self.store.list_tables()? {
            let columns = match self.store.column_names(&table) {
                Ok(columns) => columns,
                Err(err) => {
                    warn!("Skipping '{table}': {err}");
                    continue;
                }
            };
            let Ok(id_column) = detect_identity_column(&columns) else {
                debug!("Skipping '{table}': no identity column");
                continue;
            };
            match self.store.load_matching_rows(&table, &id_column, &key) {
                Ok(found) => {
                    debug!("'{table}' has {} row(s) for '{key}'", found.row_count());
                    matches.extend(found.rows.into_iter().map(|row| StudentMatch {
                        table: table.clone(),
                        columns: found.columns.clone(),
                        row,
                    }));
                }
                Err(err) => warn!("Skipping '{table}': {err}"),
            }
        }
        if matches.is_empty() {
            return Err(LedgerError::NotFound(format!("no rows found for '{identity}'")));
        }
        info!("Found {} row(s) for '{key}'", matches.len());
        Ok(LookupReport {
            identity: key,
            matches,
        })
    }
}
