use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
    Missing,
}

impl Value {
    /// Parses a raw CSV field. Blank fields are missing; finite numbers become
    /// numeric; everything else is kept verbatim as text.
    pub fn from_field(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Missing;
        }
        match parse_finite(trimmed) {
            Some(number) => Value::Number(number),
            None => Value::Text(raw.to_string()),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => parse_finite(s.trim()),
            Value::Missing => None,
        }
    }

    /// Numeric coercion where anything unparseable counts as zero.
    pub fn coerce_number(&self) -> f64 {
        self.as_number().unwrap_or(0.0)
    }

    pub fn as_display(&self) -> String {
        match self {
            Value::Number(n) => format_number(*n),
            Value::Text(s) => s.clone(),
            Value::Missing => String::new(),
        }
    }

    /// Key used to match identity values across tables, so that `156`,
    /// `156.0` and `" 156 "` all compare equal.
    pub fn identity_key(&self) -> String {
        match self {
            Value::Number(n) => format_number(*n),
            Value::Text(s) => normalize_identity(s),
            Value::Missing => String::new(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

/// Normalizes a caller-supplied identity the same way [`Value::identity_key`]
/// normalizes stored cells.
pub fn normalize_identity(raw: &str) -> String {
    let trimmed = raw.trim();
    match parse_finite(trimmed) {
        Some(number) => format_number(number),
        None => trimmed.to_string(),
    }
}

pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        (value as i64).to_string()
    } else {
        value.to_string()
    }
}

fn parse_finite(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// An ordered set of named columns and rows of scalar cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    /// Builds a table, padding or truncating every row to the column count.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Value::Missing);
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().map(move |row| &row[idx])
    }

    pub fn numeric_column(&self, idx: usize) -> Vec<f64> {
        self.column_values(idx).map(Value::coerce_number).collect()
    }

    pub fn set_numeric_column(&mut self, idx: usize, values: &[f64]) {
        for (row, value) in self.rows.iter_mut().zip(values) {
            row[idx] = Value::Number(*value);
        }
    }

    /// Removes a column by name, returning whether it existed.
    pub fn drop_column(&mut self, name: &str) -> bool {
        let Some(idx) = self.column_index(name) else {
            return false;
        };
        self.columns.remove(idx);
        for row in &mut self.rows {
            row.remove(idx);
        }
        true
    }

    /// Keeps only the rows at `indices`, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    /// Whether every non-missing cell of a column is numeric and at least one is.
    pub fn is_numeric_column(&self, idx: usize) -> bool {
        let mut seen_number = false;
        for value in self.column_values(idx) {
            match value {
                Value::Number(_) => seen_number = true,
                Value::Missing => {}
                Value::Text(_) => return false,
            }
        }
        seen_number
    }
}
