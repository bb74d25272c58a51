//! SQLite-backed table store.
//!
//! Tables are treated as opaque, whole-table key-value entries: they are
//! listed, loaded completely, introspected for column names, and replaced
//! wholesale. Every operation opens its own connection and drops it before
//! returning, so nothing is held open between calls.
//!
//! The column detection helpers here are best-effort keyword matchers. They
//! return the first hit in priority order and fail with
//! [`LedgerError::NotFound`] rather than guessing when nothing matches.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use itertools::Itertools;
use log::debug;
use regex::Regex;
use rusqlite::{
    Connection, OptionalExtension, Row, ToSql, params_from_iter,
    types::{ToSqlOutput, Value as SqlValue, ValueRef},
};

use crate::{
    classify::{IDENTITY_KEYWORDS, identity_fragment, question_number},
    data::{Table, Value, normalize_identity},
    error::{LedgerError, Result},
    pipeline::SnapshotKind,
};

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Number(n) => ToSqlOutput::Owned(SqlValue::Real(*n)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Missing => ToSqlOutput::Owned(SqlValue::Null),
        })
    }
}

fn value_from_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Missing,
        ValueRef::Integer(i) => Value::Number(i as f64),
        ValueRef::Real(f) => Value::Number(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn read_row(row: &Row<'_>, width: usize) -> rusqlite::Result<Vec<Value>> {
    (0..width)
        .map(|idx| row.get_ref(idx).map(value_from_ref))
        .collect()
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// SQLite column names are case-insensitive, so names that only differ by
/// case are suffixed before a table is written.
fn storage_column_names(columns: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    columns
        .iter()
        .map(|column| {
            let mut candidate = column.clone();
            let mut suffix = 2;
            while !seen.insert(candidate.to_lowercase()) {
                candidate = format!("{column}_{suffix}");
                suffix += 1;
            }
            candidate
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct TableStore {
    path: PathBuf,
}

impl TableStore {
    /// Opens (creating if needed) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
        };
        store.connect()?;
        Ok(store)
    }

    /// Opens an existing database, failing when the file is absent.
    pub fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(LedgerError::NotFound(format!(
                "database {} does not exist",
                path.display()
            )));
        }
        Self::open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        Ok(Connection::open(&self.path)?)
    }

    pub fn list_tables(&self) -> Result<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    pub fn has_table(&self, name: &str) -> Result<bool> {
        let conn = self.connect()?;
        table_exists(&conn, name)
    }

    pub fn load_table(&self, name: &str) -> Result<Table> {
        let conn = self.connect()?;
        require_table(&conn, name)?;
        let sql = format!("SELECT * FROM {}", quote_ident(name));
        let mut stmt = conn.prepare(&sql)?;
        let columns = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        let width = columns.len();
        let rows = stmt
            .query_map([], |row| read_row(row, width))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        debug!("Loaded {} row(s) from '{name}'", rows.len());
        Ok(Table::new(columns, rows))
    }

    /// Column names from table metadata, without reading any rows.
    pub fn column_names(&self, name: &str) -> Result<Vec<String>> {
        let conn = self.connect()?;
        require_table(&conn, name)?;
        let sql = format!("PRAGMA table_info({})", quote_ident(name));
        let mut stmt = conn.prepare(&sql)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    /// Drops and recreates `name` from `table` in one transaction.
    pub fn replace_table(&self, name: &str, table: &Table) -> Result<()> {
        if table.columns.is_empty() {
            return Err(LedgerError::InvalidArgument(format!(
                "table '{name}' has no columns to store"
            )));
        }
        let columns = storage_column_names(&table.columns);
        let declarations = columns
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                let affinity = if table.is_numeric_column(idx) { "REAL" } else { "TEXT" };
                format!("{} {affinity}", quote_ident(column))
            })
            .join(", ");
        let placeholders = (1..=columns.len()).map(|i| format!("?{i}")).join(", ");
        let quoted = quote_ident(name);

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute(&format!("DROP TABLE IF EXISTS {quoted}"), [])?;
        tx.execute(&format!("CREATE TABLE {quoted} ({declarations})"), [])?;
        {
            let mut insert =
                tx.prepare(&format!("INSERT INTO {quoted} VALUES ({placeholders})"))?;
            for row in &table.rows {
                insert.execute(params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;
        debug!(
            "Replaced table '{name}' with {} row(s) across {} column(s)",
            table.row_count(),
            columns.len()
        );
        Ok(())
    }

    /// Rows of `name` whose `column` holds `identity`. Integral identities are
    /// compared numerically, everything else as trimmed text.
    pub fn load_matching_rows(&self, name: &str, column: &str, identity: &str) -> Result<Table> {
        let key = normalize_identity(identity);
        let conn = self.connect()?;
        require_table(&conn, name)?;
        let table = quote_ident(name);
        let column_sql = quote_ident(column);
        let (sql, param) = match key.parse::<i64>() {
            Ok(n) => (
                format!("SELECT * FROM {table} WHERE CAST({column_sql} AS REAL) = ?1"),
                SqlValue::Real(n as f64),
            ),
            Err(_) => (
                format!("SELECT * FROM {table} WHERE TRIM(CAST({column_sql} AS TEXT)) = ?1"),
                SqlValue::Text(key.clone()),
            ),
        };
        let mut stmt = conn.prepare(&sql)?;
        let columns = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        let width = columns.len();
        let rows = stmt
            .query_map([param], |row| read_row(row, width))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let mut matched = Table::new(columns, rows);
        if let Some(idx) = matched.column_index(column) {
            // CAST turns non-numeric text into 0, so re-check the key.
            matched.rows.retain(|row| row[idx].identity_key() == key);
        }
        Ok(matched)
    }

    /// One past the highest run id embedded in any snapshot table name.
    pub fn next_run_id(&self) -> Result<u64> {
        let highest = self
            .list_tables()?
            .iter()
            .filter_map(|name| parse_snapshot_table_name(name))
            .map(|snapshot| snapshot.run_id)
            .max()
            .unwrap_or(0);
        Ok(highest + 1)
    }
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn require_table(conn: &Connection, name: &str) -> Result<()> {
    if table_exists(conn, name)? {
        Ok(())
    } else {
        Err(LedgerError::NotFound(format!("table '{name}' not found")))
    }
}

/// Picks the identity column: keywords are tried in priority order and the
/// first column containing the current keyword wins.
pub fn detect_identity_column<S: AsRef<str>>(columns: &[S]) -> Result<String> {
    let fragments = columns
        .iter()
        .map(|c| identity_fragment(c.as_ref()))
        .collect::<Vec<_>>();
    for keyword in IDENTITY_KEYWORDS {
        if let Some(idx) = fragments.iter().position(|f| f.contains(keyword)) {
            return Ok(columns[idx].as_ref().to_string());
        }
    }
    Err(LedgerError::NotFound(
        "no identity column (expected a column like 'Student ID' or 'Researcher ID')".into(),
    ))
}

/// Columns named exactly `Q<n>`, ordered by `n`.
pub fn detect_question_columns<S: AsRef<str>>(columns: &[S]) -> Result<Vec<String>> {
    let questions = columns
        .iter()
        .filter_map(|c| question_number(c.as_ref()).map(|n| (n, c.as_ref().to_string())))
        .sorted_by_key(|(n, _)| *n)
        .map(|(_, name)| name)
        .collect::<Vec<_>>();
    if questions.is_empty() {
        return Err(LedgerError::NotFound(
            "no question columns (expected columns like Q1, Q2, ...)".into(),
        ));
    }
    Ok(questions)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotName {
    pub stem: String,
    pub kind: SnapshotKind,
    pub run_id: u64,
}

fn snapshot_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(.+)__(raw|cleaned|formatted)_(\d+)$").expect("valid snapshot name regex")
    })
}

/// `<stem>__<kind>_<run>`, unique per source file, stage, and run.
pub fn snapshot_table_name(stem: &str, kind: SnapshotKind, run_id: u64) -> String {
    format!("{stem}__{}_{run_id}", kind.tag())
}

pub fn parse_snapshot_table_name(name: &str) -> Option<SnapshotName> {
    let caps = snapshot_name_regex().captures(name)?;
    Some(SnapshotName {
        stem: caps[1].to_string(),
        kind: SnapshotKind::from_tag(&caps[2])?,
        run_id: caps[3].parse().ok()?,
    })
}

pub fn is_formatted_table(name: &str) -> bool {
    parse_snapshot_table_name(name).is_some_and(|s| s.kind == SnapshotKind::Formatted)
}

pub fn formatted_tables(tables: &[String]) -> Vec<String> {
    tables
        .iter()
        .filter(|name| is_formatted_table(name))
        .cloned()
        .collect()
}

/// The formatted table with the highest run id; earlier names win ties.
pub fn latest_formatted_table(tables: &[String]) -> Option<String> {
    tables
        .iter()
        .filter_map(|name| {
            parse_snapshot_table_name(name)
                .filter(|s| s.kind == SnapshotKind::Formatted)
                .map(|s| (s.run_id, name))
        })
        .fold(None::<(u64, &String)>, |best, (run, name)| match best {
            Some((best_run, _)) if best_run >= run => best,
            _ => Some((run, name)),
        })
        .map(|(_, name)| name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_detection_follows_keyword_priority() {
        let columns = ["user_name", "Researcher ID", "Student ID"];
        assert_eq!(detect_identity_column(&columns).unwrap(), "Student ID");
        let columns = ["id", "learner"];
        assert_eq!(detect_identity_column(&columns).unwrap(), "learner");
        assert!(detect_identity_column(&["Q1", "score"]).unwrap_err().is_not_found());
    }

    #[test]
    fn question_columns_sort_numerically() {
        let columns = ["Q10", "score", "Q2", "Q1", "Q1_2", "Quiz"];
        assert_eq!(
            detect_question_columns(&columns).unwrap(),
            vec!["Q1", "Q2", "Q10"]
        );
        assert!(detect_question_columns(&["score"]).is_err());
    }

    #[test]
    fn snapshot_names_round_trip() {
        let name = snapshot_table_name("week_1__quiz", SnapshotKind::Formatted, 12);
        assert_eq!(name, "week_1__quiz__formatted_12");
        let parsed = parse_snapshot_table_name(&name).unwrap();
        assert_eq!(parsed.stem, "week_1__quiz");
        assert_eq!(parsed.kind, SnapshotKind::Formatted);
        assert_eq!(parsed.run_id, 12);
        assert!(parse_snapshot_table_name("grades").is_none());
    }

    #[test]
    fn latest_formatted_prefers_highest_run() {
        let tables = vec![
            "a__formatted_2".to_string(),
            "b__formatted_7".to_string(),
            "c__cleaned_9".to_string(),
            "d__formatted_7".to_string(),
        ];
        assert_eq!(latest_formatted_table(&tables).as_deref(), Some("b__formatted_7"));
        assert_eq!(latest_formatted_table(&["plain".to_string()]), None);
    }

    #[test]
    fn storage_names_avoid_case_collisions() {
        let names = storage_column_names(&["Score".into(), "score".into(), "Q1".into()]);
        assert_eq!(names, vec!["Score", "score_2", "Q1"]);
    }
}
