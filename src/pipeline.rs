//! Ingestion of one assessment export into three stored snapshots.
//!
//! A run moves a loaded table through classification, placeholder cleanup,
//! redundant-column removal, best-attempt deduplication, and normalization.
//! The table is captured before the first step (`raw`), before normalization
//! (`cleaned`), and at the end (`formatted`). Every run's snapshots stay in the
//! pipeline, keyed by run id, until the pipeline is dropped.

use std::{collections::HashSet, path::Path};

use itertools::Itertools;
use log::{debug, info};

use crate::{
    classify::{HeaderClassifier, MaxMap, STATE_COLUMN, TIME_TAKEN_COLUMN},
    data::{Table, Value},
    error::{LedgerError, Result},
    io_utils::{self, CsvReadOptions},
    normalize::{Normalizer, score_columns},
    store::{TableStore, detect_identity_column, snapshot_table_name},
};

/// Cell contents that stand in for "no answer" in exports.
const PLACEHOLDER_TOKENS: &[&str] = &["", "-", "\u{2013}", "\u{2014}", "n/a", "na"];

const REDUNDANT_COLUMNS: &[&str] = &[STATE_COLUMN, TIME_TAKEN_COLUMN];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotKind {
    Raw,
    Cleaned,
    Formatted,
}

impl SnapshotKind {
    pub const ALL: [SnapshotKind; 3] = [SnapshotKind::Raw, SnapshotKind::Cleaned, SnapshotKind::Formatted];

    pub fn tag(self) -> &'static str {
        match self {
            SnapshotKind::Raw => "raw",
            SnapshotKind::Cleaned => "cleaned",
            SnapshotKind::Formatted => "formatted",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        SnapshotKind::ALL.into_iter().find(|kind| kind.tag() == tag)
    }
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub run_id: u64,
    pub kind: SnapshotKind,
    pub table: Table,
}

/// The three snapshots captured by one [`IngestionPipeline::ingest`] call.
#[derive(Debug, Clone, Copy)]
pub struct RunSnapshots<'a> {
    pub run_id: u64,
    pub raw: &'a Table,
    pub cleaned: &'a Table,
    pub formatted: &'a Table,
}

#[derive(Debug, Default)]
pub struct IngestionPipeline {
    source_stem: Option<String>,
    current: Option<Table>,
    max_map: MaxMap,
    last_run: u64,
    snapshots: Vec<Snapshot>,
}

impl IngestionPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// A pipeline whose first run gets id `first_run`.
    pub fn starting_at(first_run: u64) -> Self {
        Self {
            last_run: first_run.saturating_sub(1),
            ..Self::default()
        }
    }

    pub fn load_csv(&mut self, path: &Path, options: &CsvReadOptions) -> Result<&Table> {
        let table = io_utils::read_table(path, options)?;
        let stem = path
            .file_stem()
            .filter(|_| !io_utils::is_dash(path))
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "stdin".to_string());
        info!(
            "Loaded {} row(s) and {} column(s) from {:?}",
            table.row_count(),
            table.columns.len(),
            path
        );
        self.source_stem = Some(stem);
        Ok(&*self.current.insert(table))
    }

    /// Uses an in-memory table as the source, named by `stem` when persisted.
    pub fn load_table(&mut self, stem: impl Into<String>, table: Table) {
        self.source_stem = Some(stem.into());
        self.current = Some(table);
    }

    pub fn current(&self) -> Option<&Table> {
        self.current.as_ref()
    }

    pub fn source_stem(&self) -> Option<&str> {
        self.source_stem.as_deref()
    }

    /// Declared maxima from the most recent run.
    pub fn max_map(&self) -> &MaxMap {
        &self.max_map
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn snapshot(&self, run_id: u64, kind: SnapshotKind) -> Option<&Snapshot> {
        self.snapshots
            .iter()
            .find(|s| s.run_id == run_id && s.kind == kind)
    }

    pub fn run_ids(&self) -> Vec<u64> {
        self.snapshots.iter().map(|s| s.run_id).dedup().collect()
    }

    /// Runs every cleaning and normalization step over the loaded table.
    pub fn ingest(&mut self) -> Result<RunSnapshots<'_>> {
        let raw = self
            .current
            .clone()
            .ok_or_else(|| LedgerError::InvalidState("no table loaded; load a CSV first".into()))?;

        self.last_run += 1;
        let run_id = self.last_run;
        let stem = self.source_stem.clone().unwrap_or_default();
        debug!("Starting run {run_id} for '{stem}'");

        let mut table = raw.clone();
        self.max_map = rename_columns(&mut table);
        mark_placeholders(&mut table);
        let empty_rows = drop_empty_rows(&mut table);
        fill_missing(&mut table);
        drop_redundant_columns(&mut table);
        let duplicates = keep_best_attempts(&mut table);
        let cleaned = table.clone();

        Normalizer::new(&self.max_map).normalize_table(&mut table);
        let formatted = table;

        info!(
            "Run {run_id} for '{stem}': {} raw row(s), {} cleaned row(s) ({} empty, {} duplicate attempt(s) removed)",
            raw.row_count(),
            cleaned.row_count(),
            empty_rows,
            duplicates
        );

        self.current = Some(formatted.clone());
        let start = self.snapshots.len();
        for (kind, table) in [
            (SnapshotKind::Raw, raw),
            (SnapshotKind::Cleaned, cleaned),
            (SnapshotKind::Formatted, formatted),
        ] {
            self.snapshots.push(Snapshot { run_id, kind, table });
        }
        let run = &self.snapshots[start..];
        Ok(RunSnapshots {
            run_id,
            raw: &run[0].table,
            cleaned: &run[1].table,
            formatted: &run[2].table,
        })
    }

    /// Writes every retained snapshot, replacing same-named tables.
    pub fn persist(&self, store: &TableStore) -> Result<Vec<String>> {
        let stem = self.source_stem.as_deref().ok_or_else(|| {
            LedgerError::InvalidState("no source loaded; nothing to persist".into())
        })?;
        let mut written = Vec::with_capacity(self.snapshots.len());
        for snapshot in &self.snapshots {
            let name = snapshot_table_name(stem, snapshot.kind, snapshot.run_id);
            store.replace_table(&name, &snapshot.table)?;
            written.push(name);
        }
        info!(
            "Persisted {} table(s) to {:?}",
            written.len(),
            store.path()
        );
        Ok(written)
    }

    /// Load, ingest, and persist one export file.
    pub fn convert(
        &mut self,
        path: &Path,
        options: &CsvReadOptions,
        store: &TableStore,
    ) -> Result<Vec<String>> {
        self.load_csv(path, options)?;
        self.ingest()?;
        self.persist(store)
    }
}

/// Renames every column to its canonical name and returns the declared maxima.
fn rename_columns(table: &mut Table) -> MaxMap {
    let mut classifier = HeaderClassifier::new();
    table.columns = table
        .columns
        .iter()
        .map(|header| classifier.classify(header).canonical_name)
        .collect();
    classifier.into_max_map()
}

fn is_placeholder(value: &Value) -> bool {
    match value {
        Value::Text(s) => {
            let token = s.trim().to_lowercase();
            PLACEHOLDER_TOKENS.contains(&token.as_str())
        }
        _ => false,
    }
}

fn mark_placeholders(table: &mut Table) {
    for cell in table.rows.iter_mut().flatten() {
        if is_placeholder(cell) {
            *cell = Value::Missing;
        }
    }
}

fn drop_empty_rows(table: &mut Table) -> usize {
    let before = table.row_count();
    table.rows.retain(|row| !row.iter().all(Value::is_missing));
    before - table.row_count()
}

fn fill_missing(table: &mut Table) {
    for cell in table.rows.iter_mut().flatten() {
        if cell.is_missing() {
            *cell = Value::Number(0.0);
        }
    }
}

fn drop_redundant_columns(table: &mut Table) {
    for column in REDUNDANT_COLUMNS {
        if table.drop_column(column) {
            debug!("Dropped redundant column '{column}'");
        }
    }
}

/// Keeps the highest-total row per identity, first row winning ties. Rows come
/// out ordered by descending total. Returns the number of rows removed.
fn keep_best_attempts(table: &mut Table) -> usize {
    let Ok(identity) = detect_identity_column(&table.columns) else {
        debug!("No identity column; skipping deduplication");
        return 0;
    };
    let Some(id_idx) = table.column_index(&identity) else {
        return 0;
    };
    let scores = score_columns(table);
    let totals = table
        .rows
        .iter()
        .map(|row| scores.iter().map(|&i| row[i].coerce_number()).sum::<f64>())
        .collect::<Vec<_>>();

    let mut seen = HashSet::new();
    let keep = (0..table.row_count())
        .sorted_by(|&a, &b| totals[b].total_cmp(&totals[a]))
        .filter(|&i| seen.insert(table.rows[i][id_idx].identity_key()))
        .collect::<Vec<_>>();
    let removed = table.row_count() - keep.len();
    *table = table.select_rows(&keep);
    removed
}
