//! Plain-text rendering of stored tables and reports for the terminal.

use std::borrow::Cow;
use std::fmt::Write as _;

use crate::data::{Table, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

/// Column-aligned text table. Columns whose every non-empty cell parses as a
/// number are right-aligned.
#[derive(Debug, Clone, Default)]
pub struct TextTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TextTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn with_rows(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let mut table = Self::new(headers);
        for row in rows {
            table.push_row(row);
        }
        table
    }

    /// Rows shorter than the header are padded with blanks; extra cells are dropped.
    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn alignments(&self) -> Vec<Align> {
        (0..self.headers.len())
            .map(|idx| {
                let mut cells = self
                    .rows
                    .iter()
                    .map(|row| row[idx].trim())
                    .filter(|cell| !cell.is_empty())
                    .peekable();
                if cells.peek().is_some() && cells.all(|cell| cell.parse::<f64>().is_ok()) {
                    Align::Right
                } else {
                    Align::Left
                }
            })
            .collect()
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths = self
            .headers
            .iter()
            .map(|h| display_width(h))
            .collect::<Vec<_>>();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(display_width(&sanitize_cell(cell)));
            }
        }
        widths.into_iter().map(|w| w.max(3)).collect()
    }

    pub fn render(&self) -> String {
        let widths = self.widths();
        let aligns = self.alignments();
        let mut output = String::new();

        let _ = writeln!(output, "{}", format_row(&self.headers, &widths, &aligns));
        let rule = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
        let _ = writeln!(output, "{}", format_row(&rule, &widths, &aligns));
        for row in &self.rows {
            let _ = writeln!(output, "{}", format_row(row, &widths, &aligns));
        }
        output
    }
}

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    TextTable::with_rows(headers.to_vec(), rows.to_vec()).render()
}

pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

/// Renders at most `limit` rows of a stored table, noting how many were left out.
pub fn render_data_table(table: &Table, limit: Option<usize>) -> String {
    let shown = limit.unwrap_or(table.row_count()).min(table.row_count());
    let rows = table
        .rows
        .iter()
        .take(shown)
        .map(|row| row.iter().map(Value::as_display).collect())
        .collect();
    let mut output = TextTable::with_rows(table.columns.clone(), rows).render();
    let hidden = table.row_count() - shown;
    if hidden > 0 {
        let _ = writeln!(output, "... {hidden} more row(s)");
    }
    output
}

fn format_row(values: &[String], widths: &[usize], aligns: &[Align]) -> String {
    let cells = values
        .iter()
        .zip(widths.iter().zip(aligns))
        .map(|(value, (&width, &align))| {
            let cell = sanitize_cell(value);
            let padding = " ".repeat(width.saturating_sub(display_width(&cell)));
            match align {
                Align::Left => format!("{cell}{padding}"),
                Align::Right => format!("{padding}{cell}"),
            }
        })
        .collect::<Vec<_>>();
    cells.join("  ").trim_end().to_string()
}

/// Visible width, ignoring ANSI colour sequences such as `\x1b[31m`.
fn display_width(value: &str) -> usize {
    let mut width = 0usize;
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\u{1b}' {
            for next in chars.by_ref() {
                if next == 'm' {
                    break;
                }
            }
        } else {
            width += 1;
        }
    }
    width
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
