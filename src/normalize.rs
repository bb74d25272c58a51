//! Rescaling of score-bearing columns onto a 0-100 scale.
//!
//! Ingestion uses [`Normalizer`], which prefers the maximum declared in the
//! original header and falls back to the observed column maximum. Readers of
//! stored tables use [`ensure_percent_scale`] instead, because a stored table
//! may be raw, cleaned, or already normalized.

use log::{debug, warn};

use crate::{
    classify::{MaxMap, SCORE_COLUMN, is_legacy_grades_column, is_question_column},
    data::Table,
};

/// Columns the pipeline totals during deduplication and rescales.
pub fn is_score_column(name: &str) -> bool {
    is_question_column(name) || is_legacy_grades_column(name) || name == SCORE_COLUMN
}

pub fn score_columns(table: &Table) -> Vec<usize> {
    table
        .columns
        .iter()
        .enumerate()
        .filter(|(_, name)| is_score_column(name))
        .map(|(idx, _)| idx)
        .collect()
}

fn column_max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

#[derive(Debug, Clone, Copy)]
pub struct Normalizer<'a> {
    max_map: &'a MaxMap,
}

impl<'a> Normalizer<'a> {
    pub fn new(max_map: &'a MaxMap) -> Self {
        Self { max_map }
    }

    /// Declared maximum when positive, otherwise the observed maximum.
    pub fn divisor(&self, name: &str, values: &[f64]) -> f64 {
        match self.max_map.get(name) {
            Some(declared) if *declared > 0.0 => *declared,
            _ => column_max(values).unwrap_or(0.0),
        }
    }

    pub fn normalize_values(&self, name: &str, values: &[f64]) -> Vec<f64> {
        let divisor = self.divisor(name, values);
        if divisor <= 0.0 {
            debug!("Column '{name}' has no positive divisor; zeroing");
            return vec![0.0; values.len()];
        }
        let scaled = values
            .iter()
            .map(|v| v / divisor * 100.0)
            .collect::<Vec<_>>();
        if scaled.iter().any(|v| *v > 100.0) {
            warn!("Column '{name}' has values above its maximum of {divisor}");
        }
        scaled
    }

    /// Rescales every score-bearing column of `table` in place.
    pub fn normalize_table(&self, table: &mut Table) {
        for idx in score_columns(table) {
            let name = table.columns[idx].clone();
            let values = table.numeric_column(idx);
            let scaled = self.normalize_values(&name, &values);
            table.set_numeric_column(idx, &scaled);
        }
    }
}

/// Brings a column of unknown provenance onto a 0-100 scale: proportions
/// (maximum <= 1) are multiplied by 100, and anything exceeding 100 is divided
/// by its own maximum.
pub fn ensure_percent_scale(values: &[f64]) -> Vec<f64> {
    let Some(max) = column_max(values) else {
        return Vec::new();
    };
    let mut scaled = values.to_vec();
    let mut max = max;
    if max <= 1.0 {
        scaled.iter_mut().for_each(|v| *v *= 100.0);
        max *= 100.0;
    }
    if max > 100.0 {
        scaled.iter_mut().for_each(|v| *v = *v / max * 100.0);
    }
    scaled
}

/// Coerces and defends one column of a stored table.
pub fn percent_column(table: &Table, idx: usize) -> Vec<f64> {
    ensure_percent_scale(&table.numeric_column(idx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_column_selection() {
        assert!(is_score_column("Q1"));
        assert!(is_score_column("Grades600"));
        assert!(is_score_column("score"));
        assert!(!is_score_column("score_2"));
        assert!(!is_score_column("Quiz"));
        assert!(!is_score_column("Q1_2"));
    }

    #[test]
    fn declared_maximum_wins_over_observed() {
        let mut max_map = MaxMap::new();
        max_map.insert("Q1".into(), 40.0);
        let normalizer = Normalizer::new(&max_map);
        assert_eq!(normalizer.normalize_values("Q1", &[10.0, 20.0]), vec![25.0, 50.0]);
    }

    #[test]
    fn observed_maximum_is_the_fallback() {
        let max_map = MaxMap::new();
        let normalizer = Normalizer::new(&max_map);
        assert_eq!(normalizer.normalize_values("Q2", &[5.0, 10.0]), vec![50.0, 100.0]);
    }

    #[test]
    fn zero_declared_maximum_falls_back_to_observed() {
        let mut max_map = MaxMap::new();
        max_map.insert("score".into(), 0.0);
        let normalizer = Normalizer::new(&max_map);
        assert_eq!(normalizer.normalize_values("score", &[2.0, 4.0]), vec![50.0, 100.0]);
    }

    #[test]
    fn all_zero_column_stays_zero() {
        let max_map = MaxMap::new();
        let normalizer = Normalizer::new(&max_map);
        assert_eq!(normalizer.normalize_values("Q1", &[0.0, 0.0, 0.0]), vec![0.0; 3]);
    }

    #[test]
    fn proportions_are_scaled_up() {
        assert_eq!(ensure_percent_scale(&[0.5, 1.0, 0.25]), vec![50.0, 100.0, 25.0]);
    }

    #[test]
    fn oversized_columns_are_scaled_down() {
        assert_eq!(ensure_percent_scale(&[100.0, 200.0]), vec![50.0, 100.0]);
    }

    #[test]
    fn percentages_pass_through() {
        assert_eq!(ensure_percent_scale(&[20.0, 80.0]), vec![20.0, 80.0]);
        assert!(ensure_percent_scale(&[]).is_empty());
    }
}
