//! Monthly matrix computation and override reconciliation.
//!
//! The matrix has one row per concept (mayor) and one column per calendar
//! month (`YYYYMM`). Computed values come from spreading each activity's amount
//! evenly over its week cells; manual overrides replace computed values cell
//! by cell.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::models::{GanttActivity, MatrixOverride};
use crate::schedule::weeks::expand_range_to_month_week_cells;
use crate::{Error, Result};

/// Key of a matrix cell: `(month YYYYMM, concept)`.
pub type CellKey = (String, String);

/// Calendar key (`YYYYMM`) of a 1-based project month.
pub fn month_key(project_start: NaiveDate, month: u32) -> String {
    let (year, month0) = calendar_month(project_start, month);
    format!("{:04}{:02}", year, month0 + 1)
}

/// Short display label ("Jan 2025") of a 1-based project month.
pub fn month_label(project_start: NaiveDate, month: u32) -> String {
    let (year, month0) = calendar_month(project_start, month);
    NaiveDate::from_ymd_opt(year, month0 + 1, 1)
        .map(|d| d.format("%b %Y").to_string())
        .unwrap_or_else(|| month_key(project_start, month))
}

fn calendar_month(project_start: NaiveDate, month: u32) -> (i32, u32) {
    let total = project_start.year() as i64 * 12
        + project_start.month0() as i64
        + month.saturating_sub(1) as i64;
    ((total.div_euclid(12)) as i32, total.rem_euclid(12) as u32)
}

/// Validate a `YYYYMM` month key, returning `(year, month)`.
pub fn parse_month_key(key: &str) -> Result<(i32, u32)> {
    if key.len() != 6 || !key.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidInput(format!(
            "month must be YYYYMM, got '{}'",
            key
        )));
    }
    let year: i32 = key[..4]
        .parse()
        .map_err(|_| Error::InvalidInput(format!("invalid year in '{}'", key)))?;
    let month: u32 = key[4..]
        .parse()
        .map_err(|_| Error::InvalidInput(format!("invalid month in '{}'", key)))?;
    if !(1..=12).contains(&month) {
        return Err(Error::InvalidInput(format!(
            "month must be 01-12, got '{}'",
            &key[4..]
        )));
    }
    Ok((year, month))
}

/// Where a displayed cell value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellSource {
    Computed,
    Override,
}

/// One displayed matrix cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatrixCell {
    pub month: String,
    pub concept: String,
    /// Value shown to the user
    pub value: f64,
    /// Value computed from the schedule, if any
    pub computed: Option<f64>,
    pub source: CellSource,
}

/// The reconciled matrix.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Matrix {
    /// Cells ordered by concept, then month
    pub cells: Vec<MatrixCell>,
}

impl Matrix {
    pub fn get(&self, month: &str, concept: &str) -> Option<&MatrixCell> {
        self.cells
            .iter()
            .find(|c| c.month == month && c.concept == concept)
    }

    /// Sum of displayed values for one concept.
    pub fn concept_total(&self, concept: &str) -> f64 {
        self.cells
            .iter()
            .filter(|c| c.concept == concept)
            .map(|c| c.value)
            .sum()
    }

    /// Sum of displayed values for one month.
    pub fn month_total(&self, month: &str) -> f64 {
        self.cells
            .iter()
            .filter(|c| c.month == month)
            .map(|c| c.value)
            .sum()
    }
}

/// Spread every activity's amount evenly over its week cells and aggregate
/// the result per `(month, mayor)`.
///
/// Activities with an invalid range are skipped with a warning.
pub fn monthly_totals(
    activities: &[GanttActivity],
    project_start: NaiveDate,
) -> BTreeMap<CellKey, f64> {
    let mut totals = BTreeMap::new();
    for activity in activities {
        let cells = match expand_range_to_month_week_cells(activity.start(), activity.end()) {
            Ok(cells) => cells,
            Err(e) => {
                tracing::warn!(activity = %activity.id, error = %e, "skipping activity with invalid range");
                continue;
            }
        };
        let per_week = activity.amount / cells.len() as f64;
        for cell in cells {
            let key = (month_key(project_start, cell.month), activity.mayor_id.clone());
            *totals.entry(key).or_insert(0.0) += per_week;
        }
    }
    totals
}

/// Merge overrides into computed values. An override always wins over the
/// computed value of its cell; overrides for cells with no computed value
/// still appear.
pub fn reconcile(computed: &BTreeMap<CellKey, f64>, overrides: &[MatrixOverride]) -> Matrix {
    let mut merged: BTreeMap<(String, String), MatrixCell> = BTreeMap::new();

    for ((month, concept), value) in computed {
        merged.insert(
            (concept.clone(), month.clone()),
            MatrixCell {
                month: month.clone(),
                concept: concept.clone(),
                value: *value,
                computed: Some(*value),
                source: CellSource::Computed,
            },
        );
    }

    for o in overrides {
        let entry = merged
            .entry((o.concept.clone(), o.month.clone()))
            .or_insert_with(|| MatrixCell {
                month: o.month.clone(),
                concept: o.concept.clone(),
                value: o.value,
                computed: None,
                source: CellSource::Override,
            });
        entry.value = o.value;
        entry.source = CellSource::Override;
    }

    Matrix {
        cells: merged.into_values().collect(),
    }
}
