//! Timeline layout model for the Gantt grid.
//!
//! Computes the horizontal geometry of every month column from typed
//! configuration: a run of frozen columns on the left (concept, totals)
//! followed by one fixed-width column per month, each split into four week
//! sub-columns. Measured geometry from a rendered table can be applied on top
//! with [`TimelineLayout::calibrate`]; without it the model is exact for the
//! configured widths.

use chrono::NaiveDate;

use crate::models::WEEKS_PER_MONTH;
use crate::schedule::matrix::{month_key, month_label};

/// Default widths of the frozen columns at the left of the grid.
pub const DEFAULT_FROZEN_COLUMNS: [f64; 2] = [240.0, 120.0];

/// Default width of one month column (four weeks).
pub const DEFAULT_MONTH_WIDTH: f64 = 160.0;

/// Offset applied to computed x positions so one-pixel lines render crisp.
pub const CRISP_LINE_OFFSET: f64 = 0.5;

/// A month column to lay out.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthColumn {
    /// Calendar key (`YYYYMM`)
    pub id: String,
    /// 1-based project month
    pub index: u32,
    pub label: String,
}

/// Build the month columns of a project starting at `project_start`.
pub fn month_columns(project_start: NaiveDate, months: u32) -> Vec<MonthColumn> {
    (1..=months)
        .map(|index| MonthColumn {
            id: month_key(project_start, index),
            index,
            label: month_label(project_start, index),
        })
        .collect()
}

/// Measured geometry of a rendered month column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMeasurement {
    pub id: String,
    pub left: f64,
    pub width: f64,
}

/// Computed horizontal geometry of one month column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnGeometry {
    pub id: String,
    pub index: u32,
    pub left: f64,
    pub width: f64,
}

impl ColumnGeometry {
    /// Right edge of the column.
    pub fn right(&self) -> f64 {
        self.left + self.width
    }
}

/// Configuration for the layout model.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutConfig {
    /// Widths of the frozen columns, left to right
    pub frozen_columns: Vec<f64>,
    /// Width of one month column
    pub month_width: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            frozen_columns: DEFAULT_FROZEN_COLUMNS.to_vec(),
            month_width: DEFAULT_MONTH_WIDTH,
        }
    }
}

impl LayoutConfig {
    /// Combined width of the frozen columns.
    pub fn frozen_width(&self) -> f64 {
        self.frozen_columns.iter().sum()
    }
}

/// Horizontal layout of the month columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimelineLayout {
    pub columns: Vec<ColumnGeometry>,
    /// Width of the whole table including frozen columns
    pub total_width: f64,
    /// Whether any column carries measured rather than computed geometry
    pub calibrated: bool,
}

impl TimelineLayout {
    /// Compute the layout purely from configuration.
    pub fn from_config(config: &LayoutConfig, months: &[MonthColumn]) -> Self {
        let frozen = config.frozen_width();
        let columns: Vec<ColumnGeometry> = months
            .iter()
            .enumerate()
            .map(|(i, month)| ColumnGeometry {
                id: month.id.clone(),
                index: month.index,
                left: frozen + i as f64 * config.month_width,
                width: config.month_width,
            })
            .collect();
        let total_width = frozen + months.len() as f64 * config.month_width;

        Self {
            columns,
            total_width,
            calibrated: false,
        }
    }

    /// Replace computed geometry with measured geometry where available.
    ///
    /// Measurements for unknown columns, or with non-finite or non-positive
    /// widths, are ignored. Returns the number of columns updated.
    pub fn calibrate(&mut self, measurements: &[ColumnMeasurement]) -> usize {
        let mut applied = 0;
        for m in measurements {
            if !m.left.is_finite() || !m.width.is_finite() || m.width <= 0.0 {
                tracing::debug!(column = %m.id, "ignoring unusable column measurement");
                continue;
            }
            if let Some(col) = self.columns.iter_mut().find(|c| c.id == m.id) {
                col.left = m.left;
                col.width = m.width;
                applied += 1;
            }
        }
        if applied > 0 {
            self.calibrated = true;
            let right = self
                .columns
                .iter()
                .map(ColumnGeometry::right)
                .fold(0.0_f64, f64::max);
            self.total_width = self.total_width.max(right);
        }
        applied
    }

    /// Geometry of the column with the given `YYYYMM` id.
    pub fn column(&self, month_id: &str) -> Option<&ColumnGeometry> {
        self.columns.iter().find(|c| c.id == month_id)
    }

    /// Geometry of the column for a 1-based project month.
    pub fn column_for_index(&self, index: u32) -> Option<&ColumnGeometry> {
        self.columns.iter().find(|c| c.index == index)
    }
}

/// X coordinate of the right edge of `week` within the month column `month_id`.
///
/// Rounded to a whole pixel and shifted by half a pixel. Returns 0 for a month
/// not present in the layout; callers draw a degenerate marker instead of
/// failing.
pub fn x_for_month_week(layout: &TimelineLayout, month_id: &str, week: u8) -> f64 {
    let Some(col) = layout.column(month_id) else {
        tracing::warn!(month_id, "month not present in timeline layout");
        return 0.0;
    };
    x_in_column(col, week)
}

pub(crate) fn x_in_column(col: &ColumnGeometry, week: u8) -> f64 {
    let week = if (1..=WEEKS_PER_MONTH).contains(&week) {
        week
    } else {
        tracing::warn!(week, month_id = %col.id, "week outside grid, clamping");
        week.clamp(1, WEEKS_PER_MONTH)
    };
    let week_width = col.width / WEEKS_PER_MONTH as f64;
    (col.left + week_width * week as f64).round() + CRISP_LINE_OFFSET
}

/// What asked for a relayout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayoutTrigger {
    /// The window was resized
    WindowResize,
    /// The table container changed size
    ContainerResize,
    /// Columns were added or removed
    ColumnsChanged,
}

/// Coalesces relayout requests so that at most one recomputation runs per frame.
#[derive(Debug, Default)]
pub struct RelayoutScheduler {
    pending: Option<RelayoutTrigger>,
    /// Requests received since creation
    pub requests: u64,
    /// Recomputations actually run
    pub recomputes: u64,
}

impl RelayoutScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a trigger. The first trigger of a frame is kept for diagnostics.
    pub fn request(&mut self, trigger: RelayoutTrigger) {
        self.requests += 1;
        if self.pending.is_none() {
            self.pending = Some(trigger);
        }
    }

    /// Whether a recomputation is scheduled for the next frame.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Run the scheduled recomputation, if any.
    pub fn on_frame<F>(&mut self, compute: F) -> Option<TimelineLayout>
    where
        F: FnOnce() -> TimelineLayout,
    {
        let trigger = self.pending.take()?;
        self.recomputes += 1;
        tracing::debug!(?trigger, "recomputing timeline layout");
        Some(compute())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(ids: &[&str]) -> Vec<MonthColumn> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| MonthColumn {
                id: id.to_string(),
                index: i as u32 + 1,
                label: id.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_layout_config_default() {
        let config = LayoutConfig::default();
        assert!((config.frozen_width() - 360.0).abs() < 0.001);
        assert!((config.month_width - 160.0).abs() < 0.001);
    }

    #[test]
    fn test_from_config_places_months_after_frozen_columns() {
        let layout = TimelineLayout::from_config(&LayoutConfig::default(), &columns(&["202501", "202502"]));
        assert_eq!(layout.columns.len(), 2);
        assert_eq!(layout.columns[0].left, 360.0);
        assert_eq!(layout.columns[1].left, 520.0);
        assert_eq!(layout.total_width, 680.0);
        assert!(!layout.calibrated);
    }

    #[test]
    fn test_x_for_month_week_right_edge_of_week() {
        let layout = TimelineLayout::from_config(&LayoutConfig::default(), &columns(&["202501", "202502"]));
        assert_eq!(x_for_month_week(&layout, "202501", 1), 400.5);
        assert_eq!(x_for_month_week(&layout, "202501", 4), 520.5);
        assert_eq!(x_for_month_week(&layout, "202502", 2), 600.5);
    }

    #[test]
    fn test_x_for_month_week_rounds_fractional_widths() {
        let config = LayoutConfig {
            frozen_columns: vec![100.0],
            month_width: 130.0,
        };
        let layout = TimelineLayout::from_config(&config, &columns(&["202501"]));
        // 100 + 32.5 = 132.5 rounds away from zero
        assert_eq!(x_for_month_week(&layout, "202501", 1), 133.5);
    }

    #[test]
    fn test_x_for_unknown_month_is_zero() {
        let layout = TimelineLayout::from_config(&LayoutConfig::default(), &columns(&["202501"]));
        assert_eq!(x_for_month_week(&layout, "209912", 2), 0.0);
        assert_eq!(x_for_month_week(&TimelineLayout::default(), "202501", 1), 0.0);
    }

    #[test]
    fn test_calibrate_uses_measured_geometry() {
        let mut layout = TimelineLayout::from_config(&LayoutConfig::default(), &columns(&["202501", "202502"]));
        let applied = layout.calibrate(&[
            ColumnMeasurement {
                id: "202502".to_string(),
                left: 600.0,
                width: 200.0,
            },
            ColumnMeasurement {
                id: "missing".to_string(),
                left: 0.0,
                width: 10.0,
            },
            ColumnMeasurement {
                id: "202501".to_string(),
                left: 0.0,
                width: f64::NAN,
            },
        ]);
        assert_eq!(applied, 1);
        assert!(layout.calibrated);
        assert_eq!(x_for_month_week(&layout, "202502", 4), 800.5);
        assert_eq!(layout.total_width, 800.0);
        // uncalibrated column keeps computed geometry
        assert_eq!(x_for_month_week(&layout, "202501", 4), 520.5);
    }

    #[test]
    fn test_month_columns_from_project_start() {
        let start = NaiveDate::from_ymd_opt(2024, 11, 15).unwrap();
        let cols = month_columns(start, 3);
        let ids: Vec<&str> = cols.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["202411", "202412", "202501"]);
        assert_eq!(cols[2].index, 3);
    }

    #[test]
    fn test_scheduler_coalesces_requests() {
        let mut scheduler = RelayoutScheduler::new();
        assert!(scheduler.on_frame(TimelineLayout::default).is_none());

        scheduler.request(RelayoutTrigger::WindowResize);
        scheduler.request(RelayoutTrigger::ContainerResize);
        scheduler.request(RelayoutTrigger::WindowResize);
        assert!(scheduler.is_pending());

        let mut computed = 0;
        let layout = scheduler.on_frame(|| {
            computed += 1;
            TimelineLayout::default()
        });
        assert!(layout.is_some());
        assert_eq!(computed, 1);
        assert!(scheduler.on_frame(TimelineLayout::default).is_none());
        assert_eq!(scheduler.requests, 3);
        assert_eq!(scheduler.recomputes, 1);
    }
}
