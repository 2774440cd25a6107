//! Scheduling core for the Gantt grid.
//!
//! # Modules
//!
//! - `weeks`: Month/week positions, durations and range expansion
//! - `layout`: Typed timeline layout model and relayout coalescing
//! - `overlay`: Reference-line marker placement
//! - `matrix`: Monthly matrix computation and override reconciliation
//! - `derive`: Parametric budget to Gantt activity derivation

pub mod derive;
pub mod layout;
pub mod matrix;
pub mod overlay;
pub mod weeks;

pub use derive::{activity_id, derive_activities};
pub use layout::{
    ColumnGeometry, ColumnMeasurement, LayoutConfig, MonthColumn, RelayoutScheduler, RelayoutTrigger,
    TimelineLayout, month_columns, x_for_month_week,
};
pub use matrix::{CellSource, Matrix, MatrixCell, month_key, monthly_totals, parse_month_key, reconcile};
pub use overlay::{Marker, markers};
pub use weeks::{expand_range_to_month_week_cells, validate_month_week_range, weeks_between};
