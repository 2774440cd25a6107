//! Data models for Faena entities.
//!
//! This module defines the core data structures:
//! - `MonthWeek` - Coarse 4-weeks-per-month timeline position
//! - `GanttActivity` - Schedule row derived from the parametric budget
//! - `ParametricLine` - Category-level budget row that seeds the schedule
//! - `MatrixOverride` - Manually entered matrix value superseding a computed cell
//! - `ReferenceLine` - Visual annotation pinned to a timeline position

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Number of week sub-columns in every month of the grid.
pub const WEEKS_PER_MONTH: u8 = 4;

/// Last project month accepted on the grid (100 years).
pub const MAX_MONTH: u32 = 1200;

/// A position on the month/week grid.
///
/// Months are 1-based project months, weeks are 1..=4. Ordering is
/// lexicographic on `(month, week)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MonthWeek {
    pub month: u32,
    pub week: u8,
}

impl MonthWeek {
    /// Create a validated position.
    pub fn new(month: u32, week: u8) -> Result<Self> {
        if month == 0 {
            return Err(Error::InvalidInput("month must be 1 or greater".to_string()));
        }
        if month > MAX_MONTH {
            return Err(Error::InvalidInput(format!(
                "month must be at most {}, got {}",
                MAX_MONTH, month
            )));
        }
        if !(1..=WEEKS_PER_MONTH).contains(&week) {
            return Err(Error::InvalidInput(format!(
                "week must be between 1 and {}, got {}",
                WEEKS_PER_MONTH, week
            )));
        }
        Ok(Self { month, week })
    }

    /// 1-based linear week position: month 1 week 1 is 1, month 2 week 1 is 5.
    pub fn index(&self) -> u64 {
        u64::from(self.month.saturating_sub(1)) * u64::from(WEEKS_PER_MONTH) + u64::from(self.week)
    }

    /// Inverse of [`MonthWeek::index`]. Index 0 is not a grid position.
    pub fn from_index(index: u64) -> Option<Self> {
        if index == 0 {
            return None;
        }
        let per = u64::from(WEEKS_PER_MONTH);
        Some(Self {
            month: u32::try_from((index - 1) / per + 1).ok()?,
            week: ((index - 1) % per + 1) as u8,
        })
    }

    /// Parse `"<month>/<week>"` or `"<month>.<week>"`.
    pub fn parse(s: &str) -> Result<Self> {
        let (m, w) = s
            .split_once(['/', '.'])
            .ok_or_else(|| Error::InvalidInput(format!("expected MONTH/WEEK, got '{}'", s)))?;
        let month = m
            .trim()
            .parse::<u32>()
            .map_err(|_| Error::InvalidInput(format!("invalid month '{}'", m.trim())))?;
        let week = w
            .trim()
            .parse::<u8>()
            .map_err(|_| Error::InvalidInput(format!("invalid week '{}'", w.trim())))?;
        Self::new(month, week)
    }
}

impl fmt::Display for MonthWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M{}S{}", self.month, self.week)
    }
}

/// A schedule row derived from the parametric budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GanttActivity {
    /// Deterministic identifier (see `schedule::derive`)
    pub id: String,

    pub client_id: String,

    pub project_id: String,

    /// Cost category ("mayor") this row belongs to
    pub mayor_id: String,

    pub start_month: u32,
    pub start_week: u8,
    pub end_month: u32,
    pub end_week: u8,

    /// Budgeted amount spread over the activity's weeks
    pub amount: f64,

    pub label: String,

    /// Display order within the schedule
    #[serde(default)]
    pub order: i64,
}

impl GanttActivity {
    /// Start position (not re-validated).
    pub fn start(&self) -> MonthWeek {
        MonthWeek {
            month: self.start_month,
            week: self.start_week,
        }
    }

    /// End position (not re-validated).
    pub fn end(&self) -> MonthWeek {
        MonthWeek {
            month: self.end_month,
            week: self.end_week,
        }
    }
}

/// One category-level row of the parametric budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParametricLine {
    pub client_id: String,

    pub project_id: String,

    pub mayor_id: String,

    pub label: String,

    pub amount: f64,

    pub start_month: u32,
    pub start_week: u8,
    pub end_month: u32,
    pub end_week: u8,

    #[serde(default)]
    pub order: i64,
}

impl ParametricLine {
    pub fn start(&self) -> MonthWeek {
        MonthWeek {
            month: self.start_month,
            week: self.start_week,
        }
    }

    pub fn end(&self) -> MonthWeek {
        MonthWeek {
            month: self.end_month,
            week: self.end_week,
        }
    }
}

/// A manually entered matrix value that supersedes a computed cell.
///
/// Unique on `(client_id, project_id, month, concept)`; uniqueness is enforced
/// by the backend's upsert conflict key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixOverride {
    pub client_id: String,

    pub project_id: String,

    /// Calendar month as `YYYYMM`
    pub month: String,

    /// Matrix row the value applies to (usually a mayor id)
    pub concept: String,

    pub value: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl MatrixOverride {
    /// Columns forming the upsert conflict key.
    pub const CONFLICT_KEY: [&'static str; 4] = ["client_id", "project_id", "month", "concept"];

    pub fn new(
        client_id: impl Into<String>,
        project_id: impl Into<String>,
        month: impl Into<String>,
        concept: impl Into<String>,
        value: f64,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            project_id: project_id.into(),
            month: month.into(),
            concept: concept.into(),
            value,
            updated_at: None,
        }
    }
}

/// A visual annotation pinned to a timeline position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceLine {
    pub id: String,

    pub plan_id: String,

    pub position_month: u32,

    pub position_week: u8,

    pub label: String,

    /// CSS color string
    pub color: String,
}

impl ReferenceLine {
    pub fn position(&self) -> MonthWeek {
        MonthWeek {
            month: self.position_month,
            week: self.position_week,
        }
    }
}

/// Fields supplied when creating a reference line; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceLineDraft {
    pub plan_id: String,
    pub position: MonthWeek,
    pub label: String,
    pub color: String,
}

/// Default color for reference lines created without one.
pub const DEFAULT_REFERENCE_COLOR: &str = "#ef4444";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_week_new_rejects_out_of_range() {
        assert!(MonthWeek::new(1, 0).is_err());
        assert!(MonthWeek::new(1, 5).is_err());
        assert!(MonthWeek::new(0, 1).is_err());
        assert!(MonthWeek::new(3, 4).is_ok());
    }

    #[test]
    fn test_month_week_new_rejects_month_past_grid() {
        assert!(MonthWeek::new(MAX_MONTH, 4).is_ok());
        let err = MonthWeek::new(MAX_MONTH + 1, 1).unwrap_err();
        assert!(err.to_string().contains("at most 1200"), "{}", err);
        assert!(MonthWeek::parse("2000000000/1").is_err());
    }

    #[test]
    fn test_month_week_index_does_not_overflow() {
        let far = MonthWeek { month: u32::MAX, week: 4 };
        assert_eq!(far.index(), u64::from(u32::MAX) * 4);
        assert_eq!(MonthWeek::from_index(far.index()), Some(far));
        assert_eq!(MonthWeek::from_index(u64::MAX), None);
    }

    #[test]
    fn test_month_week_ordering_is_lexicographic() {
        let a = MonthWeek::new(1, 4).unwrap();
        let b = MonthWeek::new(2, 1).unwrap();
        assert!(a < b);
        assert!(MonthWeek::new(2, 2).unwrap() > b);
    }

    #[test]
    fn test_month_week_index() {
        assert_eq!(MonthWeek::new(1, 1).unwrap().index(), 1);
        assert_eq!(MonthWeek::new(2, 1).unwrap().index(), 5);
        assert_eq!(MonthWeek::new(3, 4).unwrap().index(), 12);
        assert_eq!(MonthWeek::from_index(12), Some(MonthWeek { month: 3, week: 4 }));
        assert_eq!(MonthWeek::from_index(5), Some(MonthWeek { month: 2, week: 1 }));
        assert_eq!(MonthWeek::from_index(0), None);
    }

    #[test]
    fn test_month_week_parse() {
        assert_eq!(MonthWeek::parse("2/3").unwrap(), MonthWeek { month: 2, week: 3 });
        assert_eq!(MonthWeek::parse("10.1").unwrap(), MonthWeek { month: 10, week: 1 });
        assert!(MonthWeek::parse("2").is_err());
        assert!(MonthWeek::parse("2/9").is_err());
        assert!(MonthWeek::parse("x/1").is_err());
    }

    #[test]
    fn test_month_week_display() {
        assert_eq!(MonthWeek { month: 4, week: 2 }.to_string(), "M4S2");
    }

    #[test]
    fn test_matrix_override_serializes_without_timestamp() {
        let o = MatrixOverride::new("c1", "p1", "202501", "MAY-01", 10.0);
        let json = serde_json::to_value(&o).unwrap();
        assert_eq!(json["month"], "202501");
        assert!(json.get("updated_at").is_none());
    }
}
