//! Month/week grid math.
//!
//! Converts between `MonthWeek` positions and linear week indices, counts
//! durations and expands inclusive ranges into the cells they cover.

use crate::models::{MAX_MONTH, MonthWeek, WEEKS_PER_MONTH};
use crate::{Error, Result};

/// Duration of an inclusive range in weeks, floor-bounded at 1.
///
/// Inverted ranges are not rejected here; they count as a single week.
pub fn weeks_between(start: MonthWeek, end: MonthWeek) -> u32 {
    let diff = i128::from(end.index()) - i128::from(start.index()) + 1;
    diff.clamp(1, i128::from(u32::MAX)) as u32
}

/// Check that both endpoints are on the grid and that `end` is not before `start`.
///
/// Returns a human-readable description of the first problem found.
pub fn validate_month_week_range(start: MonthWeek, end: MonthWeek) -> std::result::Result<(), String> {
    for (name, pos) in [("start", start), ("end", end)] {
        if pos.month == 0 {
            return Err(format!("{} month must be 1 or greater", name));
        }
        if pos.month > MAX_MONTH {
            return Err(format!(
                "{} month must be at most {}, got {}",
                name, MAX_MONTH, pos.month
            ));
        }
        if !(1..=WEEKS_PER_MONTH).contains(&pos.week) {
            return Err(format!(
                "{} week must be between 1 and {}, got {}",
                name, WEEKS_PER_MONTH, pos.week
            ));
        }
    }
    if end < start {
        return Err(format!(
            "end {} is before start {}",
            end, start
        ));
    }
    Ok(())
}

/// Every grid cell covered by `start..=end`, in ascending order.
///
/// A single-month range iterates its weeks directly. A multi-month range clips
/// the first month to `start.week..=4`, uses all four weeks for interior
/// months and clips the last month to `1..=end.week`.
pub fn expand_range_to_month_week_cells(start: MonthWeek, end: MonthWeek) -> Result<Vec<MonthWeek>> {
    validate_month_week_range(start, end).map_err(Error::InvalidRange)?;

    let mut cells = Vec::with_capacity(weeks_between(start, end) as usize);

    if start.month == end.month {
        for week in start.week..=end.week {
            cells.push(MonthWeek {
                month: start.month,
                week,
            });
        }
        return Ok(cells);
    }

    for month in start.month..=end.month {
        let first = if month == start.month { start.week } else { 1 };
        let last = if month == end.month {
            end.week
        } else {
            WEEKS_PER_MONTH
        };
        for week in first..=last {
            cells.push(MonthWeek { month, week });
        }
    }

    Ok(cells)
}
