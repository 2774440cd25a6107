//! Reference-line overlay markers.
//!
//! Turns stored reference lines into absolutely positioned markers over the
//! timeline.

use serde::Serialize;

use crate::models::ReferenceLine;
use crate::schedule::layout::{TimelineLayout, x_in_column};

/// A vertical marker ready to draw.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub id: String,
    /// Left offset in pixels
    pub x: f64,
    pub label: String,
    pub color: String,
    /// False when the line's month is outside the layout and `x` is degenerate
    pub placed: bool,
}

/// Build markers for `lines`, ordered by timeline position.
pub fn markers(layout: &TimelineLayout, lines: &[ReferenceLine]) -> Vec<Marker> {
    let mut sorted: Vec<&ReferenceLine> = lines.iter().collect();
    sorted.sort_by(|a, b| a.position().cmp(&b.position()).then_with(|| a.id.cmp(&b.id)));

    sorted
        .into_iter()
        .map(|line| match layout.column_for_index(line.position_month) {
            Some(col) => Marker {
                id: line.id.clone(),
                x: x_in_column(col, line.position_week),
                label: line.label.clone(),
                color: line.color.clone(),
                placed: true,
            },
            None => {
                tracing::warn!(
                    line = %line.id,
                    month = line.position_month,
                    "reference line month not present in timeline layout"
                );
                Marker {
                    id: line.id.clone(),
                    x: 0.0,
                    label: line.label.clone(),
                    color: line.color.clone(),
                    placed: false,
                }
            }
        })
        .collect()
}
