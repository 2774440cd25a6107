//! Derivation of the construction schedule from the parametric budget.
//!
//! One activity is produced per mayor. Several budget lines for the same mayor
//! are folded together: amounts add up and the activity spans from the
//! earliest start to the latest end. Identifiers are hashes of
//! `(client, project, mayor)` so re-deriving the same budget yields the same
//! rows.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::models::{GanttActivity, ParametricLine};
use crate::schedule::weeks::validate_month_week_range;

/// Deterministic activity id for a mayor within a project.
///
/// Format: `ga-<12 hex chars>`
pub fn activity_id(client_id: &str, project_id: &str, mayor_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(client_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(project_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(mayor_id.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    format!("ga-{}", &hash[..12])
}

/// Derive the schedule rows for one project.
///
/// Lines belonging to other projects, and lines with an invalid range, are
/// ignored. Output is ordered by `order`, then mayor id.
pub fn derive_activities(client_id: &str, project_id: &str, lines: &[ParametricLine]) -> Vec<GanttActivity> {
    let mut by_mayor: BTreeMap<&str, GanttActivity> = BTreeMap::new();

    for line in lines {
        if line.client_id != client_id || line.project_id != project_id {
            continue;
        }
        if let Err(reason) = validate_month_week_range(line.start(), line.end()) {
            tracing::warn!(mayor = %line.mayor_id, %reason, "skipping parametric line");
            continue;
        }

        match by_mayor.get_mut(line.mayor_id.as_str()) {
            Some(activity) => {
                activity.amount += line.amount;
                if line.start() < activity.start() {
                    activity.start_month = line.start_month;
                    activity.start_week = line.start_week;
                }
                if line.end() > activity.end() {
                    activity.end_month = line.end_month;
                    activity.end_week = line.end_week;
                }
                activity.order = activity.order.min(line.order);
            }
            None => {
                by_mayor.insert(
                    line.mayor_id.as_str(),
                    GanttActivity {
                        id: activity_id(client_id, project_id, &line.mayor_id),
                        client_id: client_id.to_string(),
                        project_id: project_id.to_string(),
                        mayor_id: line.mayor_id.clone(),
                        start_month: line.start_month,
                        start_week: line.start_week,
                        end_month: line.end_month,
                        end_week: line.end_week,
                        amount: line.amount,
                        label: line.label.clone(),
                        order: line.order,
                    },
                );
            }
        }
    }

    let mut activities: Vec<GanttActivity> = by_mayor.into_values().collect();
    activities.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.mayor_id.cmp(&b.mayor_id)));
    activities
}
