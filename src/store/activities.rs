//! Gantt activities and the parametric budget they are derived from.
//!
//! Activities are never written directly: they are created, replaced and
//! pruned only by the `sync_parametric_to_gantt` procedure.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{QueryCache, activities_key, decode_rows, report};
use crate::backend::{ACTIVITIES_TABLE, Backend, PARAMETRIC_TABLE, Query, SYNC_PARAMETRIC_RPC};
use crate::models::{GanttActivity, ParametricLine};
use crate::notifications::Notifier;
use crate::schedule::validate_month_week_range;
use crate::{Error, Result};

/// Result of one parametric synchronization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    #[serde(default)]
    pub activities: usize,
    #[serde(default)]
    pub removed: u64,
}

pub struct ActivityStore<B: Backend> {
    backend: Arc<B>,
    cache: Arc<QueryCache>,
    notifier: Arc<dyn Notifier>,
}

impl<B: Backend> ActivityStore<B> {
    pub fn new(backend: Arc<B>, cache: Arc<QueryCache>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            backend,
            cache,
            notifier,
        }
    }

    /// Activities of one project in display order.
    pub async fn list(&self, client_id: &str, project_id: &str) -> Result<Vec<GanttActivity>> {
        let key = activities_key(client_id, project_id);
        if let Some(rows) = self.cache.get::<Vec<GanttActivity>>(&key) {
            return Ok(rows);
        }
        let generation = self.cache.generation(&key);
        let query = Query::new()
            .eq("client_id", client_id)
            .eq("project_id", project_id)
            .order_asc("order")
            .order_asc("mayor_id");
        let result = match self.backend.select(ACTIVITIES_TABLE, &query).await {
            Ok(rows) => decode_rows(rows),
            Err(e) => Err(e),
        };
        let rows = report(self.notifier.as_ref(), "Failed to load activities", result)?;
        self.cache.put_if_generation(&key, generation, &rows);
        Ok(rows)
    }

    /// Parametric budget lines of one project.
    pub async fn parametric_lines(&self, client_id: &str, project_id: &str) -> Result<Vec<ParametricLine>> {
        let query = Query::new()
            .eq("client_id", client_id)
            .eq("project_id", project_id)
            .order_asc("order")
            .order_asc("mayor_id");
        let result = match self.backend.select(PARAMETRIC_TABLE, &query).await {
            Ok(rows) => decode_rows(rows),
            Err(e) => Err(e),
        };
        report(self.notifier.as_ref(), "Failed to load parametric budget", result)
    }

    /// Replace the parametric budget of one project with `lines`.
    ///
    /// Every line must belong to the project and carry a valid range. The old
    /// lines are swapped out through [`Backend::replace`], so on the local
    /// backend a failed write keeps the previous budget. The schedule is not
    /// touched; publish a budget-changed event or call [`ActivityStore::sync`]
    /// afterwards.
    pub async fn replace_parametric(
        &self,
        client_id: &str,
        project_id: &str,
        lines: &[ParametricLine],
    ) -> Result<usize> {
        let result = self.write_parametric(client_id, project_id, lines).await;
        report(self.notifier.as_ref(), "Failed to save parametric budget", result)
    }

    async fn write_parametric(&self, client_id: &str, project_id: &str, lines: &[ParametricLine]) -> Result<usize> {
        for line in lines {
            if line.client_id != client_id || line.project_id != project_id {
                return Err(Error::InvalidInput(format!(
                    "line {} belongs to {}/{}",
                    line.mayor_id, line.client_id, line.project_id
                )));
            }
            if !line.amount.is_finite() {
                return Err(Error::InvalidInput(format!("line {} has a non-finite amount", line.mayor_id)));
            }
            validate_month_week_range(line.start(), line.end())
                .map_err(|e| Error::InvalidRange(format!("line {}: {}", line.mayor_id, e)))?;
        }

        let rows = lines
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let scope = Query::new().eq("client_id", client_id).eq("project_id", project_id);
        self.backend.replace(PARAMETRIC_TABLE, &scope, rows).await?;
        Ok(lines.len())
    }

    /// Re-derive the schedule of one project on the backend.
    pub async fn sync(&self, client_id: &str, project_id: &str) -> Result<SyncSummary> {
        let args = json!({ "p_client_id": client_id, "p_project_id": project_id });
        let result = self.backend.rpc(SYNC_PARAMETRIC_RPC, args).await;
        let value = report(self.notifier.as_ref(), "Failed to sync schedule", result)?;
        self.cache.invalidate(&activities_key(client_id, project_id));
        Ok(serde_json::from_value(value).unwrap_or_default())
    }
}
