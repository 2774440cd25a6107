//! Timeline reference-line store.

use std::sync::Arc;

use serde_json::{Map, Value};

use super::{QueryCache, decode_rows, reference_lines_key, report};
use crate::backend::{Backend, Query, REFERENCE_LINES_TABLE};
use crate::models::{DEFAULT_REFERENCE_COLOR, MonthWeek, ReferenceLine, ReferenceLineDraft};
use crate::notifications::Notifier;
use crate::{Error, Result};

/// Fields to change on an existing reference line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceLinePatch {
    pub position: Option<MonthWeek>,
    pub label: Option<String>,
    pub color: Option<String>,
}

impl ReferenceLinePatch {
    pub fn is_empty(&self) -> bool {
        self.position.is_none() && self.label.is_none() && self.color.is_none()
    }
}

pub struct ReferenceLineStore<B: Backend> {
    backend: Arc<B>,
    cache: Arc<QueryCache>,
    notifier: Arc<dyn Notifier>,
}

impl<B: Backend> ReferenceLineStore<B> {
    pub fn new(backend: Arc<B>, cache: Arc<QueryCache>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            backend,
            cache,
            notifier,
        }
    }

    /// Lines of one plan ordered by position.
    pub async fn list(&self, plan_id: &str) -> Result<Vec<ReferenceLine>> {
        let key = reference_lines_key(plan_id);
        if let Some(rows) = self.cache.get::<Vec<ReferenceLine>>(&key) {
            return Ok(rows);
        }
        let generation = self.cache.generation(&key);
        let query = Query::new()
            .eq("plan_id", plan_id)
            .order_asc("position_month")
            .order_asc("position_week")
            .order_asc("id");
        let result = match self.backend.select(REFERENCE_LINES_TABLE, &query).await {
            Ok(rows) => decode_rows(rows),
            Err(e) => Err(e),
        };
        let rows = report(self.notifier.as_ref(), "Failed to load reference lines", result)?;
        self.cache.put_if_generation(&key, generation, &rows);
        Ok(rows)
    }

    pub async fn create(&self, draft: ReferenceLineDraft) -> Result<ReferenceLine> {
        let plan_id = draft.plan_id.clone();
        let result = self.insert(draft).await;
        let line = report(self.notifier.as_ref(), "Failed to add reference line", result)?;
        self.cache.invalidate(&reference_lines_key(&plan_id));
        Ok(line)
    }

    async fn insert(&self, draft: ReferenceLineDraft) -> Result<ReferenceLine> {
        if draft.plan_id.trim().is_empty() {
            return Err(Error::InvalidInput("plan is required".to_string()));
        }
        let position = MonthWeek::new(draft.position.month, draft.position.week)?;
        let color = if draft.color.trim().is_empty() {
            DEFAULT_REFERENCE_COLOR.to_string()
        } else {
            draft.color
        };
        let line = ReferenceLine {
            id: uuid::Uuid::new_v4().to_string(),
            plan_id: draft.plan_id,
            position_month: position.month,
            position_week: position.week,
            label: draft.label,
            color,
        };
        let row = self
            .backend
            .insert(REFERENCE_LINES_TABLE, serde_json::to_value(&line)?)
            .await?;
        Ok(serde_json::from_value(row)?)
    }

    pub async fn update(&self, id: &str, patch: ReferenceLinePatch) -> Result<ReferenceLine> {
        let result = self.apply(id, patch).await;
        let line = report(self.notifier.as_ref(), "Failed to update reference line", result)?;
        self.cache.invalidate(&reference_lines_key(&line.plan_id));
        Ok(line)
    }

    async fn apply(&self, id: &str, patch: ReferenceLinePatch) -> Result<ReferenceLine> {
        if patch.is_empty() {
            return Err(Error::InvalidInput("nothing to update".to_string()));
        }
        let mut fields = Map::new();
        if let Some(position) = patch.position {
            let position = MonthWeek::new(position.month, position.week)?;
            fields.insert("position_month".to_string(), position.month.into());
            fields.insert("position_week".to_string(), position.week.into());
        }
        if let Some(label) = patch.label {
            fields.insert("label".to_string(), label.into());
        }
        if let Some(color) = patch.color {
            fields.insert("color".to_string(), color.into());
        }
        let rows = self
            .backend
            .update(REFERENCE_LINES_TABLE, &Query::new().eq("id", id), Value::Object(fields))
            .await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("reference line {}", id)))?;
        Ok(serde_json::from_value(row)?)
    }

    /// Delete one line by id. Returns whether it existed.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = self
            .backend
            .delete(REFERENCE_LINES_TABLE, &Query::new().eq("id", id))
            .await;
        let removed = report(self.notifier.as_ref(), "Failed to delete reference line", result)?;
        self.cache.invalidate_prefix("reference_lines:");
        Ok(removed > 0)
    }
}
