//! Manual matrix override store.

use std::sync::Arc;

use chrono::Utc;

use super::{QueryCache, decode_rows, overrides_key, report};
use crate::backend::{Backend, OVERRIDES_TABLE, Query};
use crate::models::MatrixOverride;
use crate::notifications::Notifier;
use crate::schedule::parse_month_key;
use crate::{Error, Result};

/// Reads and writes `matrix_overrides` for one backend.
pub struct OverrideStore<B: Backend> {
    backend: Arc<B>,
    cache: Arc<QueryCache>,
    notifier: Arc<dyn Notifier>,
}

impl<B: Backend> OverrideStore<B> {
    pub fn new(backend: Arc<B>, cache: Arc<QueryCache>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            backend,
            cache,
            notifier,
        }
    }

    /// Overrides of one project, ordered by month then concept.
    pub async fn list(&self, client_id: &str, project_id: &str) -> Result<Vec<MatrixOverride>> {
        let key = overrides_key(client_id, project_id);
        if let Some(rows) = self.cache.get::<Vec<MatrixOverride>>(&key) {
            return Ok(rows);
        }
        let generation = self.cache.generation(&key);
        let result = self.fetch(client_id, project_id).await;
        let rows = report(self.notifier.as_ref(), "Failed to load overrides", result)?;
        self.cache.put_if_generation(&key, generation, &rows);
        Ok(rows)
    }

    async fn fetch(&self, client_id: &str, project_id: &str) -> Result<Vec<MatrixOverride>> {
        let query = Query::new()
            .eq("client_id", client_id)
            .eq("project_id", project_id)
            .order_asc("month")
            .order_asc("concept");
        decode_rows(self.backend.select(OVERRIDES_TABLE, &query).await?)
    }

    /// Insert or replace the override for its (client, project, month, concept) cell.
    pub async fn upsert(&self, value: MatrixOverride) -> Result<MatrixOverride> {
        let key = overrides_key(&value.client_id, &value.project_id);
        let result = self.write(value).await;
        let stored = report(self.notifier.as_ref(), "Failed to save override", result)?;
        self.cache.invalidate(&key);
        Ok(stored)
    }

    async fn write(&self, mut value: MatrixOverride) -> Result<MatrixOverride> {
        validate(&value)?;
        value.updated_at = Some(Utc::now());
        let row = self
            .backend
            .upsert(
                OVERRIDES_TABLE,
                serde_json::to_value(&value)?,
                &MatrixOverride::CONFLICT_KEY,
            )
            .await?;
        Ok(serde_json::from_value(row)?)
    }

    /// Remove the override for one cell. Returns whether a row was deleted.
    pub async fn delete(&self, client_id: &str, project_id: &str, month: &str, concept: &str) -> Result<bool> {
        let result: Result<u64> = async {
            parse_month_key(month)?;
            let query = Query::new()
                .eq("client_id", client_id)
                .eq("project_id", project_id)
                .eq("month", month)
                .eq("concept", concept);
            self.backend.delete(OVERRIDES_TABLE, &query).await
        }
        .await;
        let removed = report(self.notifier.as_ref(), "Failed to delete override", result)?;
        self.cache.invalidate(&overrides_key(client_id, project_id));
        Ok(removed > 0)
    }
}

fn validate(value: &MatrixOverride) -> Result<()> {
    if value.client_id.trim().is_empty() || value.project_id.trim().is_empty() {
        return Err(Error::InvalidInput("client and project are required".to_string()));
    }
    if value.concept.trim().is_empty() {
        return Err(Error::InvalidInput("concept is required".to_string()));
    }
    if !value.value.is_finite() {
        return Err(Error::InvalidInput(format!("value must be a finite number, got {}", value.value)));
    }
    parse_month_key(&value.month)?;
    Ok(())
}
