use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use sqlx::{PgPool, Row};
use tracing::warn;
use webwatch_core_types::{ChangeRecord, MonitoringSample, TaskId, WebWatchError};

/// Append-only sample/change history, split into a durable and an in-memory
/// backend behind one trait (§4.8), the same shape as `PlanCache` (§4.5) —
/// callers never branch on which is active.
#[async_trait]
pub trait MonitoringStore: Send + Sync {
    async fn latest_sample(&self, task_id: &TaskId) -> Option<MonitoringSample>;
    async fn append_sample(&self, sample: MonitoringSample) -> Result<(), WebWatchError>;
    async fn append_change(&self, change: ChangeRecord) -> Result<(), WebWatchError>;
}

#[derive(Default)]
pub struct InMemoryMonitoringStore {
    latest: DashMap<String, MonitoringSample>,
    changes: DashMap<String, Vec<ChangeRecord>>,
}

impl InMemoryMonitoringStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MonitoringStore for InMemoryMonitoringStore {
    async fn latest_sample(&self, task_id: &TaskId) -> Option<MonitoringSample> {
        self.latest.get(&task_id.0).map(|s| s.clone())
    }

    async fn append_sample(&self, sample: MonitoringSample) -> Result<(), WebWatchError> {
        self.latest.insert(sample.task_id.0.clone(), sample);
        Ok(())
    }

    async fn append_change(&self, change: ChangeRecord) -> Result<(), WebWatchError> {
        self.changes.entry(change.task_id.0.clone()).or_default().push(change);
        Ok(())
    }
}

pub struct SqlMonitoringStore {
    pool: PgPool,
}

impl SqlMonitoringStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MonitoringStore for SqlMonitoringStore {
    async fn latest_sample(&self, task_id: &TaskId) -> Option<MonitoringSample> {
        let row = sqlx::query(
            "SELECT task_id, url, extracted_data, timestamp FROM monitoring_data \
             WHERE task_id = $1 ORDER BY timestamp DESC LIMIT 1",
        )
        .bind(&task_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| warn!(error = %e, "monitoring read failed"))
        .ok()
        .flatten()?;

        let extracted_json: serde_json::Value = row.try_get("extracted_data").ok()?;
        let extracted_data: HashMap<String, serde_json::Value> = serde_json::from_value(extracted_json).ok()?;
        Some(MonitoringSample {
            task_id: task_id.clone(),
            url: row.try_get("url").ok()?,
            extracted_data,
            execution_id: None,
            captured_at: row.try_get("timestamp").ok()?,
        })
    }

    async fn append_sample(&self, sample: MonitoringSample) -> Result<(), WebWatchError> {
        let extracted_json = serde_json::to_value(&sample.extracted_data).map_err(|e| WebWatchError::internal(e.to_string()))?;
        sqlx::query(
            "INSERT INTO monitoring_data (task_id, url, extracted_data, execution_id, timestamp) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&sample.task_id.0)
        .bind(&sample.url)
        .bind(&extracted_json)
        .bind(sample.execution_id.as_ref().map(|id| id.0.clone()))
        .bind(sample.captured_at)
        .execute(&self.pool)
        .await
        .map_err(|e| WebWatchError::internal(e.to_string()))?;
        Ok(())
    }

    async fn append_change(&self, change: ChangeRecord) -> Result<(), WebWatchError> {
        let fields_json = serde_json::to_value(&change.changed_fields).map_err(|e| WebWatchError::internal(e.to_string()))?;
        sqlx::query(
            "INSERT INTO change_detections (task_id, execution_id, changed_fields, is_restock, detected_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&change.task_id.0)
        .bind(change.execution_id.as_ref().map(|id| id.0.clone()))
        .bind(&fields_json)
        .bind(change.is_restock)
        .bind(change.detected_at)
        .execute(&self.pool)
        .await
        .map_err(|e| WebWatchError::internal(e.to_string()))?;
        Ok(())
    }
}

pub fn shared_in_memory() -> Arc<dyn MonitoringStore> {
    Arc::new(InMemoryMonitoringStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    #[tokio::test]
    async fn latest_sample_is_none_before_any_append() {
        let store = InMemoryMonitoringStore::new();
        assert!(store.latest_sample(&TaskId::new()).await.is_none());
    }

    #[tokio::test]
    async fn appended_sample_becomes_the_latest() {
        let store = InMemoryMonitoringStore::new();
        let task_id = TaskId::new();
        let sample = MonitoringSample {
            task_id: task_id.clone(),
            url: "https://example.com".to_string(),
            extracted_data: Map::new(),
            execution_id: None,
            captured_at: Utc::now(),
        };
        store.append_sample(sample.clone()).await.unwrap();
        let fetched = store.latest_sample(&task_id).await.unwrap();
        assert_eq!(fetched.url, sample.url);
    }
}
