use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::{PgPool, Row};
use tracing::{error, warn};
use webwatch_core_types::{Plan, PlanId, TaskSignature, WebWatchError};

use crate::{cache_key, default_ttl_days, CacheStats, PlanCache};

/// Durable backend over Postgres (§4.5/§6, `DATABASE_URL`). Schema per §6:
/// `execution_plans(id, task_signature, plan, version, ...)` and
/// `plan_cache(cache_key, plan_id, hit_count, last_used_at, expires_at)`.
pub struct SqlPlanCache {
    pool: PgPool,
}

impl SqlPlanCache {
    pub async fn connect(database_url: &str) -> Result<Self, WebWatchError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| WebWatchError::cache_backend(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlanCache for SqlPlanCache {
    async fn get(&self, signature: &TaskSignature) -> Option<Plan> {
        let key = cache_key(signature);
        let row = sqlx::query(
            "SELECT ep.plan FROM plan_cache pc \
             JOIN execution_plans ep ON ep.id = pc.plan_id \
             WHERE pc.cache_key = $1 AND pc.expires_at > now()",
        )
        .bind(&key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| warn!(error = %e, "plan cache read failed"))
        .ok()
        .flatten()?;

        let plan_json: serde_json::Value = row.try_get("plan").ok()?;
        let plan: Plan = serde_json::from_value(plan_json).ok()?;

        if let Err(e) = sqlx::query(
            "UPDATE plan_cache SET hit_count = hit_count + 1, last_used_at = now() WHERE cache_key = $1",
        )
        .bind(&key)
        .execute(&self.pool)
        .await
        {
            warn!(error = %e, "failed to record cache hit");
        }

        Some(plan)
    }

    async fn get_by_id(&self, plan_id: &PlanId) -> Option<Plan> {
        let row = sqlx::query("SELECT plan FROM execution_plans WHERE id = $1")
            .bind(&plan_id.0)
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten()?;
        let plan_json: serde_json::Value = row.try_get("plan").ok()?;
        serde_json::from_value(plan_json).ok()
    }

    async fn put(&self, plan: Plan, ttl_days: Option<i64>) -> Result<(), WebWatchError> {
        let plan_json = serde_json::to_value(&plan).map_err(|e| WebWatchError::internal(e.to_string()))?;

        sqlx::query(
            "INSERT INTO execution_plans (id, task_signature, instruction, url, plan, created_at, updated_at, version, is_active) \
             VALUES ($1, $2, $3, $4, $5, now(), now(), 1, true) \
             ON CONFLICT (task_signature) DO UPDATE SET \
               plan = EXCLUDED.plan, updated_at = now(), version = execution_plans.version + 1",
        )
        .bind(&plan.id.0)
        .bind(&plan.task_signature.0)
        .bind(&plan.instruction)
        .bind(&plan.url)
        .bind(&plan_json)
        .execute(&self.pool)
        .await
        .map_err(|e| WebWatchError::cache_backend(e.to_string()))?;

        let key = cache_key(&plan.task_signature);
        let expires_at = Utc::now() + Duration::days(ttl_days.unwrap_or_else(default_ttl_days));
        sqlx::query(
            "INSERT INTO plan_cache (cache_key, plan_id, hit_count, last_used_at, expires_at, created_at) \
             VALUES ($1, $2, 0, now(), $3, now()) \
             ON CONFLICT (cache_key) DO UPDATE SET plan_id = EXCLUDED.plan_id, expires_at = EXCLUDED.expires_at",
        )
        .bind(&key)
        .bind(&plan.id.0)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| WebWatchError::cache_backend(e.to_string()))?;

        Ok(())
    }

    async fn invalidate(&self, signature: &TaskSignature) -> Result<(), WebWatchError> {
        let key = cache_key(signature);
        sqlx::query("DELETE FROM plan_cache WHERE cache_key = $1")
            .bind(&key)
            .execute(&self.pool)
            .await
            .map_err(|e| WebWatchError::cache_backend(e.to_string()))?;
        Ok(())
    }

    async fn cleanup_expired(&self) -> u64 {
        sqlx::query("DELETE FROM plan_cache WHERE expires_at <= now()")
            .execute(&self.pool)
            .await
            .map(|r| r.rows_affected())
            .unwrap_or_else(|e| {
                error!(error = %e, "cache cleanup failed");
                0
            })
    }

    async fn stats(&self) -> CacheStats {
        let totals = sqlx::query("SELECT count(*) AS total, count(*) FILTER (WHERE expires_at <= now()) AS expired, coalesce(sum(hit_count), 0) AS hits FROM plan_cache")
            .fetch_one(&self.pool)
            .await;
        let Ok(row) = totals else { return CacheStats::default() };
        let total: i64 = row.try_get("total").unwrap_or(0);
        let expired: i64 = row.try_get("expired").unwrap_or(0);
        let hits: i64 = row.try_get("hits").unwrap_or(0);
        let hit_rate = if total == 0 { 0.0 } else { hits as f64 / total as f64 };

        let top_rows = sqlx::query("SELECT cache_key, hit_count FROM plan_cache ORDER BY hit_count DESC LIMIT 10")
            .fetch_all(&self.pool)
            .await
            .unwrap_or_default();
        let top = top_rows
            .into_iter()
            .filter_map(|r| Some((r.try_get::<String, _>("cache_key").ok()?, r.try_get::<i64, _>("hit_count").ok()? as u64)))
            .collect();

        CacheStats { total: total as u64, expired: expired as u64, hit_rate, top }
    }

    async fn refresh(&self, signature: &TaskSignature, plan: Plan) -> Result<(), WebWatchError> {
        let _ = signature;
        // Unlike reads/writes elsewhere, a failed refresh after successful
        // regeneration must surface to the caller (§4.5).
        self.put(plan, None).await
    }
}
