use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use webwatch_core_types::{CacheEntry, Plan, PlanId, TaskSignature, WebWatchError};

use crate::{cache_key, default_ttl_days, entry_is_fresh, CacheStats, PlanCache};

/// No-TTL-enforcement-on-write, same read contract as the durable backend:
/// used when `DATABASE_URL` is absent (§4.5, §6). Keyed by `DashMap`, the
/// concurrent map used throughout the teacher's `cdp-adapter` registries.
#[derive(Default)]
pub struct InMemoryPlanCache {
    plans: DashMap<String, Arc<Plan>>,
    entries: DashMap<String, CacheEntry>,
    by_signature: DashMap<String, String>,
}

impl InMemoryPlanCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlanCache for InMemoryPlanCache {
    async fn get(&self, signature: &TaskSignature) -> Option<Plan> {
        let key = cache_key(signature);
        let mut entry = self.entries.get_mut(&key)?;
        if !entry_is_fresh(&entry, Utc::now()) {
            return None;
        }
        entry.hit_count += 1;
        entry.last_used_at = Utc::now();
        let plan = self.plans.get(&entry.plan_id.0)?;
        Some(plan.as_ref().clone())
    }

    async fn get_by_id(&self, plan_id: &PlanId) -> Option<Plan> {
        self.plans.get(&plan_id.0).map(|p| p.as_ref().clone())
    }

    async fn put(&self, plan: Plan, ttl_days: Option<i64>) -> Result<(), WebWatchError> {
        let key = cache_key(&plan.task_signature);
        let now = Utc::now();
        let entry = CacheEntry {
            cache_key: key.clone(),
            plan_id: plan.id.clone(),
            hit_count: 0,
            last_used_at: now,
            expires_at: now + Duration::days(ttl_days.unwrap_or_else(default_ttl_days)),
        };
        self.by_signature.insert(plan.task_signature.0.clone(), plan.id.0.clone());
        self.plans.insert(plan.id.0.clone(), Arc::new(plan));
        self.entries.insert(key, entry);
        Ok(())
    }

    async fn invalidate(&self, signature: &TaskSignature) -> Result<(), WebWatchError> {
        let key = cache_key(signature);
        self.entries.remove(&key);
        Ok(())
    }

    async fn cleanup_expired(&self) -> u64 {
        let now = Utc::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| !entry_is_fresh(e.value(), now))
            .map(|e| e.key().clone())
            .collect();
        let count = expired.len() as u64;
        for key in expired {
            self.entries.remove(&key);
        }
        count
    }

    async fn stats(&self) -> CacheStats {
        let now = Utc::now();
        let total = self.entries.len() as u64;
        let expired = self.entries.iter().filter(|e| !entry_is_fresh(e.value(), now)).count() as u64;
        let mut top: Vec<(String, u64)> =
            self.entries.iter().map(|e| (e.key().clone(), e.value().hit_count)).collect();
        top.sort_by(|a, b| b.1.cmp(&a.1));
        top.truncate(10);
        let hits: u64 = self.entries.iter().map(|e| e.value().hit_count).sum();
        let hit_rate = if total == 0 { 0.0 } else { hits as f64 / total as f64 };
        CacheStats { total, expired, hit_rate, top }
    }

    async fn refresh(&self, signature: &TaskSignature, plan: Plan) -> Result<(), WebWatchError> {
        let ttl = self
            .entries
            .get(&cache_key(signature))
            .map(|_| default_ttl_days())
            .unwrap_or_else(default_ttl_days);
        self.put(plan, Some(ttl)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webwatch_core_types::{PlanErrorHandling, PlanMetadata, PlanValidation};

    fn sample_plan(url: &str) -> Plan {
        Plan {
            id: PlanId::new(),
            task_signature: TaskSignature::compute("get price", url),
            instruction: "get price".to_string(),
            url: url.to_string(),
            steps: vec![],
            expected_results: vec![],
            error_handling: PlanErrorHandling::default(),
            validation: PlanValidation::default(),
            metadata: PlanMetadata {
                created_at: Utc::now(),
                model_id: "mock".to_string(),
                confidence: 0.9,
                estimated_duration_ms: 100,
            },
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips_and_increments_hit_count() {
        let cache = InMemoryPlanCache::new();
        let plan = sample_plan("https://example.com");
        let signature = plan.task_signature.clone();
        cache.put(plan.clone(), None).await.unwrap();

        let fetched = cache.get(&signature).await.unwrap();
        assert_eq!(fetched.id, plan.id);
        cache.get(&signature).await;
        let stats = cache.stats().await;
        assert_eq!(stats.top[0].1, 2);
    }

    #[tokio::test]
    async fn invalidate_removes_the_cache_entry_but_keeps_the_plan() {
        let cache = InMemoryPlanCache::new();
        let plan = sample_plan("https://example.com");
        let signature = plan.task_signature.clone();
        let plan_id = plan.id.clone();
        cache.put(plan, None).await.unwrap();
        cache.invalidate(&signature).await.unwrap();

        assert!(cache.get(&signature).await.is_none());
        assert!(cache.get_by_id(&plan_id).await.is_some());
    }

    #[tokio::test]
    async fn expired_entries_are_cleaned_up() {
        let cache = InMemoryPlanCache::new();
        let plan = sample_plan("https://example.com");
        let signature = plan.task_signature.clone();
        cache.put(plan, Some(-1)).await.unwrap();
        assert!(cache.get(&signature).await.is_none());
        assert_eq!(cache.cleanup_expired().await, 1);
    }
}
