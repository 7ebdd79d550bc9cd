//! PlanCache (§4.5): one trait, two interchangeable backends. The
//! cache-key hashing scheme (`sha256("cache_" || taskSignature)`) is lifted
//! verbatim from the pattern described by the teacher's
//! `src/agent/mod.rs::cache_key_for_request` (canonical input hashed with
//! `sha2`, hex-encoded).

mod memory;
mod sql;

pub use memory::InMemoryPlanCache;
pub use sql::SqlPlanCache;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use webwatch_core_types::{CacheEntry, Plan, PlanId, TaskSignature, WebWatchError};

#[derive(Clone, Debug, Default)]
pub struct CacheStats {
    pub total: u64,
    pub expired: u64,
    pub hit_rate: f64,
    pub top: Vec<(String, u64)>,
}

#[async_trait]
pub trait PlanCache: Send + Sync {
    async fn get(&self, signature: &TaskSignature) -> Option<Plan>;
    async fn get_by_id(&self, plan_id: &PlanId) -> Option<Plan>;
    async fn put(&self, plan: Plan, ttl_days: Option<i64>) -> Result<(), WebWatchError>;
    async fn invalidate(&self, signature: &TaskSignature) -> Result<(), WebWatchError>;
    async fn cleanup_expired(&self) -> u64;
    async fn stats(&self) -> CacheStats;
    async fn refresh(&self, signature: &TaskSignature, plan: Plan) -> Result<(), WebWatchError>;
}

pub fn cache_key(signature: &TaskSignature) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"cache_");
    hasher.update(signature.0.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn default_ttl_days() -> i64 {
    7
}

pub fn entry_is_fresh(entry: &CacheEntry, now: chrono::DateTime<chrono::Utc>) -> bool {
    entry.expires_at > now
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_stable_for_the_same_signature() {
        let sig = TaskSignature("get price|https://example.com".to_string());
        assert_eq!(cache_key(&sig), cache_key(&sig));
    }

    #[test]
    fn cache_key_differs_across_signatures() {
        let a = TaskSignature("a".to_string());
        let b = TaskSignature("b".to_string());
        assert_ne!(cache_key(&a), cache_key(&b));
    }
}
