//! Failure-driven regeneration (§4.7), grounded on `src/replan.rs`'s
//! replan-on-failure plumbing: capture fresh page context, ask the planner
//! for a new plan, replay it once, and only adopt it if the replay succeeds.

use std::sync::Arc;

use tracing::warn;
use webwatch_browser::BrowserSession;
use webwatch_cache::PlanCache;
use webwatch_core_types::{ExecutionResult, Plan, TaskInput, TaskSignature};
use webwatch_llm::LLMClient;
use webwatch_planner::PlanGenerator;

/// Attempts exactly one regeneration pass. Returns `None` if the failure
/// doesn't look selector-related, plan generation fails, or the replay of
/// the new plan also fails — the caller keeps the original `result` in every
/// `None` case.
pub async fn attempt(
    session: &BrowserSession,
    planner: &PlanGenerator,
    primary_llm: &dyn LLMClient,
    fallback_llm: Option<Arc<dyn LLMClient>>,
    cache: &dyn PlanCache,
    task: &TaskInput,
    signature: &TaskSignature,
    failed_result: &ExecutionResult,
) -> Option<(Plan, ExecutionResult)> {
    if !failed_result.looks_like_stale_selector() {
        return None;
    }

    let page_text = session.page_text().await.ok();
    let generated = planner
        .generate_plan_with_fallback(primary_llm, fallback_llm, &task.instruction, &task.url, page_text.as_deref())
        .await;
    let plan = generated.plan?;

    let new_result = session.execute(&plan).await;
    if !new_result.is_success() {
        warn!(task_signature = %signature.0, "regenerated plan also failed, keeping original failure");
        return None;
    }

    if let Err(err) = cache.refresh(signature, plan.clone()).await {
        warn!(error = %err, "cache overwrite after regeneration failed");
    }
    Some((plan, new_result))
}
