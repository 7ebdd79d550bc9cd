//! Library entry point (§6): wires a `Config` into a concrete `Orchestrator`
//! and translates `TaskInput`/`OrchestratorOutcome` into the Lambda-gateway-
//! shaped `LambdaResponse` envelope the external interface names.
//!
//! Grounded on the teacher's `src/agent/mod.rs` (`ChatRunner::new` assembling
//! collaborators from a `Config`) and `src/cli/runtime.rs` (config-file +
//! env-layered `Config` loading, `init_logging`).

pub mod cli;
pub mod config;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use webwatch_agent::{InteractiveAgent, InteractiveAgentConfig};
use webwatch_cache::{InMemoryPlanCache, PlanCache, SqlPlanCache};
use webwatch_core_types::{TaskInput, WebWatchError};
use webwatch_llm::{AnthropicLikeClient, AnthropicLikeConfig, LLMClient, OpenAiLikeClient, OpenAiLikeConfig};
use webwatch_monitor::{shared_in_memory, MonitoringStore, SqlMonitoringStore};
use webwatch_orchestrator::{Orchestrator, OrchestratorOutcome};
use webwatch_planner::PlanGenerator;
use webwatch_prompts::PromptStore;

pub use config::{Config, LlmProviderKind};

#[derive(Clone, Debug, Serialize)]
pub struct LambdaResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl LambdaResponse {
    fn json(status_code: u16, body: Value) -> Self {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Self { status_code, headers, body: body.to_string() }
    }
}

fn llm_client(config: &Config) -> Arc<dyn LLMClient> {
    match config.llm_provider {
        LlmProviderKind::AnthropicLike => {
            let mut client_config = AnthropicLikeConfig { api_key: config.anthropic_api_key.clone(), model: config.anthropic_model.clone(), ..Default::default() };
            if let Some(base_url) = &config.llm_base_url {
                client_config.base_url = base_url.clone();
            }
            Arc::new(AnthropicLikeClient::new(client_config))
        }
        LlmProviderKind::OpenAiLike => {
            let mut client_config = OpenAiLikeConfig { api_key: config.openai_api_key.clone(), model: config.openai_model.clone(), ..Default::default() };
            if let Some(base_url) = &config.llm_base_url {
                client_config.base_url = base_url.clone();
            }
            Arc::new(OpenAiLikeClient::new(client_config))
        }
    }
}

/// Assembles the `Orchestrator` from `config` (§6): `DATABASE_URL` presence
/// selects the SQL cache/monitoring backends over the in-memory ones, and
/// `LLM_PROVIDER` selects which backend plays the primary role (the other
/// family, if credentials are present, becomes the fallback).
pub async fn build_orchestrator(config: &Config) -> Result<Orchestrator, WebWatchError> {
    let primary = llm_client(config);
    let fallback: Option<Arc<dyn LLMClient>> = match config.llm_provider {
        LlmProviderKind::OpenAiLike if !config.anthropic_api_key.is_empty() => {
            Some(Arc::new(AnthropicLikeClient::new(AnthropicLikeConfig {
                api_key: config.anthropic_api_key.clone(),
                model: config.anthropic_model.clone(),
                ..Default::default()
            })))
        }
        LlmProviderKind::AnthropicLike if !config.openai_api_key.is_empty() => {
            Some(Arc::new(OpenAiLikeClient::new(OpenAiLikeConfig {
                api_key: config.openai_api_key.clone(),
                model: config.openai_model.clone(),
                ..Default::default()
            })))
        }
        _ => None,
    };

    let (cache, monitoring): (Arc<dyn PlanCache>, Arc<dyn MonitoringStore>) = match &config.database_url {
        Some(database_url) => {
            let pool = sqlx::PgPool::connect(database_url)
                .await
                .map_err(|e| WebWatchError::cache_backend(e.to_string()))?;
            (Arc::new(SqlPlanCache::from_pool(pool.clone())), Arc::new(SqlMonitoringStore::new(pool)))
        }
        None => (Arc::new(InMemoryPlanCache::new()), shared_in_memory()),
    };

    let prompts = PromptStore::default();
    let interactive_config = InteractiveAgentConfig::default();

    Ok(Orchestrator {
        llm: primary,
        fallback_llm: fallback,
        prompts: prompts.clone(),
        cache,
        monitoring,
        planner: PlanGenerator::new(prompts),
        interactive: InteractiveAgent::new(interactive_config, PromptStore::default()),
        cache_ttl_days: config.cache_ttl_days,
        browser_timeout_ms: config.browser_timeout_ms,
    })
}

/// Parses an optional API-gateway-style envelope (`{body, headers,
/// httpMethod, requestContext}`) down to the raw `TaskInput` JSON, falling
/// back to treating `raw` as the `TaskInput` body directly (§6).
pub fn unwrap_envelope(raw: &str) -> Result<TaskInput, WebWatchError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| WebWatchError::validation(format!("invalid JSON body: {e}")))?;
    let body_value = match value.get("body") {
        Some(Value::String(inner)) => serde_json::from_str(inner).map_err(|e| WebWatchError::validation(format!("invalid JSON body: {e}")))?,
        Some(inner) => inner.clone(),
        None => value,
    };
    serde_json::from_value(body_value).map_err(|e| WebWatchError::validation(format!("malformed task input: {e}")))
}

/// Runs one task through `orchestrator` and renders the §6 response shape.
pub async fn handle(orchestrator: &Orchestrator, task: TaskInput) -> LambdaResponse {
    match orchestrator.run(&task).await {
        Ok(outcome) => render_outcome(outcome),
        Err(err) => error_response(&err),
    }
}

fn error_response(err: &WebWatchError) -> LambdaResponse {
    LambdaResponse::json(
        err.http_status(),
        json!({
            "success": false,
            "error": { "code": err.code(), "message": err.to_string() },
        }),
    )
}

fn render_outcome(outcome: OrchestratorOutcome) -> LambdaResponse {
    match outcome {
        OrchestratorOutcome::Interactive { plan_id, status, extracted_data, interactive_steps, metrics, escalated, escalation_reason } => {
            let steps: Vec<Value> = interactive_steps
                .iter()
                .map(|step| {
                    json!({
                        "stepNumber": step.step_number,
                        "action": step.action,
                        "progressScore": step.progress_score,
                        "isComplete": step.is_complete,
                        "reasoning": step.reasoning,
                    })
                })
                .collect();
            LambdaResponse::json(
                status_code_for(&status),
                json!({
                    "success": !escalated,
                    "mode": "interactive",
                    "planId": plan_id.map(|id| id.0),
                    "status": status,
                    "extractedData": extracted_data,
                    "interactiveSteps": steps,
                    "metrics": {
                        "totalDurationMs": metrics.total_duration_ms,
                        "averageProgressScore": metrics.average_progress_score,
                        "maxStepsReached": metrics.max_steps_reached,
                        "stagnationDetected": metrics.stagnation_detected,
                    },
                    "escalation": { "escalated": escalated, "reason": escalation_reason },
                }),
            )
        }
        OrchestratorOutcome::PlanOnly { plan_id, task_signature, plan, execution_time_ms, reasoning } => {
            let steps: Vec<Value> = plan
                .steps
                .iter()
                .map(|step| {
                    json!({
                        "id": step.id,
                        "type": step_type_label(&step.action),
                        "description": step.description,
                        "selector": step_selector(&step.action),
                    })
                })
                .collect();
            LambdaResponse::json(
                200,
                json!({
                    "success": true,
                    "mode": "plan_only",
                    "planId": plan_id.0,
                    "taskSignature": task_signature.0,
                    "planDetails": {
                        "steps": steps,
                        "estimatedDuration": plan.metadata.estimated_duration_ms,
                        "confidence": plan.metadata.confidence,
                        "reasoning": reasoning,
                    },
                    "executionTime": execution_time_ms,
                    "message": "plan generated and cached",
                }),
            )
        }
        OrchestratorOutcome::Execution { plan_id, execution_id, result, plan_generated, cache_hit } => {
            let status_code = status_code_for(&result.status);
            LambdaResponse::json(
                status_code,
                json!({
                    "success": result.is_success(),
                    "planId": plan_id.0,
                    "executionId": execution_id.0,
                    "status": result.status,
                    "extractedData": result.extracted_data,
                    "screenshots": result.screenshots.len(),
                    "metrics": {
                        "executionTimeMs": result.metrics.execution_time_ms,
                        "stepsCompleted": result.metrics.steps_completed,
                        "stepsTotal": result.metrics.steps_total,
                        "retryCount": result.metrics.retry_count,
                        "totalTime": result.metrics.execution_time_ms,
                        "planGenerated": plan_generated,
                        "cacheHit": cache_hit,
                    },
                    "logs": result.logs,
                    "error": result.error,
                }),
            )
        }
    }
}

/// §6's status-code table for the outcome statuses this crate actually
/// produces (validation/plan-not-found/plan-generation failures are raised
/// as `WebWatchError`s and handled by `error_response` instead).
fn status_code_for(status: &webwatch_core_types::ExecutionStatus) -> u16 {
    use webwatch_core_types::ExecutionStatus::*;
    match status {
        Success | Failed => 200,
        Timeout => 408,
        Error => 500,
    }
}

fn step_type_label(action: &webwatch_core_types::StepAction) -> &'static str {
    use webwatch_core_types::StepAction::*;
    match action {
        Navigate { .. } => "navigate",
        Click { .. } => "click",
        Type { .. } => "type",
        Select { .. } => "select",
        Hover { .. } => "hover",
        KeyPress { .. } => "keyPress",
        Scroll { .. } => "scroll",
        Wait { .. } => "wait",
        WaitForSelector { .. } => "waitForSelector",
        Extract { .. } => "extract",
        Evaluate { .. } => "evaluate",
        Screenshot { .. } => "screenshot",
        Reload => "reload",
        GoBack => "goBack",
        GoForward => "goForward",
    }
}

fn step_selector(action: &webwatch_core_types::StepAction) -> Option<&str> {
    use webwatch_core_types::StepAction::*;
    match action {
        Click { selector } | Hover { selector } | WaitForSelector { selector, .. } => Some(selector),
        Type { selector, .. } | Select { selector, .. } => Some(selector),
        Extract { selector, .. } => Some(selector),
        _ => None,
    }
}
