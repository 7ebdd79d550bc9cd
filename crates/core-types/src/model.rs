//! The data model shared by every component (§3): task input/output shapes,
//! the `Plan`, cache bookkeeping, and the monitoring history.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::plan::Step;
use crate::{ExecutionId, PlanId, TaskId};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Plan,
    Interactive,
    Auto,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::Interactive
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self { width: 1280, height: 800 }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOptions {
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default)]
    pub plan_only: bool,
    #[serde(default)]
    pub execution_only: bool,
    #[serde(default)]
    pub plan_id: Option<PlanId>,
    #[serde(default)]
    pub force_new_plan: bool,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub screenshot_enabled: bool,
    #[serde(default)]
    pub viewport: Option<Viewport>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInput {
    pub instruction: String,
    pub url: String,
    #[serde(default)]
    pub task_id: Option<TaskId>,
    #[serde(default)]
    pub options: TaskOptions,
}

/// Canonical fingerprint of `(instruction, url)`, per §3.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskSignature(pub String);

impl TaskSignature {
    pub fn compute(instruction: &str, url: &str) -> Self {
        let normalized_instruction = instruction
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let normalized_url = normalize_url(url);
        Self(format!("{}|{}", normalized_instruction, normalized_url))
    }
}

fn normalize_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(parsed) => {
            let scheme = parsed.scheme().to_lowercase();
            let host = parsed.host_str().unwrap_or("").to_lowercase();
            let mut path = parsed.path().to_string();
            if path.len() > 1 {
                path = path.trim_end_matches('/').to_string();
            }
            format!("{}://{}{}", scheme, host, path)
        }
        Err(_) => raw.trim().to_lowercase(),
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanErrorHandling {
    pub retry_count: u32,
    pub timeout_ms: u64,
    #[serde(default)]
    pub fallback_steps: Option<Vec<Step>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanValidation {
    #[serde(default)]
    pub success_criteria: Vec<String>,
    #[serde(default)]
    pub failure_criteria: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanMetadata {
    pub created_at: DateTime<Utc>,
    pub model_id: String,
    pub confidence: f32,
    pub estimated_duration_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: PlanId,
    pub task_signature: TaskSignature,
    pub instruction: String,
    pub url: String,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub expected_results: Vec<String>,
    pub error_handling: PlanErrorHandling,
    pub validation: PlanValidation,
    pub metadata: PlanMetadata,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failed,
    Timeout,
    Error,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetrics {
    pub execution_time_ms: u64,
    pub steps_completed: u32,
    pub steps_total: u32,
    pub retry_count: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionError {
    pub message: String,
    #[serde(default)]
    pub step: Option<String>,
    #[serde(default)]
    pub stack: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub plan_id: PlanId,
    #[serde(default)]
    pub task_id: Option<TaskId>,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub extracted_data: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub screenshots: Vec<String>,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub error: Option<ExecutionError>,
    pub metrics: ExecutionMetrics,
    pub created_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self.status, ExecutionStatus::Success)
    }

    /// Regeneration trigger (§4.7): case-insensitive substring match against
    /// a fixed vocabulary of selector/timeout failure signatures.
    pub fn looks_like_stale_selector(&self) -> bool {
        const NEEDLES: [&str; 8] = [
            "timeout",
            "selector",
            "element not found",
            "not visible",
            "waitforselector",
            "waitforelement",
            "locator",
            "exceeded",
        ];
        if !matches!(self.status, ExecutionStatus::Failed | ExecutionStatus::Error) {
            return false;
        }
        let mut haystacks = self.logs.join(" ").to_lowercase();
        if let Some(err) = &self.error {
            haystacks.push(' ');
            haystacks.push_str(&err.message.to_lowercase());
            if let Some(stack) = &err.stack {
                haystacks.push(' ');
                haystacks.push_str(&stack.to_lowercase());
            }
        }
        NEEDLES.iter().any(|needle| haystacks.contains(needle))
    }
}

/// A snapshot of `BrowserSession::capture_state` (§4.1), threaded through the
/// interactive loop and serialized into `InteractiveStep` (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserStateSnapshot {
    pub url: String,
    pub dom: String,
    #[serde(default)]
    pub screenshot: Option<String>,
    pub viewport: Viewport,
    pub captured_at: DateTime<Utc>,
    #[serde(default)]
    pub error: Option<String>,
}

/// One iteration of the interactive closed loop (§3 `InteractiveStep`, §4.6).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractiveStep {
    pub step_number: u32,
    pub browser_state: BrowserStateSnapshot,
    pub action: Step,
    pub execution_result: crate::plan::StepOutcome,
    pub progress_score: f32,
    pub is_complete: bool,
    pub reasoning: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub cache_key: String,
    pub plan_id: PlanId,
    pub hit_count: u64,
    pub last_used_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringSample {
    pub task_id: TaskId,
    pub url: String,
    pub extracted_data: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub execution_id: Option<ExecutionId>,
    pub captured_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub task_id: TaskId,
    #[serde(default)]
    pub execution_id: Option<ExecutionId>,
    pub changed_fields: Vec<String>,
    pub is_restock: bool,
    pub detected_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_signature_ignores_case_and_whitespace() {
        let a = TaskSignature::compute("  Get The Price  ", "https://Example.com/Shop/");
        let b = TaskSignature::compute("get the price", "https://example.com/Shop");
        assert_eq!(a, b);
    }

    #[test]
    fn task_signature_differs_on_instruction() {
        let a = TaskSignature::compute("get the price", "https://example.com");
        let b = TaskSignature::compute("get the title", "https://example.com");
        assert_ne!(a, b);
    }

    #[test]
    fn stale_selector_detection_is_case_insensitive() {
        let mut result = ExecutionResult {
            plan_id: PlanId::new(),
            task_id: None,
            status: ExecutionStatus::Failed,
            extracted_data: HashMap::new(),
            screenshots: vec![],
            logs: vec!["Selector .PRICE Not Found".to_string()],
            error: None,
            metrics: ExecutionMetrics::default(),
            created_at: Utc::now(),
        };
        assert!(result.looks_like_stale_selector());
        result.logs.clear();
        result.status = ExecutionStatus::Success;
        assert!(!result.looks_like_stale_selector());
    }
}
