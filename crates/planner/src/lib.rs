//! PlanGenerator (§4.4): one-shot generation of a complete step sequence
//! from (instruction, url, optional page text), with a separate validation
//! pass. Grounded on the teacher's `agent_core::planner::rule_based` (plan
//! assembly) and `plan_validator` (post-hoc validation as its own pass).

mod scaffold;
mod validator;

pub use validator::estimated_duration_ms;

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;
use webwatch_core_types::{Plan, PlanErrorHandling, PlanMetadata, PlanValidation, TaskSignature, WebWatchError};
use webwatch_llm::{ChatMessage, CompletionOptions, LLMClient};
use webwatch_prompts::PromptStore;

use scaffold::parse_raw_plan;
use validator::validate_and_normalize;

pub struct GeneratedPlan {
    pub plan: Option<Plan>,
    pub confidence: f32,
    pub reasoning: String,
    pub error: Option<String>,
    pub warnings: Vec<String>,
}

pub struct PlanGenerator {
    prompts: PromptStore,
}

impl Default for PlanGenerator {
    fn default() -> Self {
        Self { prompts: PromptStore::default() }
    }
}

impl PlanGenerator {
    pub fn new(prompts: PromptStore) -> Self {
        Self { prompts }
    }

    pub async fn generate_plan(
        &self,
        llm: &dyn LLMClient,
        instruction: &str,
        url: &str,
        page_text: Option<&str>,
    ) -> GeneratedPlan {
        if let Err(e) = self.prompts.validate_request(instruction, url) {
            return GeneratedPlan { plan: None, confidence: 0.0, reasoning: String::new(), error: Some(e.to_string()), warnings: vec![] };
        }

        let messages = vec![
            ChatMessage::system(self.prompts.system_prompt()),
            ChatMessage::user(self.prompts.plan_prompt(instruction, url, page_text)),
        ];
        let options = CompletionOptions { json_mode: true, temperature: Some(0.1), ..Default::default() };

        let response = match llm.complete(&messages, &options).await {
            Ok(r) => r,
            Err(e) => {
                return GeneratedPlan {
                    plan: None,
                    confidence: 0.0,
                    reasoning: String::new(),
                    error: Some(e.to_string()),
                    warnings: vec![],
                }
            }
        };

        self.finalize(&response.content, response.model, instruction, url)
    }

    /// Tries a second client when the first fails or scores low confidence,
    /// keeping whichever result has the higher confidence (§4.4).
    pub async fn generate_plan_with_fallback(
        &self,
        primary: &dyn LLMClient,
        fallback: Option<Arc<dyn LLMClient>>,
        instruction: &str,
        url: &str,
        page_text: Option<&str>,
    ) -> GeneratedPlan {
        let primary_result = self.generate_plan(primary, instruction, url, page_text).await;
        let needs_fallback = primary_result.plan.is_none() || primary_result.confidence < 0.5;
        let Some(fallback) = fallback.filter(|_| needs_fallback) else {
            return primary_result;
        };

        warn!(confidence = primary_result.confidence, "primary plan generation weak, trying fallback");
        let fallback_result = self.generate_plan(fallback.as_ref(), instruction, url, page_text).await;
        if fallback_result.confidence > primary_result.confidence {
            fallback_result
        } else {
            primary_result
        }
    }

    fn finalize(&self, content: &str, model_id: String, instruction: &str, url: &str) -> GeneratedPlan {
        let raw = match parse_raw_plan(content) {
            Ok(raw) => raw,
            Err(e) => {
                return GeneratedPlan {
                    plan: None,
                    confidence: 0.0,
                    reasoning: String::new(),
                    error: Some(format!("validation: could not parse plan JSON: {e}")),
                    warnings: vec![],
                }
            }
        };

        let reasoning = raw.reasoning.clone().unwrap_or_default();
        let confidence = raw.confidence.unwrap_or(0.0).clamp(0.0, 1.0);

        let (steps, warnings) = match validate_and_normalize(&raw, url) {
            Ok(ok) => ok,
            Err(e) => {
                return GeneratedPlan {
                    plan: None,
                    confidence,
                    reasoning,
                    error: Some(format!("validation: {e}")),
                    warnings: vec![],
                }
            }
        };

        let estimated_duration_ms = estimated_duration_ms(&steps);
        let plan = Plan {
            id: webwatch_core_types::PlanId::new(),
            task_signature: TaskSignature::compute(instruction, url),
            instruction: instruction.to_string(),
            url: url.to_string(),
            steps,
            expected_results: vec![],
            error_handling: PlanErrorHandling { retry_count: 3, timeout_ms: 30_000, fallback_steps: None },
            validation: PlanValidation {
                success_criteria: raw.success_criteria,
                failure_criteria: raw.failure_criteria,
            },
            metadata: PlanMetadata { created_at: Utc::now(), model_id, confidence, estimated_duration_ms },
        };

        GeneratedPlan { plan: Some(plan), confidence, reasoning, error: None, warnings }
    }
}

pub fn validation_error(message: impl Into<String>) -> WebWatchError {
    WebWatchError::plan_generation(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use webwatch_llm::MockLlmClient;

    #[tokio::test]
    async fn generates_a_valid_plan_from_mock_llm() {
        let generator = PlanGenerator::default();
        let llm = MockLlmClient::with_response(
            r#"{"steps":[{"id":"s1","type":"navigate"},{"id":"s2","type":"extract","selector":".title"}],
                "successCriteria":["document.title.length > 0"],"failureCriteria":[],
                "confidence":0.9,"reasoning":"simple extraction"}"#,
        );
        let result = generator.generate_plan(&llm, "get the title", "https://example.com", None).await;
        assert!(result.error.is_none());
        let plan = result.plan.unwrap();
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.metadata.confidence, 0.9);
    }

    #[tokio::test]
    async fn invalid_instruction_short_circuits_before_calling_the_llm() {
        let generator = PlanGenerator::default();
        let llm = MockLlmClient::default();
        let result = generator.generate_plan(&llm, "", "https://example.com", None).await;
        assert!(result.plan.is_none());
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn malformed_json_yields_validation_error() {
        let generator = PlanGenerator::default();
        let llm = MockLlmClient::with_response("not json");
        let result = generator.generate_plan(&llm, "get the title", "https://example.com", None).await;
        assert!(result.plan.is_none());
        assert!(result.error.unwrap().contains("validation"));
    }
}
