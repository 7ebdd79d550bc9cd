//! Trace-to-Plan promotion (§4.6): turns a successful interactive run into a
//! replayable `Plan` so future invocations can skip the model entirely.

use chrono::Utc;
use webwatch_core_types::{
    InteractiveStep, Plan, PlanErrorHandling, PlanId, PlanMetadata, PlanValidation, Step,
    TaskSignature,
};

/// Promotes a completed, successful `InteractiveStep` trace into a `Plan`.
/// Ids are synthesized as `step-1..N`; success/failure criteria are generic
/// since the interactive loop has no notion of the author's original intent
/// beyond "it completed".
pub fn promote(trace: &[InteractiveStep], instruction: &str, url: &str, model_id: &str) -> Plan {
    let steps: Vec<Step> = trace
        .iter()
        .enumerate()
        .map(|(index, interactive_step)| {
            let mut step = interactive_step.action.clone();
            step.id = format!("step-{}", index + 1);
            step
        })
        .collect();

    let estimated_duration_ms: u64 = trace.iter().map(|s| s.execution_result.duration_ms).sum();
    let confidence = trace.last().map(|s| s.progress_score).unwrap_or(0.0);

    Plan {
        id: PlanId::new(),
        task_signature: TaskSignature::compute(instruction, url),
        instruction: instruction.to_string(),
        url: url.to_string(),
        steps,
        expected_results: vec![],
        error_handling: PlanErrorHandling { retry_count: 3, timeout_ms: 30_000, fallback_steps: None },
        validation: PlanValidation {
            success_criteria: vec!["All steps executed successfully".to_string()],
            failure_criteria: vec!["Any step failed with error".to_string()],
        },
        metadata: PlanMetadata {
            created_at: Utc::now(),
            model_id: model_id.to_string(),
            confidence,
            estimated_duration_ms,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webwatch_core_types::{BrowserStateSnapshot, StepAction, StepOutcome, Viewport};

    fn step(step_number: u32, progress_score: f32) -> InteractiveStep {
        InteractiveStep {
            step_number,
            browser_state: BrowserStateSnapshot {
                url: "https://example.com".to_string(),
                dom: String::new(),
                screenshot: None,
                viewport: Viewport::default(),
                captured_at: Utc::now(),
                error: None,
            },
            action: Step {
                id: "scratch".to_string(),
                description: "navigate".to_string(),
                action: StepAction::Navigate { url: "https://example.com".to_string() },
                optional: false,
                retries: None,
                condition: None,
                wait_after_ms: None,
            },
            execution_result: StepOutcome::ok("scratch", None, 500, 1),
            progress_score,
            is_complete: false,
            reasoning: "moved along".to_string(),
        }
    }

    #[test]
    fn ids_are_reassigned_sequentially() {
        let trace = vec![step(1, 0.3), step(2, 0.9)];
        let plan = promote(&trace, "get the price", "https://example.com", "mock");
        assert_eq!(plan.steps[0].id, "step-1");
        assert_eq!(plan.steps[1].id, "step-2");
    }

    #[test]
    fn confidence_is_the_last_steps_progress_score() {
        let trace = vec![step(1, 0.3), step(2, 0.95)];
        let plan = promote(&trace, "get the price", "https://example.com", "mock");
        assert_eq!(plan.metadata.confidence, 0.95);
    }

    #[test]
    fn duration_is_summed_across_steps() {
        let trace = vec![step(1, 0.3), step(2, 0.95)];
        let plan = promote(&trace, "get the price", "https://example.com", "mock");
        assert_eq!(plan.metadata.estimated_duration_ms, 1000);
    }
}
