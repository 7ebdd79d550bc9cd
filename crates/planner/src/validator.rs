//! Plan validation (§4.4), split from generation as a separate pass —
//! grounded on the teacher's `agent_core::plan_validator::PlanValidator`,
//! which likewise validates a finished plan rather than inlining checks into
//! generation.

use webwatch_core_types::{ExtractKind, Step, StepAction, WaitForState};

use crate::scaffold::{RawPlan, RawStep};

pub struct ValidatedStep {
    pub step: Step,
    pub warnings: Vec<String>,
}

pub fn validate_and_normalize(raw: &RawPlan, default_url: &str) -> Result<(Vec<Step>, Vec<String>), String> {
    if raw.steps.is_empty() {
        return Err("plan has no steps".to_string());
    }
    let mut steps = Vec::with_capacity(raw.steps.len());
    let mut warnings = Vec::new();
    for (idx, raw_step) in raw.steps.iter().enumerate() {
        let validated = normalize_step(raw_step, idx, default_url)?;
        warnings.extend(validated.warnings);
        steps.push(validated.step);
    }
    Ok((steps, warnings))
}

fn normalize_step(raw: &RawStep, idx: usize, default_url: &str) -> Result<ValidatedStep, String> {
    let id = raw.id.clone().unwrap_or_else(|| format!("step-{}", idx + 1));
    let description = raw
        .description
        .clone()
        .unwrap_or_else(|| format!("{} step", raw.step_type));
    let mut warnings = Vec::new();

    let action = match raw.step_type.as_str() {
        "navigate" => StepAction::Navigate {
            url: raw.url.clone().unwrap_or_else(|| default_url.to_string()),
        },
        "click" => StepAction::Click {
            selector: require_selector(raw, "click")?,
        },
        "hover" => StepAction::Hover {
            selector: require_selector(raw, "hover")?,
        },
        "type" => StepAction::Type {
            selector: require_selector(raw, "type")?,
            value: require_value(raw, "type")?,
        },
        "select" => StepAction::Select {
            selector: require_selector(raw, "select")?,
            value: require_value(raw, "select")?,
        },
        "keyPress" => StepAction::KeyPress {
            key: raw.key.clone().ok_or_else(|| "keyPress requires key".to_string())?,
        },
        "scroll" => StepAction::Scroll { x: None, y: None, direction: raw.direction.clone() },
        "wait" => StepAction::Wait { ms: raw.wait_time.unwrap_or(1_000) },
        "waitForSelector" => StepAction::WaitForSelector {
            selector: require_selector(raw, "waitForSelector")?,
            timeout_ms: Some(raw.wait_time.unwrap_or(10_000)),
            state: Some(WaitForState::Attached),
        },
        "extract" => StepAction::Extract {
            selector: require_selector(raw, "extract")?,
            multiple: raw.multiple.unwrap_or(false),
            attribute: raw.attribute.clone(),
            kind: Some(parse_extract_kind(raw.kind.as_deref())),
        },
        "evaluate" => StepAction::Evaluate {
            script: raw.script.clone().ok_or_else(|| "evaluate requires script".to_string())?,
        },
        "screenshot" => StepAction::Screenshot { full_page: false },
        "reload" => StepAction::Reload,
        "goBack" => StepAction::GoBack,
        "goForward" => StepAction::GoForward,
        other => return Err(format!("unknown step type: {other}")),
    };

    if let Some(selector) = &raw.selector {
        if !looks_like_plausible_selector(selector) || looks_unusual(selector) {
            // Selector plausibility is a warning, not a rejection (§4.4, §9
            // open question: the source's selector regexes reject too much).
            warnings.push(format!("step {id}: selector '{selector}' looks unusual"));
        }
    }

    Ok(ValidatedStep {
        step: Step {
            id,
            description,
            action,
            optional: raw.optional.unwrap_or(false),
            retries: None,
            condition: raw.condition.clone(),
            wait_after_ms: None,
        },
        warnings,
    })
}

fn require_selector(raw: &RawStep, kind: &str) -> Result<String, String> {
    raw.selector.clone().ok_or_else(|| format!("{kind} requires a selector"))
}

fn require_value(raw: &RawStep, kind: &str) -> Result<String, String> {
    raw.value.clone().ok_or_else(|| format!("{kind} requires a value"))
}

fn parse_extract_kind(raw: Option<&str>) -> ExtractKind {
    match raw {
        Some("html") => ExtractKind::Html,
        Some("value") => ExtractKind::Value,
        Some("attribute") => ExtractKind::Attribute,
        _ => ExtractKind::Text,
    }
}

/// A loose plausibility check, not a strict grammar: rejects obviously broken
/// selectors (empty, unbalanced brackets) while tolerating anything a real
/// CSS engine would accept, including combinators like `.a.b:hover > #id`.
fn looks_like_plausible_selector(selector: &str) -> bool {
    if selector.trim().is_empty() {
        return false;
    }
    selector.chars().filter(|c| *c == '[').count() == selector.chars().filter(|c| *c == ']').count()
        && selector.chars().filter(|c| *c == '(').count() == selector.chars().filter(|c| *c == ')').count()
}

/// Flags combinators, pseudo-classes, and chained compound selectors (e.g.
/// `.class1.class2:hover > #id`) as unusual: a real CSS engine parses them
/// fine, but the common case this spec expects is a single class/id/tag
/// selector, so anything more elaborate is worth a warning.
fn looks_unusual(selector: &str) -> bool {
    selector.contains('>')
        || selector.contains(' ')
        || selector.contains(':')
        || selector.matches('.').count() > 1
        || selector.matches('#').count() > 1
}

pub fn estimated_duration_ms(steps: &[Step]) -> u64 {
    steps.iter().map(step_duration_estimate).sum()
}

fn step_duration_estimate(step: &Step) -> u64 {
    match &step.action {
        StepAction::Navigate { .. } => 3_000,
        StepAction::Wait { ms } => *ms,
        StepAction::WaitForSelector { timeout_ms, .. } => timeout_ms.unwrap_or(10_000).min(10_000),
        StepAction::Click { .. }
        | StepAction::Type { .. }
        | StepAction::Select { .. }
        | StepAction::Hover { .. }
        | StepAction::KeyPress { .. } => 500,
        StepAction::Extract { .. } | StepAction::Evaluate { .. } => 200,
        StepAction::Scroll { .. } | StepAction::Reload | StepAction::GoBack | StepAction::GoForward => 1_000,
        StepAction::Screenshot { .. } => 1_000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scaffold::RawPlan;

    fn raw_with(step_type: &str) -> RawPlan {
        RawPlan {
            steps: vec![RawStep {
                step_type: step_type.to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn navigate_without_url_inherits_plan_url() {
        let raw = raw_with("navigate");
        let (steps, _) = validate_and_normalize(&raw, "https://example.com").unwrap();
        match &steps[0].action {
            StepAction::Navigate { url } => assert_eq!(url, "https://example.com"),
            _ => panic!("wrong action"),
        }
    }

    #[test]
    fn click_without_selector_is_rejected() {
        let raw = raw_with("click");
        assert!(validate_and_normalize(&raw, "https://example.com").is_err());
    }

    #[test]
    fn empty_steps_is_rejected() {
        let raw = RawPlan::default();
        assert!(validate_and_normalize(&raw, "https://example.com").is_err());
    }

    #[test]
    fn wait_for_selector_defaults_timeout() {
        let mut raw = raw_with("waitForSelector");
        raw.steps[0].selector = Some(".price".to_string());
        let (steps, _) = validate_and_normalize(&raw, "https://example.com").unwrap();
        match &steps[0].action {
            StepAction::WaitForSelector { timeout_ms, .. } => assert_eq!(*timeout_ms, Some(10_000)),
            _ => panic!("wrong action"),
        }
    }

    #[test]
    fn unusual_selector_warns_but_does_not_reject() {
        let mut raw = raw_with("click");
        raw.steps[0].selector = Some(".class1.class2:hover > #id".to_string());
        let (_, warnings) = validate_and_normalize(&raw, "https://example.com").unwrap();
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn duration_estimate_sums_per_type_constants() {
        let raw = RawPlan {
            steps: vec![
                RawStep { step_type: "navigate".to_string(), ..Default::default() },
                RawStep { step_type: "click".to_string(), selector: Some(".a".into()), ..Default::default() },
            ],
            ..Default::default()
        };
        let (steps, _) = validate_and_normalize(&raw, "https://example.com").unwrap();
        assert_eq!(estimated_duration_ms(&steps), 3_500);
    }
}
