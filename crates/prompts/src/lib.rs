//! PromptStore (§4.3): loads and interpolates the three prompt templates.
//!
//! Grounded on the teacher's `agent_core::agent_loop::prompt`/`state_formatter`
//! modules, which hand-assemble prompt text with plain string building rather
//! than a templating crate — this crate keeps that idiom but factors the
//! substitution step out into `template::render` since this spec needs the
//! same `{{var}}`/`{{#if}}` substitution in three different templates.

mod template;

use std::path::Path;

use serde_json::Value;
use tracing::warn;
use webwatch_core_types::WebWatchError;

const DEFAULT_SYSTEM: &str = include_str!("../templates/system.txt");
const DEFAULT_USER_PLAN: &str = include_str!("../templates/user_plan.txt");
const DEFAULT_INTERACTIVE_STEP: &str = include_str!("../templates/interactive_step.txt");

const INTERACTIVE_DOM_TRUNCATE_CHARS: usize = 4_000;
const MAX_INSTRUCTION_CHARS: usize = 2_000;

#[derive(Clone, Debug)]
pub struct PromptStore {
    system: String,
    user_plan: String,
    interactive_step: String,
}

impl Default for PromptStore {
    fn default() -> Self {
        Self {
            system: DEFAULT_SYSTEM.to_string(),
            user_plan: DEFAULT_USER_PLAN.to_string(),
            interactive_step: DEFAULT_INTERACTIVE_STEP.to_string(),
        }
    }
}

impl PromptStore {
    /// Loads overrides from a directory containing `system.txt`,
    /// `user_plan.txt`, `interactive_step.txt`. A missing or unreadable file
    /// falls back to the built-in default and logs a warning (§4.3).
    pub fn load_with_overrides(dir: Option<&Path>) -> Self {
        let mut store = Self::default();
        let Some(dir) = dir else { return store };
        store.system = read_override(dir, "system.txt").unwrap_or(store.system);
        store.user_plan = read_override(dir, "user_plan.txt").unwrap_or(store.user_plan);
        store.interactive_step = read_override(dir, "interactive_step.txt").unwrap_or(store.interactive_step);
        store
    }

    pub fn validate_request(&self, instruction: &str, url: &str) -> Result<(), WebWatchError> {
        if instruction.trim().is_empty() {
            return Err(WebWatchError::validation("instruction must not be empty"));
        }
        if instruction.chars().count() > MAX_INSTRUCTION_CHARS {
            return Err(WebWatchError::validation("instruction exceeds the configured length budget"));
        }
        let parsed = url::Url::parse(url).map_err(|_| WebWatchError::validation("url is not a valid URL"))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(WebWatchError::validation("url must use http or https"));
        }
        Ok(())
    }

    pub fn system_prompt(&self) -> String {
        self.system.clone()
    }

    pub fn plan_prompt(&self, instruction: &str, url: &str, page_text: Option<&str>) -> String {
        let vars = serde_json::json!({
            "instruction": instruction,
            "url": url,
            "pageText": page_text,
        });
        template::render(&self.user_plan, &vars)
    }

    pub fn interactive_step_prompt(
        &self,
        instruction: &str,
        state_url: &str,
        state_dom: &str,
        has_screenshot: bool,
        history: &str,
    ) -> String {
        let truncated_dom = truncate_chars(state_dom, INTERACTIVE_DOM_TRUNCATE_CHARS);
        let vars = serde_json::json!({
            "instruction": instruction,
            "history": history,
            "state": {
                "url": state_url,
                "dom": truncated_dom,
                "screenshot": has_screenshot,
            },
        });
        template::render(&self.interactive_step, &vars)
    }
}

fn read_override(dir: &Path, name: &str) -> Option<String> {
    match std::fs::read_to_string(dir.join(name)) {
        Ok(content) => Some(content),
        Err(err) => {
            warn!(template = name, error = %err, "prompt override unreadable, using built-in default");
            None
        }
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.chars().take(max_chars).collect()
}

/// Summarizes a previous interactive step for inclusion in the next prompt,
/// e.g. `"Step 2: click .add-to-cart – Progress: 0.40 – reasoning text"`
/// (§4.6).
pub fn summarize_step(step_number: u32, action_label: &str, progress_score: f32, reasoning: &str) -> String {
    format!("Step {step_number}: {action_label} – Progress: {progress_score:.2} – {reasoning}")
}

pub fn render_value(template: &str, vars: &Value) -> String {
    template::render(template, vars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_instruction() {
        let store = PromptStore::default();
        assert!(store.validate_request("  ", "https://example.com").is_err());
    }

    #[test]
    fn rejects_non_http_url() {
        let store = PromptStore::default();
        assert!(store.validate_request("do a thing", "ftp://example.com").is_err());
    }

    #[test]
    fn interactive_dom_is_truncated() {
        let store = PromptStore::default();
        let long_dom = "x".repeat(10_000);
        let rendered = store.interactive_step_prompt("get price", "https://x.test", &long_dom, true, "");
        assert!(rendered.len() < 10_000);
    }

    #[test]
    fn step_summary_matches_expected_shape() {
        let summary = summarize_step(2, "click .add-to-cart", 0.4, "clicked the button");
        assert_eq!(summary, "Step 2: click .add-to-cart – Progress: 0.40 – clicked the button");
    }
}
