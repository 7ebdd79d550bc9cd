use serde::{Deserialize, Serialize};

/// One unit of browser action (§3 "Step").
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StepAction {
    Navigate { url: String },
    Click { selector: String },
    Type { selector: String, value: String },
    Select { selector: String, value: String },
    Hover { selector: String },
    KeyPress { key: String },
    Scroll {
        #[serde(default)]
        x: Option<i64>,
        #[serde(default)]
        y: Option<i64>,
        #[serde(default)]
        direction: Option<String>,
    },
    Wait { ms: u64 },
    WaitForSelector {
        selector: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
        #[serde(default)]
        state: Option<WaitForState>,
    },
    Extract {
        selector: String,
        #[serde(default)]
        multiple: bool,
        #[serde(default)]
        attribute: Option<String>,
        #[serde(default)]
        kind: Option<ExtractKind>,
    },
    Evaluate { script: String },
    Screenshot {
        #[serde(default)]
        full_page: bool,
    },
    Reload,
    GoBack,
    GoForward,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WaitForState {
    Attached,
    Visible,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExtractKind {
    Text,
    Html,
    Value,
    Attribute,
}

impl Default for ExtractKind {
    fn default() -> Self {
        ExtractKind::Text
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub description: String,
    pub action: StepAction,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub retries: Option<u32>,
    /// A boolean expression evaluated in page context; a falsy result skips
    /// (not fails) the step.
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub wait_after_ms: Option<u64>,
}

impl Step {
    pub fn max_retries(&self, plan_default: u32) -> u32 {
        self.retries.unwrap_or(plan_default)
    }
}

/// Outcome of a single `Step` execution, independent of plan-level status.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step_id: String,
    pub success: bool,
    pub skipped: bool,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub duration_ms: u64,
    pub attempts: u32,
}

impl StepOutcome {
    pub fn ok(step_id: &str, result: Option<serde_json::Value>, duration_ms: u64, attempts: u32) -> Self {
        Self {
            step_id: step_id.to_string(),
            success: true,
            skipped: false,
            result,
            error: None,
            duration_ms,
            attempts,
        }
    }

    pub fn skipped(step_id: &str) -> Self {
        Self {
            step_id: step_id.to_string(),
            success: true,
            skipped: true,
            result: None,
            error: None,
            duration_ms: 0,
            attempts: 0,
        }
    }

    pub fn failed(step_id: &str, error: impl Into<String>, duration_ms: u64, attempts: u32) -> Self {
        Self {
            step_id: step_id.to_string(),
            success: false,
            skipped: false,
            result: None,
            error: Some(error.into()),
            duration_ms,
            attempts,
        }
    }
}
