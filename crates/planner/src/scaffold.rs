//! Loosely-typed JSON shape produced by the LLM before validation tightens it
//! into `webwatch_core_types::Plan`. Kept separate from the strict `Step`
//! tagged union because LLM output is never trusted as-is (§4.4).

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawStep {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub step_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub wait_time: Option<u64>,
    #[serde(default)]
    pub multiple: Option<bool>,
    #[serde(default)]
    pub attribute: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub optional: Option<bool>,
    #[serde(default)]
    pub condition: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawPlan {
    #[serde(default)]
    pub steps: Vec<RawStep>,
    #[serde(default)]
    pub success_criteria: Vec<String>,
    #[serde(default)]
    pub failure_criteria: Vec<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

pub fn parse_raw_plan(content: &str) -> Result<RawPlan, String> {
    let value: Value = serde_json::from_str(content.trim()).map_err(|e| e.to_string())?;
    serde_json::from_value(value).map_err(|e| e.to_string())
}
