//! LLMClient abstraction (§4.2): one capability set, two real backends
//! ("family-A" openai-like, "family-B" anthropic-like), and a deterministic
//! mock for offline tests. Grounded on the teacher's `agent_core::LlmProvider`
//! trait shape (`crates/agent-core/src/llm_provider.rs`), generalized from
//! that crate's plan/replan/decide split to the flatter chat-completion
//! contract this spec calls for.

mod anthropic_like;
mod cost;
mod mock;
mod openai_like;

pub use anthropic_like::AnthropicLikeClient;
pub use cost::estimate_cost;
pub use mock::MockLlmClient;
pub use openai_like::OpenAiLikeClient;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use webwatch_core_types::WebWatchError;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

#[derive(Clone, Debug, Default)]
pub struct CompletionOptions {
    pub json_mode: bool,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: Usage,
    pub model: String,
    pub finish_reason: String,
}

#[derive(Clone, Debug)]
pub struct StreamChunk {
    pub chunk_content: String,
    pub cumulative_content: String,
    pub usage: Option<Usage>,
    pub is_complete: bool,
}

/// §4.2 contract. Streaming is modeled as a restartable-only stream: callers
/// who need to retry reissue the whole request rather than resuming mid-way.
#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<CompletionResponse, WebWatchError>;

    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<BoxStream<'static, Result<StreamChunk, WebWatchError>>, WebWatchError>;

    fn estimate_cost(&self, prompt_tokens: u32, completion_tokens: u32) -> f64;

    async fn test_connection(&self) -> bool;
}

/// Family-A JSON-mode support is model-specific: only models whose name
/// contains "turbo", ends with "o", or contains "3.5" accept the strict JSON
/// response format (§4.2 policy).
pub fn family_a_supports_json_mode(model: &str) -> bool {
    let lowered = model.to_lowercase();
    lowered.contains("turbo") || lowered.ends_with('o') || lowered.contains("3.5")
}

/// Family-B has no native JSON mode; the instruction is appended to the
/// rendered prompt instead and the response is parsed defensively.
pub fn append_json_instruction(mut messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    if let Some(last) = messages.last_mut() {
        if last.role == Role::User {
            last.content.push_str("\n\nRespond with JSON only, no prose.");
            return messages;
        }
    }
    messages.push(ChatMessage::user("Respond with JSON only, no prose."));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_mode_detection_matches_policy() {
        assert!(family_a_supports_json_mode("gpt-3.5-turbo"));
        assert!(family_a_supports_json_mode("gpt-4-turbo"));
        assert!(!family_a_supports_json_mode("gpt-4"));
    }

    #[test]
    fn json_instruction_is_appended_to_last_user_turn() {
        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("hi")];
        let appended = append_json_instruction(messages);
        assert!(appended.last().unwrap().content.contains("JSON only"));
    }
}
