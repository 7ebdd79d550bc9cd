use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use webwatch_core_types::WebWatchError;

use crate::{ChatMessage, CompletionOptions, CompletionResponse, LLMClient, StreamChunk, Usage};

/// Deterministic client for offline tests, mirroring the teacher's
/// `MockLlmProvider` (`agent-core/src/llm_provider.rs`): it never touches the
/// network and derives its answer from the last user turn so tests can steer
/// it with plain string content.
#[derive(Clone, Debug, Default)]
pub struct MockLlmClient {
    pub canned_json: Option<String>,
}

impl MockLlmClient {
    pub fn with_response(body: impl Into<String>) -> Self {
        Self { canned_json: Some(body.into()) }
    }
}

#[async_trait]
impl LLMClient for MockLlmClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _options: &CompletionOptions,
    ) -> Result<CompletionResponse, WebWatchError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, crate::Role::User))
            .map(|m| m.content.clone())
            .unwrap_or_default();
        if last_user.trim().is_empty() {
            return Err(WebWatchError::validation("empty prompt"));
        }
        let content = self.canned_json.clone().unwrap_or_else(|| "{}".to_string());
        Ok(CompletionResponse {
            content,
            usage: Usage { prompt_tokens: 10, completion_tokens: 5, total_tokens: 15 },
            model: "mock".to_string(),
            finish_reason: "stop".to_string(),
        })
    }

    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<BoxStream<'static, Result<StreamChunk, WebWatchError>>, WebWatchError> {
        let response = self.complete(messages, options).await?;
        Ok(stream::once(async move {
            Ok(StreamChunk {
                chunk_content: response.content.clone(),
                cumulative_content: response.content,
                usage: Some(response.usage),
                is_complete: true,
            })
        })
        .boxed())
    }

    fn estimate_cost(&self, _prompt_tokens: u32, _completion_tokens: u32) -> f64 {
        0.0
    }

    async fn test_connection(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_empty_prompts() {
        let client = MockLlmClient::default();
        let result = client.complete(&[ChatMessage::user("  ")], &CompletionOptions::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn returns_the_canned_response() {
        let client = MockLlmClient::with_response("{\"steps\":[]}");
        let result = client.complete(&[ChatMessage::user("plan it")], &CompletionOptions::default()).await.unwrap();
        assert_eq!(result.content, "{\"steps\":[]}");
    }
}
