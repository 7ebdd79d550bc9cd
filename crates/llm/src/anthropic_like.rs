use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::json;
use webwatch_core_types::WebWatchError;

use crate::{
    append_json_instruction, ChatMessage, CompletionOptions, CompletionResponse, LLMClient, Role,
    StreamChunk, Usage,
};

#[derive(Clone, Debug)]
pub struct AnthropicLikeConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub api_version: String,
}

impl Default for AnthropicLikeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "claude-3-sonnet-20240229".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            api_version: "2023-06-01".to_string(),
        }
    }
}

pub struct AnthropicLikeClient {
    config: AnthropicLikeConfig,
    http: reqwest::Client,
}

impl AnthropicLikeClient {
    pub fn new(config: AnthropicLikeConfig) -> Self {
        Self { config, http: reqwest::Client::new() }
    }

    /// Family-B has no system-role slot in the message array; system turns
    /// are concatenated and promoted to the request's top-level `system`
    /// field (§4.2 policy).
    fn split_system_and_turns(messages: &[ChatMessage]) -> (Option<String>, Vec<serde_json::Value>) {
        let mut system_parts = Vec::new();
        let mut turns = Vec::new();
        for message in messages {
            match message.role {
                Role::System => system_parts.push(message.content.clone()),
                Role::User => turns.push(json!({ "role": "user", "content": message.content })),
                Role::Assistant => turns.push(json!({ "role": "assistant", "content": message.content })),
            }
        }
        let system = if system_parts.is_empty() { None } else { Some(system_parts.join("\n\n")) };
        (system, turns)
    }
}

#[async_trait]
impl LLMClient for AnthropicLikeClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<CompletionResponse, WebWatchError> {
        let messages = if options.json_mode {
            append_json_instruction(messages.to_vec())
        } else {
            messages.to_vec()
        };
        let (system, turns) = Self::split_system_and_turns(&messages);

        let mut body = json!({
            "model": self.config.model,
            "messages": turns,
            "max_tokens": options.max_tokens.unwrap_or(4096),
            "temperature": options.temperature.unwrap_or(0.7),
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }

        let timeout = Duration::from_millis(options.timeout_ms.unwrap_or(30_000));
        let response = self
            .http
            .post(format!("{}/v1/messages", self.config.base_url))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", &self.config.api_version)
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify_transport_error)?;

        if response.status() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(WebWatchError::RateLimited { retry_after_seconds: retry_after, details: None });
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(WebWatchError::internal(format!("anthropic-like API error {status}: {text}")));
        }

        let parsed: serde_json::Value = response.json().await.map_err(classify_transport_error)?;
        parse_anthropic_response(parsed, &self.config.model)
    }

    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<BoxStream<'static, Result<StreamChunk, WebWatchError>>, WebWatchError> {
        let response = self.complete(messages, options).await?;
        let chunk = StreamChunk {
            chunk_content: response.content.clone(),
            cumulative_content: response.content,
            usage: Some(response.usage),
            is_complete: true,
        };
        Ok(stream::once(async move { Ok(chunk) }).boxed())
    }

    fn estimate_cost(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        crate::estimate_cost(&self.config.model, prompt_tokens, completion_tokens)
    }

    async fn test_connection(&self) -> bool {
        self.http
            .post(format!("{}/v1/messages", self.config.base_url))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", &self.config.api_version)
            .json(&json!({"model": self.config.model, "max_tokens": 1, "messages": [{"role":"user","content":"ping"}]}))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success() || r.status() == 400)
            .unwrap_or(false)
    }
}

fn classify_transport_error(err: reqwest::Error) -> WebWatchError {
    if err.is_timeout() {
        WebWatchError::TransportTimeout { message: err.to_string(), details: None }
    } else {
        WebWatchError::internal(err.to_string())
    }
}

fn parse_anthropic_response(value: serde_json::Value, model: &str) -> Result<CompletionResponse, WebWatchError> {
    let content = value["content"][0]["text"]
        .as_str()
        .ok_or_else(|| WebWatchError::internal("missing content[0].text"))?
        .to_string();
    let usage = Usage {
        prompt_tokens: value["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32,
        completion_tokens: value["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32,
        total_tokens: (value["usage"]["input_tokens"].as_u64().unwrap_or(0)
            + value["usage"]["output_tokens"].as_u64().unwrap_or(0)) as u32,
    };
    Ok(CompletionResponse {
        content,
        usage,
        model: value["model"].as_str().unwrap_or(model).to_string(),
        finish_reason: value["stop_reason"].as_str().unwrap_or("end_turn").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_turns_are_promoted_and_removed_from_the_array() {
        let messages = vec![
            ChatMessage::system("be terse"),
            ChatMessage::system("answer in json"),
            ChatMessage::user("hello"),
        ];
        let (system, turns) = AnthropicLikeClient::split_system_and_turns(&messages);
        assert_eq!(system.as_deref(), Some("be terse\n\nanswer in json"));
        assert_eq!(turns.len(), 1);
    }

    #[test]
    fn parses_a_well_formed_response() {
        let body = json!({
            "model": "claude-3-sonnet-20240229",
            "content": [{"type": "text", "text": "{\"ok\":true}"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 5},
        });
        let parsed = parse_anthropic_response(body, "claude-3-sonnet-20240229").unwrap();
        assert_eq!(parsed.content, "{\"ok\":true}");
        assert_eq!(parsed.usage.total_tokens, 15);
    }
}
