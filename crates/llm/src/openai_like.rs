use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::json;
use tracing::warn;
use webwatch_core_types::WebWatchError;

use crate::{
    family_a_supports_json_mode, ChatMessage, CompletionOptions, CompletionResponse, LLMClient,
    Role, StreamChunk, Usage,
};

#[derive(Clone, Debug)]
pub struct OpenAiLikeConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl Default for OpenAiLikeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gpt-4o".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

pub struct OpenAiLikeClient {
    config: OpenAiLikeConfig,
    http: reqwest::Client,
}

impl OpenAiLikeClient {
    pub fn new(config: OpenAiLikeConfig) -> Self {
        Self { config, http: reqwest::Client::new() }
    }

    fn render_messages(messages: &[ChatMessage]) -> Vec<serde_json::Value> {
        messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                json!({ "role": role, "content": m.content })
            })
            .collect()
    }
}

#[async_trait]
impl LLMClient for OpenAiLikeClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<CompletionResponse, WebWatchError> {
        let mut body = json!({
            "model": self.config.model,
            "messages": Self::render_messages(messages),
            "temperature": options.temperature.unwrap_or(0.7),
        });
        if let Some(max_tokens) = options.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if options.json_mode {
            if family_a_supports_json_mode(&self.config.model) {
                body["response_format"] = json!({ "type": "json_object" });
            } else {
                warn!(model = %self.config.model, "model does not support strict JSON mode, relying on prompt instruction");
            }
        }

        let timeout = Duration::from_millis(options.timeout_ms.unwrap_or(30_000));
        let response = self
            .http
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
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
            return Err(WebWatchError::internal(format!("openai-like API error {status}: {text}")));
        }

        let parsed: serde_json::Value = response.json().await.map_err(classify_transport_error)?;
        parse_openai_response(parsed, &self.config.model)
    }

    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<BoxStream<'static, Result<StreamChunk, WebWatchError>>, WebWatchError> {
        // Streaming restarts the whole request on retry; for this crate's
        // purposes we fetch the full completion and replay it as one chunk,
        // keeping the public stream contract without a partial-SSE parser.
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
            .get(format!("{}/models", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
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

fn parse_openai_response(value: serde_json::Value, model: &str) -> Result<CompletionResponse, WebWatchError> {
    let content = value["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| WebWatchError::internal("missing choices[0].message.content"))?
        .to_string();
    let finish_reason = value["choices"][0]["finish_reason"].as_str().unwrap_or("stop").to_string();
    let usage = Usage {
        prompt_tokens: value["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        completion_tokens: value["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
        total_tokens: value["usage"]["total_tokens"].as_u64().unwrap_or(0) as u32,
    };
    Ok(CompletionResponse {
        content,
        usage,
        model: value["model"].as_str().unwrap_or(model).to_string(),
        finish_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_response() {
        let body = json!({
            "model": "gpt-4o",
            "choices": [{"message": {"content": "{\"ok\":true}"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15},
        });
        let parsed = parse_openai_response(body, "gpt-4o").unwrap();
        assert_eq!(parsed.content, "{\"ok\":true}");
        assert_eq!(parsed.usage.total_tokens, 15);
    }
}
