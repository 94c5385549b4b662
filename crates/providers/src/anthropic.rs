//! Anthropic-native adapter.
//!
//! Implements the Anthropic Messages API, where system messages go in a
//! separate top-level `system` field.

use serde_json::Value;

use tg_domain::chat::{ChatMessage, Role};
use tg_domain::config::ProviderConfig;
use tg_domain::error::{Error, Result};

use crate::traits::{ChatRequest, ChatResponse, LlmProvider, Usage};
use crate::util::{from_reqwest, resolve_api_key};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    id: String,
    base_url: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn from_config(cfg: &ProviderConfig) -> Result<Self> {
        let api_key = resolve_api_key(cfg)?;
        let default_model = cfg
            .default_model
            .clone()
            .unwrap_or_else(|| "claude-sonnet-4-20250514".into());

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: cfg.id.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model,
            client,
        })
    }

    fn build_messages_body(&self, req: &ChatRequest) -> Value {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut api_messages: Vec<Value> = Vec::new();

        for msg in &req.messages {
            match msg.role {
                Role::System => system_parts.push(&msg.content),
                Role::User => api_messages.push(serde_json::json!({
                    "role": "user",
                    "content": msg.content,
                })),
                Role::Assistant => api_messages.push(serde_json::json!({
                    "role": "assistant",
                    "content": msg.content,
                })),
            }
        }

        let mut body = serde_json::json!({
            "model": req.model.clone().unwrap_or_else(|| self.default_model.clone()),
            "messages": api_messages,
            "max_tokens": req.max_tokens.unwrap_or(4096),
        });
        if !system_parts.is_empty() {
            body["system"] = Value::String(system_parts.join("\n\n"));
        }
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        body
    }
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/messages", self.base_url);
        let body = self.build_messages_body(&req);

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let raw: Value = resp.json().await.map_err(from_reqwest)?;

        if !status.is_success() {
            let message = raw
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(Error::Provider {
                provider: self.id.clone(),
                message: format!("HTTP {status}: {message}"),
            });
        }

        // Concatenate all text content blocks.
        let content = raw
            .get("content")
            .and_then(Value::as_array)
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(|b| {
                        if b.get("type").and_then(Value::as_str) == Some("text") {
                            b.get("text").and_then(Value::as_str)
                        } else {
                            None
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();
        let model = raw
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(&self.default_model)
            .to_string();
        let usage = raw.get("usage").map(|u| {
            let input = u.get("input_tokens").and_then(Value::as_u64).unwrap_or(0) as u32;
            let output = u.get("output_tokens").and_then(Value::as_u64).unwrap_or(0) as u32;
            Usage {
                prompt_tokens: input,
                completion_tokens: output,
                total_tokens: input + output,
            }
        });

        Ok(ChatResponse {
            content,
            usage,
            model,
        })
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}
