use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::llm::{
    error_for_status, model_or_default,
    models::{ChatOptions, ChatResponse, Message, Provider, Role},
    LlmError, LlmProvider,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(client: Client, api_key: String, base_url: String) -> Self {
        Self {
            client,
            api_key,
            base_url,
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn invoke(&self, messages: &[Message], options: ChatOptions) -> Result<ChatResponse, LlmError> {
        let model = model_or_default(&options, Provider::Anthropic);

        // System prompts travel in a dedicated field; `messages` holds user/assistant turns only
        let mut system = String::new();
        let turns: Vec<&Message> = messages
            .iter()
            .filter(|m| {
                if m.role == Role::System {
                    system.push_str(&m.content);
                    system.push('\n');
                    false
                } else {
                    true
                }
            })
            .collect();

        let mut body = json!({
            "model": model,
            "messages": turns,
            "max_tokens": options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });
        if !system.trim().is_empty() {
            body["system"] = json!(system.trim());
        }
        if let Some(temperature) = options.temperature {
            body["temperature"] = json!(temperature);
        }

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let json: serde_json::Value = error_for_status(Provider::Anthropic, response)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let content = json["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(|b| b["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|text| !text.is_empty())
            .ok_or_else(|| LlmError::InvalidResponse("missing content text blocks".into()))?;

        let mut response_metadata = json!({});
        if let Some(usage) = json.get("usage") {
            response_metadata["usage"] = usage.clone();
        }

        Ok(ChatResponse {
            content,
            model: json["model"].as_str().unwrap_or(model).to_string(),
            response_metadata,
        })
    }
}
