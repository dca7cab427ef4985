use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::llm::{
    error_for_status, model_or_default,
    models::{ChatOptions, ChatResponse, Message, Provider, Role},
    LlmError, LlmProvider,
};

pub struct GoogleProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GoogleProvider {
    pub fn new(client: Client, api_key: String, base_url: String) -> Self {
        Self {
            client,
            api_key,
            base_url,
        }
    }
}

fn to_contents(messages: &[Message]) -> (Vec<Value>, String) {
    let mut system = String::new();
    let mut contents = Vec::with_capacity(messages.len());

    for m in messages {
        let role = match m.role {
            Role::System => {
                system.push_str(&m.content);
                system.push('\n');
                continue;
            }
            Role::User => "user",
            Role::Assistant => "model",
        };
        contents.push(json!({"role": role, "parts": [{"text": m.content}]}));
    }

    (contents, system.trim().to_string())
}

#[async_trait]
impl LlmProvider for GoogleProvider {
    fn name(&self) -> &str {
        "google"
    }

    async fn invoke(&self, messages: &[Message], options: ChatOptions) -> Result<ChatResponse, LlmError> {
        let model = model_or_default(&options, Provider::Google);
        let (contents, system) = to_contents(messages);

        let mut body = json!({ "contents": contents });
        if !system.is_empty() {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }
        let mut generation_config = json!({});
        if let Some(temperature) = options.temperature {
            generation_config["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = options.max_tokens {
            generation_config["maxOutputTokens"] = json!(max_tokens);
        }
        body["generationConfig"] = generation_config;

        let response = self
            .client
            .post(format!("{}/v1beta/models/{}:generateContent", self.base_url, model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let json: Value = error_for_status(Provider::Google, response)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let content = json["candidates"][0]["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|text| !text.is_empty())
            .ok_or_else(|| LlmError::InvalidResponse("missing candidates[0].content.parts".into()))?;

        let mut response_metadata = json!({});
        if let Some(usage) = json.get("usageMetadata") {
            response_metadata["usage_metadata"] = json!({
                "prompt_token_count": usage.get("promptTokenCount").cloned().unwrap_or(json!(0)),
                "candidates_token_count": usage.get("candidatesTokenCount").cloned().unwrap_or(json!(0)),
            });
        }

        Ok(ChatResponse {
            content,
            model: model.to_string(),
            response_metadata,
        })
    }
}
