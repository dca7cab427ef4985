use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::llm::{
    error_for_status, model_or_default,
    models::{ChatOptions, ChatResponse, Message, Provider},
    LlmError, LlmProvider,
};

pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(client: Client, api_key: String, base_url: String) -> Self {
        Self {
            client,
            api_key,
            base_url,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn invoke(&self, messages: &[Message], options: ChatOptions) -> Result<ChatResponse, LlmError> {
        let model = model_or_default(&options, Provider::OpenAi);

        let mut body = json!({
            "model": model,
            "messages": messages,
        });
        if let Some(temperature) = options.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = options.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let json: serde_json::Value = error_for_status(Provider::OpenAi, response)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::InvalidResponse("missing choices[0].message.content".into()))?
            .to_string();

        let mut response_metadata = json!({});
        if let Some(usage) = json.get("usage") {
            response_metadata["token_usage"] = usage.clone();
        }

        Ok(ChatResponse {
            content,
            model: json["model"].as_str().unwrap_or(model).to_string(),
            response_metadata,
        })
    }
}
