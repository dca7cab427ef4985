pub mod anthropic;
pub mod google;
pub mod models;
pub mod openai;
pub mod registry;

use anthropic::AnthropicProvider;
use google::GoogleProvider;
use openai::OpenAiProvider;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::config::LlmConfig;
use models::{ChatOptions, ChatResponse, Message, Provider};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Network Error: {0}")]
    Network(String),
    #[error("API Error: {0}")]
    Api(String),
    #[error("Invalid Response: {0}")]
    InvalidResponse(String),
    #[error("Rate Limited")]
    RateLimited,
}

/// One chat-completion capability per provider family.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Sends `messages` in order and returns the generated text together with
    /// the provider's usage report.
    async fn invoke(&self, messages: &[Message], options: ChatOptions) -> Result<ChatResponse, LlmError>;
}

/// Builds a provider client bound to one user's API key.
pub trait ProviderFactory: Send + Sync {
    fn create(&self, provider: Provider, api_key: String) -> Arc<dyn LlmProvider>;
}

pub struct HttpProviderFactory {
    config: LlmConfig,
    client: reqwest::Client,
}

impl HttpProviderFactory {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

impl ProviderFactory for HttpProviderFactory {
    fn create(&self, provider: Provider, api_key: String) -> Arc<dyn LlmProvider> {
        let base_url = self.config.endpoint(provider).api_base.clone();
        let client = self.client.clone();

        match provider {
            Provider::OpenAi => Arc::new(OpenAiProvider::new(client, api_key, base_url)),
            Provider::Anthropic => Arc::new(AnthropicProvider::new(client, api_key, base_url)),
            Provider::Google => Arc::new(GoogleProvider::new(client, api_key, base_url)),
        }
    }
}

pub(crate) fn model_or_default<'a>(options: &'a ChatOptions, provider: Provider) -> &'a str {
    options.model.as_deref().unwrap_or(provider.default_model())
}

pub(crate) async fn error_for_status(
    provider: Provider,
    response: reqwest::Response,
) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(LlmError::RateLimited);
    }
    Err(LlmError::Api(format!("{provider} error {status}: {text}")))
}
