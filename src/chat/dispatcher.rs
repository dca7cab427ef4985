use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::accounts::CredentialStore;
use crate::error::{AppError, Result};
use crate::llm::models::{ChatOptions, ChatResponse, Message, Provider, Role, UsageMetadata};
use crate::llm::ProviderFactory;

pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a helpful assistant.

Respond using clean, well-structured Markdown.

When providing code examples, code snippets, or any code-related content, always use fenced code blocks with triple backticks (```) and specify the programming language after the opening backticks.

Formatting rules:
- Use clear section headings (##, ###) when helpful
- Use bullet points for lists and numbered lists for step-by-step instructions
- Highlight important terms using bold
- Use blockquotes (>) for insights, notes, or warnings
- Use tables when comparing multiple items
- Do NOT use HTML
- Do NOT mention Markdown explicitly in the response

Content rules:
- Be clear, concise, and helpful
- If the question is ambiguous, make reasonable assumptions and proceed
- Prefer examples when explaining technical concepts"#;

/// Generated text plus the provider-reported token counts for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
}

pub struct ChatDispatcher {
    credentials: Arc<dyn CredentialStore>,
    factory: Arc<dyn ProviderFactory>,
    system_prompt: String,
}

impl ChatDispatcher {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        factory: Arc<dyn ProviderFactory>,
        system_prompt: Option<String>,
    ) -> Self {
        Self {
            credentials,
            factory,
            system_prompt: system_prompt.unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        }
    }

    /// Sends `messages` to `provider` with the user's own credential.
    ///
    /// The system prompt is prepended unless the caller already supplied a
    /// system message.
    pub async fn dispatch(
        &self,
        user_id: Uuid,
        provider: Provider,
        messages: Vec<Message>,
        model: &str,
    ) -> Result<Completion> {
        let mut messages = messages;
        if !messages.iter().any(|m| m.role == Role::System) {
            messages.insert(0, Message::system(self.system_prompt.clone()));
        }

        let response = self.invoke(user_id, provider, &messages, model).await?;
        let usage = response.usage();
        if usage == UsageMetadata::Unrecognized {
            warn!("{} response for {} carried no recognised usage report", provider, model);
        }
        let (input_tokens, output_tokens) = usage.token_counts();

        info!(
            "Dispatched {} message(s) to {}/{}: {} input, {} output tokens",
            messages.len(),
            provider,
            model,
            input_tokens,
            output_tokens
        );

        Ok(Completion {
            content: response.content,
            input_tokens,
            output_tokens,
        })
    }

    /// Sends `messages` verbatim, without the system prompt.
    pub async fn invoke(
        &self,
        user_id: Uuid,
        provider: Provider,
        messages: &[Message],
        model: &str,
    ) -> Result<ChatResponse> {
        let api_key = self.credentials.resolve(user_id, provider)?;
        let client = self.factory.create(provider, api_key);

        let options = ChatOptions {
            model: Some(model.to_string()),
            ..Default::default()
        };

        client.invoke(messages, options).await.map_err(|e| {
            error!("{} call for model {} failed: {}", provider, model, e);
            AppError::from(e)
        })
    }
}
