#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chatledger::accounts::ApiKeyUpdate;
use chatledger::config::{AppConfig, DatabaseConfig};
use chatledger::crypto::KeyCipher;
use chatledger::db::{get_connection, DbPool, User};
use chatledger::llm::models::{ChatOptions, ChatResponse, Message, Provider, Role};
use chatledger::llm::registry::ModelRegistry;
use chatledger::llm::{LlmError, LlmProvider, ProviderFactory};
use chatledger::state::Services;
use serde_json::json;

pub const TITLE: &str = "Scripted Title";

/// What the scripted provider answers to the next chat (non-title) call.
#[derive(Debug, Clone)]
pub enum Reply {
    Text { content: String, input: i64, output: i64 },
    /// Text with a usage report in none of the known shapes.
    UnknownUsage(String),
    Fail,
}

impl Reply {
    pub fn text(content: &str, input: i64, output: i64) -> Self {
        Reply::Text {
            content: content.to_string(),
            input,
            output,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Call {
    pub provider: Provider,
    pub api_key: String,
    pub model: Option<String>,
    pub messages: Vec<Message>,
}

type Hook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
pub struct Script {
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<Call>>,
    fail_titles: AtomicBool,
    before_next_chat: Mutex<Option<Hook>>,
}

impl Script {
    pub fn push(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// Makes every later title request fail with a rate limit.
    pub fn fail_titles(&self) {
        self.fail_titles.store(true, Ordering::SeqCst);
    }

    /// Runs `hook` while the next chat call is in flight.
    pub fn before_next_chat(&self, hook: impl FnOnce() + Send + 'static) {
        *self.before_next_chat.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls that carried a system prompt, i.e. real chat dispatches.
    pub fn chat_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.messages.iter().any(|m| m.role == Role::System))
            .collect()
    }
}

/// Usage reported in each provider's native shape.
fn usage_metadata(provider: Provider, input: i64, output: i64) -> serde_json::Value {
    match provider {
        Provider::OpenAi => json!({"token_usage": {"prompt_tokens": input, "completion_tokens": output}}),
        Provider::Anthropic => json!({"usage": {"input_tokens": input, "output_tokens": output}}),
        Provider::Google => json!({"usage_metadata": {"prompt_token_count": input, "candidates_token_count": output}}),
    }
}

struct ScriptedProvider {
    provider: Provider,
    api_key: String,
    script: Arc<Script>,
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        self.provider.as_str()
    }

    async fn invoke(&self, messages: &[Message], options: ChatOptions) -> Result<ChatResponse, LlmError> {
        self.script.calls.lock().unwrap().push(Call {
            provider: self.provider,
            api_key: self.api_key.clone(),
            model: options.model.clone(),
            messages: messages.to_vec(),
        });

        let model = options.model.unwrap_or_default();

        // Title requests are the only calls without a system prompt.
        if !messages.iter().any(|m| m.role == Role::System) {
            if self.script.fail_titles.load(Ordering::SeqCst) {
                return Err(LlmError::RateLimited);
            }
            return Ok(ChatResponse {
                content: format!("\"{TITLE}\""),
                model,
                response_metadata: json!({}),
            });
        }

        let hook = self.script.before_next_chat.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }

        let reply = self
            .script
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Reply::text("ok", 10, 5));

        match reply {
            Reply::Text { content, input, output } => Ok(ChatResponse {
                content,
                model,
                response_metadata: usage_metadata(self.provider, input, output),
            }),
            Reply::UnknownUsage(content) => Ok(ChatResponse {
                content,
                model,
                response_metadata: json!({"weird": 1}),
            }),
            Reply::Fail => Err(LlmError::Api("scripted failure".to_string())),
        }
    }
}

pub struct ScriptedFactory {
    pub script: Arc<Script>,
}

impl ProviderFactory for ScriptedFactory {
    fn create(&self, provider: Provider, api_key: String) -> Arc<dyn LlmProvider> {
        Arc::new(ScriptedProvider {
            provider,
            api_key,
            script: self.script.clone(),
        })
    }
}

pub struct TestApp {
    pub services: Services,
    pub script: Arc<Script>,
    pub pool: DbPool,
}

pub fn setup() -> TestApp {
    let mut config = AppConfig::default();
    config.database = DatabaseConfig {
        path: ":memory:".to_string(),
    };

    let pool = get_connection(&config.database).unwrap();
    let script = Arc::new(Script::default());
    let factory = Arc::new(ScriptedFactory { script: script.clone() });

    let services = Services::build(
        &config,
        pool.clone(),
        KeyCipher::ephemeral(),
        Arc::new(ModelRegistry::builtin()),
        factory,
    );

    TestApp { services, script, pool }
}

impl TestApp {
    /// Registers a user holding a key for every provider.
    pub fn user(&self, email: &str) -> (User, String) {
        let (user, token) = self.services.accounts.register(email, "Test", "User").unwrap();
        self.services
            .accounts
            .set_api_keys(
                user.id,
                &ApiKeyUpdate {
                    openai_api_key: Some("sk-openai-test-key".to_string()),
                    anthropic_api_key: Some("sk-ant-test-key".to_string()),
                    google_api_key: Some("google-test-key".to_string()),
                },
            )
            .unwrap();
        (user, token)
    }

    /// Registers a user without any provider key.
    pub fn keyless_user(&self, email: &str) -> User {
        self.services.accounts.register(email, "No", "Keys").unwrap().0
    }
}
