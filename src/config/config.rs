use serde::Deserialize;

use crate::llm::models::Provider;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "chatledger.duckdb".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SecurityConfig {
    /// Hex-encoded 32 byte AES-256 key for stored provider credentials.
    pub encryption_key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderEndpoint {
    pub api_base: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_openai")]
    pub openai: ProviderEndpoint,
    #[serde(default = "default_anthropic")]
    pub anthropic: ProviderEndpoint,
    #[serde(default = "default_google")]
    pub google: ProviderEndpoint,
    #[serde(default = "default_title_model")]
    pub title_model: String,
}

impl LlmConfig {
    pub fn endpoint(&self, provider: Provider) -> &ProviderEndpoint {
        match provider {
            Provider::OpenAi => &self.openai,
            Provider::Anthropic => &self.anthropic,
            Provider::Google => &self.google,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            openai: default_openai(),
            anthropic: default_anthropic(),
            google: default_google(),
            title_model: default_title_model(),
        }
    }
}

fn default_openai() -> ProviderEndpoint {
    ProviderEndpoint {
        api_base: "https://api.openai.com/v1".to_string(),
    }
}

fn default_anthropic() -> ProviderEndpoint {
    ProviderEndpoint {
        api_base: "https://api.anthropic.com".to_string(),
    }
}

fn default_google() -> ProviderEndpoint {
    ProviderEndpoint {
        api_base: "https://generativelanguage.googleapis.com".to_string(),
    }
}

fn default_title_model() -> String {
    "gpt-4o-mini".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// Overrides the built-in default system prompt when set.
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default = "default_context_limit")]
    pub default_context_limit_tokens: i64,
    #[serde(default = "default_reserve")]
    pub system_prompt_token_reserve: i64,
    #[serde(default = "default_min_limit")]
    pub min_context_limit_tokens: i64,
    #[serde(default = "default_max_limit")]
    pub max_context_limit_tokens: i64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            default_context_limit_tokens: default_context_limit(),
            system_prompt_token_reserve: default_reserve(),
            min_context_limit_tokens: default_min_limit(),
            max_context_limit_tokens: default_max_limit(),
        }
    }
}

fn default_context_limit() -> i64 {
    4000
}

fn default_reserve() -> i64 {
    200
}

fn default_min_limit() -> i64 {
    100
}

fn default_max_limit() -> i64 {
    200_000
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl AppConfig {
    pub fn load(path: &str) -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("CHATLEDGER").separator("__"))
            .build()?;

        let mut app_config: AppConfig = settings.try_deserialize()?;

        // Expand environment variables if present like ${CHATLEDGER_KEY}
        app_config.server.host = expand_env(&app_config.server.host);
        app_config.database.path = expand_env(&app_config.database.path);
        app_config.security.encryption_key = expand_env(&app_config.security.encryption_key);

        Ok(app_config)
    }
}

fn expand_env(val: &str) -> String {
    match val.strip_prefix("${").and_then(|v| v.strip_suffix('}')) {
        Some(var_name) => std::env::var(var_name).unwrap_or_default(),
        None => val.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_braced_variables_only() {
        std::env::set_var("CHATLEDGER_TEST_EXPAND", "secret");
        assert_eq!(expand_env("${CHATLEDGER_TEST_EXPAND}"), "secret");
        assert_eq!(expand_env("$CHATLEDGER_TEST_EXPAND"), "$CHATLEDGER_TEST_EXPAND");
        assert_eq!(expand_env("${CHATLEDGER_TEST_UNSET_VAR}"), "");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = AppConfig::load("does-not-exist.yaml").unwrap();
        assert_eq!(config.chat.default_context_limit_tokens, 4000);
        assert_eq!(config.chat.system_prompt_token_reserve, 200);
        assert_eq!(config.llm.title_model, "gpt-4o-mini");
        assert_eq!(config.llm.endpoint(Provider::Anthropic).api_base, "https://api.anthropic.com");
    }
}
