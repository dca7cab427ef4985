use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "google")]
    Google,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::OpenAi, Provider::Anthropic, Provider::Google];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Google => "google",
        }
    }

    /// Model used when a request names none.
    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-4o",
            Provider::Anthropic => "claude-sonnet-4-20250514",
            Provider::Google => "gemini-1.5-pro",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(Provider::OpenAi),
            "anthropic" => Ok(Provider::Anthropic),
            "google" => Ok(Provider::Google),
            other => Err(format!("unsupported provider: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// A completed generation. `response_metadata` carries the provider's usage
/// report in that provider's own shape; see [`UsageMetadata`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    #[serde(default)]
    pub response_metadata: Value,
}

impl ChatResponse {
    pub fn usage(&self) -> UsageMetadata {
        UsageMetadata::from_response_metadata(&self.response_metadata)
    }
}

/// The three usage shapes reported by the supported provider families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageMetadata {
    /// `token_usage { prompt_tokens, completion_tokens }`
    TokenUsage { prompt_tokens: i64, completion_tokens: i64 },
    /// `usage { input_tokens, output_tokens }`
    Usage { input_tokens: i64, output_tokens: i64 },
    /// `usage_metadata { prompt_token_count, candidates_token_count }`
    UsageMetadata { prompt_token_count: i64, candidates_token_count: i64 },
    Unrecognized,
}

impl UsageMetadata {
    /// Checks the keys in a fixed order: `token_usage`, then `usage`, then
    /// `usage_metadata`. Missing counters inside a matched shape read as 0.
    pub fn from_response_metadata(metadata: &Value) -> Self {
        if let Some(u) = metadata.get("token_usage") {
            UsageMetadata::TokenUsage {
                prompt_tokens: count_field(u, "prompt_tokens"),
                completion_tokens: count_field(u, "completion_tokens"),
            }
        } else if let Some(u) = metadata.get("usage") {
            UsageMetadata::Usage {
                input_tokens: count_field(u, "input_tokens"),
                output_tokens: count_field(u, "output_tokens"),
            }
        } else if let Some(u) = metadata.get("usage_metadata") {
            UsageMetadata::UsageMetadata {
                prompt_token_count: count_field(u, "prompt_token_count"),
                candidates_token_count: count_field(u, "candidates_token_count"),
            }
        } else {
            UsageMetadata::Unrecognized
        }
    }

    /// `(input_tokens, output_tokens)`
    pub fn token_counts(&self) -> (i64, i64) {
        match *self {
            UsageMetadata::TokenUsage { prompt_tokens, completion_tokens } => {
                (prompt_tokens, completion_tokens)
            }
            UsageMetadata::Usage { input_tokens, output_tokens } => (input_tokens, output_tokens),
            UsageMetadata::UsageMetadata {
                prompt_token_count,
                candidates_token_count,
            } => (prompt_token_count, candidates_token_count),
            UsageMetadata::Unrecognized => (0, 0),
        }
    }
}

fn count_field(usage: &Value, key: &str) -> i64 {
    usage
        .get(key)
        .and_then(Value::as_i64)
        .filter(|n| *n >= 0)
        .unwrap_or(0)
}
