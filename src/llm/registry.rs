use serde::Serialize;

use crate::llm::models::Provider;

/// Context window applied to model names the registry does not know.
pub const DEFAULT_CONTEXT_WINDOW: i64 = 4000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub provider: Provider,
    pub context_window: i64,
    pub cost_per_1k_input: f64,
    pub cost_per_1k_output: f64,
}

impl ModelDescriptor {
    fn new(name: &str, provider: Provider, context_window: i64, input: f64, output: f64) -> Self {
        Self {
            name: name.to_string(),
            provider,
            context_window,
            cost_per_1k_input: input,
            cost_per_1k_output: output,
        }
    }
}

/// Immutable table of the models the service knows how to size.
///
/// Built once at startup and shared by reference; lookups are exact string
/// matches with no aliasing.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: Vec<ModelDescriptor>,
}

impl ModelRegistry {
    pub fn new(models: Vec<ModelDescriptor>) -> Self {
        Self { models }
    }

    pub fn builtin() -> Self {
        use Provider::{Anthropic, Google, OpenAi};

        Self::new(vec![
            ModelDescriptor::new("gpt-4o", OpenAi, 128_000, 0.0025, 0.01),
            ModelDescriptor::new("gpt-4o-mini", OpenAi, 128_000, 0.00015, 0.0006),
            ModelDescriptor::new("gpt-4-turbo", OpenAi, 128_000, 0.01, 0.03),
            ModelDescriptor::new("gpt-3.5-turbo", OpenAi, 16_385, 0.0005, 0.0015),
            ModelDescriptor::new("claude-sonnet-4-20250514", Anthropic, 200_000, 0.003, 0.015),
            ModelDescriptor::new("claude-3-5-sonnet-20241022", Anthropic, 200_000, 0.003, 0.015),
            ModelDescriptor::new("claude-3-opus-20240229", Anthropic, 200_000, 0.015, 0.075),
            ModelDescriptor::new("gemini-1.5-pro", Google, 2_000_000, 0.00125, 0.005),
            ModelDescriptor::new("gemini-1.5-flash", Google, 1_000_000, 0.000075, 0.0003),
            ModelDescriptor::new("gemini-1.0-pro", Google, 32_768, 0.0005, 0.0015),
        ])
    }

    pub fn lookup(&self, model_name: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.name == model_name)
    }

    /// Unknown names get [`DEFAULT_CONTEXT_WINDOW`] rather than an error.
    pub fn context_limit(&self, model_name: &str) -> i64 {
        self.lookup(model_name)
            .map(|m| m.context_window)
            .unwrap_or(DEFAULT_CONTEXT_WINDOW)
    }

    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
