use serde::{Deserialize, Serialize};

use crate::llm::registry::ModelRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContextMetrics {
    pub total_context_size: i64,
    pub remaining_context_size: i64,
    pub total_used_percentage: f64,
    pub remaining_percentage: f64,
}

/// Derives window usage for `total_tokens_used` against `model_name`.
///
/// `remaining_context_size` is clamped at zero but `total_used_percentage` is
/// not, so an overshooting conversation reports more than 100% used and 0%
/// remaining.
pub fn compute(registry: &ModelRegistry, total_tokens_used: i64, model_name: &str) -> ContextMetrics {
    let total_context_size = registry.context_limit(model_name);
    let remaining_context_size = (total_context_size - total_tokens_used).max(0);

    let (used, remaining) = if total_context_size > 0 {
        let size = total_context_size as f64;
        (
            total_tokens_used as f64 / size * 100.0,
            remaining_context_size as f64 / size * 100.0,
        )
    } else {
        (0.0, 0.0)
    };

    ContextMetrics {
        total_context_size,
        remaining_context_size,
        total_used_percentage: round2(used),
        remaining_percentage: round2(remaining),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
