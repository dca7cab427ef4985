pub mod metrics;
pub mod selector;
pub mod tokenizer;

pub use metrics::{compute as compute_metrics, ContextMetrics};
pub use selector::select_within_budget;
