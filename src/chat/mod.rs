pub mod dispatcher;
pub mod title;

pub use dispatcher::{ChatDispatcher, Completion, DEFAULT_SYSTEM_PROMPT};
pub use title::fallback_title;
