use tracing::warn;
use uuid::Uuid;

use crate::chat::ChatDispatcher;
use crate::llm::models::{Message, Provider};

const MAX_TITLE_CHARS: usize = 60;
const TRUNCATED_CHARS: usize = 57;
const MIN_WORD_BREAK: usize = 30;

impl ChatDispatcher {
    /// Asks `model` for a short title, falling back to [`fallback_title`] on
    /// any failure.
    pub async fn generate_title(&self, user_id: Uuid, provider: Provider, model: &str, content: &str) -> String {
        let prompt = format!(
            "Generate a short, descriptive title (maximum {MAX_TITLE_CHARS} characters) for a \
             conversation that starts with this message: \"{content}\"\n\n\
             Respond with ONLY the title, nothing else."
        );

        match self.invoke(user_id, provider, &[Message::user(prompt)], model).await {
            Ok(response) => {
                let title = clean_title(&response.content);
                if title.is_empty() {
                    warn!("Title model returned an empty title, using fallback");
                    fallback_title(content)
                } else {
                    title
                }
            }
            Err(e) => {
                warn!("Title generation failed, using fallback: {}", e);
                fallback_title(content)
            }
        }
    }
}

fn clean_title(raw: &str) -> String {
    let mut title = raw.trim();
    for quote in ['"', '\''] {
        if title.len() >= 2 && title.starts_with(quote) && title.ends_with(quote) {
            title = &title[1..title.len() - 1];
        }
    }
    let title = title.trim();

    if title.chars().count() > MAX_TITLE_CHARS {
        let head: String = title.chars().take(TRUNCATED_CHARS).collect();
        format!("{head}...")
    } else {
        title.to_string()
    }
}

/// Local title: content up to 60 characters is kept as is. Longer content is
/// cut to 57 characters, at the last word boundary when one falls past
/// position 30, and marked with "...".
pub fn fallback_title(content: &str) -> String {
    if content.chars().count() <= MAX_TITLE_CHARS {
        return content.to_string();
    }

    let truncated: String = content.chars().take(TRUNCATED_CHARS).collect();
    match truncated.rfind(' ') {
        Some(idx) if truncated[..idx].chars().count() > MIN_WORD_BREAK => {
            format!("{}...", &truncated[..idx])
        }
        _ => format!("{truncated}..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_content_is_kept() {
        assert_eq!(fallback_title("Hello there"), "Hello there");
        let exactly_sixty = "x".repeat(60);
        assert_eq!(fallback_title(&exactly_sixty), exactly_sixty);
    }

    #[test]
    fn long_content_breaks_on_late_word_boundary() {
        let content = "Explain the difference between threads and processes in operating systems please";
        let title = fallback_title(content);
        assert_eq!(title, "Explain the difference between threads and processes in...");
        assert!(title.chars().count() <= 60);
    }

    #[test]
    fn early_word_boundary_falls_back_to_hard_cut() {
        let content = format!("short {}", "y".repeat(80));
        let title = fallback_title(&content);
        assert_eq!(title.chars().count(), 60);
        assert!(title.ends_with("..."));
        assert!(title.starts_with("short yyyy"));
    }

    #[test]
    fn cleans_quotes_and_length() {
        assert_eq!(clean_title("  \"Rust Lifetimes\"  "), "Rust Lifetimes");
        assert_eq!(clean_title("'Borrowing'"), "Borrowing");
        let long = clean_title(&"t".repeat(75));
        assert_eq!(long.chars().count(), 60);
        assert!(long.ends_with("..."));
    }
}
