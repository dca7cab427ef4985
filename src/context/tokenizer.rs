//! Client-side token estimates.
//!
//! OpenAI models use their own BPE; everything else (Anthropic, Google,
//! unknown names) is measured with `cl100k_base`. These numbers only drive
//! context selection: persisted token counts always come from the provider.

use std::sync::LazyLock;

use tiktoken_rs::tokenizer::{get_tokenizer, Tokenizer};
use tiktoken_rs::CoreBPE;

use crate::llm::models::Message;

/// Formatting tax per message (role markers and separators).
pub const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Tokens that prime the assistant reply after the last message.
pub const REPLY_PRIMING_TOKENS: usize = 2;

static CL100K: LazyLock<Option<CoreBPE>> = LazyLock::new(|| tiktoken_rs::cl100k_base().ok());
static O200K: LazyLock<Option<CoreBPE>> = LazyLock::new(|| tiktoken_rs::o200k_base().ok());

fn encoding_for(model: &str) -> Option<&'static CoreBPE> {
    match get_tokenizer(model) {
        Some(Tokenizer::O200kBase) => O200K.as_ref().or(CL100K.as_ref()),
        _ => CL100K.as_ref(),
    }
}

pub fn count_tokens(text: &str, model: &str) -> usize {
    match encoding_for(model) {
        Some(bpe) => bpe.encode_ordinary(text).len(),
        // Only reachable if the embedded vocabularies fail to load.
        None => text.chars().count().div_ceil(4),
    }
}

pub fn count_message_tokens(message: &Message, model: &str) -> usize {
    count_tokens(&message.content, model)
        + MESSAGE_OVERHEAD_TOKENS
        + count_tokens(message.role.as_str(), model)
}

pub fn count_conversation_tokens(messages: &[Message], model: &str) -> usize {
    messages
        .iter()
        .map(|m| count_message_tokens(m, model))
        .sum::<usize>()
        + REPLY_PRIMING_TOKENS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::models::Role;

    #[test]
    fn empty_text_has_no_tokens() {
        assert_eq!(count_tokens("", "gpt-4o-mini"), 0);
    }

    #[test]
    fn unknown_models_use_fallback_encoding() {
        let text = "The quick brown fox jumps over the lazy dog.";
        let fallback = count_tokens(text, "definitely-not-a-model");
        assert!(fallback > 0);
        assert_eq!(count_tokens(text, "claude-3-opus-20240229"), fallback);
        assert_eq!(count_tokens(text, "gpt-4"), fallback);
    }

    #[test]
    fn message_adds_overhead_and_role() {
        let message = Message::new(Role::Assistant, "hello there");
        let expected = count_tokens("hello there", "gpt-4o")
            + MESSAGE_OVERHEAD_TOKENS
            + count_tokens("assistant", "gpt-4o");
        assert_eq!(count_message_tokens(&message, "gpt-4o"), expected);
    }

    #[test]
    fn conversation_adds_reply_priming() {
        let messages = vec![Message::user("hi"), Message::new(Role::Assistant, "hello")];
        let per_message: usize = messages
            .iter()
            .map(|m| count_message_tokens(m, "gpt-4o-mini"))
            .sum();
        assert_eq!(
            count_conversation_tokens(&messages, "gpt-4o-mini"),
            per_message + REPLY_PRIMING_TOKENS
        );
        assert_eq!(count_conversation_tokens(&[], "gpt-4o-mini"), REPLY_PRIMING_TOKENS);
    }

    #[test]
    fn longer_text_costs_more() {
        let short = count_tokens("hello", "gpt-4o");
        let long = count_tokens(&"hello world ".repeat(50), "gpt-4o");
        assert!(long > short);
    }
}
