//! Token-budgeted history selection.
//!
//! Packs messages greedily from newest to oldest and stops at the first one
//! that does not fit. The newest message is always kept, even when it alone
//! exceeds the budget, so a non-empty history never produces an empty
//! request.

use crate::context::tokenizer::count_conversation_tokens;
use crate::llm::models::Message;

/// Returns the chronological suffix of `messages` that fits in `token_budget`.
pub fn select_within_budget(messages: &[Message], token_budget: i64, model: &str) -> Vec<Message> {
    // Each message is priced as a one-message conversation, priming included.
    select_suffix(messages, token_budget, |m| {
        count_conversation_tokens(std::slice::from_ref(m), model)
    })
    .to_vec()
}

/// Generic form of [`select_within_budget`] with a caller-supplied cost.
pub fn select_suffix<T>(items: &[T], token_budget: i64, mut cost: impl FnMut(&T) -> usize) -> &[T] {
    let mut start = items.len();
    let mut used: i64 = 0;

    for (idx, item) in items.iter().enumerate().rev() {
        let item_cost = i64::try_from(cost(item)).unwrap_or(i64::MAX);
        if used.saturating_add(item_cost) > token_budget {
            if start == items.len() {
                start = idx;
            }
            break;
        }
        used += item_cost;
        start = idx;
    }

    &items[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::models::Role;

    fn history(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| {
                let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
                Message::new(role, format!("message number {i} with a little padding text"))
            })
            .collect()
    }

    #[test]
    fn empty_history_selects_nothing() {
        assert!(select_within_budget(&[], 4000, "gpt-4o-mini").is_empty());
        assert!(select_within_budget(&[], -5, "gpt-4o-mini").is_empty());
    }

    #[test]
    fn fixed_cost_packs_most_recent_that_fit() {
        let items = ["a", "b", "c", "d", "e"];
        assert_eq!(select_suffix(&items, 120, |_| 50), &["d", "e"]);
        assert_eq!(select_suffix(&items, 150, |_| 50), &["c", "d", "e"]);
        assert_eq!(select_suffix(&items, 1000, |_| 50), &items[..]);
    }

    #[test]
    fn oversized_newest_message_is_forced_in() {
        assert_eq!(select_suffix(&["huge"], 10, |_| 9000), &["huge"]);
        assert_eq!(select_suffix(&["old", "huge"], 10, |_| 9000), &["huge"]);
    }

    #[test]
    fn non_positive_budget_keeps_only_newest() {
        let messages = history(4);
        for budget in [0, -1, -10_000] {
            let selected = select_within_budget(&messages, budget, "gpt-4o");
            assert_eq!(selected, vec![messages[3].clone()]);
        }
    }

    #[test]
    fn stops_at_first_message_that_does_not_fit() {
        let costs = [10usize, 500, 10, 10];
        let items: Vec<usize> = (0..costs.len()).collect();
        // The cheap oldest message is not reached once index 1 overflows.
        assert_eq!(select_suffix(&items, 100, |i| costs[*i]), &[2, 3]);
    }

    #[test]
    fn selection_is_a_chronological_suffix_ending_with_newest() {
        let messages = history(12);
        for budget in [-1, 0, 1, 20, 50, 100, 250, 10_000] {
            let selected = select_within_budget(&messages, budget, "gpt-4o-mini");
            assert!(!selected.is_empty());
            assert_eq!(selected.last(), messages.last());
            let offset = messages.len() - selected.len();
            assert_eq!(&messages[offset..], &selected[..]);
        }
    }

    #[test]
    fn real_costs_respect_budget_once_more_than_one_message_selected() {
        let messages = history(20);
        let budget = 120;
        let selected = select_within_budget(&messages, budget, "gpt-4o-mini");
        if selected.len() > 1 {
            let total: usize = selected
                .iter()
                .map(|m| count_conversation_tokens(std::slice::from_ref(m), "gpt-4o-mini"))
                .sum();
            assert!(total as i64 <= budget);
        }
    }
}
