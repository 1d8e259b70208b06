//! History pruning — fit a conversation into its token budget.
//!
//! Pruning keeps a contiguous suffix of the newest messages whose estimated
//! size (with a safety margin for estimator drift) stays inside the budget.
//! The oldest messages drop first; a configurable floor of messages is
//! always kept so an agent never loses the current exchange entirely.

use nexus_core::types::{estimate_total_tokens, Message};

/// Multiplier applied over the char-based token estimate; real tokenizers
/// routinely come in above `len/4` on code and non-Latin text.
pub const SAFETY_MARGIN: f64 = 1.2;

/// Starting chunk ratio for summarization.
pub const CHUNK_RATIO_BASE: f64 = 0.40;
/// Floor the ratio never drops below.
pub const CHUNK_RATIO_MIN: f64 = 0.15;

/// Mean message share of the window below which the base ratio applies.
const MEAN_SHARE_LOW: f64 = 0.05;
/// Mean message share at which the ratio bottoms out at the floor.
const MEAN_SHARE_HIGH: f64 = 0.25;

/// Outcome of a prune pass.
#[derive(Debug, Clone)]
pub struct PruneResult {
    /// Kept messages in their original order.
    pub kept: Vec<Message>,
    pub dropped_count: usize,
    pub kept_tokens: u64,
    pub budget_tokens: u64,
}

/// Prune `messages` to `floor(context_tokens × share)` tokens.
///
/// Walks from the newest message backward, keeping messages while the
/// accumulated estimate times [`SAFETY_MARGIN`] fits the budget. At least
/// `min_keep` messages (floored to 1) are kept regardless of budget.
pub fn prune_to_budget(
    messages: &[Message],
    context_tokens: u64,
    share: f64,
    min_keep: usize,
) -> PruneResult {
    let share = if share.is_finite() { share.clamp(0.0, 1.0) } else { 0.0 };
    let budget_tokens = (context_tokens as f64 * share).floor() as u64;
    let min_keep = min_keep.max(1);

    let mut kept: Vec<Message> = Vec::new();
    let mut kept_tokens: u64 = 0;

    for message in messages.iter().rev() {
        let tokens = message.estimate_tokens();
        let fits = (kept_tokens + tokens) as f64 * SAFETY_MARGIN <= budget_tokens as f64;
        if kept.len() < min_keep || fits {
            kept.push(message.clone());
            kept_tokens += tokens;
        } else {
            break;
        }
    }

    kept.reverse();
    PruneResult {
        dropped_count: messages.len() - kept.len(),
        kept,
        kept_tokens,
        budget_tokens,
    }
}

/// Chunk ratio for summarization, adapted to message size.
///
/// When the mean message occupies more than 5% of the context window, the
/// ratio shrinks linearly from [`CHUNK_RATIO_BASE`] down to
/// [`CHUNK_RATIO_MIN`] (reached at 25%). Empty input or a zero window keep
/// the base ratio.
pub fn adaptive_chunk_ratio(messages: &[Message], context_window: u64) -> f64 {
    if messages.is_empty() || context_window == 0 {
        return CHUNK_RATIO_BASE;
    }
    let mean = estimate_total_tokens(messages) as f64 / messages.len() as f64;
    let mean_share = mean / context_window as f64;
    if mean_share <= MEAN_SHARE_LOW {
        return CHUNK_RATIO_BASE;
    }
    let t = ((mean_share - MEAN_SHARE_LOW) / (MEAN_SHARE_HIGH - MEAN_SHARE_LOW)).clamp(0.0, 1.0);
    CHUNK_RATIO_BASE - (CHUNK_RATIO_BASE - CHUNK_RATIO_MIN) * t
}

/// A message too large to summarize alongside anything else.
pub fn is_oversized(message: &Message, context_window: u64) -> bool {
    message.estimate_tokens() > context_window / 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::types::Role;

    fn msg(chars: usize) -> Message {
        Message::new(Role::User, "x".repeat(chars))
    }

    #[test]
    fn keeps_everything_under_budget() {
        let messages: Vec<Message> = (0..5).map(|_| msg(40)).collect(); // 10 tokens each
        let result = prune_to_budget(&messages, 1_000, 1.0, 1);
        assert_eq!(result.kept.len(), 5);
        assert_eq!(result.dropped_count, 0);
        assert_eq!(result.kept_tokens, 50);
        assert_eq!(result.budget_tokens, 1_000);
    }

    #[test]
    fn drops_oldest_first() {
        // 10 tokens per message; budget 40 tokens; margin 1.2 → 3 fit (36 ≤ 40).
        let messages: Vec<Message> = (0..10).map(|_| msg(40)).collect();
        let result = prune_to_budget(&messages, 40, 1.0, 1);
        assert_eq!(result.kept.len(), 3);
        assert_eq!(result.dropped_count, 7);
        assert!(result.kept_tokens as f64 * SAFETY_MARGIN <= result.budget_tokens as f64);
    }

    #[test]
    fn kept_is_contiguous_suffix() {
        let messages: Vec<Message> = (0..6)
            .map(|i| Message::new(Role::User, format!("message number {i} {}", "p".repeat(i * 20))))
            .collect();
        let result = prune_to_budget(&messages, 30, 1.0, 1);
        let n = result.kept.len();
        for (kept, original) in result.kept.iter().zip(&messages[messages.len() - n..]) {
            assert_eq!(kept.content, original.content);
        }
    }

    #[test]
    fn min_keep_overrides_budget() {
        let messages: Vec<Message> = (0..4).map(|_| msg(4_000)).collect(); // 1000 tokens each
        let result = prune_to_budget(&messages, 10, 1.0, 2);
        assert_eq!(result.kept.len(), 2);
        assert!(result.kept_tokens > result.budget_tokens);
    }

    #[test]
    fn min_keep_floors_to_one() {
        let messages = vec![msg(4_000)];
        let result = prune_to_budget(&messages, 0, 1.0, 0);
        assert_eq!(result.kept.len(), 1);
    }

    #[test]
    fn share_is_clamped() {
        let messages: Vec<Message> = (0..3).map(|_| msg(40)).collect();
        let over = prune_to_budget(&messages, 100, 2.0, 1);
        assert_eq!(over.budget_tokens, 100);
        let under = prune_to_budget(&messages, 100, -0.5, 1);
        assert_eq!(under.budget_tokens, 0);
    }

    #[test]
    fn empty_input_is_empty_output() {
        let result = prune_to_budget(&[], 1_000, 0.5, 1);
        assert!(result.kept.is_empty());
        assert_eq!(result.dropped_count, 0);
        assert_eq!(result.kept_tokens, 0);
    }

    #[test]
    fn ratio_base_for_small_messages() {
        let messages: Vec<Message> = (0..10).map(|_| msg(40)).collect();
        assert_eq!(adaptive_chunk_ratio(&messages, 100_000), CHUNK_RATIO_BASE);
    }

    #[test]
    fn ratio_base_for_empty_or_zero_window() {
        assert_eq!(adaptive_chunk_ratio(&[], 100_000), CHUNK_RATIO_BASE);
        assert_eq!(adaptive_chunk_ratio(&[msg(40)], 0), CHUNK_RATIO_BASE);
    }

    #[test]
    fn ratio_floors_for_huge_messages() {
        // Mean = 1000 tokens against a 2000-token window → 50% share, well
        // past the floor point.
        let messages: Vec<Message> = (0..4).map(|_| msg(4_000)).collect();
        let ratio = adaptive_chunk_ratio(&messages, 2_000);
        assert!((ratio - CHUNK_RATIO_MIN).abs() < 1e-9);
    }

    #[test]
    fn ratio_decreases_monotonically() {
        let window = 10_000u64;
        let mut last = f64::MAX;
        for chars in [400usize, 4_000, 8_000, 12_000, 20_000] {
            let messages: Vec<Message> = (0..3).map(|_| msg(chars)).collect();
            let ratio = adaptive_chunk_ratio(&messages, window);
            assert!(ratio <= last, "ratio must not increase as messages grow");
            assert!((CHUNK_RATIO_MIN..=CHUNK_RATIO_BASE).contains(&ratio));
            last = ratio;
        }
    }

    #[test]
    fn oversized_is_strictly_over_half() {
        let half = msg(2_000); // 500 tokens
        assert!(!is_oversized(&half, 1_000));
        let over = msg(2_004); // 501 tokens
        assert!(is_oversized(&over, 1_000));
    }
}
