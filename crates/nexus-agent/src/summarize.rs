//! Chunked history summarization.
//!
//! Long histories are partitioned into token-bounded chunks, each chunk is
//! summarized by the external [`Summarizer`], and partial summaries are
//! merged until a single summary remains. Messages too large to summarize
//! at all are filtered up front and noted in the result instead of being
//! silently dropped.

use async_trait::async_trait;
use tracing::debug;

use nexus_core::types::{estimate_total_tokens, Message, Role};

use crate::provider::LlmError;
use crate::prune::is_oversized;

/// Note emitted for each message filtered out as oversized.
pub const OVERSIZED_NOTE: &str = "[Oversized message omitted]";
/// Returned when nothing summarizable remains.
pub const EMPTY_HISTORY: &str = "No prior history.";

/// Tuning for a summarization pass.
#[derive(Debug, Clone)]
pub struct SummaryConfig {
    /// Largest chunk handed to the summarizer in one call.
    pub max_chunk_tokens: u64,
    /// Below this many messages, staged summarization uses a single pass.
    pub min_messages_for_split: usize,
    /// Partition count for staged summarization.
    pub parts: usize,
    /// Carried-over summary from an earlier compaction, merged as context.
    pub previous_summary: Option<String>,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            max_chunk_tokens: 2_000,
            min_messages_for_split: 12,
            parts: 2,
            previous_summary: None,
        }
    }
}

/// External summarization capability (an LLM call in production).
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn generate(
        &self,
        messages: &[Message],
        config: &SummaryConfig,
    ) -> Result<String, LlmError>;
}

/// Partition `messages` into chunks of at most `max_chunk_tokens` each.
///
/// A message that alone exceeds the cap becomes its own chunk rather than
/// being split.
fn partition_chunks(messages: &[Message], max_chunk_tokens: u64) -> Vec<Vec<Message>> {
    let max_chunk_tokens = max_chunk_tokens.max(1);
    let mut chunks: Vec<Vec<Message>> = Vec::new();
    let mut current: Vec<Message> = Vec::new();
    let mut current_tokens: u64 = 0;

    for message in messages {
        let tokens = message.estimate_tokens();
        if tokens > max_chunk_tokens {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_tokens = 0;
            }
            chunks.push(vec![message.clone()]);
            continue;
        }
        if current_tokens + tokens > max_chunk_tokens && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_tokens = 0;
        }
        current.push(message.clone());
        current_tokens += tokens;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Split `messages` into `parts` partitions of roughly equal token share.
///
/// With a uniform token distribution this balances message counts too.
fn split_equal_token_parts(messages: &[Message], parts: usize) -> Vec<Vec<Message>> {
    let parts = parts.max(1);
    let total = estimate_total_tokens(messages);
    let target = (total / parts as u64).max(1);

    let mut partitions: Vec<Vec<Message>> = Vec::new();
    let mut current: Vec<Message> = Vec::new();
    let mut current_tokens: u64 = 0;

    for message in messages {
        current_tokens += message.estimate_tokens();
        current.push(message.clone());
        if current_tokens >= target && partitions.len() < parts - 1 {
            partitions.push(std::mem::take(&mut current));
            current_tokens = 0;
        }
    }
    if !current.is_empty() {
        partitions.push(current);
    }
    partitions
}

fn partials_to_messages(partials: &[String]) -> Vec<Message> {
    partials
        .iter()
        .map(|p| Message::new(Role::User, p.clone()))
        .collect()
}

/// Summarize `messages` chunk by chunk, then merge partial summaries until a
/// single summary remains.
///
/// Every merge round either strictly reduces the number of chunks or ends
/// with one final pass over all partials, so the loop is bounded.
pub async fn summarize_in_chunks(
    summarizer: &dyn Summarizer,
    messages: &[Message],
    config: &SummaryConfig,
) -> Result<String, LlmError> {
    if messages.is_empty() {
        return Ok(String::new());
    }

    let chunks = partition_chunks(messages, config.max_chunk_tokens);
    debug!(chunks = chunks.len(), "summarizing history in chunks");

    let mut partials: Vec<String> = Vec::with_capacity(chunks.len());
    for chunk in &chunks {
        partials.push(summarizer.generate(chunk, config).await?);
    }

    while partials.len() > 1 {
        let merged = partials_to_messages(&partials);
        let rechunked = partition_chunks(&merged, config.max_chunk_tokens);
        if rechunked.len() >= partials.len() {
            // Partials no longer compress into fewer chunks; one final pass.
            return summarizer.generate(&merged, config).await;
        }
        let mut next: Vec<String> = Vec::with_capacity(rechunked.len());
        for chunk in &rechunked {
            next.push(summarizer.generate(chunk, config).await?);
        }
        partials = next;
    }

    Ok(partials.pop().unwrap_or_default())
}

/// Summarize with oversized messages filtered out and noted.
///
/// Oversized messages (relative to `context_window`) contribute an
/// [`OVERSIZED_NOTE`] line each; when nothing summarizable remains the
/// result is [`EMPTY_HISTORY`]. Summarizer errors propagate — the caller
/// decides whether to fall back.
pub async fn summarize_with_fallback(
    summarizer: &dyn Summarizer,
    messages: &[Message],
    config: &SummaryConfig,
    context_window: u64,
) -> Result<String, LlmError> {
    let (oversized, normal): (Vec<&Message>, Vec<&Message>) = messages
        .iter()
        .partition(|m| is_oversized(m, context_window));

    if normal.is_empty() {
        return Ok(EMPTY_HISTORY.to_string());
    }

    let normal: Vec<Message> = normal.into_iter().cloned().collect();
    let summary = summarize_in_chunks(summarizer, &normal, config).await?;

    if oversized.is_empty() {
        return Ok(summary);
    }
    let mut lines: Vec<String> = oversized.iter().map(|_| OVERSIZED_NOTE.to_string()).collect();
    lines.push(summary);
    Ok(lines.join("\n"))
}

/// Staged summarization for long histories: split into equal-token parts,
/// summarize each, then merge the partials (with any previous summary
/// prepended as context). Short histories get a single pass.
pub async fn summarize_in_stages(
    summarizer: &dyn Summarizer,
    messages: &[Message],
    config: &SummaryConfig,
) -> Result<String, LlmError> {
    if messages.len() < config.min_messages_for_split {
        return summarizer.generate(messages, config).await;
    }

    let partitions = split_equal_token_parts(messages, config.parts);
    let mut partials: Vec<String> = Vec::with_capacity(partitions.len());
    for part in partitions.iter().filter(|p| !p.is_empty()) {
        partials.push(summarizer.generate(part, config).await?);
    }

    let mut merge: Vec<Message> = Vec::with_capacity(partials.len() + 1);
    if let Some(previous) = &config.previous_summary {
        merge.push(Message::new(
            Role::System,
            format!("Previous summary:\n{previous}"),
        ));
    }
    merge.extend(partials_to_messages(&partials));
    summarizer.generate(&merge, config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Summarizer that records each call's message count and returns a
    /// fixed-size digest, so merge rounds converge.
    struct FakeSummarizer {
        calls: Mutex<Vec<usize>>,
        fail: bool,
    }

    impl FakeSummarizer {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Summarizer for FakeSummarizer {
        async fn generate(
            &self,
            messages: &[Message],
            _config: &SummaryConfig,
        ) -> Result<String, LlmError> {
            self.calls.lock().unwrap().push(messages.len());
            if self.fail {
                return Err(LlmError::Unavailable("summarizer offline".into()));
            }
            Ok(format!("summary of {} messages", messages.len()))
        }
    }

    fn msg(chars: usize) -> Message {
        Message::new(Role::User, "x".repeat(chars))
    }

    #[test]
    fn partition_respects_token_cap() {
        // 100 tokens each, cap 250 → chunks of 2, 2, 1.
        let messages: Vec<Message> = (0..5).map(|_| msg(400)).collect();
        let chunks = partition_chunks(&messages, 250);
        assert_eq!(chunks.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 2, 1]);
    }

    #[test]
    fn oversized_message_gets_own_chunk() {
        let messages = vec![msg(40), msg(4_000), msg(40)];
        let chunks = partition_chunks(&messages, 100);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].len(), 1);
    }

    #[test]
    fn equal_token_split_balances_uniform_input() {
        let messages: Vec<Message> = (0..8).map(|_| msg(40)).collect();
        let parts = split_equal_token_parts(&messages, 4);
        assert_eq!(parts.len(), 4);
        for p in &parts {
            assert_eq!(p.len(), 2);
        }
    }

    #[test]
    fn equal_token_split_never_exceeds_parts() {
        let messages: Vec<Message> = (0..3).map(|_| msg(40)).collect();
        let parts = split_equal_token_parts(&messages, 5);
        assert!(parts.len() <= 5);
        let total: usize = parts.iter().map(Vec::len).sum();
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn single_chunk_summarizes_once() {
        let s = FakeSummarizer::new();
        let messages: Vec<Message> = (0..3).map(|_| msg(40)).collect();
        let out = summarize_in_chunks(&s, &messages, &SummaryConfig::default())
            .await
            .unwrap();
        assert_eq!(out, "summary of 3 messages");
        assert_eq!(s.call_count(), 1);
    }

    #[tokio::test]
    async fn multiple_chunks_merge_to_one_summary() {
        let s = FakeSummarizer::new();
        // 500 tokens each, cap 600 → 4 chunks, then a merge round.
        let messages: Vec<Message> = (0..4).map(|_| msg(2_000)).collect();
        let out = summarize_in_chunks(
            &s,
            &messages,
            &SummaryConfig {
                max_chunk_tokens: 600,
                ..SummaryConfig::default()
            },
        )
        .await
        .unwrap();
        assert!(out.contains("summary of"));
        assert!(s.call_count() > 4, "expected merge calls after chunk calls");
    }

    #[tokio::test]
    async fn empty_input_summarizes_to_empty() {
        let s = FakeSummarizer::new();
        let out = summarize_in_chunks(&s, &[], &SummaryConfig::default())
            .await
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(s.call_count(), 0);
    }

    #[tokio::test]
    async fn fallback_notes_oversized_messages() {
        let s = FakeSummarizer::new();
        let messages = vec![msg(40), msg(4_000)]; // window 1000 → second is oversized
        let out = summarize_with_fallback(&s, &messages, &SummaryConfig::default(), 1_000)
            .await
            .unwrap();
        assert!(out.starts_with(OVERSIZED_NOTE));
        assert!(out.contains("summary of 1 messages"));
    }

    #[tokio::test]
    async fn fallback_all_oversized_returns_empty_history() {
        let s = FakeSummarizer::new();
        let messages = vec![msg(4_000), msg(5_000)];
        let out = summarize_with_fallback(&s, &messages, &SummaryConfig::default(), 1_000)
            .await
            .unwrap();
        assert_eq!(out, EMPTY_HISTORY);
        assert_eq!(s.call_count(), 0);
    }

    #[tokio::test]
    async fn summarizer_errors_propagate() {
        let s = FakeSummarizer::failing();
        let messages = vec![msg(40)];
        let err = summarize_with_fallback(&s, &messages, &SummaryConfig::default(), 1_000).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn stages_single_pass_below_threshold() {
        let s = FakeSummarizer::new();
        let messages: Vec<Message> = (0..3).map(|_| msg(40)).collect();
        let cfg = SummaryConfig {
            min_messages_for_split: 10,
            ..SummaryConfig::default()
        };
        summarize_in_stages(&s, &messages, &cfg).await.unwrap();
        assert_eq!(s.call_count(), 1);
    }

    #[tokio::test]
    async fn stages_split_and_merge() {
        let s = FakeSummarizer::new();
        let messages: Vec<Message> = (0..12).map(|_| msg(40)).collect();
        let cfg = SummaryConfig {
            min_messages_for_split: 4,
            parts: 3,
            ..SummaryConfig::default()
        };
        summarize_in_stages(&s, &messages, &cfg).await.unwrap();
        // 3 part summaries + 1 merge.
        assert_eq!(s.call_count(), 4);
    }

    #[tokio::test]
    async fn stages_include_previous_summary_in_merge() {
        struct Capture(Mutex<Vec<Vec<String>>>);

        #[async_trait]
        impl Summarizer for Capture {
            async fn generate(
                &self,
                messages: &[Message],
                _config: &SummaryConfig,
            ) -> Result<String, LlmError> {
                self.0
                    .lock()
                    .unwrap()
                    .push(messages.iter().map(|m| m.content.clone()).collect());
                Ok("merged".into())
            }
        }

        let s = Capture(Mutex::new(Vec::new()));
        let messages: Vec<Message> = (0..6).map(|_| msg(40)).collect();
        let cfg = SummaryConfig {
            min_messages_for_split: 4,
            parts: 2,
            previous_summary: Some("earlier context".into()),
            ..SummaryConfig::default()
        };
        summarize_in_stages(&s, &messages, &cfg).await.unwrap();

        let calls = s.0.lock().unwrap();
        let merge_call = calls.last().expect("merge call");
        assert!(merge_call[0].contains("earlier context"));
    }
}
