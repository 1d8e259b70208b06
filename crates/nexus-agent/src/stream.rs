//! Streaming chunk types and tool-call reassembly.
//!
//! Providers stream tool-call arguments as fragments keyed by a stable
//! index. [`ToolCallAssembler`] concatenates fragments in arrival order per
//! index and releases the finalized calls when the upstream signals
//! `finish_reason == "tool_calls"` or the stream ends.

use std::collections::BTreeMap;

/// One event in a provider's completion stream.
#[derive(Debug, Clone)]
pub enum CompletionChunk {
    /// Incremental text content from the model.
    TextDelta { text: String },

    /// A fragment of a tool call. `id` and `name` arrive on the first
    /// fragment for an index; later fragments carry only argument text.
    ToolCallDelta {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        arguments: String,
    },

    /// Error during streaming; terminates the stream.
    Error { message: String },

    /// Stream completed.
    Done { finish_reason: Option<String> },
}

/// A fully assembled tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Concatenated argument fragments, usually a JSON document.
    pub arguments: String,
}

#[derive(Debug, Default)]
struct PartialCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Reassembles streamed tool-call fragments.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    partial: BTreeMap<usize, PartialCall>,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk. Returns the finalized calls when the chunk closes the
    /// stream (`Done`, regardless of reason — stream end finalizes too).
    pub fn push(&mut self, chunk: &CompletionChunk) -> Option<Vec<ToolCall>> {
        match chunk {
            CompletionChunk::ToolCallDelta {
                index,
                id,
                name,
                arguments,
            } => {
                let entry = self.partial.entry(*index).or_default();
                if entry.id.is_none() {
                    entry.id.clone_from(id);
                }
                if entry.name.is_none() {
                    entry.name.clone_from(name);
                }
                entry.arguments.push_str(arguments);
                None
            }
            CompletionChunk::Done { .. } => Some(self.finish()),
            _ => None,
        }
    }

    /// Drain all accumulated calls in index order. Fragments that never
    /// received a name are dropped — nothing useful can be dispatched.
    pub fn finish(&mut self) -> Vec<ToolCall> {
        std::mem::take(&mut self.partial)
            .into_values()
            .filter_map(|p| {
                let name = p.name?;
                Some(ToolCall {
                    id: p.id.unwrap_or_default(),
                    name,
                    arguments: p.arguments,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(index: usize, id: Option<&str>, name: Option<&str>, args: &str) -> CompletionChunk {
        CompletionChunk::ToolCallDelta {
            index,
            id: id.map(String::from),
            name: name.map(String::from),
            arguments: args.to_string(),
        }
    }

    #[test]
    fn fragments_concatenate_in_arrival_order() {
        let mut asm = ToolCallAssembler::new();
        assert!(asm.push(&delta(0, Some("c1"), Some("search"), "{\"q\":")).is_none());
        assert!(asm.push(&delta(0, None, None, "\"rust\"}")).is_none());

        let calls = asm
            .push(&CompletionChunk::Done {
                finish_reason: Some("tool_calls".into()),
            })
            .expect("finalized on done");

        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "c1");
        assert_eq!(calls[0].name, "search");
        assert_eq!(calls[0].arguments, "{\"q\":\"rust\"}");
    }

    #[test]
    fn interleaved_indexes_assemble_separately() {
        let mut asm = ToolCallAssembler::new();
        asm.push(&delta(1, Some("b"), Some("write"), "{\"pa"));
        asm.push(&delta(0, Some("a"), Some("read"), "{\"x\":1}"));
        asm.push(&delta(1, None, None, "th\":\"f\"}"));

        let calls = asm.finish();
        assert_eq!(calls.len(), 2);
        // Index order, not arrival order.
        assert_eq!(calls[0].name, "read");
        assert_eq!(calls[1].name, "write");
        assert_eq!(calls[1].arguments, "{\"path\":\"f\"}");
    }

    #[test]
    fn stream_end_without_tool_reason_still_finalizes() {
        let mut asm = ToolCallAssembler::new();
        asm.push(&delta(0, Some("a"), Some("read"), "{}"));
        let calls = asm
            .push(&CompletionChunk::Done { finish_reason: None })
            .expect("finalized on stream end");
        assert_eq!(calls.len(), 1);
    }

    #[test]
    fn nameless_fragments_are_dropped() {
        let mut asm = ToolCallAssembler::new();
        asm.push(&delta(0, Some("a"), None, "orphan"));
        assert!(asm.finish().is_empty());
    }

    #[test]
    fn finish_drains_state() {
        let mut asm = ToolCallAssembler::new();
        asm.push(&delta(0, Some("a"), Some("read"), "{}"));
        assert_eq!(asm.finish().len(), 1);
        assert!(asm.finish().is_empty());
    }

    #[test]
    fn text_deltas_are_ignored() {
        let mut asm = ToolCallAssembler::new();
        assert!(asm
            .push(&CompletionChunk::TextDelta {
                text: "hello".into()
            })
            .is_none());
        assert!(asm.finish().is_empty());
    }
}
