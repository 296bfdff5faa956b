//! Model delta streams and response aggregation.
//!
//! Providers that stream emit a sequence of [`ModelEvent`]s; the
//! [`ResponseAggregator`] folds that sequence back into the exact
//! [`ModelResponse`] a non-streaming request would have produced, so the
//! committed history is identical either way. Partial state held by the
//! aggregator never enters history.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{ModelResponse, ResponsePart};
use crate::usage::RunUsage;

/// An incremental event in a streamed model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ModelEvent {
    /// A fragment of assistant text.
    TextDelta {
        /// The text fragment.
        content: String,
    },
    /// The model started a tool call.
    ToolCallStart {
        /// Position of this call within the response.
        index: usize,
        /// Unique id for the call.
        id: String,
        /// Name of the tool being called.
        tool_name: String,
    },
    /// A fragment of a tool call's JSON arguments.
    ToolCallDelta {
        /// Position of the call this fragment belongs to.
        index: usize,
        /// The argument fragment.
        args_delta: String,
    },
    /// Usage reported by the provider.
    Usage(RunUsage),
    /// The response is complete.
    Done,
}

impl ModelEvent {
    /// A text fragment event.
    #[must_use]
    pub fn text_delta(content: impl Into<String>) -> Self {
        Self::TextDelta {
            content: content.into(),
        }
    }

    /// Returns `true` for the terminal event.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

#[derive(Debug, Default)]
struct ToolCallBuilder {
    id: String,
    tool_name: String,
    args: String,
}

impl ToolCallBuilder {
    fn into_part(self) -> ResponsePart {
        // An empty argument string means the tool takes no arguments.
        let args = if self.args.trim().is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(&self.args).unwrap_or(Value::String(self.args))
        };
        ResponsePart::ToolCall {
            id: self.id,
            tool_name: self.tool_name,
            args,
        }
    }
}

/// Folds a stream of [`ModelEvent`]s into a complete [`ModelResponse`].
#[derive(Debug, Default)]
pub struct ResponseAggregator {
    text: String,
    tool_calls: BTreeMap<usize, ToolCallBuilder>,
    usage: RunUsage,
    done: bool,
}

impl ResponseAggregator {
    /// Create an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the accumulated state.
    pub fn apply(&mut self, event: &ModelEvent) {
        match event {
            ModelEvent::TextDelta { content } => self.text.push_str(content),
            ModelEvent::ToolCallStart {
                index,
                id,
                tool_name,
            } => {
                let builder = self.tool_calls.entry(*index).or_default();
                builder.id = id.clone();
                builder.tool_name = tool_name.clone();
            }
            ModelEvent::ToolCallDelta { index, args_delta } => {
                self.tool_calls
                    .entry(*index)
                    .or_default()
                    .args
                    .push_str(args_delta);
            }
            ModelEvent::Usage(usage) => self.usage += *usage,
            ModelEvent::Done => self.done = true,
        }
    }

    /// Text accumulated so far.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns `true` once the terminal event has been applied.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.done
    }

    /// Returns `true` if any tool call has started.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Finish aggregation, producing the complete response.
    ///
    /// Text (if any) comes first, then tool calls in stream order.
    #[must_use]
    pub fn into_response(self) -> ModelResponse {
        let mut parts = Vec::new();
        if !self.text.is_empty() {
            parts.push(ResponsePart::Text { content: self.text });
        }
        parts.extend(self.tool_calls.into_values().map(ToolCallBuilder::into_part));
        ModelResponse::new(parts).with_usage(self.usage)
    }
}
