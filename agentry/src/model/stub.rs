//! A scripted model for tests and offline development.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;

use super::{Model, ModelEventStream, ModelSettings};
use crate::error::ModelError;
use crate::message::{Message, ModelResponse, ResponsePart};
use crate::stream::ModelEvent;
use crate::tool::ToolDefinition;
use crate::usage::RunUsage;

/// Number of characters per streamed text fragment.
const STREAM_CHUNK_CHARS: usize = 16;

/// One scripted response.
#[derive(Debug, Clone)]
pub struct StubResponse {
    parts: Vec<ResponsePart>,
    usage: Option<RunUsage>,
}

impl StubResponse {
    /// A plain text response.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            parts: vec![ResponsePart::Text {
                content: content.into(),
            }],
            usage: None,
        }
    }

    /// A response with a single tool call, with a freshly minted id.
    #[must_use]
    pub fn tool_call(tool_name: impl Into<String>, args: Value) -> Self {
        Self {
            parts: vec![ResponsePart::tool_call(tool_name, args)],
            usage: None,
        }
    }

    /// A response with several tool calls, in order.
    #[must_use]
    pub fn tool_calls(calls: Vec<(&str, Value)>) -> Self {
        Self {
            parts: calls
                .into_iter()
                .map(|(name, args)| ResponsePart::tool_call(name, args))
                .collect(),
            usage: None,
        }
    }

    /// A response with explicit parts.
    #[must_use]
    pub const fn parts(parts: Vec<ResponsePart>) -> Self {
        Self { parts, usage: None }
    }

    /// Attach explicit usage; otherwise the model fabricates a default.
    #[must_use]
    pub const fn with_usage(mut self, usage: RunUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// A model that replays a script of responses, consumed in order.
///
/// The default fabricated usage is one request of 50 input and 5 output
/// tokens per response, so usage-limit behavior is exercisable without a
/// real provider. An exhausted script is a provider error.
#[derive(Debug)]
pub struct StubModel {
    model_name: String,
    script: Mutex<VecDeque<StubResponse>>,
    default_usage: RunUsage,
    last_tool_names: Mutex<Vec<String>>,
}

impl StubModel {
    /// Create a stub replaying the given script.
    #[must_use]
    pub fn new(script: Vec<StubResponse>) -> Self {
        Self {
            model_name: "stub".to_owned(),
            script: Mutex::new(script.into()),
            default_usage: RunUsage::request(50, 5),
            last_tool_names: Mutex::new(Vec::new()),
        }
    }

    /// Use a custom model name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    /// Override the usage fabricated for responses without explicit usage.
    #[must_use]
    pub const fn with_default_usage(mut self, usage: RunUsage) -> Self {
        self.default_usage = usage;
        self
    }

    /// Names of the tool definitions offered on the most recent request.
    #[must_use]
    pub fn last_tool_names(&self) -> Vec<String> {
        self.last_tool_names
            .lock()
            .map(|names| names.clone())
            .unwrap_or_default()
    }

    fn next_response(&self, tools: &[ToolDefinition]) -> Result<ModelResponse, ModelError> {
        if let Ok(mut last) = self.last_tool_names.lock() {
            *last = tools.iter().map(|def| def.name.clone()).collect();
        }
        let scripted = self
            .script
            .lock()
            .map_err(|_| ModelError::provider("stub model script lock poisoned"))?
            .pop_front()
            .ok_or_else(|| ModelError::provider("stub model script exhausted"))?;
        let usage = scripted.usage.unwrap_or(self.default_usage);
        Ok(ModelResponse::new(scripted.parts)
            .with_usage(usage)
            .with_model_name(&self.model_name))
    }
}

#[async_trait]
impl Model for StubModel {
    fn name(&self) -> &str {
        &self.model_name
    }

    async fn request(
        &self,
        _messages: &[Message],
        tools: &[ToolDefinition],
        _settings: &ModelSettings,
    ) -> Result<ModelResponse, ModelError> {
        self.next_response(tools)
    }

    async fn request_stream(
        &self,
        _messages: &[Message],
        tools: &[ToolDefinition],
        _settings: &ModelSettings,
    ) -> Result<ModelEventStream, ModelError> {
        let response = self.next_response(tools)?;
        let mut events = Vec::new();
        let mut call_index = 0usize;
        for part in response.parts {
            match part {
                ResponsePart::Text { content } => {
                    let chars: Vec<char> = content.chars().collect();
                    for chunk in chars.chunks(STREAM_CHUNK_CHARS) {
                        events.push(ModelEvent::TextDelta {
                            content: chunk.iter().collect(),
                        });
                    }
                }
                ResponsePart::ToolCall {
                    id,
                    tool_name,
                    args,
                } => {
                    events.push(ModelEvent::ToolCallStart {
                        index: call_index,
                        id,
                        tool_name,
                    });
                    events.push(ModelEvent::ToolCallDelta {
                        index: call_index,
                        args_delta: args.to_string(),
                    });
                    call_index += 1;
                }
            }
        }
        events.push(ModelEvent::Usage(response.usage));
        events.push(ModelEvent::Done);
        Ok(futures::stream::iter(events.into_iter().map(Ok)).boxed())
    }
}
