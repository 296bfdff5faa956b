//! Conversation messages exchanged with a model.
//!
//! A run's history is an append-only sequence of [`Message`]s alternating
//! between requests (sent to the model) and responses (received from it).
//! Every part carries enough structure to round-trip through JSON losslessly,
//! so a history can be persisted and replayed into a later run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::usage::RunUsage;

/// A single entry in a run's message history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Message {
    /// A payload sent to the model.
    Request(ModelRequest),
    /// A payload received from the model.
    Response(ModelResponse),
}

impl Message {
    /// View this message as a request, if it is one.
    #[must_use]
    pub const fn as_request(&self) -> Option<&ModelRequest> {
        match self {
            Self::Request(req) => Some(req),
            Self::Response(_) => None,
        }
    }

    /// View this message as a response, if it is one.
    #[must_use]
    pub const fn as_response(&self) -> Option<&ModelResponse> {
        match self {
            Self::Response(resp) => Some(resp),
            Self::Request(_) => None,
        }
    }
}

/// A request payload: one or more parts sent to the model together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    /// Ordered parts of the request.
    pub parts: Vec<RequestPart>,
}

impl ModelRequest {
    /// A request holding the given parts.
    #[must_use]
    pub const fn new(parts: Vec<RequestPart>) -> Self {
        Self { parts }
    }

    /// A request with a single user prompt.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            parts: vec![RequestPart::user(content)],
        }
    }
}

/// One part of a model request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "part_kind", rename_all = "kebab-case")]
pub enum RequestPart {
    /// Instructions establishing the agent's behavior.
    #[serde(rename = "system")]
    SystemPrompt {
        /// The instruction text.
        content: String,
        /// When the part was created.
        timestamp: DateTime<Utc>,
    },
    /// Text supplied by the end user.
    #[serde(rename = "user")]
    UserPrompt {
        /// The prompt text.
        content: String,
        /// When the part was created.
        timestamp: DateTime<Utc>,
    },
    /// The result of a tool invocation, echoed back to the model.
    ToolReturn {
        /// Name the model used to call the tool.
        tool_name: String,
        /// Id of the originating tool call.
        tool_call_id: String,
        /// The tool's return value.
        content: Value,
        /// When the tool completed.
        timestamp: DateTime<Utc>,
    },
    /// Feedback asking the model to correct itself and try again.
    RetryPrompt {
        /// The tool that raised the retry, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_name: Option<String>,
        /// Id of the originating tool call, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_call_id: Option<String>,
        /// Explanation of what to fix.
        content: String,
        /// When the retry was raised.
        timestamp: DateTime<Utc>,
    },
}

impl RequestPart {
    /// A system prompt part stamped with the current time.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::SystemPrompt {
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// A user prompt part stamped with the current time.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::UserPrompt {
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// A tool-return part stamped with the current time.
    #[must_use]
    pub fn tool_return(
        tool_name: impl Into<String>,
        tool_call_id: impl Into<String>,
        content: Value,
    ) -> Self {
        Self::ToolReturn {
            tool_name: tool_name.into(),
            tool_call_id: tool_call_id.into(),
            content,
            timestamp: Utc::now(),
        }
    }

    /// A retry-prompt part stamped with the current time.
    #[must_use]
    pub fn retry(
        content: impl Into<String>,
        tool_name: Option<String>,
        tool_call_id: Option<String>,
    ) -> Self {
        Self::RetryPrompt {
            tool_name,
            tool_call_id,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A response payload received from the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Ordered parts of the response.
    pub parts: Vec<ResponsePart>,
    /// Usage consumed producing this response.
    #[serde(default)]
    pub usage: RunUsage,
    /// When the response was received.
    pub timestamp: DateTime<Utc>,
    /// Name of the model that produced the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
}

impl ModelResponse {
    /// A response holding the given parts, stamped with the current time.
    #[must_use]
    pub fn new(parts: Vec<ResponsePart>) -> Self {
        Self {
            parts,
            usage: RunUsage::default(),
            timestamp: Utc::now(),
            model_name: None,
        }
    }

    /// A plain text response.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self::new(vec![ResponsePart::Text {
            content: content.into(),
        }])
    }

    /// Attach usage to this response.
    #[must_use]
    pub fn with_usage(mut self, usage: RunUsage) -> Self {
        self.usage = usage;
        self
    }

    /// Attach a model name to this response.
    #[must_use]
    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = Some(name.into());
        self
    }

    /// All text parts concatenated in order.
    #[must_use]
    pub fn text_content(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ResponsePart::Text { content } => Some(content.as_str()),
                ResponsePart::ToolCall { .. } => None,
            })
            .collect()
    }

    /// All tool-call parts in order.
    #[must_use]
    pub fn tool_calls(&self) -> Vec<&ResponsePart> {
        self.parts
            .iter()
            .filter(|part| matches!(part, ResponsePart::ToolCall { .. }))
            .collect()
    }

    /// Returns `true` if the response contains at least one tool call.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        self.parts
            .iter()
            .any(|part| matches!(part, ResponsePart::ToolCall { .. }))
    }
}

/// One part of a model response.
///
/// Parts carry no `usage` or `timestamp` of their own; both are recorded
/// once on the enclosing [`ModelResponse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "part_kind", rename_all = "kebab-case")]
pub enum ResponsePart {
    /// Assistant text.
    Text {
        /// The text content.
        content: String,
    },
    /// A request to invoke a tool.
    ToolCall {
        /// Unique id for matching the eventual tool return.
        id: String,
        /// Name of the tool to invoke.
        tool_name: String,
        /// Arguments as a JSON value.
        args: Value,
    },
}

impl ResponsePart {
    /// A tool-call part with a freshly minted id.
    #[must_use]
    pub fn tool_call(tool_name: impl Into<String>, args: Value) -> Self {
        Self::ToolCall {
            id: uuid::Uuid::new_v4().to_string(),
            tool_name: tool_name.into(),
            args,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    mod construction {
        use super::*;

        #[test]
        fn user_request_has_one_part() {
            let req = ModelRequest::user("hello");
            assert_eq!(req.parts.len(), 1);
            assert!(matches!(&req.parts[0], RequestPart::UserPrompt { content, .. } if content == "hello"));
        }

        #[test]
        fn text_content_concatenates_in_order() {
            let resp = ModelResponse::new(vec![
                ResponsePart::Text {
                    content: "foo".into(),
                },
                ResponsePart::tool_call("now", json!({})),
                ResponsePart::Text {
                    content: "bar".into(),
                },
            ]);
            assert_eq!(resp.text_content(), "foobar");
            assert!(resp.has_tool_calls());
            assert_eq!(resp.tool_calls().len(), 1);
        }

        #[test]
        fn tool_call_ids_are_unique() {
            let a = ResponsePart::tool_call("a", json!({}));
            let b = ResponsePart::tool_call("a", json!({}));
            let (ResponsePart::ToolCall { id: id_a, .. }, ResponsePart::ToolCall { id: id_b, .. }) =
                (&a, &b)
            else {
                panic!("expected tool calls");
            };
            assert_ne!(id_a, id_b);
        }

        #[test]
        fn message_accessors() {
            let req = Message::Request(ModelRequest::user("hi"));
            let resp = Message::Response(ModelResponse::text("hello"));
            assert!(req.as_request().is_some());
            assert!(req.as_response().is_none());
            assert!(resp.as_response().is_some());
        }
    }

    mod serde_round_trip {
        use super::*;

        #[test]
        fn request_parts_use_stable_tags() {
            let req = ModelRequest::new(vec![
                RequestPart::system("be brief"),
                RequestPart::user("hi"),
                RequestPart::tool_return("now", "call-1", json!("2026-01-01")),
                RequestPart::retry("try again", Some("now".into()), Some("call-1".into())),
            ]);
            let value = serde_json::to_value(&req).unwrap();
            let kinds: Vec<&str> = value["parts"]
                .as_array()
                .unwrap()
                .iter()
                .map(|p| p["part_kind"].as_str().unwrap())
                .collect();
            assert_eq!(kinds, vec!["system", "user", "tool-return", "retry-prompt"]);
        }

        #[test]
        fn response_parts_use_stable_tags() {
            let resp = ModelResponse::new(vec![
                ResponsePart::Text {
                    content: "hi".into(),
                },
                ResponsePart::tool_call("now", json!({})),
            ]);
            let value = serde_json::to_value(&resp).unwrap();
            assert_eq!(value["parts"][0]["part_kind"], "text");
            assert_eq!(value["parts"][1]["part_kind"], "tool-call");
        }

        #[test]
        fn usage_and_timestamp_live_on_the_response_not_its_parts() {
            let resp = ModelResponse::new(vec![
                ResponsePart::Text {
                    content: "hi".into(),
                },
                ResponsePart::tool_call("now", json!({})),
            ])
            .with_usage(RunUsage::request(50, 10));
            let value = serde_json::to_value(&resp).unwrap();
            assert!(value.get("timestamp").is_some());
            assert!(value.get("usage").is_some());
            for part in value["parts"].as_array().unwrap() {
                assert!(part.get("timestamp").is_none());
                assert!(part.get("usage").is_none());
            }
        }

        #[test]
        fn history_round_trips_losslessly() {
            let history = vec![
                Message::Request(ModelRequest::new(vec![
                    RequestPart::system("be brief"),
                    RequestPart::user("roll the dice"),
                ])),
                Message::Response(
                    ModelResponse::new(vec![ResponsePart::tool_call("roll", json!({"sides": 6}))])
                        .with_usage(RunUsage::request(50, 10))
                        .with_model_name("stub"),
                ),
                Message::Request(ModelRequest::new(vec![RequestPart::tool_return(
                    "roll",
                    "call-1",
                    json!(4),
                )])),
                Message::Response(ModelResponse::text("you rolled a 4")),
            ];
            let json = serde_json::to_string(&history).unwrap();
            let back: Vec<Message> = serde_json::from_str(&json).unwrap();
            assert_eq!(history, back);
        }

        #[test]
        fn timestamps_survive_round_trip_exactly() {
            let part = RequestPart::user("hi");
            let RequestPart::UserPrompt { timestamp, .. } = &part else {
                panic!("expected user prompt");
            };
            let original = *timestamp;
            let json = serde_json::to_string(&part).unwrap();
            let back: RequestPart = serde_json::from_str(&json).unwrap();
            let RequestPart::UserPrompt { timestamp, .. } = back else {
                panic!("expected user prompt");
            };
            assert_eq!(original, timestamp);
        }

        #[test]
        fn message_kind_tag() {
            let msg = Message::Request(ModelRequest::user("hi"));
            let value = serde_json::to_value(&msg).unwrap();
            assert_eq!(value["kind"], "request");
            let msg = Message::Response(ModelResponse::text("yo"));
            let value = serde_json::to_value(&msg).unwrap();
            assert_eq!(value["kind"], "response");
        }

        #[test]
        fn retry_prompt_omits_absent_attribution() {
            let part = RequestPart::retry("fix the output", None, None);
            let value = serde_json::to_value(&part).unwrap();
            assert!(value.get("tool_name").is_none());
            assert!(value.get("tool_call_id").is_none());
        }
    }
}
