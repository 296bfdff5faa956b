//! Unified error types for the agentry engine.
//!
//! The taxonomy distinguishes three classes of failure:
//! - recoverable retry signals ([`ModelRetry`]), which never escape the run
//!   loop — they are turned into feedback for the next model call;
//! - fatal errors ([`Error`]), which abort the run;
//! - usage-limit violations ([`UsageLimitError`]), always fatal and never
//!   retried.
//!
//! A failed run surfaces as [`AgentRunError`], which carries the partial
//! message history and the usage consumed up to the failure point.

use crate::message::Message;
use crate::usage::{RunUsage, UsageLimitError};

/// Result type alias for agentry operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A fatal error raised while driving an agent run.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The model provider failed.
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// A usage limit was exceeded.
    #[error("usage limit exceeded: {0}")]
    UsageLimit(#[from] UsageLimitError),

    /// The model produced a response the run controller cannot interpret,
    /// such as a call to an unknown tool or a response with no usable parts.
    #[error("unexpected model behavior: {0}")]
    UnexpectedModelBehavior(String),

    /// A tool handler failed with a non-recoverable error.
    #[error("tool '{tool_name}' failed: {source}")]
    ToolFailure {
        /// Name of the tool whose handler failed.
        tool_name: String,
        /// The underlying tool error.
        #[source]
        source: ToolError,
    },

    /// A retry budget was exhausted; the last recoverable failure becomes fatal.
    #[error("exceeded retry budget of {budget} for {scope}")]
    RetryBudgetExceeded {
        /// What the budget applied to, e.g. `tool 'roulette'` or `output validation`.
        scope: String,
        /// The configured budget.
        budget: usize,
    },

    /// Toolset composition produced an invalid tool collection.
    #[error("toolset configuration error: {0}")]
    ToolsetConfiguration(String),

    /// The step limit was reached without a final output.
    #[error("maximum steps ({max_steps}) reached without final output")]
    MaxSteps {
        /// The configured step limit.
        max_steps: usize,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an unexpected-model-behavior error.
    #[must_use]
    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::UnexpectedModelBehavior(msg.into())
    }

    /// Create a toolset configuration error.
    #[must_use]
    pub fn toolset(msg: impl Into<String>) -> Self {
        Self::ToolsetConfiguration(msg.into())
    }

    /// Returns `true` if this error was caused by a usage limit.
    #[must_use]
    pub const fn is_usage_limit(&self) -> bool {
        matches!(self, Self::UsageLimit(_))
    }

    /// Returns `true` if this error was caused by an exhausted retry budget.
    #[must_use]
    pub const fn is_retry_budget(&self) -> bool {
        matches!(self, Self::RetryBudgetExceeded { .. })
    }
}

/// A recoverable signal asking the model to try again.
///
/// Raised by tool handlers and output validators; the run controller turns
/// it into a retry prompt that is fed back to the model instead of aborting
/// the run. Only when the relevant retry budget is exhausted does it become
/// fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ModelRetry {
    /// Human-readable explanation shown to the model.
    pub message: String,
}

impl ModelRetry {
    /// Create a new retry signal with the given explanation.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for ModelRetry {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for ModelRetry {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Error type for tool handler execution.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum ToolError {
    /// Recoverable failure: ask the model to correct itself and call again.
    #[error("{0}")]
    Retry(#[from] ModelRetry),

    /// The supplied arguments did not match the tool's schema. Fatal.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The handler failed in a way the model cannot correct. Fatal.
    #[error("execution failed: {0}")]
    Execution(String),
}

impl ToolError {
    /// Create a recoverable retry signal.
    #[must_use]
    pub fn retry(msg: impl Into<String>) -> Self {
        Self::Retry(ModelRetry::new(msg))
    }

    /// Create an invalid-arguments error.
    #[must_use]
    pub fn invalid_args(msg: impl Into<String>) -> Self {
        Self::InvalidArguments(msg.into())
    }

    /// Create an execution error.
    #[must_use]
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Returns `true` if this is a recoverable retry signal.
    #[must_use]
    pub const fn is_retry(&self) -> bool {
        matches!(self, Self::Retry(_))
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidArguments(err.to_string())
    }
}

/// Error type for model provider operations.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum ModelError {
    /// The provider does not support the requested feature.
    #[error("feature not supported: {0}")]
    NotSupported(String),

    /// Provider-reported failure.
    #[error("{0}")]
    Provider(String),

    /// The delta stream failed mid-response.
    #[error("stream error: {0}")]
    Stream(String),
}

impl ModelError {
    /// Create a not-supported error.
    #[must_use]
    pub fn not_supported(feature: impl Into<String>) -> Self {
        Self::NotSupported(feature.into())
    }

    /// Create a provider error.
    #[must_use]
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Create a stream error.
    #[must_use]
    pub fn stream(msg: impl Into<String>) -> Self {
        Self::Stream(msg.into())
    }
}

/// A failed agent run, carrying the accumulated history for diagnosis.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct AgentRunError {
    /// The fatal error that aborted the run.
    #[source]
    pub error: Error,
    /// The message history accumulated up to the failure point.
    pub messages: Vec<Message>,
    /// The usage recorded up to the failure point.
    pub usage: RunUsage,
}

impl AgentRunError {
    /// The fatal error that aborted the run.
    #[must_use]
    pub const fn kind(&self) -> &Error {
        &self.error
    }
}
