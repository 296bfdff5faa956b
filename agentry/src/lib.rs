//! Agentry is a run-loop orchestration engine for conversational agents.
//!
//! An [`Agent`] pairs a model with instructions, composable toolsets, and a
//! typed output. Each run drives a state machine: the model is called with
//! the history and the currently resolved tools; tool calls are dispatched
//! concurrently and fed back; final candidates are parsed and validated,
//! with recoverable failures retried against explicit budgets. Usage is
//! accounted in shared atomic counters so a tree of delegating agents is
//! metered against a single [`UsageLimits`] budget.
//!
//! ```rust,ignore
//! use agentry::prelude::*;
//!
//! let agent: Agent<(), String> = Agent::new(StubModel::new(vec![
//!     StubResponse::text("hello"),
//! ]))
//! .instructions("Reply concisely.");
//!
//! let result = agent.run("say hello", ()).await?;
//! assert_eq!(result.output, "hello");
//! ```
//!
//! Streaming runs surface progress as [`RunEvent`]s, including debounced
//! partial-output snapshots whose last value always equals the blocking
//! result for the same responses.

pub mod agent;
pub mod context;
pub mod error;
pub mod message;
pub mod model;
pub mod output;
pub mod stream;
pub mod tool;
pub mod toolset;
pub mod usage;

pub use agent::{Agent, Instructions, RunConfig, RunEvent, RunResult};
pub use context::RunContext;
pub use error::{AgentRunError, Error, ModelError, ModelRetry, Result, ToolError};
pub use message::{Message, ModelRequest, ModelResponse, RequestPart, ResponsePart};
pub use model::{Model, ModelEventStream, ModelSettings, SharedModel, StubModel, StubResponse};
pub use output::{AgentOutput, FunctionValidator, Json, OutputSchema, OutputValidator};
pub use stream::{ModelEvent, ResponseAggregator};
pub use tool::{FunctionTool, SharedTool, Tool, ToolDefinition};
pub use toolset::{
    CombinedToolset, DynamicToolset, FunctionToolset, PrefixedToolset, ResolvedTools,
    SharedToolset, Toolset, ToolsetExt,
};
pub use usage::{RunUsage, SharedUsage, UsageLimitError, UsageLimits};

/// Everything most callers need, in one import.
pub mod prelude {
    pub use crate::agent::{Agent, RunConfig, RunEvent, RunResult};
    pub use crate::context::RunContext;
    pub use crate::error::{AgentRunError, Error, ModelRetry, Result, ToolError};
    pub use crate::message::{Message, ModelRequest, ModelResponse, RequestPart, ResponsePart};
    pub use crate::model::{Model, ModelSettings, StubModel, StubResponse};
    pub use crate::output::{AgentOutput, Json, OutputValidator};
    pub use crate::tool::{FunctionTool, Tool, ToolDefinition};
    pub use crate::toolset::{
        CombinedToolset, DynamicToolset, FunctionToolset, Toolset, ToolsetExt,
    };
    pub use crate::usage::{RunUsage, SharedUsage, UsageLimits};
}
