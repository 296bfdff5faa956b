//! Tools callable by the model.
//!
//! A [`Tool`] exposes a name, a JSON schema for its arguments, and an async
//! handler. [`FunctionTool`] wraps an async closure with typed arguments,
//! deriving the schema from the argument type and serde-validating incoming
//! arguments before the handler runs. A schema mismatch is fatal; handlers
//! signal recoverable failures with [`ToolError::Retry`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::RunContext;
use crate::error::ToolError;

/// A tool's wire-visible shape, sent to the model with each request.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct ToolDefinition {
    /// Name the model uses to call the tool.
    pub name: String,
    /// What the tool does, shown to the model.
    pub description: String,
    /// JSON schema for the tool's arguments.
    pub parameters: Value,
}

impl ToolDefinition {
    /// Create a definition.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// An executable tool the model can call during a run.
#[async_trait]
pub trait Tool<D>: Send + Sync {
    /// Name the model uses to call the tool. Unique within a resolved set.
    fn name(&self) -> &str;

    /// Description shown to the model.
    fn description(&self) -> &str {
        ""
    }

    /// JSON schema for the tool's arguments.
    fn parameters_schema(&self) -> Value;

    /// Per-tool retry budget override; `None` uses the agent default.
    fn max_retries(&self) -> Option<usize> {
        None
    }

    /// Execute the tool with the given arguments.
    async fn call(&self, ctx: RunContext<D>, args: Value) -> Result<Value, ToolError>;

    /// The wire-visible definition for this tool.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters_schema())
    }
}

/// Shared handle to a tool.
pub type SharedTool<D> = Arc<dyn Tool<D>>;

/// Generate a JSON schema for `T`, stripped of the meta `$schema` field.
pub(crate) fn json_schema_for<T: JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    let mut value = serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object"}));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
    }
    value
}

/// Deserialize tool arguments, accepting both JSON values and JSON-in-a-string.
pub(crate) fn parse_args<A: DeserializeOwned>(args: &Value) -> Result<A, ToolError> {
    match args {
        Value::String(raw) => serde_json::from_str(raw).map_err(ToolError::from),
        other => serde_json::from_value(other.clone()).map_err(ToolError::from),
    }
}

type Handler<D> = dyn Fn(RunContext<D>, Value) -> BoxFuture<'static, Result<Value, ToolError>>
    + Send
    + Sync;

/// A [`Tool`] built from an async closure with typed arguments.
///
/// The argument type's [`JsonSchema`] derivation becomes the tool's parameter
/// schema, and arguments are deserialized into it before the closure runs.
pub struct FunctionTool<D> {
    name: String,
    description: String,
    parameters: Value,
    max_retries: Option<usize>,
    handler: Arc<Handler<D>>,
}

impl<D: Send + Sync + 'static> FunctionTool<D> {
    /// Wrap an async closure as a tool.
    ///
    /// The closure receives a clone of the run context and the deserialized
    /// arguments; its return value is serialized as the tool result.
    pub fn new<A, O, F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: F,
    ) -> Self
    where
        A: DeserializeOwned + JsonSchema + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(RunContext<D>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, ToolError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let erased = move |ctx: RunContext<D>, raw: Value| -> BoxFuture<'static, Result<Value, ToolError>> {
            let handler = Arc::clone(&handler);
            async move {
                let args: A = parse_args(&raw)?;
                let output = handler(ctx, args).await?;
                serde_json::to_value(output).map_err(|e| ToolError::execution(e.to_string()))
            }
            .boxed()
        };
        Self {
            name: name.into(),
            description: description.into(),
            parameters: json_schema_for::<A>(),
            max_retries: None,
            handler: Arc::new(erased),
        }
    }

    /// Override the per-tool retry budget.
    #[must_use]
    pub const fn with_retries(mut self, retries: usize) -> Self {
        self.max_retries = Some(retries);
        self
    }
}

#[async_trait]
impl<D: Send + Sync + 'static> Tool<D> for FunctionTool<D> {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.parameters.clone()
    }

    fn max_retries(&self) -> Option<usize> {
        self.max_retries
    }

    async fn call(&self, ctx: RunContext<D>, args: Value) -> Result<Value, ToolError> {
        (self.handler)(ctx, args).await
    }
}

impl<D> fmt::Debug for FunctionTool<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}
