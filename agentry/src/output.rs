//! Final-output handling: structural parsing and semantic validation.
//!
//! The agent's output type decides how a final model response is interpreted.
//! [`AgentOutput`] is implemented for [`String`] (plain text passes through
//! untouched) and for [`Json<T>`], which parses the response text into a
//! serde type and turns parse failures into retry feedback for the model.
//! Registered [`OutputValidator`]s then check semantics; both structural and
//! semantic rejections consume the agent-scoped output retry budget.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::RunContext;
use crate::error::ModelRetry;
use crate::tool::json_schema_for;

/// A named JSON schema describing one accepted output shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSchema {
    /// Name of the shape, taken from the Rust type.
    pub name: String,
    /// JSON schema for the shape.
    pub schema: Value,
}

/// How a final model response becomes a typed output.
pub trait AgentOutput: Sized + Send + 'static {
    /// Schemas for the accepted output shapes; `None` means plain text.
    fn schemas() -> Option<Vec<OutputSchema>>;

    /// Parse final response text into the output type.
    ///
    /// An `Err` is retry feedback: it is sent back to the model as a retry
    /// prompt and should name what an acceptable response looks like.
    fn from_text(text: &str) -> Result<Self, ModelRetry>;

    /// Attempt a parse of incomplete text for streaming snapshots.
    ///
    /// `None` suppresses the snapshot; it is never an error.
    fn from_partial_text(text: &str) -> Option<Self> {
        Self::from_text(text).ok()
    }
}

impl AgentOutput for String {
    fn schemas() -> Option<Vec<OutputSchema>> {
        None
    }

    fn from_text(text: &str) -> Result<Self, ModelRetry> {
        Ok(text.to_owned())
    }

    fn from_partial_text(text: &str) -> Option<Self> {
        Some(text.to_owned())
    }
}

/// Marks an agent's output as JSON parsed into `T`.
///
/// `T` supplies both the schema advertised to the model and the serde
/// deserialization of the final response. Unions of acceptable shapes are
/// ordinary Rust enums (tagged or `#[serde(untagged)]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    /// Unwrap the inner value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> AgentOutput for Json<T>
where
    T: DeserializeOwned + Serialize + JsonSchema + Send + 'static,
{
    fn schemas() -> Option<Vec<OutputSchema>> {
        Some(vec![OutputSchema {
            name: T::schema_name().into_owned(),
            schema: json_schema_for::<T>(),
        }])
    }

    fn from_text(text: &str) -> Result<Self, ModelRetry> {
        serde_json::from_str(text).map(Json).map_err(|e| {
            ModelRetry::new(format!(
                "response did not match the expected '{}' schema ({e}); \
                 reply with JSON matching that schema",
                T::schema_name()
            ))
        })
    }
}

/// A semantic check applied after structural parsing succeeds.
///
/// Returning `Err(ModelRetry)` sends the feedback back to the model and
/// consumes one unit of the agent's output retry budget. Validators may
/// also normalize the value by returning a modified `Ok`.
#[async_trait]
pub trait OutputValidator<D, O>: Send + Sync {
    /// Validate (and possibly rewrite) a candidate output.
    async fn validate(&self, ctx: RunContext<D>, output: O) -> Result<O, ModelRetry>;
}

/// Shared handle to an output validator.
pub type SharedValidator<D, O> = Arc<dyn OutputValidator<D, O>>;

type ValidatorFn<D, O> =
    dyn Fn(RunContext<D>, O) -> BoxFuture<'static, Result<O, ModelRetry>> + Send + Sync;

/// An [`OutputValidator`] built from an async closure.
pub struct FunctionValidator<D, O> {
    inner: Arc<ValidatorFn<D, O>>,
}

impl<D: Send + Sync + 'static, O: Send + 'static> FunctionValidator<D, O> {
    /// Wrap an async closure as a validator.
    pub fn new<F, Fut>(validator: F) -> Self
    where
        F: Fn(RunContext<D>, O) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, ModelRetry>> + Send + 'static,
    {
        let validator = Arc::new(validator);
        let erased = move |ctx: RunContext<D>, output: O| -> BoxFuture<'static, Result<O, ModelRetry>> {
            let validator = Arc::clone(&validator);
            async move { validator(ctx, output).await }.boxed()
        };
        Self {
            inner: Arc::new(erased),
        }
    }
}

#[async_trait]
impl<D: Send + Sync + 'static, O: Send + 'static> OutputValidator<D, O>
    for FunctionValidator<D, O>
{
    async fn validate(&self, ctx: RunContext<D>, output: O) -> Result<O, ModelRetry> {
        (self.inner)(ctx, output).await
    }
}

impl<D, O> fmt::Debug for FunctionValidator<D, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionValidator").finish_non_exhaustive()
    }
}
