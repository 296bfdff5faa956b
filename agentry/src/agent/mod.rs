//! Agents: immutable run configuration plus the entry points that drive runs.

pub mod result;
mod runner;
mod streaming;

pub use result::RunResult;
pub use streaming::RunEvent;

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;
use tracing::info_span;

use crate::context::RunContext;
use crate::error::AgentRunError;
use crate::message::{Message, RequestPart};
use crate::model::{Model, ModelSettings, SharedModel};
use crate::output::{AgentOutput, FunctionValidator, OutputValidator, SharedValidator};
use crate::tool::{SharedTool, Tool};
use crate::toolset::{SharedToolset, Toolset};
use crate::usage::{SharedUsage, UsageLimits};

use runner::RunState;

/// Default agent-scoped output retry budget.
const DEFAULT_OUTPUT_RETRIES: usize = 1;
/// Default per-tool retry budget.
const DEFAULT_TOOL_RETRIES: usize = 1;
/// Default cap on run steps.
const DEFAULT_MAX_STEPS: usize = 50;

/// System-prompt text for an agent, static or derived from the run context.
pub enum Instructions<D> {
    /// Fixed text.
    Static(String),
    /// Text computed from the run context at the start of a run.
    Dynamic(Arc<dyn Fn(&RunContext<D>) -> String + Send + Sync>),
}

impl<D> fmt::Debug for Instructions<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(text) => f.debug_tuple("Static").field(text).finish(),
            Self::Dynamic(_) => f.debug_tuple("Dynamic").finish(),
        }
    }
}

/// Per-run options.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Prior conversation to resume from.
    pub message_history: Vec<Message>,
    /// Usage counters to record into; supply a parent's counters to meter a
    /// delegation tree against one budget. Fresh counters when `None`.
    pub usage: Option<SharedUsage>,
    /// Ceilings enforced during the run.
    pub usage_limits: UsageLimits,
    /// Minimum interval between streamed output snapshots.
    pub debounce: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            message_history: Vec::new(),
            usage: None,
            usage_limits: UsageLimits::none(),
            debounce: Duration::from_millis(100),
        }
    }
}

impl RunConfig {
    /// Resume from a prior conversation.
    #[must_use]
    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.message_history = history;
        self
    }

    /// Record usage into existing shared counters.
    #[must_use]
    pub fn with_usage(mut self, usage: SharedUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Enforce usage ceilings.
    #[must_use]
    pub const fn with_limits(mut self, limits: UsageLimits) -> Self {
        self.usage_limits = limits;
        self
    }

    /// Set the streamed-snapshot debounce interval.
    #[must_use]
    pub const fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

/// An immutable agent: a model, instructions, toolsets, and an output type.
///
/// `D` is the dependency type handed to every tool, resolver, and validator;
/// `O` is the output type, defaulting to plain text. Construction is builder
/// style and all per-run state lives elsewhere, so one agent value can drive
/// any number of concurrent runs.
pub struct Agent<D, O = String> {
    pub(crate) name: String,
    pub(crate) model: SharedModel,
    pub(crate) instructions: Vec<Instructions<D>>,
    pub(crate) tools: Vec<SharedTool<D>>,
    pub(crate) toolsets: Vec<SharedToolset<D>>,
    pub(crate) validators: Vec<SharedValidator<D, O>>,
    pub(crate) output_retries: usize,
    pub(crate) tool_retries: usize,
    pub(crate) max_steps: usize,
    pub(crate) settings: ModelSettings,
    _output: PhantomData<fn() -> O>,
}

impl<D: Send + Sync + 'static, O: AgentOutput> Agent<D, O> {
    /// Create an agent driven by the given model.
    #[must_use]
    pub fn new(model: impl Model + 'static) -> Self {
        Self {
            name: "agent".to_owned(),
            model: Arc::new(model),
            instructions: Vec::new(),
            tools: Vec::new(),
            toolsets: Vec::new(),
            validators: Vec::new(),
            output_retries: DEFAULT_OUTPUT_RETRIES,
            tool_retries: DEFAULT_TOOL_RETRIES,
            max_steps: DEFAULT_MAX_STEPS,
            settings: ModelSettings::default(),
            _output: PhantomData,
        }
    }

    /// Name the agent, for spans and diagnostics.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Append static instructions.
    #[must_use]
    pub fn instructions(mut self, text: impl Into<String>) -> Self {
        self.instructions.push(Instructions::Static(text.into()));
        self
    }

    /// Append instructions computed from the run context.
    #[must_use]
    pub fn instructions_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&RunContext<D>) -> String + Send + Sync + 'static,
    {
        self.instructions.push(Instructions::Dynamic(Arc::new(f)));
        self
    }

    /// Register a tool directly on the agent.
    #[must_use]
    pub fn tool(mut self, tool: impl Tool<D> + 'static) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    /// Register a toolset.
    #[must_use]
    pub fn toolset(mut self, toolset: impl Toolset<D> + 'static) -> Self {
        self.toolsets.push(Arc::new(toolset));
        self
    }

    /// Register an already-shared toolset.
    #[must_use]
    pub fn shared_toolset(mut self, toolset: SharedToolset<D>) -> Self {
        self.toolsets.push(toolset);
        self
    }

    /// Register an output validator from an async closure.
    #[must_use]
    pub fn output_validator<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(RunContext<D>, O) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, crate::error::ModelRetry>> + Send + 'static,
    {
        self.validators.push(Arc::new(FunctionValidator::new(f)));
        self
    }

    /// Register an output validator.
    #[must_use]
    pub fn validator(mut self, validator: impl OutputValidator<D, O> + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Set the agent-scoped output retry budget (default 1).
    #[must_use]
    pub const fn output_retries(mut self, retries: usize) -> Self {
        self.output_retries = retries;
        self
    }

    /// Set the default per-tool retry budget (default 1).
    #[must_use]
    pub const fn tool_retries(mut self, retries: usize) -> Self {
        self.tool_retries = retries;
        self
    }

    /// Cap the number of run steps (default 50).
    #[must_use]
    pub const fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Set provider request knobs.
    #[must_use]
    pub const fn model_settings(mut self, settings: ModelSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Run to completion with default per-run options.
    pub async fn run(
        &self,
        prompt: impl Into<String>,
        deps: D,
    ) -> Result<RunResult<O>, AgentRunError> {
        self.run_with(prompt, deps, RunConfig::default()).await
    }

    /// Run to completion with explicit per-run options.
    pub async fn run_with(
        &self,
        prompt: impl Into<String>,
        deps: D,
        config: RunConfig,
    ) -> Result<RunResult<O>, AgentRunError> {
        let span = info_span!("agent", name = %self.name, model = %self.model.name());
        let mut state = RunState::new(self, prompt.into(), deps, config);
        match state.run_to_completion().instrument(span).await {
            Ok(result) => Ok(result),
            Err(error) => Err(state.fail(error)),
        }
    }

    /// Materialize system-prompt parts for the start of a run.
    pub(crate) fn system_parts(&self, ctx: &RunContext<D>) -> Vec<RequestPart> {
        let mut parts = Vec::new();
        for instructions in &self.instructions {
            let text = match instructions {
                Instructions::Static(text) => text.clone(),
                Instructions::Dynamic(f) => f(ctx),
            };
            parts.push(RequestPart::system(text));
        }
        if let Some(schemas) = O::schemas() {
            if let Ok(encoded) = serde_json::to_string(&schemas) {
                parts.push(RequestPart::system(format!(
                    "Respond with a single JSON value matching one of these schemas: {encoded}"
                )));
            }
        }
        parts
    }
}

impl<D, O> fmt::Debug for Agent<D, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("model", &self.model.name())
            .field("instructions", &self.instructions.len())
            .field("tools", &self.tools.len())
            .field("toolsets", &self.toolsets.len())
            .field("validators", &self.validators.len())
            .field("output_retries", &self.output_retries)
            .field("tool_retries", &self.tool_retries)
            .finish_non_exhaustive()
    }
}
