//! Composable collections of tools.
//!
//! A [`Toolset`] produces the tools available for one step of a run. The run
//! controller re-resolves the agent's toolsets at the start of every step, so
//! dynamic sets can change shape between steps while each step stays
//! internally consistent: the set sent to the model is the set used to
//! dispatch that step's calls.
//!
//! Composition never silently drops or overrides a tool. Any name collision
//! in the final resolved set is a configuration error.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::RunContext;
use crate::error::{Error, Result, ToolError};
use crate::tool::{SharedTool, Tool, ToolDefinition};

/// A source of tools for a run step.
///
/// Resolution is synchronous and must be deterministic for a given context.
pub trait Toolset<D>: Send + Sync {
    /// Produce the tools available under this set for the given context.
    fn resolve(&self, ctx: &RunContext<D>) -> Result<Vec<SharedTool<D>>>;
}

/// Shared handle to a toolset.
pub type SharedToolset<D> = Arc<dyn Toolset<D>>;

/// Combinators available on every toolset.
pub trait ToolsetExt<D>: Toolset<D> + Sized + 'static {
    /// Rename every tool in this set to `"<prefix>_<name>"`.
    fn prefixed(self, prefix: impl Into<String>) -> PrefixedToolset<D> {
        PrefixedToolset::new(Arc::new(self), prefix)
    }
}

impl<D, T: Toolset<D> + Sized + 'static> ToolsetExt<D> for T {}

/// An ordered, static collection of tools.
pub struct FunctionToolset<D> {
    tools: Vec<SharedTool<D>>,
}

impl<D> FunctionToolset<D> {
    /// Create an empty toolset.
    #[must_use]
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Add a tool, builder style.
    #[must_use]
    pub fn tool(mut self, tool: impl Tool<D> + 'static) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    /// Add an already-shared tool, builder style.
    #[must_use]
    pub fn shared_tool(mut self, tool: SharedTool<D>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Number of tools in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if the set holds no tools.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl<D> Default for FunctionToolset<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Send + Sync> Toolset<D> for FunctionToolset<D> {
    fn resolve(&self, _ctx: &RunContext<D>) -> Result<Vec<SharedTool<D>>> {
        Ok(self.tools.clone())
    }
}

impl<D> fmt::Debug for FunctionToolset<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionToolset")
            .field("tools", &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>())
            .finish()
    }
}

struct PrefixedTool<D> {
    name: String,
    inner: SharedTool<D>,
}

#[async_trait]
impl<D: Send + Sync + 'static> Tool<D> for PrefixedTool<D> {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn parameters_schema(&self) -> Value {
        self.inner.parameters_schema()
    }

    fn max_retries(&self) -> Option<usize> {
        self.inner.max_retries()
    }

    async fn call(&self, ctx: RunContext<D>, args: Value) -> Result<Value, ToolError> {
        self.inner.call(ctx, args).await
    }
}

/// A toolset whose tools are renamed to `"<prefix>_<name>"`.
///
/// Lets two sets exposing the same tool names coexist in one agent.
pub struct PrefixedToolset<D> {
    inner: SharedToolset<D>,
    prefix: String,
}

impl<D> PrefixedToolset<D> {
    /// Wrap a toolset under the given prefix.
    #[must_use]
    pub fn new(inner: SharedToolset<D>, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
        }
    }
}

impl<D: Send + Sync + 'static> Toolset<D> for PrefixedToolset<D> {
    fn resolve(&self, ctx: &RunContext<D>) -> Result<Vec<SharedTool<D>>> {
        let tools = self.inner.resolve(ctx)?;
        Ok(tools
            .into_iter()
            .map(|tool| {
                let name = format!("{}_{}", self.prefix, tool.name());
                Arc::new(PrefixedTool { name, inner: tool }) as SharedTool<D>
            })
            .collect())
    }
}

impl<D> fmt::Debug for PrefixedToolset<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefixedToolset")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

/// A left-to-right union of toolsets.
///
/// Order is preserved across members; a name appearing in more than one
/// member is a configuration error surfaced at resolution.
pub struct CombinedToolset<D> {
    members: Vec<SharedToolset<D>>,
}

impl<D> CombinedToolset<D> {
    /// Combine the given toolsets.
    #[must_use]
    pub fn new(members: Vec<SharedToolset<D>>) -> Self {
        Self { members }
    }
}

impl<D: Send + Sync> Toolset<D> for CombinedToolset<D> {
    fn resolve(&self, ctx: &RunContext<D>) -> Result<Vec<SharedTool<D>>> {
        let mut tools = Vec::new();
        for member in &self.members {
            tools.extend(member.resolve(ctx)?);
        }
        Ok(tools)
    }
}

impl<D> fmt::Debug for CombinedToolset<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CombinedToolset")
            .field("members", &self.members.len())
            .finish()
    }
}

/// A toolset chosen per step by a resolver function.
///
/// The resolver is re-invoked at the start of every step, so the available
/// tools can depend on the step index, the history, or the dependencies.
pub struct DynamicToolset<D> {
    resolver: Arc<dyn Fn(&RunContext<D>) -> SharedToolset<D> + Send + Sync>,
}

impl<D> DynamicToolset<D> {
    /// Create a dynamic toolset from a resolver function.
    pub fn new<F>(resolver: F) -> Self
    where
        F: Fn(&RunContext<D>) -> SharedToolset<D> + Send + Sync + 'static,
    {
        Self {
            resolver: Arc::new(resolver),
        }
    }
}

impl<D: Send + Sync> Toolset<D> for DynamicToolset<D> {
    fn resolve(&self, ctx: &RunContext<D>) -> Result<Vec<SharedTool<D>>> {
        (self.resolver)(ctx).resolve(ctx)
    }
}

impl<D> fmt::Debug for DynamicToolset<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicToolset").finish_non_exhaustive()
    }
}

/// The flattened, validated set of tools for one run step.
///
/// Preserves resolution order and enforces global name uniqueness.
pub struct ResolvedTools<D> {
    tools: Vec<SharedTool<D>>,
    by_name: HashMap<String, usize>,
}

impl<D> ResolvedTools<D> {
    /// Validate a flattened tool list, rejecting duplicate names.
    pub fn from_tools(tools: Vec<SharedTool<D>>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(tools.len());
        for (index, tool) in tools.iter().enumerate() {
            if by_name.insert(tool.name().to_owned(), index).is_some() {
                return Err(Error::toolset(format!(
                    "duplicate tool name '{}'",
                    tool.name()
                )));
            }
        }
        Ok(Self { tools, by_name })
    }

    /// Wire-visible definitions, in resolution order.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|tool| tool.definition()).collect()
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SharedTool<D>> {
        self.by_name.get(name).map(|&index| &self.tools[index])
    }

    /// Tool names in resolution order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }

    /// Number of tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if no tools resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl<D> fmt::Debug for ResolvedTools<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedTools")
            .field("tools", &self.names())
            .finish()
    }
}
