//! Per-run context handed to tools, resolvers, and validators.

use std::fmt;
use std::sync::Arc;

use crate::message::Message;
use crate::usage::{RunUsage, SharedUsage};

/// A read-only view of a run, threaded through every extension point.
///
/// Cheap to clone. Tool handlers, dynamic toolset resolvers, instructions
/// functions, and output validators all receive a `RunContext` carrying the
/// run's dependencies, its shared usage counters, the current step index,
/// and a snapshot of the history at the start of the step.
///
/// For agent delegation, a tool handler clones [`RunContext::usage`] and
/// passes it to the nested run so that the whole tree shares one budget.
pub struct RunContext<D> {
    deps: Arc<D>,
    usage: SharedUsage,
    run_step: usize,
    messages: Arc<Vec<Message>>,
}

impl<D> RunContext<D> {
    pub(crate) fn new(deps: Arc<D>, usage: SharedUsage) -> Self {
        Self {
            deps,
            usage,
            run_step: 0,
            messages: Arc::new(Vec::new()),
        }
    }

    /// The run's dependencies.
    #[must_use]
    pub fn deps(&self) -> &D {
        &self.deps
    }

    /// The shared usage counters for this run's delegation tree.
    #[must_use]
    pub const fn usage(&self) -> &SharedUsage {
        &self.usage
    }

    /// A point-in-time copy of the usage totals.
    #[must_use]
    pub fn usage_snapshot(&self) -> RunUsage {
        self.usage.snapshot()
    }

    /// Zero-based index of the current step.
    #[must_use]
    pub const fn run_step(&self) -> usize {
        self.run_step
    }

    /// The message history as of the start of the current step.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub(crate) fn set_step(&mut self, step: usize) {
        self.run_step = step;
    }

    pub(crate) fn set_messages(&mut self, messages: Arc<Vec<Message>>) {
        self.messages = messages;
    }
}

impl<D> Clone for RunContext<D> {
    fn clone(&self) -> Self {
        Self {
            deps: Arc::clone(&self.deps),
            usage: self.usage.clone(),
            run_step: self.run_step,
            messages: Arc::clone(&self.messages),
        }
    }
}

impl<D> fmt::Debug for RunContext<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("run_step", &self.run_step)
            .field("usage", &self.usage.snapshot())
            .field("messages", &self.messages.len())
            .finish_non_exhaustive()
    }
}
