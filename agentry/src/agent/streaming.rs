//! The streamed run loop.
//!
//! `Agent::run_stream` drives the same state machine as the blocking path
//! but surfaces progress as [`RunEvent`]s: text deltas as they arrive,
//! tool-call lifecycle events, and debounced partial-output snapshots.
//! Dropping the stream cancels the run; nothing partial is committed to
//! history, because a step's response only enters history once its delta
//! stream completes.

use async_stream::try_stream;
use futures::{Stream, StreamExt};

use super::runner::{RunState, StepOutcome};
use super::{Agent, RunConfig, RunResult};
use crate::error::{AgentRunError, Error};
use crate::output::AgentOutput;
use crate::stream::{ModelEvent, ResponseAggregator};
use tokio::time::Instant;

/// Progress events from a streamed run.
#[derive(Debug)]
#[non_exhaustive]
pub enum RunEvent<O> {
    /// The run started.
    RunStarted,
    /// A step began.
    StepStarted {
        /// Zero-based step index.
        step: usize,
    },
    /// A fragment of assistant text arrived.
    TextDelta {
        /// The text fragment.
        content: String,
    },
    /// The model started a tool call.
    ToolCallStarted {
        /// Id of the call.
        id: String,
        /// Name of the tool.
        tool_name: String,
    },
    /// A dispatched tool call finished.
    ToolCallCompleted {
        /// Id of the call.
        id: String,
        /// Name of the tool.
        tool_name: String,
        /// Whether the tool asked for a retry instead of returning.
        retried: bool,
    },
    /// A parse of the output so far.
    ///
    /// Snapshots are advisory and debounced; the last snapshot of a run
    /// always equals the final output.
    OutputSnapshot(O),
    /// The run finished.
    Completed(Box<RunResult<O>>),
}

impl<D: Send + Sync + 'static, O: AgentOutput + Clone> Agent<D, O> {
    /// Run the agent, surfacing progress as a stream of events.
    ///
    /// The stream ends with [`RunEvent::Completed`] on success or a single
    /// [`AgentRunError`] item on failure.
    pub fn run_stream(
        &self,
        prompt: impl Into<String>,
        deps: D,
        config: RunConfig,
    ) -> impl Stream<Item = Result<RunEvent<O>, AgentRunError>> + Send + '_ {
        let prompt = prompt.into();
        let debounce = config.debounce;
        try_stream! {
            let mut state = RunState::new(self, prompt, deps, config);
            yield RunEvent::RunStarted;
            loop {
                state.check_step_allowed().map_err(|e| state.fail(e))?;
                yield RunEvent::StepStarted { step: state.step() };

                let resolved = state.resolve_tools().map_err(|e| state.fail(e))?;
                state.check_request_allowed().map_err(|e| state.fail(e))?;
                let definitions = resolved.definitions();
                let opened = self
                    .model
                    .request_stream(state.history(), &definitions, &self.settings)
                    .await;
                let mut events = opened.map_err(|e| state.fail(Error::Model(e)))?;

                let mut aggregator = ResponseAggregator::new();
                let mut last_snapshot: Option<Instant> = None;
                while let Some(event) = events.next().await {
                    let event = event.map_err(|e| state.fail(Error::Model(e)))?;
                    aggregator.apply(&event);
                    match event {
                        ModelEvent::TextDelta { content } => {
                            yield RunEvent::TextDelta { content };
                            // a step that calls tools cannot be final, so its
                            // text never yields output snapshots
                            if !aggregator.has_tool_calls() {
                                let due = last_snapshot
                                    .is_none_or(|at| at.elapsed() >= debounce);
                                if due {
                                    if let Some(snapshot) =
                                        O::from_partial_text(aggregator.text())
                                    {
                                        last_snapshot = Some(Instant::now());
                                        yield RunEvent::OutputSnapshot(snapshot);
                                    }
                                }
                            }
                        }
                        ModelEvent::ToolCallStart { id, tool_name, .. } => {
                            yield RunEvent::ToolCallStarted { id, tool_name };
                        }
                        _ => {}
                    }
                }

                let response = aggregator.into_response();
                state.record_response(&response).map_err(|e| state.fail(e))?;
                let outcome = state
                    .process_response(&response, &resolved)
                    .await
                    .map_err(|e| state.fail(e))?;
                match outcome {
                    StepOutcome::Done(output) => {
                        yield RunEvent::OutputSnapshot(output.clone());
                        let result = state.finish(output);
                        yield RunEvent::Completed(Box::new(result));
                        break;
                    }
                    StepOutcome::Continue { executed } => {
                        for call in executed {
                            yield RunEvent::ToolCallCompleted {
                                id: call.id,
                                tool_name: call.tool_name,
                                retried: call.retried,
                            };
                        }
                    }
                }
            }
        }
    }
}
