//! The run state machine shared by the blocking and streaming paths.
//!
//! A run proceeds in steps. Each step resolves the agent's toolsets, checks
//! usage limits, sends the history to the model, records the response, and
//! classifies it: tool calls are dispatched concurrently and their results
//! appended as a new request, while a final candidate goes through structural
//! parsing and semantic validation. Recoverable failures become retry prompts
//! until their budget runs out.

use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

use futures::future;
use serde_json::Value;
use tracing::{Instrument, debug, info_span, warn};

use super::{Agent, RunConfig, RunResult};
use crate::context::RunContext;
use crate::error::{Error, ModelRetry, Result, ToolError};
use crate::message::{Message, ModelRequest, ModelResponse, RequestPart, ResponsePart};
use crate::output::AgentOutput;
use crate::toolset::ResolvedTools;
use crate::usage::{SharedUsage, UsageLimits};

/// A tool call that was dispatched during a step.
pub(crate) struct ExecutedCall {
    pub(crate) id: String,
    pub(crate) tool_name: String,
    pub(crate) retried: bool,
}

/// What a processed response means for the run.
pub(crate) enum StepOutcome<O> {
    /// The run produced its validated final output.
    Done(O),
    /// The run continues; tool returns or retry feedback were appended.
    Continue {
        executed: Vec<ExecutedCall>,
    },
}

/// All mutable state for one run.
pub(crate) struct RunState<'a, D, O: AgentOutput> {
    agent: &'a Agent<D, O>,
    ctx: RunContext<D>,
    messages: Vec<Message>,
    new_messages_start: usize,
    usage: SharedUsage,
    limits: UsageLimits,
    tool_retry_counts: HashMap<String, usize>,
    output_retries_used: usize,
    step: usize,
}

impl<'a, D: Send + Sync + 'static, O: AgentOutput> RunState<'a, D, O> {
    pub(crate) fn new(agent: &'a Agent<D, O>, prompt: String, deps: D, config: RunConfig) -> Self {
        let usage = config.usage.unwrap_or_default();
        let ctx = RunContext::new(Arc::new(deps), usage.clone());
        let mut messages = config.message_history;
        let new_messages_start = messages.len();

        let mut parts = agent.system_parts(&ctx);
        parts.push(RequestPart::user(prompt));
        messages.push(Message::Request(ModelRequest::new(parts)));

        let mut state = Self {
            agent,
            ctx,
            messages,
            new_messages_start,
            usage,
            limits: config.usage_limits,
            tool_retry_counts: HashMap::new(),
            output_retries_used: 0,
            step: 0,
        };
        state.sync_context();
        state
    }

    pub(crate) const fn step(&self) -> usize {
        self.step
    }

    pub(crate) fn history(&self) -> &[Message] {
        &self.messages
    }

    /// Drive the run to its final output without streaming.
    pub(crate) async fn run_to_completion(&mut self) -> Result<RunResult<O>> {
        loop {
            self.check_step_allowed()?;
            let resolved = self.resolve_tools()?;
            self.check_request_allowed()?;
            let definitions = resolved.definitions();
            debug!(step = self.step, tools = definitions.len(), "requesting model response");
            let response = self
                .agent
                .model
                .request(&self.messages, &definitions, &self.agent.settings)
                .await?;
            self.record_response(&response)?;
            match self.process_response(&response, &resolved).await? {
                StepOutcome::Done(output) => return Ok(self.finish(output)),
                StepOutcome::Continue { .. } => {}
            }
        }
    }

    /// Fail the step-count guard once the cap is reached.
    pub(crate) fn check_step_allowed(&self) -> Result<()> {
        if self.step >= self.agent.max_steps {
            return Err(Error::MaxSteps {
                max_steps: self.agent.max_steps,
            });
        }
        Ok(())
    }

    /// Flatten the agent's tools and toolsets for this step.
    pub(crate) fn resolve_tools(&self) -> Result<ResolvedTools<D>> {
        let mut tools = self.agent.tools.clone();
        for toolset in &self.agent.toolsets {
            tools.extend(toolset.resolve(&self.ctx)?);
        }
        ResolvedTools::from_tools(tools)
    }

    /// Enforce the request limit before contacting the model.
    pub(crate) fn check_request_allowed(&self) -> Result<()> {
        self.usage.check_before_request(&self.limits)?;
        Ok(())
    }

    /// Commit a model response: record usage, re-check token ceilings, and
    /// append the response to history.
    pub(crate) fn record_response(&mut self, response: &ModelResponse) -> Result<()> {
        self.usage.record(response.usage);
        self.messages.push(Message::Response(response.clone()));
        self.sync_context();
        self.usage.check_tokens(&self.limits)?;
        Ok(())
    }

    /// Classify a committed response and act on it.
    pub(crate) async fn process_response(
        &mut self,
        response: &ModelResponse,
        resolved: &ResolvedTools<D>,
    ) -> Result<StepOutcome<O>> {
        if response.parts.is_empty() {
            return Err(Error::unexpected("response contained no parts"));
        }
        if response.has_tool_calls() {
            let executed = self.execute_tool_calls(response, resolved).await?;
            return Ok(StepOutcome::Continue { executed });
        }
        self.try_finalize(response).await
    }

    /// Dispatch every tool call in the response concurrently, then reassemble
    /// the results into one request in the original call order.
    async fn execute_tool_calls(
        &mut self,
        response: &ModelResponse,
        resolved: &ResolvedTools<D>,
    ) -> Result<Vec<ExecutedCall>> {
        let calls: Vec<(String, String, Value)> = response
            .parts
            .iter()
            .filter_map(|part| match part {
                ResponsePart::ToolCall {
                    id,
                    tool_name,
                    args,
                } => Some((id.clone(), tool_name.clone(), args.clone())),
                ResponsePart::Text { .. } => None,
            })
            .collect();

        let mut futures = Vec::with_capacity(calls.len());
        for (_, tool_name, args) in &calls {
            let tool = resolved.get(tool_name).ok_or_else(|| {
                Error::unexpected(format!("model called unknown tool '{tool_name}'"))
            })?;
            let tool = Arc::clone(tool);
            let ctx = self.ctx.clone();
            let args = args.clone();
            let span = info_span!("tool", name = %tool_name);
            futures.push(async move { tool.call(ctx, args).await }.instrument(span));
        }
        let results = future::join_all(futures).await;

        let mut parts = Vec::with_capacity(calls.len());
        let mut executed = Vec::with_capacity(calls.len());
        for ((id, tool_name, _), result) in calls.into_iter().zip(results) {
            match result {
                Ok(value) => {
                    // a success closes the call cycle, so the budget starts
                    // fresh the next time this tool asks for a retry
                    self.tool_retry_counts.remove(&tool_name);
                    parts.push(RequestPart::tool_return(&tool_name, &id, value));
                    executed.push(ExecutedCall {
                        id,
                        tool_name,
                        retried: false,
                    });
                }
                Err(ToolError::Retry(retry)) => {
                    let budget = resolved
                        .get(&tool_name)
                        .and_then(|tool| tool.max_retries())
                        .unwrap_or(self.agent.tool_retries);
                    let count = self.tool_retry_counts.entry(tool_name.clone()).or_insert(0);
                    *count += 1;
                    if *count > budget {
                        return Err(Error::RetryBudgetExceeded {
                            scope: format!("tool '{tool_name}'"),
                            budget,
                        });
                    }
                    warn!(tool = %tool_name, attempt = *count, "tool requested retry");
                    parts.push(RequestPart::retry(
                        retry.message,
                        Some(tool_name.clone()),
                        Some(id.clone()),
                    ));
                    executed.push(ExecutedCall {
                        id,
                        tool_name,
                        retried: true,
                    });
                }
                Err(err) => {
                    return Err(Error::ToolFailure {
                        tool_name,
                        source: err,
                    });
                }
            }
        }

        self.push_request(ModelRequest::new(parts));
        self.advance_step();
        Ok(executed)
    }

    /// Treat the response as a final candidate: parse, then validate.
    async fn try_finalize(&mut self, response: &ModelResponse) -> Result<StepOutcome<O>> {
        let text = response.text_content();
        let candidate = match O::from_text(&text) {
            Ok(candidate) => candidate,
            Err(retry) => return self.output_retry(retry),
        };

        let mut value = candidate;
        for validator in &self.agent.validators {
            match validator.validate(self.ctx.clone(), value).await {
                Ok(validated) => value = validated,
                Err(retry) => return self.output_retry(retry),
            }
        }
        Ok(StepOutcome::Done(value))
    }

    /// Consume one unit of the output retry budget and feed the failure back.
    fn output_retry(&mut self, retry: ModelRetry) -> Result<StepOutcome<O>> {
        self.output_retries_used += 1;
        if self.output_retries_used > self.agent.output_retries {
            return Err(Error::RetryBudgetExceeded {
                scope: "output validation".to_owned(),
                budget: self.agent.output_retries,
            });
        }
        warn!(attempt = self.output_retries_used, "output rejected, asking the model to retry");
        self.push_request(ModelRequest::new(vec![RequestPart::retry(
            retry.message,
            None,
            None,
        )]));
        self.advance_step();
        Ok(StepOutcome::Continue {
            executed: Vec::new(),
        })
    }

    pub(crate) fn finish(&mut self, output: O) -> RunResult<O> {
        RunResult::new(
            output,
            mem::take(&mut self.messages),
            self.new_messages_start,
            self.usage.snapshot(),
            self.step + 1,
        )
    }

    /// Wrap a fatal error together with the partial record of the run.
    pub(crate) fn fail(&mut self, error: Error) -> crate::error::AgentRunError {
        crate::error::AgentRunError {
            error,
            messages: mem::take(&mut self.messages),
            usage: self.usage.snapshot(),
        }
    }

    fn push_request(&mut self, request: ModelRequest) {
        self.messages.push(Message::Request(request));
        self.sync_context();
    }

    fn advance_step(&mut self) {
        self.step += 1;
        self.ctx.set_step(self.step);
    }

    fn sync_context(&mut self) {
        self.ctx.set_messages(Arc::new(self.messages.clone()));
    }
}
