//! End-to-end runs through the public API: composed toolsets, delegation,
//! validated structured output, usage limits, streaming, and history resume.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use agentry::prelude::*;
use agentry::{AgentRunError, Error, ModelRetry};
use futures::StreamExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Deserialize, JsonSchema)]
struct Empty {}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn echo_tool(name: &str, reply: &str) -> FunctionTool<()> {
    let reply = reply.to_owned();
    FunctionTool::new(name, "", move |_ctx, _args: Empty| {
        let reply = reply.clone();
        async move { Ok(reply) }
    })
}

mod sql_generation {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
    #[serde(untagged)]
    enum SqlResponse {
        Success { sql_query: String },
        InvalidRequest { error_message: String },
    }

    fn sql_agent(model: StubModel) -> Agent<(), Json<SqlResponse>> {
        Agent::new(model)
            .with_name("sql-gen")
            .instructions("Translate the request into a SQL query over the records table.")
            .output_validator(|_ctx, output: Json<SqlResponse>| async move {
                match &output.0 {
                    SqlResponse::Success { sql_query }
                        if !sql_query.to_uppercase().starts_with("SELECT") =>
                    {
                        Err(ModelRetry::new("please create a SELECT query"))
                    }
                    _ => Ok(output),
                }
            })
    }

    #[tokio::test]
    async fn semantic_validator_turns_rejection_into_a_retry() {
        init_tracing();
        let agent = sql_agent(StubModel::new(vec![
            StubResponse::text(r#"{"sql_query": "DELETE FROM records"}"#),
            StubResponse::text(r#"{"sql_query": "SELECT * FROM records WHERE level = 'error'"}"#),
        ]));
        let result = agent.run("show me error records", ()).await.unwrap();
        assert!(matches!(
            result.output.0,
            SqlResponse::Success { ref sql_query } if sql_query.starts_with("SELECT")
        ));
        assert_eq!(result.steps, 2);

        // the rejection was fed back as an unattributed retry prompt
        let retry_prompts: Vec<&RequestPart> = result
            .all_messages()
            .iter()
            .filter_map(Message::as_request)
            .flat_map(|req| &req.parts)
            .filter(|part| matches!(part, RequestPart::RetryPrompt { .. }))
            .collect();
        assert_eq!(retry_prompts.len(), 1);
        let RequestPart::RetryPrompt {
            tool_name, content, ..
        } = retry_prompts[0]
        else {
            unreachable!()
        };
        assert!(tool_name.is_none());
        assert!(content.contains("SELECT"));
    }

    #[tokio::test]
    async fn union_output_accepts_the_refusal_variant() {
        let agent = sql_agent(StubModel::new(vec![StubResponse::text(
            r#"{"error_message": "that request is not about records"}"#,
        )]));
        let result = agent.run("what is the weather", ()).await.unwrap();
        assert!(matches!(result.output.0, SqlResponse::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn structural_parse_failure_also_consumes_the_budget() {
        let agent = sql_agent(StubModel::new(vec![
            StubResponse::text("sorry, plain prose"),
            StubResponse::text(r#"{"sql_query": "SELECT 1"}"#),
        ]));
        let result = agent.run("anything", ()).await.unwrap();
        assert!(matches!(result.output.0, SqlResponse::Success { .. }));
        assert_eq!(result.steps, 2);
    }
}

mod composed_toolsets {
    use super::*;

    fn weather_and_time_agent(model: Arc<StubModel>) -> Agent<(), String> {
        let weather = FunctionToolset::new()
            .tool(echo_tool("now", "sunny, 21C"))
            .tool(echo_tool("forecast", "rain tomorrow"))
            .prefixed("weather");
        let datetime = FunctionToolset::new()
            .tool(echo_tool("now", "2026-08-24T12:00:00Z"))
            .tool(echo_tool("timezone", "Europe/Paris"))
            .prefixed("datetime");
        Agent::new(model)
            .toolset(CombinedToolset::new(vec![
                Arc::new(weather),
                Arc::new(datetime),
            ]))
    }

    #[tokio::test]
    async fn prefixes_disambiguate_and_all_four_names_are_offered() {
        let model = Arc::new(StubModel::new(vec![
            StubResponse::tool_call("weather_now", json!({})),
            StubResponse::text("it is sunny"),
        ]));
        let agent = weather_and_time_agent(Arc::clone(&model));
        let result = agent.run("how is the weather", ()).await.unwrap();
        assert_eq!(result.output, "it is sunny");
        assert_eq!(
            model.last_tool_names(),
            vec!["weather_now", "weather_forecast", "datetime_now", "datetime_timezone"]
        );

        // the prefixed call reached the inner tool
        let returns = result.all_messages()[2].as_request().unwrap();
        assert!(matches!(
            &returns.parts[0],
            RequestPart::ToolReturn { tool_name, content, .. }
                if tool_name == "weather_now" && content == &json!("sunny, 21C")
        ));
    }

    #[tokio::test]
    async fn unprefixed_union_collision_fails_the_run() {
        let colliding: Agent<(), String> = Agent::new(StubModel::new(vec![
            StubResponse::text("unreachable"),
        ]))
        .toolset(CombinedToolset::new(vec![
            Arc::new(FunctionToolset::new().tool(echo_tool("now", "a"))),
            Arc::new(FunctionToolset::new().tool(echo_tool("now", "b"))),
        ]));
        let err = colliding.run("go", ()).await.unwrap_err();
        assert!(matches!(err.error, Error::ToolsetConfiguration(_)));
        assert!(err.error.to_string().contains("now"));
    }

    #[tokio::test]
    async fn dynamic_toolset_changes_between_steps() {
        let model = Arc::new(StubModel::new(vec![
            StubResponse::tool_call("open", json!({})),
            StubResponse::tool_call("close", json!({})),
            StubResponse::text("cycle finished"),
        ]));
        let open: Arc<dyn Toolset<()>> =
            Arc::new(FunctionToolset::new().tool(echo_tool("open", "opened")));
        let close: Arc<dyn Toolset<()>> =
            Arc::new(FunctionToolset::new().tool(echo_tool("close", "closed")));
        let agent: Agent<(), String> = Agent::new(Arc::clone(&model)).toolset(
            DynamicToolset::new(move |ctx: &RunContext<()>| {
                if ctx.run_step() == 0 {
                    Arc::clone(&open)
                } else {
                    Arc::clone(&close)
                }
            }),
        );
        let result = agent.run("run the cycle", ()).await.unwrap();
        assert_eq!(result.output, "cycle finished");
        assert_eq!(result.steps, 3);
        // the final request only saw the step>=1 set
        assert_eq!(model.last_tool_names(), vec!["close"]);
    }
}

mod delegation {
    use super::*;

    fn child_agent(reply: &str) -> Arc<Agent<(), String>> {
        Arc::new(
            Agent::new(StubModel::new(vec![StubResponse::text(reply)]))
                .with_name("delegate"),
        )
    }

    #[tokio::test]
    async fn tree_usage_accumulates_into_one_set_of_counters() {
        init_tracing();
        let child = child_agent("the joke");
        let parent: Agent<(), String> = Agent::new(StubModel::new(vec![
            StubResponse::tool_call("ask_delegate", json!({})),
            StubResponse::text("here is what I got"),
        ]))
        .with_name("parent")
        .tool(FunctionTool::new(
            "ask_delegate",
            "Hand the request to the delegate agent",
            move |ctx: RunContext<()>, _args: Empty| {
                let child = Arc::clone(&child);
                async move {
                    let config = RunConfig::default().with_usage(ctx.usage().clone());
                    let result = child
                        .run_with("tell me a joke", (), config)
                        .await
                        .map_err(|e| ToolError::execution(e.to_string()))?;
                    Ok(result.into_output())
                }
            },
        ));
        let result = parent.run("go", ()).await.unwrap();
        assert_eq!(result.output, "here is what I got");
        // two parent requests plus one child request, one shared counter set
        assert_eq!(result.usage.requests, 3);
    }

    #[tokio::test]
    async fn concurrent_delegates_record_losslessly() {
        let left = child_agent("left answer");
        let right = child_agent("right answer");
        let parent: Agent<(), String> = Agent::new(StubModel::new(vec![
            StubResponse::tool_call("fan_out", json!({})),
            StubResponse::text("combined"),
        ]))
        .tool(FunctionTool::new(
            "fan_out",
            "Ask both delegates at once",
            move |ctx: RunContext<()>, _args: Empty| {
                let left = Arc::clone(&left);
                let right = Arc::clone(&right);
                async move {
                    let shared = ctx.usage().clone();
                    let (a, b) = tokio::join!(
                        left.run_with("go", (), RunConfig::default().with_usage(shared.clone())),
                        right.run_with("go", (), RunConfig::default().with_usage(shared)),
                    );
                    let a = a.map_err(|e| ToolError::execution(e.to_string()))?;
                    let b = b.map_err(|e| ToolError::execution(e.to_string()))?;
                    Ok(format!("{} / {}", a.output, b.output))
                }
            },
        ));
        let result = parent.run("go", ()).await.unwrap();
        assert_eq!(result.usage.requests, 4);
    }

    #[tokio::test]
    async fn request_limit_spans_the_whole_tree() {
        let limits = UsageLimits::none().with_request_limit(2);
        let child = Arc::new(
            Agent::<(), String>::new(StubModel::new(vec![StubResponse::text("child reply")]))
                .with_name("delegate"),
        );
        let child_limits = limits;
        let parent: Agent<(), String> = Agent::new(StubModel::new(vec![
            StubResponse::tool_call("ask_delegate", json!({})),
            StubResponse::text("never reached"),
        ]))
        .tool(FunctionTool::new(
            "ask_delegate",
            "",
            move |ctx: RunContext<()>, _args: Empty| {
                let child = Arc::clone(&child);
                let limits = child_limits;
                async move {
                    let config = RunConfig::default()
                        .with_usage(ctx.usage().clone())
                        .with_limits(limits);
                    let result = child
                        .run_with("go", (), config)
                        .await
                        .map_err(|e| ToolError::execution(e.to_string()))?;
                    Ok(result.into_output())
                }
            },
        ));
        let err = parent
            .run_with("go", (), RunConfig::default().with_limits(limits))
            .await
            .unwrap_err();
        // parent request + child request hit the cap; the parent's second
        // request is blocked before it reaches the model
        assert!(err.error.is_usage_limit());
        assert_eq!(err.usage.requests, 2);
    }
}

mod usage_limits {
    use super::*;

    #[tokio::test]
    async fn a_single_permitted_request_fails_before_the_second() {
        let agent: Agent<(), String> = Agent::new(StubModel::new(vec![
            StubResponse::tool_call("lookup", json!({})),
            StubResponse::text("never reached"),
        ]))
        .tool(echo_tool("lookup", "found"));
        let config =
            RunConfig::default().with_limits(UsageLimits::none().with_request_limit(1));
        let err: AgentRunError = agent.run_with("go", (), config).await.unwrap_err();
        assert!(err.error.is_usage_limit());
        assert_eq!(err.usage.requests, 1);
        // the tool round that was already in flight completed and is recorded
        let last = err.messages.last().unwrap().as_request().unwrap();
        assert!(matches!(last.parts[0], RequestPart::ToolReturn { .. }));
    }
}

mod streaming {
    use super::*;

    #[tokio::test]
    async fn streamed_text_equals_the_blocking_output() {
        let script = || {
            vec![StubResponse::text(
                "# Forecast\n\nSunny with a light breeze, 21 degrees in the afternoon.",
            )]
        };

        let blocking: Agent<(), String> = Agent::new(StubModel::new(script()));
        let expected = blocking.run("weather please", ()).await.unwrap().output;

        let streaming: Agent<(), String> = Agent::new(StubModel::new(script()));
        let stream = streaming.run_stream(
            "weather please",
            (),
            RunConfig::default().with_debounce(Duration::ZERO),
        );
        futures::pin_mut!(stream);
        let mut text = String::new();
        let mut completed = None;
        while let Some(event) = stream.next().await {
            match event.unwrap() {
                RunEvent::TextDelta { content } => text.push_str(&content),
                RunEvent::Completed(result) => completed = Some(result),
                _ => {}
            }
        }
        assert_eq!(text, expected);
        assert_eq!(completed.unwrap().output, expected);
    }

    #[tokio::test]
    async fn last_snapshot_matches_the_completed_output() {
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
        struct Summary {
            title: String,
            bullet_count: u32,
        }
        let agent: Agent<(), Json<Summary>> = Agent::new(StubModel::new(vec![
            StubResponse::text(r#"{"title": "weekly report", "bullet_count": 4}"#),
        ]));
        let stream = agent.run_stream(
            "summarize",
            (),
            RunConfig::default().with_debounce(Duration::ZERO),
        );
        futures::pin_mut!(stream);
        let mut snapshots = Vec::new();
        let mut completed = None;
        while let Some(event) = stream.next().await {
            match event.unwrap() {
                RunEvent::OutputSnapshot(snapshot) => snapshots.push(snapshot),
                RunEvent::Completed(result) => completed = Some(result),
                _ => {}
            }
        }
        let completed = completed.unwrap();
        assert_eq!(snapshots.last().unwrap().0, completed.output.0);
    }
}

mod history_resume {
    use super::*;

    #[tokio::test]
    async fn a_serialized_history_resumes_a_conversation() -> anyhow::Result<()> {
        let first: Agent<(), String> = Agent::new(StubModel::new(vec![StubResponse::text(
            "Paris is the capital of France.",
        )]));
        let result = first.run("capital of France?", ()).await?;

        // persist and reload the transcript
        let stored = serde_json::to_string(result.all_messages())?;
        let history: Vec<Message> = serde_json::from_str(&stored)?;
        assert_eq!(history, result.all_messages());

        let second: Agent<(), String> = Agent::new(StubModel::new(vec![StubResponse::text(
            "About 2.1 million people live there.",
        )]));
        let followup = second
            .run_with(
                "and how many people live there?",
                (),
                RunConfig::default().with_history(history),
            )
            .await?;

        assert_eq!(followup.output, "About 2.1 million people live there.");
        assert_eq!(followup.all_messages().len(), 4);
        assert_eq!(followup.new_messages().len(), 2);
        // prior turns are preserved verbatim at the front
        assert_eq!(&followup.all_messages()[..2], result.all_messages());
        Ok(())
    }

    #[tokio::test]
    async fn deps_drive_dynamic_instructions() -> anyhow::Result<()> {
        #[derive(Debug)]
        struct UserProfile {
            name: String,
        }
        let agent: Agent<UserProfile, String> =
            Agent::new(StubModel::new(vec![StubResponse::text("hi Sam")]))
                .instructions_fn(|ctx: &RunContext<UserProfile>| {
                    format!("The user's name is {}.", ctx.deps().name)
                });
        let result = agent
            .run("greet me", UserProfile { name: "Sam".into() })
            .await?;
        let request = result.all_messages()[0].as_request().unwrap();
        assert!(matches!(
            &request.parts[0],
            RequestPart::SystemPrompt { content, .. } if content.contains("Sam")
        ));
        Ok(())
    }
}
