//! Assistant run engine.
//!
//! Drives one run on a thread from creation to a user-facing reply:
//!
//! ```text
//! submitted → polling ─┬─ completed        → newest assistant message
//!                      ├─ requires_action  → dispatch tools, submit, depth+1, polling
//!                      ├─ failed/cancelled/expired → failure reply
//!                      └─ attempts exhausted       → timeout reply
//! ```
//!
//! Every exit path yields a reply string.  Errors never escape to the
//! transport layer.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::Instrument;

use rd_assistant::{AssistantApi, RunStatus};
use rd_domain::config::AssistantConfig;
use rd_domain::error::{Error, Result};
use rd_domain::message::Role;

use super::tools::{ToolContext, ToolRegistry};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Settings & outcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub max_depth: u32,
    pub max_attempts: u32,
    pub poll_interval: Duration,
    pub recursion_reply: String,
    pub timeout_reply: String,
    pub failure_reply: String,
}

impl RunSettings {
    pub fn from_config(cfg: &AssistantConfig) -> Self {
        Self {
            max_depth: cfg.max_depth,
            max_attempts: cfg.max_attempts.max(1),
            poll_interval: Duration::from_millis(cfg.poll_interval_ms),
            recursion_reply: cfg.recursion_reply.clone(),
            timeout_reply: cfg.timeout_reply.clone(),
            failure_reply: cfg.failure_reply.clone(),
        }
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::from_config(&AssistantConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    RecursionLimit,
    TimedOut,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Text to deliver to the contact.
    pub reply: String,
    pub run_id: Option<String>,
    /// Tool round-trips completed.
    pub depth: u32,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How far `drive` got before it returned.
#[derive(Debug, Default)]
struct Progress {
    depth: u32,
    /// The last snapshot was terminal; there is nothing left to cancel.
    settled: bool,
}

pub struct RunEngine {
    assistant: Arc<dyn AssistantApi>,
    tools: Arc<ToolRegistry>,
    settings: RunSettings,
}

impl RunEngine {
    pub fn new(assistant: Arc<dyn AssistantApi>, tools: Arc<ToolRegistry>, settings: RunSettings) -> Self {
        Self {
            assistant,
            tools,
            settings,
        }
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Start a run on `thread_id` and drive it to a reply.  The caller must
    /// hold the contact lock so at most one run is live per thread.
    pub async fn execute(&self, thread_id: &str, assistant_id: &str, ctx: &ToolContext) -> RunReport {
        let span = tracing::info_span!(
            "assistant.run",
            tenant = %ctx.tenant.id,
            contact_id = %ctx.contact_id,
            thread_id,
            run_id = tracing::field::Empty,
        );
        self.execute_inner(thread_id, assistant_id, ctx).instrument(span).await
    }

    async fn execute_inner(&self, thread_id: &str, assistant_id: &str, ctx: &ToolContext) -> RunReport {
        let definitions = self.tools.definitions_for(&ctx.tenant);
        let run_id = match self
            .assistant
            .create_run(thread_id, assistant_id, &definitions)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(error = %e, "run creation failed");
                return self.report(RunOutcome::Failed, None, 0);
            }
        };
        tracing::Span::current().record("run_id", run_id.as_str());

        let mut progress = Progress::default();
        let result = self.drive(thread_id, &run_id, ctx, &mut progress).await;
        let depth = progress.depth;
        let outcome = match result {
            Ok(reply) => {
                tracing::info!(depth, "run completed");
                return RunReport {
                    outcome: RunOutcome::Completed,
                    reply,
                    run_id: Some(run_id),
                    depth,
                };
            }
            Err(Error::RecursionLimit { .. }) => RunOutcome::RecursionLimit,
            Err(Error::Timeout(_)) => RunOutcome::TimedOut,
            Err(e) => {
                tracing::warn!(error = %e, "run failed");
                RunOutcome::Failed
            }
        };

        // A non-terminal run blocks the next run on this thread.
        if !progress.settled {
            if let Err(e) = self.assistant.cancel_run(thread_id, &run_id).await {
                tracing::debug!(error = %e, "run cancellation failed");
            }
        }
        self.report(outcome, Some(run_id), depth)
    }

    fn report(&self, outcome: RunOutcome, run_id: Option<String>, depth: u32) -> RunReport {
        let reply = match outcome {
            RunOutcome::RecursionLimit => &self.settings.recursion_reply,
            RunOutcome::TimedOut => &self.settings.timeout_reply,
            RunOutcome::Failed | RunOutcome::Completed => &self.settings.failure_reply,
        };
        RunReport {
            outcome,
            reply: reply.clone(),
            run_id,
            depth,
        }
    }

    /// Poll until a terminal state.  Each depth gets its own attempt budget.
    async fn drive(
        &self,
        thread_id: &str,
        run_id: &str,
        ctx: &ToolContext,
        progress: &mut Progress,
    ) -> Result<String> {
        loop {
            let snapshot = self.poll(thread_id, run_id).await?;
            progress.settled = snapshot.status.is_terminal();
            let depth = &mut progress.depth;
            match snapshot.status {
                RunStatus::Completed => return self.latest_reply(thread_id).await,
                RunStatus::RequiresAction => {
                    if *depth >= self.settings.max_depth {
                        tracing::warn!(depth = *depth, "tool recursion limit reached");
                        return Err(Error::RecursionLimit { depth: *depth });
                    }
                    tracing::debug!(depth = *depth, calls = snapshot.tool_calls.len(), "dispatching tool calls");
                    let outputs = self.tools.dispatch(ctx, &snapshot.tool_calls).await;
                    self.assistant
                        .submit_tool_outputs(thread_id, run_id, &outputs)
                        .await?;
                    *depth += 1;
                }
                status => {
                    tracing::warn!(?status, "run ended without completing");
                    return Err(Error::Assistant(format!("run ended as {status:?}")));
                }
            }
        }
    }

    /// Poll up to `max_attempts` times, sleeping between polls, until the
    /// run leaves `queued`/`in_progress`.  A failed poll uses an attempt.
    async fn poll(&self, thread_id: &str, run_id: &str) -> Result<rd_assistant::RunSnapshot> {
        for attempt in 1..=self.settings.max_attempts {
            match self.assistant.get_run(thread_id, run_id).await {
                Ok(snap) if snap.status.is_terminal() || snap.status == RunStatus::RequiresAction => {
                    return Ok(snap)
                }
                Ok(_) => {}
                Err(e) => tracing::debug!(attempt, error = %e, "run poll failed"),
            }
            if attempt < self.settings.max_attempts {
                tokio::time::sleep(self.settings.poll_interval).await;
            }
        }
        tracing::warn!(attempts = self.settings.max_attempts, "run polling exhausted");
        Err(Error::Timeout(format!(
            "run {run_id} still pending after {} polls",
            self.settings.max_attempts
        )))
    }

    async fn latest_reply(&self, thread_id: &str) -> Result<String> {
        let messages = self.assistant.list_messages(thread_id).await?;
        messages
            .into_iter()
            .find(|m| m.role == Role::Assistant && !m.content.trim().is_empty())
            .map(|m| m.content)
            .ok_or_else(|| Error::Assistant("completed run left no assistant message".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::tools::testing::{ctx, tenant};
    use rd_assistant::{ScriptedAssistant, Step};
    use rd_domain::tool::ToolCall;
    use serde_json::json;

    fn engine(assistant: Arc<ScriptedAssistant>) -> RunEngine {
        RunEngine::new(assistant, Arc::new(ToolRegistry::new()), RunSettings::default())
    }

    async fn thread(a: &ScriptedAssistant) -> String {
        let t = a.create_thread().await.unwrap();
        a.add_message(&t, Role::User, "hello").await.unwrap();
        t
    }

    #[tokio::test(start_paused = true)]
    async fn completed_run_returns_newest_assistant_message() {
        let a = Arc::new(ScriptedAssistant::new());
        a.push_run(vec![Step::Working(2), Step::Reply("hi there".into())]);
        let t = thread(&a).await;

        let started = tokio::time::Instant::now();
        let report = engine(a.clone()).execute(&t, "asst", &ctx(tenant(|_| {}))).await;
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.reply, "hi there");
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn tool_round_trip_submits_every_output() {
        let a = Arc::new(ScriptedAssistant::new());
        let calls = vec![
            ToolCall {
                call_id: "c1".into(),
                tool_name: "unknown_a".into(),
                arguments: json!({}),
            },
            ToolCall {
                call_id: "c2".into(),
                tool_name: "unknown_b".into(),
                arguments: json!({}),
            },
        ];
        a.push_run(vec![Step::Call(calls), Step::Reply("done".into())]);
        let t = thread(&a).await;

        let report = engine(a.clone()).execute(&t, "asst", &ctx(tenant(|_| {}))).await;
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.depth, 1);
        let outputs = a.submitted_outputs();
        assert_eq!(outputs.len(), 2);
        assert!(outputs.iter().all(|o| o.is_error()));
    }

    #[tokio::test(start_paused = true)]
    async fn endless_tool_calls_stop_at_max_depth() {
        let a = Arc::new(ScriptedAssistant::new());
        a.push_run(vec![Step::Loop]);
        let t = thread(&a).await;

        let eng = engine(a.clone());
        let report = eng.execute(&t, "asst", &ctx(tenant(|_| {}))).await;
        assert_eq!(report.outcome, RunOutcome::RecursionLimit);
        assert_eq!(report.reply, eng.settings().recursion_reply);
        assert_eq!(a.submissions(), 5);
        assert_eq!(report.depth, 5);
        assert_eq!(a.cancelled_runs(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_run_times_out_with_bounded_latency() {
        let a = Arc::new(ScriptedAssistant::new());
        a.push_run(vec![Step::Hang]);
        let t = thread(&a).await;

        let started = tokio::time::Instant::now();
        let eng = engine(a.clone());
        let report = eng.execute(&t, "asst", &ctx(tenant(|_| {}))).await;
        assert_eq!(report.outcome, RunOutcome::TimedOut);
        assert_eq!(report.reply, eng.settings().timeout_reply);
        assert_eq!(started.elapsed(), Duration::from_secs(2 * 29));
        assert_eq!(a.cancelled_runs(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_states_degrade_to_failure_reply() {
        for status in [RunStatus::Failed, RunStatus::Cancelled, RunStatus::Expired] {
            let a = Arc::new(ScriptedAssistant::new());
            a.push_run(vec![Step::Working(1), Step::End(status)]);
            let t = thread(&a).await;
            let eng = engine(a.clone());
            let report = eng.execute(&t, "asst", &ctx(tenant(|_| {}))).await;
            assert_eq!(report.outcome, RunOutcome::Failed, "{status:?}");
            assert_eq!(report.reply, eng.settings().failure_reply);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_tool_outputs_cancel_the_run() {
        let a = Arc::new(ScriptedAssistant::new());
        a.push_run(vec![Step::Loop]);
        a.fail_next_submit();
        let t = thread(&a).await;

        let eng = engine(a.clone());
        let report = eng.execute(&t, "asst", &ctx(tenant(|_| {}))).await;
        assert_eq!(report.outcome, RunOutcome::Failed);
        assert_eq!(report.reply, eng.settings().failure_reply);
        assert_eq!(report.depth, 0);
        assert_eq!(a.submissions(), 0);
        assert_eq!(a.cancelled_runs(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn runs_that_end_on_their_own_are_not_cancelled() {
        let a = Arc::new(ScriptedAssistant::new());
        a.push_run(vec![Step::End(RunStatus::Failed)]);
        a.push_run(vec![Step::Reply("fine".into())]);
        let t = thread(&a).await;

        let eng = engine(a.clone());
        assert_eq!(eng.execute(&t, "asst", &ctx(tenant(|_| {}))).await.outcome, RunOutcome::Failed);
        assert_eq!(eng.execute(&t, "asst", &ctx(tenant(|_| {}))).await.outcome, RunOutcome::Completed);
        assert_eq!(a.cancelled_runs(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_thread_is_a_failure_not_a_panic() {
        let a = Arc::new(ScriptedAssistant::new());
        let report = engine(a).execute("nope", "asst", &ctx(tenant(|_| {}))).await;
        assert_eq!(report.outcome, RunOutcome::Failed);
        assert!(report.run_id.is_none());
    }
}
