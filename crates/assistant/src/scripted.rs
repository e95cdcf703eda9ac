//! Deterministic in-memory assistant.
//!
//! Each created run consumes the next queued script (a list of [`Step`]s).
//! When the queue is empty a run simply replies with the default text.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rd_domain::error::{Error, Result};
use rd_domain::message::Role;
use rd_domain::tool::{ToolCall, ToolDefinition, ToolOutput};

use crate::traits::{AssistantApi, RunSnapshot, RunStatus, ThreadMessage};

/// One stage of a scripted run.
#[derive(Debug, Clone)]
pub enum Step {
    /// Report `in_progress` for this many polls.
    Working(u32),
    /// Report `requires_action` with these calls until outputs are submitted.
    Call(Vec<ToolCall>),
    /// Append an assistant message and complete.
    Reply(String),
    /// End in a non-completed terminal status.
    End(RunStatus),
    /// Request a fresh `noop` tool call after every submission, forever.
    Loop,
    /// Stay `in_progress` forever.
    Hang,
}

struct Run {
    thread_id: String,
    steps: VecDeque<Step>,
    loop_round: u32,
    cancelled: bool,
}

#[derive(Default)]
struct Inner {
    threads: HashMap<String, Vec<ThreadMessage>>,
    runs: HashMap<String, Run>,
    scripts: VecDeque<Vec<Step>>,
    submitted: Vec<ToolOutput>,
    submissions: u32,
    last_tools: Vec<ToolDefinition>,
    fail_next_create_thread: bool,
    fail_next_submit: bool,
}

pub struct ScriptedAssistant {
    inner: Mutex<Inner>,
    seq: AtomicU64,
    default_reply: String,
    thread_latency: Option<Duration>,
}

impl Default for ScriptedAssistant {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedAssistant {
    pub fn new() -> Self {
        Self::with_default_reply("ok")
    }

    pub fn with_default_reply(reply: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            seq: AtomicU64::new(1),
            default_reply: reply.into(),
            thread_latency: None,
        }
    }

    /// Delay every `create_thread` call, so concurrent callers overlap.
    pub fn with_thread_latency(mut self, latency: Duration) -> Self {
        self.thread_latency = Some(latency);
        self
    }

    /// Queue the script for the next created run.
    pub fn push_run(&self, steps: Vec<Step>) {
        self.inner.lock().scripts.push_back(steps);
    }

    /// Make the next `create_thread` call fail with a transient error.
    pub fn fail_next_thread(&self) {
        self.inner.lock().fail_next_create_thread = true;
    }

    /// Make the next `submit_tool_outputs` call fail.  The run keeps
    /// waiting for outputs.
    pub fn fail_next_submit(&self) {
        self.inner.lock().fail_next_submit = true;
    }

    pub fn threads_created(&self) -> usize {
        self.inner.lock().threads.len()
    }

    pub fn runs_created(&self) -> usize {
        self.inner.lock().runs.len()
    }

    /// Number of `submit_tool_outputs` calls across all runs.
    pub fn submissions(&self) -> u32 {
        self.inner.lock().submissions
    }

    pub fn submitted_outputs(&self) -> Vec<ToolOutput> {
        self.inner.lock().submitted.clone()
    }

    pub fn cancelled_runs(&self) -> usize {
        self.inner.lock().runs.values().filter(|r| r.cancelled).count()
    }

    /// Tool definitions passed to the latest `create_run`.
    pub fn last_tools(&self) -> Vec<ToolDefinition> {
        self.inner.lock().last_tools.clone()
    }

    /// Messages on a thread, oldest first.
    pub fn thread_messages(&self, thread_id: &str) -> Vec<ThreadMessage> {
        self.inner
            .lock()
            .threads
            .get(thread_id)
            .cloned()
            .unwrap_or_default()
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}_{}", self.seq.fetch_add(1, Ordering::Relaxed))
    }
}

fn push_message(inner: &mut Inner, thread_id: &str, id: String, role: Role, content: String) {
    let thread = inner.threads.entry(thread_id.to_owned()).or_default();
    let created_at = thread.len() as i64;
    thread.push(ThreadMessage {
        id,
        role,
        content,
        created_at,
    });
}

#[async_trait::async_trait]
impl AssistantApi for ScriptedAssistant {
    async fn create_thread(&self) -> Result<String> {
        if let Some(latency) = self.thread_latency {
            tokio::time::sleep(latency).await;
        }
        let mut inner = self.inner.lock();
        if std::mem::take(&mut inner.fail_next_create_thread) {
            return Err(Error::Assistant("scripted thread creation failure".into()));
        }
        let id = self.next_id("thread");
        inner.threads.insert(id.clone(), Vec::new());
        Ok(id)
    }

    async fn add_message(&self, thread_id: &str, role: Role, content: &str) -> Result<()> {
        let id = self.next_id("msg");
        let mut inner = self.inner.lock();
        if !inner.threads.contains_key(thread_id) {
            return Err(Error::NotFound(format!("thread {thread_id}")));
        }
        push_message(&mut inner, thread_id, id, role, content.to_owned());
        Ok(())
    }

    async fn create_run(
        &self,
        thread_id: &str,
        _assistant_id: &str,
        tools: &[ToolDefinition],
    ) -> Result<String> {
        let id = self.next_id("run");
        let mut inner = self.inner.lock();
        if !inner.threads.contains_key(thread_id) {
            return Err(Error::NotFound(format!("thread {thread_id}")));
        }
        let steps = inner
            .scripts
            .pop_front()
            .unwrap_or_else(|| vec![Step::Reply(self.default_reply.clone())]);
        inner.last_tools = tools.to_vec();
        inner.runs.insert(
            id.clone(),
            Run {
                thread_id: thread_id.to_owned(),
                steps: steps.into(),
                loop_round: 0,
                cancelled: false,
            },
        );
        Ok(id)
    }

    async fn get_run(&self, _thread_id: &str, run_id: &str) -> Result<RunSnapshot> {
        let msg_id = self.next_id("msg");
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if std::mem::take(&mut inner.fail_next_submit) {
            return Err(Error::Assistant("scripted submit failure".into()));
        }
        let run = inner
            .runs
            .get_mut(run_id)
            .ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
        if run.cancelled {
            return Ok(RunSnapshot::status(RunStatus::Cancelled));
        }

        loop {
            match run.steps.front_mut() {
                None => return Ok(RunSnapshot::status(RunStatus::Completed)),
                Some(Step::Working(0)) => {
                    run.steps.pop_front();
                }
                Some(Step::Working(n)) => {
                    *n -= 1;
                    return Ok(RunSnapshot::status(RunStatus::InProgress));
                }
                Some(Step::Hang) => return Ok(RunSnapshot::status(RunStatus::InProgress)),
                Some(Step::Call(calls)) => {
                    return Ok(RunSnapshot {
                        status: RunStatus::RequiresAction,
                        tool_calls: calls.clone(),
                    })
                }
                Some(Step::Loop) => {
                    return Ok(RunSnapshot {
                        status: RunStatus::RequiresAction,
                        tool_calls: vec![ToolCall {
                            call_id: format!("{run_id}_loop_{}", run.loop_round),
                            tool_name: "noop".into(),
                            arguments: serde_json::json!({}),
                        }],
                    })
                }
                Some(Step::End(status)) => return Ok(RunSnapshot::status(*status)),
                Some(Step::Reply(text)) => {
                    let text = std::mem::take(text);
                    let thread_id = run.thread_id.clone();
                    run.steps.clear();
                    push_message(inner, &thread_id, msg_id, Role::Assistant, text);
                    return Ok(RunSnapshot::status(RunStatus::Completed));
                }
            }
        }
    }

    async fn submit_tool_outputs(
        &self,
        _thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let run = inner
            .runs
            .get_mut(run_id)
            .ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
        match run.steps.front() {
            Some(Step::Call(calls)) => {
                if calls.len() != outputs.len() {
                    return Err(Error::Assistant(format!(
                        "expected {} tool outputs, got {}",
                        calls.len(),
                        outputs.len()
                    )));
                }
                run.steps.pop_front();
            }
            Some(Step::Loop) => run.loop_round += 1,
            _ => return Err(Error::Assistant("run is not awaiting tool outputs".into())),
        }
        inner.submissions += 1;
        inner.submitted.extend_from_slice(outputs);
        Ok(())
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>> {
        let inner = self.inner.lock();
        let mut msgs = inner
            .threads
            .get(thread_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("thread {thread_id}")))?;
        msgs.reverse();
        Ok(msgs)
    }

    async fn cancel_run(&self, _thread_id: &str, run_id: &str) -> Result<()> {
        if let Some(run) = self.inner.lock().runs.get_mut(run_id) {
            run.cancelled = true;
        }
        Ok(())
    }
}
