//! Turn pipeline: one flushed conversation → one assistant run → reply
//! parts delivered through the transport.
//!
//! Turns for the same contact are serialized by the contact lock, held from
//! thread resolution until the last reply part is sent.

use std::sync::Arc;

use serde::Serialize;

use rd_assistant::AssistantApi;
use rd_domain::error::{Error, Result};
use rd_domain::message::Role;
use rd_sessions::ThreadManager;

use super::debounce::{FlushHandler, Flushed};
use super::reply::{deliver, split_reply};
use super::runs::{RunEngine, RunOutcome};
use super::tools::ToolContext;
use crate::tenants::{render, TenantRegistry};
use crate::transport::Transport;

/// Text that resets the contact's session instead of reaching the assistant.
pub const RESET_COMMAND: &str = "/resetbot";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnReport {
    Reset { had_thread: bool },
    Replied {
        thread_id: String,
        outcome: RunOutcome,
        parts_sent: usize,
    },
    /// The thread could not be prepared; the contact got the failure reply.
    Aborted { reason: String },
}

pub struct TurnEngine {
    tenants: Arc<TenantRegistry>,
    threads: Arc<ThreadManager>,
    assistant: Arc<dyn AssistantApi>,
    runs: Arc<RunEngine>,
    transport: Arc<dyn Transport>,
    part_delimiter: String,
}

impl TurnEngine {
    pub fn new(
        tenants: Arc<TenantRegistry>,
        threads: Arc<ThreadManager>,
        assistant: Arc<dyn AssistantApi>,
        runs: Arc<RunEngine>,
        transport: Arc<dyn Transport>,
        part_delimiter: impl Into<String>,
    ) -> Self {
        Self {
            tenants,
            threads,
            assistant,
            runs,
            transport,
            part_delimiter: part_delimiter.into(),
        }
    }

    pub async fn handle(&self, batch: Flushed) -> Result<TurnReport> {
        let tenant = self
            .tenants
            .get(&batch.tenant_id)
            .ok_or_else(|| Error::NotFound(format!("tenant {}", batch.tenant_id)))?;

        if batch.text.trim() == RESET_COMMAND {
            let had_thread = self.threads.reset(&tenant.id, &batch.contact_id)?;
            let text = render(
                &tenant.config.templates.reset,
                &[("contact", batch.contact_id.as_str()), ("tenant", tenant.display_name())],
            );
            if let Err(e) = self.transport.send_text(&tenant.id, &batch.chat_id, &text).await {
                tracing::warn!(tenant = %tenant.id, chat_id = %batch.chat_id, error = %e, "reset reply failed");
            }
            return Ok(TurnReport::Reset { had_thread });
        }

        let guard = self.threads.lock_contact(&tenant.id, &batch.contact_id).await?;

        let prepared = async {
            let thread_id = self
                .threads
                .get_or_create_locked(&guard, &tenant.id, &batch.contact_id)
                .await?;
            self.assistant
                .add_message(&thread_id, Role::User, &batch.text)
                .await?;
            Ok::<_, Error>(thread_id)
        }
        .await;

        let thread_id = match prepared {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(
                    tenant = %tenant.id,
                    contact_id = %batch.contact_id,
                    error = %e,
                    "could not prepare assistant thread"
                );
                let apology = &self.runs.settings().failure_reply;
                if let Err(e) = self.transport.send_text(&tenant.id, &batch.chat_id, apology).await {
                    tracing::warn!(tenant = %tenant.id, error = %e, "failure reply not delivered");
                }
                return Ok(TurnReport::Aborted {
                    reason: e.to_string(),
                });
            }
        };

        let ctx = ToolContext {
            tenant: tenant.clone(),
            contact_id: batch.contact_id.clone(),
            chat_id: batch.chat_id.clone(),
            conversation: batch.text.clone(),
            transport: self.transport.clone(),
        };
        let report = self
            .runs
            .execute(&thread_id, &tenant.config.assistant_id, &ctx)
            .await;

        let parts = split_reply(&report.reply, &self.part_delimiter);
        let parts_sent = deliver(self.transport.as_ref(), &tenant.id, &batch.chat_id, &parts).await;
        drop(guard);

        tracing::info!(
            tenant = %tenant.id,
            contact_id = %batch.contact_id,
            thread_id = %thread_id,
            outcome = ?report.outcome,
            messages = batch.message_count,
            parts_sent,
            "turn finished"
        );
        Ok(TurnReport::Replied {
            thread_id,
            outcome: report.outcome,
            parts_sent,
        })
    }
}

#[async_trait::async_trait]
impl FlushHandler for TurnEngine {
    async fn on_flush(&self, batch: Flushed) {
        let tenant = batch.tenant_id.clone();
        let chat_id = batch.chat_id.clone();
        if let Err(e) = self.handle(batch).await {
            tracing::error!(tenant = %tenant, chat_id = %chat_id, error = %e, "turn failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use rd_assistant::{ScriptedAssistant, Step};
    use rd_domain::clock::SystemClock;
    use rd_domain::config::{Config, TenantConfig};
    use rd_sessions::SessionStore;
    use rd_store::DocumentStore;

    use crate::runtime::runs::RunSettings;
    use crate::runtime::tools::ToolRegistry;
    use crate::transport::{MemoryTransport, Sent};

    struct Harness {
        engine: Arc<TurnEngine>,
        assistant: Arc<ScriptedAssistant>,
        transport: Arc<MemoryTransport>,
    }

    fn harness() -> Harness {
        let mut config = Config::default();
        config.tenants.insert(
            "acme".into(),
            TenantConfig {
                assistant_id: "asst_1".into(),
                ..TenantConfig::default()
            },
        );
        let docs = Arc::new(DocumentStore::in_memory());
        let assistant = Arc::new(ScriptedAssistant::new());
        let transport = Arc::new(MemoryTransport::new());
        let threads = Arc::new(ThreadManager::new(
            SessionStore::new(docs, Arc::new(SystemClock)),
            assistant.clone(),
        ));
        let runs = Arc::new(RunEngine::new(
            assistant.clone(),
            Arc::new(ToolRegistry::new()),
            RunSettings::default(),
        ));
        let engine = Arc::new(TurnEngine::new(
            Arc::new(TenantRegistry::from_config(&config)),
            threads,
            assistant.clone(),
            runs,
            transport.clone(),
            "||",
        ));
        Harness {
            engine,
            assistant,
            transport,
        }
    }

    fn batch(text: &str) -> Flushed {
        Flushed {
            tenant_id: "acme".into(),
            chat_id: "5511".into(),
            contact_id: "5511".into(),
            text: text.into(),
            message_count: 1,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn multi_part_reply_is_delivered_in_order() {
        let h = harness();
        h.assistant.push_run(vec![Step::Reply(
            "Here is our menu || [document: menu.pdf] Our prices || Anything else?".into(),
        )]);

        let report = h.engine.handle(batch("hi")).await.unwrap();
        assert!(matches!(report, TurnReport::Replied { parts_sent: 3, .. }));
        let sent = h.transport.sent();
        assert_eq!(
            sent,
            vec![
                Sent::Text { chat_id: "5511".into(), text: "Here is our menu".into() },
                Sent::Document {
                    chat_id: "5511".into(),
                    document: "menu.pdf".into(),
                    caption: "Our prices".into(),
                },
                Sent::Text { chat_id: "5511".into(), text: "Anything else?".into() },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn thread_is_reused_across_turns() {
        let h = harness();
        h.engine.handle(batch("one")).await.unwrap();
        h.engine.handle(batch("two")).await.unwrap();
        assert_eq!(h.assistant.threads_created(), 1);
        assert_eq!(h.assistant.runs_created(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_command_starts_a_new_thread() {
        let h = harness();
        h.engine.handle(batch("one")).await.unwrap();
        let report = h.engine.handle(batch(" /resetbot ")).await.unwrap();
        assert_eq!(report, TurnReport::Reset { had_thread: true });
        assert_eq!(h.assistant.runs_created(), 1);

        h.engine.handle(batch("again")).await.unwrap();
        assert_eq!(h.assistant.threads_created(), 2);
        let texts = h.transport.texts_to("5511");
        assert!(texts[1].starts_with("Conversation reset"));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_turns_for_one_contact_are_serialized() {
        let h = harness();
        h.assistant.push_run(vec![Step::Working(3), Step::Reply("first".into())]);
        h.assistant.push_run(vec![Step::Reply("second".into())]);

        let (a, b) = tokio::join!(h.engine.handle(batch("a")), h.engine.handle(batch("b")));
        a.unwrap();
        b.unwrap();
        assert_eq!(h.assistant.threads_created(), 1);
        assert_eq!(h.transport.texts_to("5511"), vec!["first", "second"]);
    }

    #[tokio::test(start_paused = true)]
    async fn thread_failure_sends_apology() {
        let h = harness();
        h.assistant.fail_next_thread();
        let report = h.engine.handle(batch("hi")).await.unwrap();
        assert!(matches!(report, TurnReport::Aborted { .. }));
        assert_eq!(h.transport.texts_to("5511").len(), 1);
        assert_eq!(h.assistant.runs_created(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_tenant_is_an_error() {
        let h = harness();
        let mut b = batch("hi");
        b.tenant_id = "ghost".into();
        assert!(matches!(h.engine.handle(b).await, Err(Error::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn debounced_burst_becomes_one_turn() {
        let h = harness();
        let debouncer = crate::runtime::debounce::Debouncer::new(h.engine.clone());
        for part in ["I want", "to book", "tomorrow"] {
            debouncer.push("acme", "5511", "5511", part.into(), Duration::from_secs(30));
            tokio::time::sleep(Duration::from_secs(3)).await;
        }
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(h.assistant.runs_created(), 1);
        let thread = h.assistant.thread_messages("thread_1");
        assert_eq!(thread[0].content, "I want to book tomorrow");
    }
}
