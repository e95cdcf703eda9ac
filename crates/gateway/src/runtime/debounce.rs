//! Per-conversation message debouncing.
//!
//! Messages for one conversation are buffered until it has been quiet for
//! the tenant's window; then the buffer is flushed once, space-joined in
//! arrival order.  Every arrival cancels the outstanding timer and arms a
//! new one, so at most one timer exists per conversation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// A coalesced batch handed to the turn pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Flushed {
    pub tenant_id: String,
    pub chat_id: String,
    pub contact_id: String,
    pub text: String,
    pub message_count: usize,
}

/// Receives flushed conversations.  Runs on the timer task, so a slow or
/// failing handler never blocks new arrivals.
#[async_trait::async_trait]
pub trait FlushHandler: Send + Sync + 'static {
    async fn on_flush(&self, batch: Flushed);
}

type ConversationKey = (String, String);

struct Pending {
    parts: Vec<String>,
    contact_id: String,
    generation: u64,
    timer: JoinHandle<()>,
}

pub struct Debouncer {
    handler: Arc<dyn FlushHandler>,
    pending: Arc<Mutex<HashMap<ConversationKey, Pending>>>,
    generation: AtomicU64,
}

impl Debouncer {
    pub fn new(handler: Arc<dyn FlushHandler>) -> Self {
        Self {
            handler,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Buffer `text` for the conversation and (re)arm its flush timer.
    pub fn push(
        &self,
        tenant_id: &str,
        chat_id: &str,
        contact_id: &str,
        text: String,
        window: Duration,
    ) {
        let key = (tenant_id.to_owned(), chat_id.to_owned());
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;

        let mut pending = self.pending.lock();
        let timer = self.arm(key.clone(), generation, window);
        match pending.get_mut(&key) {
            Some(p) => {
                p.timer.abort();
                p.timer = timer;
                p.generation = generation;
                p.parts.push(text);
            }
            None => {
                pending.insert(
                    key,
                    Pending {
                        parts: vec![text],
                        contact_id: contact_id.to_owned(),
                        generation,
                        timer,
                    },
                );
            }
        }
        tracing::debug!(tenant = tenant_id, chat_id, generation, "debounce timer armed");
    }

    /// Conversations with buffered messages.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    fn arm(&self, key: ConversationKey, generation: u64, window: Duration) -> JoinHandle<()> {
        let pending = self.pending.clone();
        let handler = self.handler.clone();
        tokio::spawn(async move {
            tokio::time::sleep(window).await;

            // A newer arrival may have replaced this timer after it fired
            // but before it got the lock.
            let entry = {
                let mut map = pending.lock();
                match map.get(&key) {
                    Some(p) if p.generation == generation => map.remove(&key),
                    _ => None,
                }
            };
            let Some(entry) = entry else {
                return;
            };

            let (tenant_id, chat_id) = key;
            tracing::debug!(
                tenant = %tenant_id,
                chat_id = %chat_id,
                messages = entry.parts.len(),
                "debounce flush"
            );
            let batch = Flushed {
                tenant_id,
                chat_id,
                contact_id: entry.contact_id,
                message_count: entry.parts.len(),
                text: entry.parts.join(" "),
            };
            handler.on_flush(batch).await;
        })
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        for (_, p) in self.pending.lock().drain() {
            p.timer.abort();
        }
    }
}
