//! Follow-up scheduler: time-anchored messages with offset-preserving
//! pause and resume.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Duration;

use rd_domain::clock::Clock;
use rd_domain::error::{Error, Result};
use rd_store::{DocumentStore, Filter};

use super::model::{
    Delivery, FollowUpFilter, MessageStatus, NewScheduledMessage, ResumeOutcome,
    ScheduledMessage, ScheduledMessagePatch, ScheduledTime,
};

pub const COLLECTION: &str = "scheduled_messages";

pub struct FollowUpScheduler {
    docs: Arc<DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl FollowUpScheduler {
    pub fn new(docs: Arc<DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { docs, clock }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // ── Single-row operations ──────────────────────────────────────

    pub fn create(&self, tenant_id: &str, payload: NewScheduledMessage) -> Result<ScheduledMessage> {
        payload.validate()?;
        let msg = ScheduledMessage {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_owned(),
            chat_ids: payload
                .chat_ids
                .into_iter()
                .filter(|c| !c.trim().is_empty())
                .collect(),
            message: payload.message,
            scheduled_time: payload.scheduled_time,
            status: payload.status,
            message_type: payload.message_type,
            metadata: payload.metadata,
            batch_quantity: payload.batch_quantity,
            repeat_interval: payload.repeat_interval,
            repeat_unit: payload.repeat_unit,
            paused_at: None,
            created_at: self.clock.now(),
            completed_at: None,
            delivered_count: 0,
        };
        self.docs.put(COLLECTION, &msg.id, &msg)?;
        tracing::info!(
            tenant = tenant_id,
            id = %msg.id,
            message_type = %msg.message_type,
            at = msg.scheduled_time.seconds,
            "scheduled message created"
        );
        Ok(msg)
    }

    pub fn get(&self, tenant_id: &str, id: &str) -> Result<Option<ScheduledMessage>> {
        Ok(self
            .docs
            .get_as::<ScheduledMessage>(COLLECTION, id)?
            .filter(|m| m.tenant_id == tenant_id))
    }

    pub fn update(
        &self,
        tenant_id: &str,
        id: &str,
        patch: ScheduledMessagePatch,
    ) -> Result<ScheduledMessage> {
        self.docs.transaction(|tx| {
            let mut msg: ScheduledMessage = match tx.get(COLLECTION, id) {
                Some(v) => serde_json::from_value(v)?,
                None => return Err(Error::NotFound(format!("scheduled message {id}"))),
            };
            if msg.tenant_id != tenant_id {
                return Err(Error::NotFound(format!("scheduled message {id}")));
            }
            let patch = patch.clone();
            if let Some(chat_ids) = patch.chat_ids {
                msg.chat_ids = chat_ids;
                msg.delivered_count = 0;
            }
            if let Some(message) = patch.message {
                msg.message = message;
            }
            if let Some(at) = patch.scheduled_time {
                msg.scheduled_time = at;
            }
            if let Some(status) = patch.status {
                if !msg.status.can_transition_to(status) {
                    return Err(Error::Validation(format!(
                        "cannot move scheduled message from {} to {}",
                        msg.status.as_str(),
                        status.as_str()
                    )));
                }
                if status == MessageStatus::Paused && msg.status != MessageStatus::Paused {
                    msg.paused_at = Some(ScheduledTime::from_datetime(self.clock.now()));
                }
                if status != MessageStatus::Paused {
                    msg.paused_at = None;
                }
                msg.status = status;
            }
            if let Some(t) = patch.message_type {
                msg.message_type = t;
            }
            if let Some(metadata) = patch.metadata {
                msg.metadata = metadata;
            }
            if patch.batch_quantity.is_some() {
                msg.batch_quantity = patch.batch_quantity;
            }
            if patch.repeat_interval.is_some() {
                msg.repeat_interval = patch.repeat_interval;
            }
            if patch.repeat_unit.is_some() {
                msg.repeat_unit = patch.repeat_unit;
            }
            if msg.chat_ids.is_empty() || msg.message.trim().is_empty() {
                return Err(Error::Validation(
                    "chatIds and message must not be empty".into(),
                ));
            }
            tx.set(COLLECTION, id, serde_json::to_value(&msg)?, false);
            Ok(msg)
        })
    }

    pub fn delete_one(&self, tenant_id: &str, id: &str) -> Result<bool> {
        if self.get(tenant_id, id)?.is_none() {
            return Ok(false);
        }
        self.docs.delete(COLLECTION, id)
    }

    /// Every row addressed to `chat_id`, ordered by scheduled time.
    pub fn list_for(&self, tenant_id: &str, chat_id: &str) -> Vec<ScheduledMessage> {
        let mut rows = self.query(&[
            Filter::eq("tenantId", tenant_id),
            Filter::contains("chatIds", chat_id),
        ]);
        rows.sort_by_key(|m| m.scheduled_time);
        rows
    }

    // ── Filter operations ──────────────────────────────────────────

    /// Pause every matching `scheduled` row.  Payload and scheduled time
    /// are kept as they are.  Returns the paused ids.
    pub fn pause(&self, tenant_id: &str, filter: &FollowUpFilter) -> Result<Vec<String>> {
        let (primary, linked) = self.select(tenant_id, filter, Some(MessageStatus::Scheduled));
        let ids: Vec<String> = primary.iter().chain(&linked).map(|m| m.id.clone()).collect();
        let now = ScheduledTime::from_datetime(self.clock.now());

        let paused = self.docs.transaction(|tx| {
            let mut paused = Vec::new();
            for id in &ids {
                let Some(raw) = tx.get(COLLECTION, id) else {
                    continue;
                };
                let mut msg: ScheduledMessage = serde_json::from_value(raw)?;
                if msg.status != MessageStatus::Scheduled {
                    continue;
                }
                msg.status = MessageStatus::Paused;
                msg.paused_at = Some(now);
                tx.set(COLLECTION, id, serde_json::to_value(&msg)?, false);
                paused.push(id.clone());
            }
            Ok(paused)
        })?;

        tracing::info!(
            tenant = tenant_id,
            chat_id = %filter.chat_id,
            count = paused.len(),
            "follow-ups paused"
        );
        Ok(paused)
    }

    /// Resume every matching `paused` row, shifting all of them by the
    /// same Δ so a sequence keeps its spacing.
    ///
    /// Δ is measured from the anchor: the earliest recorded pause instant
    /// among the primary rows, or, for rows paused without one, the
    /// earliest original scheduled time.  Linked rows are shifted by the Δ
    /// of their primary rows.  A negative Δ is rejected.
    pub fn resume(&self, tenant_id: &str, filter: &FollowUpFilter) -> Result<ResumeOutcome> {
        let (primary, linked) = self.select(tenant_id, filter, Some(MessageStatus::Paused));
        let anchor_rows = if primary.is_empty() { &linked } else { &primary };
        let Some(anchor) = resume_anchor(anchor_rows) else {
            return Ok(ResumeOutcome {
                delta_seconds: 0,
                resumed: Vec::new(),
            });
        };

        let now = ScheduledTime::from_datetime(self.clock.now());
        let delta = now.since(anchor);
        if delta < Duration::zero() {
            return Err(Error::Validation(format!(
                "cannot resume before the anchor time ({}s ahead)",
                -delta.num_seconds()
            )));
        }

        let mut rows: Vec<ScheduledMessage> = primary.into_iter().chain(linked).collect();
        rows.sort_by_key(|m| m.scheduled_time);
        let ids: Vec<String> = rows.into_iter().map(|m| m.id).collect();

        let resumed = self.docs.transaction(|tx| {
            let mut resumed = Vec::new();
            for id in &ids {
                let Some(raw) = tx.get(COLLECTION, id) else {
                    continue;
                };
                let mut msg: ScheduledMessage = serde_json::from_value(raw)?;
                if msg.status != MessageStatus::Paused {
                    continue;
                }
                msg.scheduled_time = msg.scheduled_time.shifted(delta);
                msg.status = MessageStatus::Scheduled;
                msg.paused_at = None;
                tx.set(COLLECTION, id, serde_json::to_value(&msg)?, false);
                resumed.push((id.clone(), msg.scheduled_time));
            }
            Ok(resumed)
        })?;

        tracing::info!(
            tenant = tenant_id,
            chat_id = %filter.chat_id,
            count = resumed.len(),
            delta_secs = delta.num_seconds(),
            "follow-ups resumed"
        );
        Ok(ResumeOutcome {
            delta_seconds: delta.num_seconds(),
            resumed,
        })
    }

    /// Remove every matching row that has not completed.
    pub fn delete(&self, tenant_id: &str, filter: &FollowUpFilter) -> Result<usize> {
        let (primary, linked) = self.select(tenant_id, filter, None);
        let ids: Vec<String> = primary
            .iter()
            .chain(&linked)
            .filter(|m| m.status != MessageStatus::Completed)
            .map(|m| m.id.clone())
            .collect();

        let removed = self.docs.transaction(|tx| {
            let mut removed = 0;
            for id in &ids {
                let Some(raw) = tx.get(COLLECTION, id) else {
                    continue;
                };
                let msg: ScheduledMessage = serde_json::from_value(raw)?;
                if msg.status == MessageStatus::Completed {
                    continue;
                }
                tx.delete(COLLECTION, id);
                removed += 1;
            }
            Ok(removed)
        })?;

        tracing::info!(
            tenant = tenant_id,
            chat_id = %filter.chat_id,
            removed,
            "follow-ups deleted"
        );
        Ok(removed)
    }

    /// Physically remove a contact's rows of one type, in any status.
    /// `step` narrows to a single position of a sequence.
    pub fn cleanup(
        &self,
        tenant_id: &str,
        contact_id: &str,
        message_type: &str,
        step: Option<u32>,
    ) -> Result<usize> {
        let mut filters = vec![
            Filter::eq("tenantId", tenant_id),
            Filter::contains("chatIds", contact_id),
            Filter::eq("type", message_type),
        ];
        if let Some(step) = step {
            filters.push(Filter::eq("metadata.step", step));
        }
        let ids: Vec<String> = self.query(&filters).into_iter().map(|m| m.id).collect();
        self.docs.transaction(|tx| {
            for id in &ids {
                tx.delete(COLLECTION, id);
            }
            Ok(())
        })?;
        Ok(ids.len())
    }

    // ── Delivery ───────────────────────────────────────────────────

    /// Ids of `scheduled` rows whose time has come, across all tenants.
    pub fn due_ids(&self) -> Vec<String> {
        let now = self.clock.now().timestamp();
        let mut rows = self.query(&[
            Filter::eq("status", MessageStatus::Scheduled.as_str()),
            Filter::lte("scheduledTime.seconds", now),
        ]);
        rows.sort_by_key(|m| m.scheduled_time);
        rows.into_iter().map(|m| m.id).collect()
    }

    /// Atomically take the next batch of recipients from a due row.  The
    /// row is marked `completed` once every recipient has been claimed;
    /// otherwise it is pushed back by its repeat interval.
    pub fn claim(&self, id: &str) -> Result<Option<Delivery>> {
        let now = self.clock.now();
        self.docs.transaction(|tx| {
            let Some(raw) = tx.get(COLLECTION, id) else {
                return Ok(None);
            };
            let mut msg: ScheduledMessage = serde_json::from_value(raw)?;
            let due = msg
                .scheduled_time
                .to_datetime()
                .map(|at| at <= now)
                .unwrap_or(true);
            if msg.status != MessageStatus::Scheduled || !due {
                return Ok(None);
            }

            let pending = msg.pending_chat_ids();
            if pending.is_empty() {
                msg.status = MessageStatus::Completed;
                msg.completed_at = Some(now);
                tx.set(COLLECTION, id, serde_json::to_value(&msg)?, false);
                return Ok(None);
            }
            let take = msg
                .batch_quantity
                .map(|q| q.max(1) as usize)
                .unwrap_or(pending.len())
                .min(pending.len());
            let recipients = pending[..take].to_vec();
            msg.delivered_count += take;

            if msg.pending_chat_ids().is_empty() {
                msg.status = MessageStatus::Completed;
                msg.completed_at = Some(now);
            } else {
                msg.scheduled_time = msg.scheduled_time.shifted(msg.repeat_every());
            }
            tx.set(COLLECTION, id, serde_json::to_value(&msg)?, false);

            Ok(Some(Delivery {
                id: msg.id.clone(),
                tenant_id: msg.tenant_id.clone(),
                recipients,
                message: msg.message.clone(),
                message_type: msg.message_type.clone(),
            }))
        })
    }

    // ── Internal ───────────────────────────────────────────────────

    fn query(&self, filters: &[Filter]) -> Vec<ScheduledMessage> {
        self.docs
            .query(COLLECTION, filters)
            .into_iter()
            .filter_map(|d| match d.parse() {
                Ok(m) => Some(m),
                Err(e) => {
                    tracing::warn!(key = %d.key, error = %e, "skipping malformed scheduled message");
                    None
                }
            })
            .collect()
    }

    /// Primary rows (addressed to the chat) and, when asked for, linked
    /// rows (reminders whose `metadata.linked_chat_id` is the chat).
    fn select(
        &self,
        tenant_id: &str,
        filter: &FollowUpFilter,
        status: Option<MessageStatus>,
    ) -> (Vec<ScheduledMessage>, Vec<ScheduledMessage>) {
        let mut common = vec![Filter::eq("tenantId", tenant_id)];
        if let Some(status) = status {
            common.push(Filter::eq("status", status.as_str()));
        }
        if let Some(t) = &filter.message_type {
            common.push(Filter::eq("type", t.as_str()));
        }

        let mut by_chat = common.clone();
        by_chat.push(Filter::contains("chatIds", filter.chat_id.as_str()));
        let primary = self.query(&by_chat);

        let linked = if filter.include_linked {
            let seen: HashSet<&str> = primary.iter().map(|m| m.id.as_str()).collect();
            let mut by_link = common;
            by_link.push(Filter::eq("metadata.linked_chat_id", filter.chat_id.as_str()));
            self.query(&by_link)
                .into_iter()
                .filter(|m| !seen.contains(m.id.as_str()))
                .collect()
        } else {
            Vec::new()
        };
        (primary, linked)
    }
}

fn resume_anchor(rows: &[ScheduledMessage]) -> Option<ScheduledTime> {
    rows.iter()
        .filter_map(|m| m.paused_at)
        .min()
        .or_else(|| rows.iter().map(|m| m.scheduled_time).min())
}
