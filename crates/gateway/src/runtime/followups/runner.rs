//! Follow-up runner: claims due rows and hands them to the transport.

use std::sync::Arc;

use crate::transport::Transport;

use super::scheduler::FollowUpScheduler;

pub struct FollowUpRunner {
    scheduler: Arc<FollowUpScheduler>,
    transport: Arc<dyn Transport>,
}

/// Counters for one tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub claimed: usize,
    pub sent: usize,
    pub failed: usize,
}

impl FollowUpRunner {
    pub fn new(scheduler: Arc<FollowUpScheduler>, transport: Arc<dyn Transport>) -> Self {
        Self {
            scheduler,
            transport,
        }
    }

    /// Deliver everything due now.  A row is claimed before it is sent, so
    /// a failed send is logged and not retried.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();
        for id in self.scheduler.due_ids() {
            let delivery = match self.scheduler.claim(&id) {
                Ok(Some(d)) => d,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "failed to claim scheduled message");
                    continue;
                }
            };
            report.claimed += 1;
            for chat_id in &delivery.recipients {
                match self
                    .transport
                    .send_text(&delivery.tenant_id, chat_id, &delivery.message)
                    .await
                {
                    Ok(()) => report.sent += 1,
                    Err(e) => {
                        report.failed += 1;
                        tracing::warn!(
                            tenant = %delivery.tenant_id,
                            chat_id = %chat_id,
                            id = %delivery.id,
                            error = %e,
                            "scheduled send failed"
                        );
                    }
                }
            }
        }
        if report.claimed > 0 {
            tracing::info!(
                claimed = report.claimed,
                sent = report.sent,
                failed = report.failed,
                "follow-up tick"
            );
        }
        report
    }
}
