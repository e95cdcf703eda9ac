//! Follow-up tools: schedule, pause, resume and cancel the contact's
//! scheduled messages.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use rd_domain::clock::Clock;
use rd_domain::config::ToolCategory;
use rd_domain::error::{Error, Result};
use rd_domain::tool::ToolDefinition;

use crate::runtime::followups::{FollowUpFilter, FollowUpScheduler, NewScheduledMessage};

use super::{parse_args, ToolContext, ToolHandler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUpAction {
    Schedule,
    Pause,
    Resume,
    Cancel,
}

impl FollowUpAction {
    pub const ALL: [FollowUpAction; 4] = [Self::Schedule, Self::Pause, Self::Resume, Self::Cancel];

    fn name(self) -> &'static str {
        match self {
            Self::Schedule => "schedule_follow_up",
            Self::Pause => "pause_follow_ups",
            Self::Resume => "resume_follow_ups",
            Self::Cancel => "cancel_follow_ups",
        }
    }
}

pub struct FollowUpTool {
    action: FollowUpAction,
    scheduler: Arc<FollowUpScheduler>,
    clock: Arc<dyn Clock>,
}

#[derive(Deserialize)]
struct ScheduleArgs {
    message: String,
    #[serde(default)]
    send_at: Option<DateTime<Utc>>,
    #[serde(default)]
    delay_minutes: Option<i64>,
    #[serde(default, rename = "type")]
    message_type: Option<String>,
    #[serde(default)]
    step: Option<u32>,
}

#[derive(Deserialize, Default)]
struct FilterArgs {
    #[serde(default, rename = "type")]
    message_type: Option<String>,
}

impl FollowUpTool {
    pub fn new(action: FollowUpAction, scheduler: Arc<FollowUpScheduler>, clock: Arc<dyn Clock>) -> Self {
        Self {
            action,
            scheduler,
            clock,
        }
    }

    fn schedule(&self, ctx: &ToolContext, args: ScheduleArgs) -> Result<Value> {
        let at = match (args.send_at, args.delay_minutes) {
            (Some(at), _) => at,
            (None, Some(m)) if m >= 0 => self.clock.now() + Duration::minutes(m),
            (None, Some(_)) => return Err(Error::Validation("delay_minutes must not be negative".into())),
            (None, None) => {
                return Err(Error::Validation("send_at or delay_minutes is required".into()))
            }
        };
        let mut payload = NewScheduledMessage::new(
            &ctx.chat_id,
            &args.message,
            at,
            args.message_type.as_deref().unwrap_or("follow_up"),
        );
        if let Some(step) = args.step {
            payload = payload.with_metadata("step", step);
        }
        let msg = self.scheduler.create(&ctx.tenant.id, payload)?;
        Ok(json!({
            "status": "scheduled",
            "id": msg.id,
            "send_at": at.to_rfc3339(),
        }))
    }

    fn filter(&self, ctx: &ToolContext, args: &FilterArgs) -> FollowUpFilter {
        FollowUpFilter::chat(&ctx.chat_id)
            .of_type(args.message_type.as_deref())
            .with_linked()
    }
}

#[async_trait::async_trait]
impl ToolHandler for FollowUpTool {
    fn definition(&self) -> ToolDefinition {
        let type_prop = json!({ "type": "string", "description": "Only act on follow-ups of this type" });
        let (description, parameters) = match self.action {
            FollowUpAction::Schedule => (
                "Schedule a message to be sent to the contact later.",
                json!({
                    "type": "object",
                    "properties": {
                        "message": { "type": "string", "description": "Text to send" },
                        "send_at": { "type": "string", "description": "RFC 3339 send time" },
                        "delay_minutes": { "type": "integer", "description": "Send this many minutes from now" },
                        "type": { "type": "string", "description": "Follow-up type, default follow_up" },
                        "step": { "type": "integer", "description": "Position in a sequence" }
                    },
                    "required": ["message"]
                }),
            ),
            FollowUpAction::Pause => (
                "Pause the contact's pending follow-ups, keeping their spacing.",
                json!({ "type": "object", "properties": { "type": type_prop } }),
            ),
            FollowUpAction::Resume => (
                "Resume the contact's paused follow-ups, shifted by the time spent paused.",
                json!({ "type": "object", "properties": { "type": type_prop } }),
            ),
            FollowUpAction::Cancel => (
                "Cancel the contact's pending follow-ups.",
                json!({ "type": "object", "properties": { "type": type_prop } }),
            ),
        };
        ToolDefinition {
            name: self.action.name().into(),
            description: description.into(),
            parameters,
        }
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Followups
    }

    async fn call(&self, ctx: &ToolContext, args: &Value) -> Result<Value> {
        let tenant = &ctx.tenant.id;
        match self.action {
            FollowUpAction::Schedule => self.schedule(ctx, parse_args(args)?),
            FollowUpAction::Pause => {
                let f: FilterArgs = parse_args(args)?;
                let ids = self.scheduler.pause(tenant, &self.filter(ctx, &f))?;
                Ok(json!({ "status": "paused", "count": ids.len() }))
            }
            FollowUpAction::Resume => {
                let f: FilterArgs = parse_args(args)?;
                let out = self.scheduler.resume(tenant, &self.filter(ctx, &f))?;
                Ok(json!({
                    "status": "resumed",
                    "count": out.resumed.len(),
                    "delta_seconds": out.delta_seconds,
                }))
            }
            FollowUpAction::Cancel => {
                let f: FilterArgs = parse_args(args)?;
                let removed = self.scheduler.delete(tenant, &self.filter(ctx, &f))?;
                Ok(json!({ "status": "cancelled", "count": removed }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;

    fn tool(fx: &Fixture, action: FollowUpAction) -> FollowUpTool {
        FollowUpTool::new(action, fx.services.scheduler.clone(), fx.services.clock.clone())
    }

    #[tokio::test]
    async fn schedule_then_pause_and_resume() {
        let fx = fixture();
        let ctx = ctx(tenant(|_| {}));

        let out = tool(&fx, FollowUpAction::Schedule)
            .call(&ctx, &json!({ "message": "still there?", "delay_minutes": 60, "step": 1 }))
            .await
            .unwrap();
        assert_eq!(out["status"], "scheduled");

        let paused = tool(&fx, FollowUpAction::Pause).call(&ctx, &json!({})).await.unwrap();
        assert_eq!(paused["count"], 1);

        fx.clock.advance(Duration::minutes(30));
        let resumed = tool(&fx, FollowUpAction::Resume).call(&ctx, &json!({})).await.unwrap();
        assert_eq!(resumed["delta_seconds"], 1800);

        let rows = fx.services.scheduler.list_for("acme", "5511");
        assert_eq!(
            rows[0].scheduled_time.to_datetime().unwrap(),
            t0() + Duration::minutes(90)
        );
    }

    #[tokio::test]
    async fn schedule_needs_a_time() {
        let fx = fixture();
        let ctx = ctx(tenant(|_| {}));
        let err = tool(&fx, FollowUpAction::Schedule)
            .call(&ctx, &json!({ "message": "hi" }))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn cancel_removes_pending_rows() {
        let fx = fixture();
        let ctx = ctx(tenant(|_| {}));
        for m in [10, 20] {
            tool(&fx, FollowUpAction::Schedule)
                .call(&ctx, &json!({ "message": "x", "delay_minutes": m }))
                .await
                .unwrap();
        }
        let out = tool(&fx, FollowUpAction::Cancel).call(&ctx, &json!(null)).await.unwrap();
        assert_eq!(out["count"], 2);
        assert!(fx.services.scheduler.list_for("acme", "5511").is_empty());
    }
}
