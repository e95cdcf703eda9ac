use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use rd_domain::clock::Clock;
use rd_domain::config::ToolCategory;
use rd_domain::error::{Error, Result};
use rd_domain::tool::ToolDefinition;
use rd_store::DocumentStore;

use crate::runtime::followups::{FollowUpScheduler, NewScheduledMessage};
use crate::tenants::{render, Tenant};
use crate::transport::Transport;

use super::{parse_args, ToolContext, ToolHandler, ToolServices};

pub const COLLECTION: &str = "bookings";
pub const INDEX_COLLECTION: &str = "booking_index";
pub const REMINDER_TYPE: &str = "booking_reminder";

/// How far ahead of the appointment the reminders go out.
const REMINDER_LEAD_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub number: u64,
    pub tenant_id: String,
    pub contact_id: String,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub calendar_id: Option<String>,
    #[serde(default)]
    pub sheet_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct BookingIndex {
    last: u64,
}

/// `book_appointment`: numbered booking, contact reminder, staff alert.
pub struct BookAppointment {
    docs: Arc<DocumentStore>,
    clock: Arc<dyn Clock>,
    scheduler: Arc<FollowUpScheduler>,
    transport: Arc<dyn Transport>,
}

#[derive(Deserialize)]
struct Args {
    at: DateTime<Utc>,
    #[serde(default)]
    service: String,
    #[serde(default)]
    notes: String,
}

impl BookAppointment {
    pub fn new(services: &ToolServices) -> Self {
        Self {
            docs: services.docs.clone(),
            clock: services.clock.clone(),
            scheduler: services.scheduler.clone(),
            transport: services.transport.clone(),
        }
    }

    /// Take the next booking number and write the record in one
    /// transaction, so concurrent bookings never share a number.
    fn record(&self, tenant: &Tenant, contact_id: &str, args: &Args) -> Result<BookingRecord> {
        let now = self.clock.now();
        self.docs.transaction(|tx| {
            let index: BookingIndex = match tx.get(INDEX_COLLECTION, &tenant.id) {
                Some(v) => serde_json::from_value(v)?,
                None => BookingIndex::default(),
            };
            let number = index.last + 1;
            let booking = BookingRecord {
                number,
                tenant_id: tenant.id.clone(),
                contact_id: contact_id.to_owned(),
                at: args.at,
                service: args.service.clone(),
                notes: args.notes.clone(),
                calendar_id: tenant.config.calendar_id.clone(),
                sheet_id: tenant.config.sheet_id.clone(),
                created_at: now,
            };
            tx.set(
                INDEX_COLLECTION,
                &tenant.id,
                serde_json::to_value(BookingIndex { last: number })?,
                false,
            );
            tx.set(
                COLLECTION,
                &format!("{}:{number}", tenant.id),
                serde_json::to_value(&booking)?,
                false,
            );
            Ok(booking)
        })
    }
}

#[async_trait::async_trait]
impl ToolHandler for BookAppointment {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "book_appointment".into(),
            description: "Book an appointment for the contact and schedule a reminder.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "at": { "type": "string", "description": "RFC 3339 appointment time" },
                    "service": { "type": "string" },
                    "notes": { "type": "string" }
                },
                "required": ["at"]
            }),
        }
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Booking
    }

    async fn call(&self, ctx: &ToolContext, args: &Value) -> Result<Value> {
        let args: Args = parse_args(args)?;
        let now = self.clock.now();
        if args.at <= now {
            return Err(Error::Validation("appointment time must be in the future".into()));
        }
        let tenant = &ctx.tenant;
        let booking = self.record(tenant, &ctx.contact_id, &args)?;
        let when = args
            .at
            .with_timezone(&tenant.tz)
            .format("%Y-%m-%d %H:%M")
            .to_string();
        let number = booking.number.to_string();
        let vars = [
            ("contact", ctx.contact_id.as_str()),
            ("when", when.as_str()),
            ("tenant", tenant.display_name()),
            ("details", args.service.as_str()),
        ];

        let remind_at = args.at - Duration::hours(REMINDER_LEAD_HOURS);
        let mut reminder_id = None;
        if remind_at > now {
            let reminder = NewScheduledMessage::new(
                &ctx.chat_id,
                &render(&tenant.config.templates.booking_reminder, &vars),
                remind_at,
                REMINDER_TYPE,
            )
            .with_metadata("booking", booking.number);
            reminder_id = Some(self.scheduler.create(&tenant.id, reminder)?.id);
        }

        if let Some(group) = &tenant.config.target_group_id {
            let alert = tenant.notification(
                &render(&tenant.config.templates.booking_alert, &vars),
                &[
                    ("Booking", number.as_str()),
                    ("Service", args.service.as_str()),
                    ("Notes", args.notes.as_str()),
                ],
            );
            if let Err(e) = self.transport.send_text(&tenant.id, group, &alert).await {
                tracing::warn!(tenant = %tenant.id, error = %e, "booking alert failed");
            }
            if remind_at > now {
                let staff_reminder = NewScheduledMessage::new(group, &alert, remind_at, REMINDER_TYPE)
                    .with_metadata("booking", booking.number)
                    .with_metadata("linked_chat_id", ctx.chat_id.as_str());
                self.scheduler.create(&tenant.id, staff_reminder)?;
            }
        }

        tracing::info!(tenant = %tenant.id, contact_id = %ctx.contact_id, booking = booking.number, "appointment booked");
        Ok(json!({
            "status": "booked",
            "booking": booking.number,
            "at": when,
            "reminder_id": reminder_id,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::runtime::followups::FollowUpFilter;

    #[tokio::test]
    async fn numbers_bookings_and_schedules_linked_reminders() {
        let fx = fixture();
        let tool = BookAppointment::new(&fx.services);
        let ctx = ctx(tenant(|c| {
            c.target_group_id = Some("staff-group".into());
            c.timezone = "America/Sao_Paulo".into();
        }));
        let at = t0() + Duration::days(3);

        let first = tool
            .call(&ctx, &json!({ "at": at.to_rfc3339(), "service": "haircut" }))
            .await
            .unwrap();
        let second = tool.call(&ctx, &json!({ "at": at.to_rfc3339() })).await.unwrap();
        assert_eq!(first["booking"], 1);
        assert_eq!(second["booking"], 2);
        // 12:00 UTC is 09:00 in São Paulo.
        assert_eq!(first["at"], "2026-06-04 09:00");

        let reminders = fx.services.scheduler.list_for("acme", "5511");
        assert_eq!(reminders.len(), 2);
        assert_eq!(
            reminders[0].scheduled_time.to_datetime().unwrap(),
            at - Duration::hours(24)
        );
        assert_eq!(fx.transport.texts_to("staff-group").len(), 2);

        // Staff reminders follow the contact's pause.
        let paused = fx
            .services
            .scheduler
            .pause("acme", &FollowUpFilter::chat("5511").with_linked())
            .unwrap();
        assert_eq!(paused.len(), 4);
    }

    #[tokio::test]
    async fn past_time_is_rejected() {
        let fx = fixture();
        let tool = BookAppointment::new(&fx.services);
        let err = tool
            .call(
                &ctx(tenant(|_| {})),
                &json!({ "at": (t0() - Duration::hours(1)).to_rfc3339() }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(fx.services.docs.query(COLLECTION, &[]).is_empty());
    }

    #[tokio::test]
    async fn short_notice_booking_skips_reminder() {
        let fx = fixture();
        let tool = BookAppointment::new(&fx.services);
        let out = tool
            .call(
                &ctx(tenant(|_| {})),
                &json!({ "at": (t0() + Duration::hours(2)).to_rfc3339() }),
            )
            .await
            .unwrap();
        assert!(out["reminder_id"].is_null());
        assert!(fx.services.scheduler.list_for("acme", "5511").is_empty());
    }
}
