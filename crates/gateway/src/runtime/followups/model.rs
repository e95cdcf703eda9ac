use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use rd_domain::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scheduled message
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Allowed transitions: `scheduled → paused → scheduled` and
/// `scheduled → completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Scheduled,
    Paused,
    Completed,
}

impl MessageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        use MessageStatus::*;
        matches!(
            (self, next),
            (Scheduled, Scheduled)
                | (Paused, Paused)
                | (Completed, Completed)
                | (Scheduled, Paused)
                | (Paused, Scheduled)
                | (Scheduled, Completed)
        )
    }
}

/// Epoch timestamp in the `{seconds, nanoseconds}` shape used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScheduledTime {
    pub seconds: i64,
    #[serde(default)]
    pub nanoseconds: u32,
}

impl ScheduledTime {
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self {
            seconds: at.timestamp(),
            nanoseconds: at.timestamp_subsec_nanos(),
        }
    }

    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.seconds, self.nanoseconds).single()
    }

    pub fn shifted(self, by: Duration) -> Self {
        match self.to_datetime() {
            Some(at) => Self::from_datetime(at + by),
            None => Self {
                seconds: self.seconds + by.num_seconds(),
                nanoseconds: self.nanoseconds,
            },
        }
    }

    /// `self - earlier`, with nanosecond precision.
    pub fn since(self, earlier: Self) -> Duration {
        Duration::seconds(self.seconds - earlier.seconds)
            + Duration::nanoseconds(i64::from(self.nanoseconds) - i64::from(earlier.nanoseconds))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatUnit {
    Minutes,
    Hours,
    Days,
}

impl RepeatUnit {
    pub fn duration(self, n: u32) -> Duration {
        let n = i64::from(n);
        match self {
            Self::Minutes => Duration::minutes(n),
            Self::Hours => Duration::hours(n),
            Self::Days => Duration::days(n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledMessage {
    pub id: String,
    pub tenant_id: String,
    pub chat_ids: Vec<String>,
    pub message: String,
    pub scheduled_time: ScheduledTime,
    pub status: MessageStatus,
    #[serde(rename = "type")]
    pub message_type: String,
    /// Free-form; `linked_chat_id` marks a secondary-recipient reminder and
    /// `step` the position in a sequence.
    #[serde(default)]
    pub metadata: Value,
    /// Recipients per send; the rest are re-scheduled.
    #[serde(default)]
    pub batch_quantity: Option<u32>,
    #[serde(default)]
    pub repeat_interval: Option<u32>,
    #[serde(default)]
    pub repeat_unit: Option<RepeatUnit>,
    /// When the row was paused.  `scheduled_time` itself is never touched
    /// by a pause.
    #[serde(default)]
    pub paused_at: Option<ScheduledTime>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// How many of `chat_ids`, in order, have already been claimed.
    #[serde(default)]
    pub delivered_count: usize,
}

impl ScheduledMessage {
    pub fn linked_chat_id(&self) -> Option<&str> {
        self.metadata.get("linked_chat_id").and_then(|v| v.as_str())
    }

    /// Gap before the remaining recipients of a batched send go out.
    pub fn repeat_every(&self) -> Duration {
        self.repeat_unit
            .unwrap_or(RepeatUnit::Days)
            .duration(self.repeat_interval.unwrap_or(1).max(1))
    }

    /// Recipients not yet claimed.
    pub fn pending_chat_ids(&self) -> &[String] {
        &self.chat_ids[self.delivered_count.min(self.chat_ids.len())..]
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Requests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn d_status() -> MessageStatus {
    MessageStatus::Scheduled
}

fn d_type() -> String {
    "follow_up".into()
}

/// Payload accepted by `create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewScheduledMessage {
    pub chat_ids: Vec<String>,
    pub message: String,
    pub scheduled_time: ScheduledTime,
    #[serde(default = "d_status")]
    pub status: MessageStatus,
    #[serde(rename = "type", default = "d_type")]
    pub message_type: String,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub batch_quantity: Option<u32>,
    #[serde(default)]
    pub repeat_interval: Option<u32>,
    #[serde(default)]
    pub repeat_unit: Option<RepeatUnit>,
}

impl NewScheduledMessage {
    pub fn new(chat_id: &str, message: &str, at: DateTime<Utc>, message_type: &str) -> Self {
        Self {
            chat_ids: vec![chat_id.to_owned()],
            message: message.to_owned(),
            scheduled_time: ScheduledTime::from_datetime(at),
            status: MessageStatus::Scheduled,
            message_type: message_type.to_owned(),
            metadata: Value::Object(Default::default()),
            batch_quantity: None,
            repeat_interval: None,
            repeat_unit: None,
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        if !self.metadata.is_object() {
            self.metadata = Value::Object(Default::default());
        }
        if let Some(obj) = self.metadata.as_object_mut() {
            obj.insert(key.to_owned(), value.into());
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.chat_ids.iter().all(|c| c.trim().is_empty()) {
            return Err(Error::Validation("chatIds must name at least one chat".into()));
        }
        if self.message.trim().is_empty() {
            return Err(Error::Validation("message must not be empty".into()));
        }
        if self.status == MessageStatus::Completed {
            return Err(Error::Validation("cannot create a completed message".into()));
        }
        if self.batch_quantity == Some(0) {
            return Err(Error::Validation("batchQuantity must be positive".into()));
        }
        if self.scheduled_time.to_datetime().is_none() {
            return Err(Error::Validation("scheduledTime is out of range".into()));
        }
        Ok(())
    }
}

/// Partial update accepted by `update`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledMessagePatch {
    pub chat_ids: Option<Vec<String>>,
    pub message: Option<String>,
    pub scheduled_time: Option<ScheduledTime>,
    pub status: Option<MessageStatus>,
    #[serde(rename = "type")]
    pub message_type: Option<String>,
    pub metadata: Option<Value>,
    pub batch_quantity: Option<u32>,
    pub repeat_interval: Option<u32>,
    pub repeat_unit: Option<RepeatUnit>,
}

/// Selects rows for pause / resume / delete.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpFilter {
    pub chat_id: String,
    #[serde(rename = "type", default)]
    pub message_type: Option<String>,
    /// Also act on rows whose `metadata.linked_chat_id` is `chat_id`.
    #[serde(default)]
    pub include_linked: bool,
}

impl FollowUpFilter {
    pub fn chat(chat_id: &str) -> Self {
        Self {
            chat_id: chat_id.to_owned(),
            ..Self::default()
        }
    }

    pub fn of_type(mut self, message_type: Option<&str>) -> Self {
        self.message_type = message_type.map(str::to_owned);
        self
    }

    pub fn with_linked(mut self) -> Self {
        self.include_linked = true;
        self
    }
}

/// Result of a resume.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResumeOutcome {
    /// Shift applied to every resumed row, in seconds.
    pub delta_seconds: i64,
    /// `(id, new scheduled time)` in original-time order.
    pub resumed: Vec<(String, ScheduledTime)>,
}

/// One due send claimed by the runner.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub id: String,
    pub tenant_id: String,
    pub recipients: Vec<String>,
    pub message: String,
    pub message_type: String,
}
