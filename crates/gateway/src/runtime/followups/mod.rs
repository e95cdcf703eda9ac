//! Scheduled follow-up messages.
//!
//! Rows live in the `scheduled_messages` collection.  The scheduler owns
//! every state change (create, patch, pause, resume, delete, cleanup,
//! claim) and the runner turns due rows into transport sends.

pub mod model;
pub mod runner;
pub mod scheduler;

pub use model::{
    Delivery, FollowUpFilter, MessageStatus, NewScheduledMessage, RepeatUnit, ResumeOutcome,
    ScheduledMessage, ScheduledMessagePatch, ScheduledTime,
};
pub use runner::{FollowUpRunner, TickReport};
pub use scheduler::FollowUpScheduler;
