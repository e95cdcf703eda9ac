//! Conversation turn orchestration.
//!
//! Inbound messages are normalized and buffered by the [`debounce`]
//! module; a flush becomes one [`turn`], which resolves the contact's
//! thread, drives an assistant run through [`runs`] (dispatching tool calls
//! through [`tools`]) and delivers the reply parts.  The follow-up
//! scheduler and the assignment engine are reachable both from tool calls
//! and directly from the HTTP API.

pub mod assignment;
pub mod contacts;
pub mod debounce;
pub mod followups;
pub mod normalize;
pub mod reply;
pub mod runs;
pub mod tools;
pub mod turn;

pub use debounce::{Debouncer, FlushHandler, Flushed};
pub use runs::{RunEngine, RunOutcome, RunReport, RunSettings};
pub use turn::{TurnEngine, TurnReport, RESET_COMMAND};
