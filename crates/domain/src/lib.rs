//! Shared types for relaydesk: the error taxonomy, configuration model,
//! tool-call and inbound-message shapes, and the clock abstraction used by
//! time-sensitive components.

pub mod clock;
pub mod config;
pub mod error;
pub mod message;
pub mod tool;

pub use error::{Error, Result};
