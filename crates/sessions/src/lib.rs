//! Session management for relaydesk.
//!
//! Maps each (tenant, contact) pair to one durable assistant thread.  Thread
//! creation is serialized per contact so concurrent deliveries share a
//! single thread, and a reset discards the stored thread id so the next
//! turn starts fresh.

pub mod lock;
pub mod store;
pub mod threads;

pub use lock::{ContactGuard, ContactLockMap};
pub use store::{session_key, SessionRecord, SessionStore};
pub use threads::ThreadManager;
