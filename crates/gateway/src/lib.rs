//! relaydesk gateway: the conversation turn pipeline, follow-up scheduler,
//! staff assignment, tenant strategy table, outbound transport, HTTP API
//! and CLI.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod runtime;
pub mod state;
pub mod tenants;
pub mod transport;
