use std::sync::Arc;

use rd_assistant::AssistantApi;
use rd_domain::clock::Clock;
use rd_domain::config::Config;
use rd_sessions::ThreadManager;
use rd_store::DocumentStore;

use crate::runtime::assignment::{AssignmentEngine, RosterCache};
use crate::runtime::contacts::ContactStore;
use crate::runtime::debounce::Debouncer;
use crate::runtime::followups::{FollowUpRunner, FollowUpScheduler};
use crate::runtime::tools::ToolRegistry;
use crate::runtime::turn::TurnEngine;
use crate::tenants::TenantRegistry;
use crate::transport::Transport;

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Core**: config, clock, document store, tenant table
/// - **Conversation**: assistant, threads, debouncer, turn pipeline, tools
/// - **Scheduling & assignment**: follow-ups, contacts, rosters
/// - **Security**: token hashes computed at startup
#[derive(Clone)]
pub struct AppState {
    // ── Core ──────────────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub clock: Arc<dyn Clock>,
    pub docs: Arc<DocumentStore>,
    pub tenants: Arc<TenantRegistry>,

    // ── Conversation ──────────────────────────────────────────────────
    pub assistant: Arc<dyn AssistantApi>,
    pub threads: Arc<ThreadManager>,
    pub tools: Arc<ToolRegistry>,
    pub turns: Arc<TurnEngine>,
    pub debouncer: Arc<Debouncer>,
    pub transport: Arc<dyn Transport>,

    // ── Scheduling & assignment ───────────────────────────────────────
    pub scheduler: Arc<FollowUpScheduler>,
    pub followup_runner: Arc<FollowUpRunner>,
    pub contacts: Arc<ContactStore>,
    pub roster: Arc<RosterCache>,
    pub assignment: Arc<AssignmentEngine>,

    // ── Security (startup-computed) ───────────────────────────────────
    /// SHA-256 hash of the API bearer token.
    /// `None` = dev mode (no auth enforced).
    pub api_token_hash: Option<Vec<u8>>,
    /// HMAC key for inbound webhook signatures.
    /// `None` = signatures are not checked.
    pub inbound_secret: Option<Vec<u8>>,
}
