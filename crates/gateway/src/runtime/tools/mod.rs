//! Tool dispatch registry.
//!
//! Maps tool names to handlers, builds the per-tenant definition list
//! passed to run creation, and executes the calls of one `requires_action`
//! step.  Every call yields exactly one output in the order the calls were
//! given; handler errors and panics become serialized error objects.

pub mod booking;
pub mod followups;
pub mod handoff;
pub mod tagging;
pub mod tasks;

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::Instrument;

use rd_domain::clock::Clock;
use rd_domain::config::ToolCategory;
use rd_domain::error::{Error, Result};
use rd_domain::tool::{ToolCall, ToolDefinition, ToolOutput};
use rd_store::DocumentStore;

use crate::runtime::assignment::{AssignmentEngine, RosterCache};
use crate::runtime::contacts::ContactStore;
use crate::runtime::followups::FollowUpScheduler;
use crate::tenants::Tenant;
use crate::transport::Transport;

/// Who a tool call is acting for.
#[derive(Clone)]
pub struct ToolContext {
    pub tenant: Arc<Tenant>,
    pub contact_id: String,
    pub chat_id: String,
    /// The batched user text that started this turn.
    pub conversation: String,
    pub transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("tenant", &self.tenant.id)
            .field("contact_id", &self.contact_id)
            .field("chat_id", &self.chat_id)
            .field("conversation_len", &self.conversation.len())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// Tenants only see tools whose category they enable.
    fn category(&self) -> ToolCategory;

    async fn call(&self, ctx: &ToolContext, args: &Value) -> Result<Value>;
}

/// Decode tool arguments.  A JSON string holding an object is accepted
/// too, since some providers deliver arguments that way.
pub fn parse_args<T: DeserializeOwned>(args: &Value) -> Result<T> {
    let decoded = match args {
        Value::String(raw) => serde_json::from_str(raw)
            .map_err(|e| Error::Validation(format!("invalid arguments: {e}")))?,
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };
    serde_json::from_value(decoded).map_err(|e| Error::Validation(format!("invalid arguments: {e}")))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct ToolRegistry {
    handlers: BTreeMap<String, Arc<dyn ToolHandler>>,
}

/// Shared services the standard handlers act through.
#[derive(Clone)]
pub struct ToolServices {
    pub docs: Arc<DocumentStore>,
    pub clock: Arc<dyn Clock>,
    pub scheduler: Arc<FollowUpScheduler>,
    pub contacts: Arc<ContactStore>,
    pub assignment: Arc<AssignmentEngine>,
    pub roster: Arc<RosterCache>,
    pub transport: Arc<dyn Transport>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in tool.
    pub fn standard(services: &ToolServices) -> Self {
        let mut reg = Self::new();
        for action in followups::FollowUpAction::ALL {
            reg.register(Arc::new(followups::FollowUpTool::new(
                action,
                services.scheduler.clone(),
                services.clock.clone(),
            )));
        }
        reg.register(Arc::new(tagging::TagContact::new(services.contacts.clone())));
        reg.register(Arc::new(handoff::HandoffToHuman::new(
            services.assignment.clone(),
            services.contacts.clone(),
        )));
        reg.register(Arc::new(booking::BookAppointment::new(services)));
        reg.register(Arc::new(tasks::CreateTask::new(
            services.docs.clone(),
            services.clock.clone(),
            services.roster.clone(),
            services.transport.clone(),
        )));
        reg
    }

    /// Later registrations replace earlier ones with the same name.
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        let name = handler.definition().name;
        self.handlers.insert(name, handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Definitions of the tools the tenant has enabled, sorted by name.
    pub fn definitions_for(&self, tenant: &Tenant) -> Vec<ToolDefinition> {
        self.handlers
            .values()
            .filter(|h| tenant.has_tool(h.category()))
            .map(|h| h.definition())
            .collect()
    }

    /// Run all calls concurrently.  Outputs are returned in call order.
    pub async fn dispatch(&self, ctx: &ToolContext, calls: &[ToolCall]) -> Vec<ToolOutput> {
        let futures: Vec<_> = calls
            .iter()
            .map(|call| {
                let span = tracing::info_span!(
                    "tool.call",
                    tool_name = %call.tool_name,
                    call_id = %call.call_id,
                );
                self.dispatch_one(ctx, call).instrument(span)
            })
            .collect();
        futures_util::future::join_all(futures).await
    }

    async fn dispatch_one(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        let Some(handler) = self.handlers.get(&call.tool_name) else {
            tracing::warn!(tenant = %ctx.tenant.id, "unknown tool");
            return ToolOutput::error(
                &call.call_id,
                "not_found",
                format!("unknown tool: {}", call.tool_name),
            );
        };
        if !ctx.tenant.has_tool(handler.category()) {
            tracing::warn!(tenant = %ctx.tenant.id, "tool not enabled for tenant");
            return ToolOutput::error(
                &call.call_id,
                "disabled",
                format!("tool {} is not enabled", call.tool_name),
            );
        }

        let result = AssertUnwindSafe(handler.call(ctx, &call.arguments))
            .catch_unwind()
            .await;
        match result {
            Ok(Ok(value)) => {
                tracing::debug!("tool call succeeded");
                ToolOutput::new(&call.call_id, value.to_string())
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, kind = e.kind(), "tool call failed");
                ToolOutput::error(&call.call_id, e.kind(), e.to_string())
            }
            Err(_) => {
                tracing::error!("tool handler panicked");
                ToolOutput::error(&call.call_id, "panic", "tool handler panicked")
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixtures shared by the handler tests.

    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rd_domain::clock::ManualClock;
    use rd_domain::config::{Employee, TenantConfig};

    use crate::runtime::assignment::RoundRobin;
    use crate::transport::MemoryTransport;

    pub struct Fixture {
        pub services: ToolServices,
        pub clock: Arc<ManualClock>,
        pub transport: Arc<MemoryTransport>,
    }

    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    pub fn fixture() -> Fixture {
        let docs = Arc::new(DocumentStore::in_memory());
        let clock = Arc::new(ManualClock::new(t0()));
        let transport = Arc::new(MemoryTransport::new());
        let contacts = Arc::new(ContactStore::new(docs.clone()));
        let roster = Arc::new(RosterCache::new());
        let assignment = Arc::new(
            AssignmentEngine::new(
                roster.clone(),
                RoundRobin::new(docs.clone(), clock.clone()),
                contacts.clone(),
                transport.clone(),
            )
            .with_rng(StdRng::seed_from_u64(3)),
        );
        let services = ToolServices {
            scheduler: Arc::new(FollowUpScheduler::new(docs.clone(), clock.clone())),
            docs,
            clock: clock.clone(),
            contacts,
            assignment,
            roster,
            transport: transport.clone(),
        };
        Fixture {
            services,
            clock,
            transport,
        }
    }

    pub fn tenant(configure: impl FnOnce(&mut TenantConfig)) -> Arc<Tenant> {
        let mut cfg = TenantConfig {
            name: "Acme".into(),
            tools: vec![
                ToolCategory::Followups,
                ToolCategory::Tagging,
                ToolCategory::Handoff,
                ToolCategory::Booking,
                ToolCategory::Tasks,
            ],
            staff: vec![Employee {
                name: "sam".into(),
                phone: "sam-phone".into(),
                weight: 1,
                role: "sales".into(),
                group: None,
            }],
            ..TenantConfig::default()
        };
        configure(&mut cfg);
        Arc::new(Tenant::new("acme", cfg, 30))
    }

    pub fn ctx(tenant: Arc<Tenant>) -> ToolContext {
        ToolContext {
            tenant,
            contact_id: "5511".into(),
            chat_id: "5511".into(),
            conversation: "hi".into(),
            transport: Arc::new(MemoryTransport::new()),
        }
    }

    impl Fixture {
        /// Context whose transport records into `self.transport`.
        pub fn ctx(&self, tenant: Arc<Tenant>, conversation: &str) -> ToolContext {
            ToolContext {
                conversation: conversation.into(),
                transport: self.transport.clone(),
                ..ctx(tenant)
            }
        }
    }
}
