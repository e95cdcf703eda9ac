use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use rd_domain::config::ToolCategory;
use rd_domain::error::Result;
use rd_domain::tool::ToolDefinition;

use crate::runtime::assignment::AssignmentEngine;
use crate::runtime::contacts::ContactStore;
use crate::tenants::render;

use super::{parse_args, ToolContext, ToolHandler};

pub const HANDOFF_TAG: &str = "handoff";

/// `handoff_to_human`: assign the contact to staff and alert the team
/// through the turn's transport.
pub struct HandoffToHuman {
    assignment: Arc<AssignmentEngine>,
    contacts: Arc<ContactStore>,
}

impl HandoffToHuman {
    pub fn new(assignment: Arc<AssignmentEngine>, contacts: Arc<ContactStore>) -> Self {
        Self {
            assignment,
            contacts,
        }
    }
}

/// Alerts quote at most this many characters of the customer's text.
const QUOTE_CHARS: usize = 280;

fn quote(conversation: &str) -> String {
    let trimmed = conversation.trim();
    match trimmed.char_indices().nth(QUOTE_CHARS) {
        Some((cut, _)) => format!("{}…", &trimmed[..cut]),
        None => trimmed.to_owned(),
    }
}

#[derive(Deserialize, Default)]
struct Args {
    #[serde(default)]
    reason: String,
}

#[async_trait::async_trait]
impl ToolHandler for HandoffToHuman {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "handoff_to_human".into(),
            description: "Hand the conversation to a human staff member.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "reason": { "type": "string", "description": "Why a human is needed" }
                }
            }),
        }
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Handoff
    }

    async fn call(&self, ctx: &ToolContext, args: &Value) -> Result<Value> {
        let args: Args = parse_args(args)?;
        let tenant = &ctx.tenant;
        let assignment = self.assignment.assign_contact(tenant, &ctx.contact_id).await?;
        self.contacts.add_tag(&tenant.id, &ctx.contact_id, HANDOFF_TAG)?;

        if let Some(group) = &tenant.config.target_group_id {
            let headline = render(
                &tenant.config.templates.staff_assigned,
                &[
                    ("contact", ctx.contact_id.as_str()),
                    ("staff", assignment.assignee.name.as_str()),
                    ("tenant", tenant.display_name()),
                ],
            );
            let said = quote(&ctx.conversation);
            let text = tenant.notification(
                &headline,
                &[("Reason", args.reason.as_str()), ("Customer said", said.as_str())],
            );
            if let Err(e) = ctx.transport.send_text(&tenant.id, group, &text).await {
                tracing::warn!(tenant = %tenant.id, error = %e, "handoff group alert failed");
            }
        }

        Ok(json!({
            "status": "assigned",
            "assignee": assignment.assignee.name,
            "manager": assignment.manager.map(|m| m.name),
        }))
    }
}
