use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use rd_domain::clock::Clock;
use rd_domain::config::ToolCategory;
use rd_domain::error::{Error, Result};
use rd_domain::tool::ToolDefinition;
use rd_store::DocumentStore;

use crate::runtime::assignment::RosterCache;
use crate::tenants::render;
use crate::transport::Transport;

use super::{parse_args, ToolContext, ToolHandler};

pub const COLLECTION: &str = "tasks";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub tenant_id: String,
    pub contact_id: String,
    pub title: String,
    pub assignee: String,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub sheet_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// `create_task`: record a staff task about the contact.
pub struct CreateTask {
    docs: Arc<DocumentStore>,
    clock: Arc<dyn Clock>,
    roster: Arc<RosterCache>,
    transport: Arc<dyn Transport>,
}

impl CreateTask {
    pub fn new(
        docs: Arc<DocumentStore>,
        clock: Arc<dyn Clock>,
        roster: Arc<RosterCache>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            docs,
            clock,
            roster,
            transport,
        }
    }
}

#[derive(Deserialize)]
struct Args {
    title: String,
    #[serde(default)]
    assignee: Option<String>,
    #[serde(default)]
    due_date: Option<String>,
    #[serde(default)]
    details: String,
}

#[async_trait::async_trait]
impl ToolHandler for CreateTask {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "create_task".into(),
            description: "Create a follow-up task for a staff member.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string" },
                    "assignee": { "type": "string", "description": "Staff member name" },
                    "due_date": { "type": "string", "description": "YYYY-MM-DD" },
                    "details": { "type": "string" }
                },
                "required": ["title", "assignee", "due_date"]
            }),
        }
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Tasks
    }

    async fn call(&self, ctx: &ToolContext, args: &Value) -> Result<Value> {
        let args: Args = parse_args(args)?;
        let assignee = args
            .assignee
            .map(|a| a.trim().to_owned())
            .filter(|a| !a.is_empty())
            .ok_or_else(|| Error::Validation("assignee is required".into()))?;
        let due_raw = args
            .due_date
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| Error::Validation("due_date is required".into()))?;
        let due_date = NaiveDate::parse_from_str(due_raw.trim(), "%Y-%m-%d")
            .map_err(|_| Error::Validation(format!("due_date {due_raw:?} is not YYYY-MM-DD")))?;
        if args.title.trim().is_empty() {
            return Err(Error::Validation("title must not be empty".into()));
        }

        let tenant = &ctx.tenant;
        let task = TaskRecord {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant.id.clone(),
            contact_id: ctx.contact_id.clone(),
            title: args.title.trim().to_owned(),
            assignee,
            due_date,
            details: args.details,
            sheet_id: tenant.config.sheet_id.clone(),
            created_at: self.clock.now(),
        };
        self.docs.put(COLLECTION, &task.id, &task)?;
        tracing::info!(tenant = %tenant.id, task_id = %task.id, assignee = %task.assignee, "task created");

        let roster = self.roster.snapshot(tenant);
        let staff = roster
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(&task.assignee));
        let notified = match staff {
            Some(staff) => {
                let due = task.due_date.to_string();
                let summary = format!("{} ({})", task.title, task.contact_id);
                let headline = render(
                    &tenant.config.templates.task_assigned,
                    &[
                        ("staff", staff.name.as_str()),
                        ("details", summary.as_str()),
                        ("contact", task.contact_id.as_str()),
                        ("when", due.as_str()),
                        ("tenant", tenant.display_name()),
                    ],
                );
                let text = tenant.notification(
                    &headline,
                    &[("Due", due.as_str()), ("Details", task.details.as_str())],
                );
                match self.transport.send_text(&tenant.id, &staff.phone, &text).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(tenant = %tenant.id, error = %e, "task notification failed");
                        false
                    }
                }
            }
            None => false,
        };

        Ok(json!({
            "status": "created",
            "id": task.id,
            "due_date": task.due_date.to_string(),
            "notified": notified,
        }))
    }
}
