use rd_domain::error::Result;
use rd_domain::message::Role;
use rd_domain::tool::{ToolCall, ToolDefinition, ToolOutput};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Status of a run as reported by the assistant service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Completed,
    Failed,
    Cancelled,
    Expired,
}

impl RunStatus {
    /// Parse the service's status string.  Transitional states the service
    /// may add (`cancelling`, `incomplete`) map to their nearest neighbour.
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "queued" => Self::Queued,
            "in_progress" => Self::InProgress,
            "requires_action" => Self::RequiresAction,
            "completed" => Self::Completed,
            "failed" | "incomplete" => Self::Failed,
            "cancelled" | "cancelling" => Self::Cancelled,
            "expired" => Self::Expired,
            _ => return None,
        })
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Expired
        )
    }
}

/// One poll result.  `tool_calls` is only populated in `requires_action`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSnapshot {
    pub status: RunStatus,
    pub tool_calls: Vec<ToolCall>,
}

impl RunSnapshot {
    pub fn status(status: RunStatus) -> Self {
        Self {
            status,
            tool_calls: Vec::new(),
        }
    }
}

/// A message on a thread.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadMessage {
    pub id: String,
    pub role: Role,
    /// Concatenated text content.
    pub content: String,
    /// Unix seconds.
    pub created_at: i64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Capability trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The hosted assistant: durable threads, asynchronous runs, and tool-call
/// round-trips.
#[async_trait::async_trait]
pub trait AssistantApi: Send + Sync {
    async fn create_thread(&self) -> Result<String>;

    async fn add_message(&self, thread_id: &str, role: Role, content: &str) -> Result<()>;

    /// Start a run and return its id.
    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        tools: &[ToolDefinition],
    ) -> Result<String>;

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<RunSnapshot>;

    /// Submit one output per pending tool call, all at once.
    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<()>;

    /// Thread messages, newest first.
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>>;

    /// Best-effort cancellation of a run the caller has given up on.
    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parsing() {
        assert_eq!(RunStatus::parse("requires_action"), Some(RunStatus::RequiresAction));
        assert_eq!(RunStatus::parse("cancelling"), Some(RunStatus::Cancelled));
        assert_eq!(RunStatus::parse("bogus"), None);
        assert!(RunStatus::Expired.is_terminal());
        assert!(!RunStatus::Queued.is_terminal());
    }
}
