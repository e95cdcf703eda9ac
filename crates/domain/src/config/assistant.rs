use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Hosted assistant
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Connection settings for the hosted assistant service and the bounds
/// of the run state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Base URL of an OpenAI-Assistants-compatible API.
    #[serde(default = "d_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    /// Per-request HTTP timeout in seconds.
    #[serde(default = "d_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Maximum tool-call round-trips per turn.
    #[serde(default = "d_max_depth")]
    pub max_depth: u32,
    /// Maximum status polls per depth.
    #[serde(default = "d_max_attempts")]
    pub max_attempts: u32,
    /// Delay between status polls.
    #[serde(default = "d_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Sentinel that splits a reply into separately delivered parts.
    #[serde(default = "d_part_delimiter")]
    pub part_delimiter: String,
    /// Reply used when the run hits `max_depth`.
    #[serde(default = "d_recursion_reply")]
    pub recursion_reply: String,
    /// Reply used when polling exhausts `max_attempts`.
    #[serde(default = "d_timeout_reply")]
    pub timeout_reply: String,
    /// Reply used when the run ends failed/cancelled/expired or the
    /// assistant service is unreachable.
    #[serde(default = "d_failure_reply")]
    pub failure_reply: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            api_key_env: d_api_key_env(),
            request_timeout_secs: d_timeout_secs(),
            max_depth: d_max_depth(),
            max_attempts: d_max_attempts(),
            poll_interval_ms: d_poll_interval_ms(),
            part_delimiter: d_part_delimiter(),
            recursion_reply: d_recursion_reply(),
            timeout_reply: d_timeout_reply(),
            failure_reply: d_failure_reply(),
        }
    }
}

fn d_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn d_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}

fn d_timeout_secs() -> u64 {
    60
}

fn d_max_depth() -> u32 {
    5
}

fn d_max_attempts() -> u32 {
    30
}

fn d_poll_interval_ms() -> u64 {
    2_000
}

fn d_part_delimiter() -> String {
    "||".into()
}

fn d_recursion_reply() -> String {
    "Sorry, I got stuck working on that. Could you rephrase your request?".into()
}

fn d_timeout_reply() -> String {
    "This is taking longer than expected. Please try again in a moment.".into()
}

fn d_failure_reply() -> String {
    "Sorry, something went wrong on our side. Please try again shortly.".into()
}
