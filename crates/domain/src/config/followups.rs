use serde::{Deserialize, Serialize};

/// Follow-up delivery runner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUpsConfig {
    /// How often due scheduled messages are collected and sent.
    #[serde(default = "d_tick_secs")]
    pub tick_secs: u64,
    /// Disable the background runner (API and tools still work).
    #[serde(default = "d_true")]
    pub runner_enabled: bool,
}

impl Default for FollowUpsConfig {
    fn default() -> Self {
        Self {
            tick_secs: d_tick_secs(),
            runner_enabled: true,
        }
    }
}

fn d_tick_secs() -> u64 {
    30
}

fn d_true() -> bool {
    true
}
