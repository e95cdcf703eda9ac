use serde::{Deserialize, Serialize};

/// Inbound message coalescing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebounceConfig {
    /// Quiet period after the last message before a conversation is
    /// flushed.  Tenants may override it.
    #[serde(default = "d_window_secs")]
    pub window_secs: u64,
    /// Text substituted for a voice note that could not be transcribed.
    #[serde(default = "d_transcription_apology")]
    pub transcription_apology: String,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            window_secs: d_window_secs(),
            transcription_apology: d_transcription_apology(),
        }
    }
}

fn d_window_secs() -> u64 {
    30
}

fn d_transcription_apology() -> String {
    "[voice message could not be transcribed]".into()
}
