use serde::{Deserialize, Serialize};

/// Messaging transport wiring.  The transport itself is external; relaydesk
/// posts outbound actions to it over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Endpoint that accepts outbound send/transcribe requests.  `None`
    /// logs outbound messages instead of sending them.
    #[serde(default)]
    pub outbound_url: Option<String>,
    /// Environment variable holding the bearer token for `outbound_url`.
    #[serde(default = "d_outbound_token_env")]
    pub outbound_token_env: String,
    /// Environment variable holding the HMAC secret used to verify
    /// inbound webhook signatures.  Unset = no signature check.
    #[serde(default = "d_inbound_secret_env")]
    pub inbound_secret_env: String,
    #[serde(default = "d_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            outbound_url: None,
            outbound_token_env: d_outbound_token_env(),
            inbound_secret_env: d_inbound_secret_env(),
            request_timeout_secs: d_request_timeout_secs(),
        }
    }
}

fn d_outbound_token_env() -> String {
    "RD_TRANSPORT_TOKEN".into()
}

fn d_inbound_secret_env() -> String {
    "RD_INBOUND_SECRET".into()
}

fn d_request_timeout_secs() -> u64 {
    30
}
