/// Shared error type used across all relaydesk crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    /// Missing or malformed caller input. Surfaced to the caller as a
    /// structured message, never as a crash.
    #[error("validation: {0}")]
    Validation(String),

    #[error("assistant: {0}")]
    Assistant(String),

    #[error("transport: {0}")]
    Transport(String),

    /// Tool-call round-trips exceeded the configured depth.
    #[error("recursion limit reached after {depth} tool round-trips")]
    RecursionLimit { depth: u32 },

    /// A transactional read-modify-write observed a concurrent change and
    /// gave up after retrying.
    #[error("persistence conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Short machine-readable tag, used in serialized tool error outputs.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Http(_) => "http",
            Error::Timeout(_) => "timeout",
            Error::Validation(_) => "validation",
            Error::Assistant(_) => "assistant",
            Error::Transport(_) => "transport",
            Error::RecursionLimit { .. } => "recursion_limit",
            Error::Conflict(_) => "conflict",
            Error::NotFound(_) => "not_found",
            Error::Config(_) => "config",
            Error::Other(_) => "other",
        }
    }

    /// Whether the failure came from an external dependency and may succeed
    /// on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::Timeout(_) | Error::Assistant(_) | Error::Transport(_) | Error::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(Error::Validation("x".into()).kind(), "validation");
        assert_eq!(Error::RecursionLimit { depth: 5 }.kind(), "recursion_limit");
        assert_eq!(Error::Conflict("c".into()).kind(), "conflict");
    }

    #[test]
    fn transient_classification() {
        assert!(Error::Http("502".into()).is_transient());
        assert!(Error::Transport("down".into()).is_transient());
        assert!(!Error::Validation("missing".into()).is_transient());
        assert!(!Error::Conflict("busy".into()).is_transient());
    }
}
