mod assistant;
mod debounce;
mod followups;
mod observability;
mod server;
mod storage;
mod tenants;
mod transport;

pub use assistant::*;
pub use debounce::*;
pub use followups::*;
pub use observability::*;
pub use server::*;
pub use storage::*;
pub use tenants::*;
pub use transport::*;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub debounce: DebounceConfig,
    #[serde(default)]
    pub followups: FollowUpsConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    /// Tenant strategy table (key = tenant id).
    #[serde(default)]
    pub tenants: HashMap<String, TenantConfig>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut push = |severity, field: String, message: &str| {
            errors.push(ConfigError {
                severity,
                field,
                message: message.into(),
            });
        };

        if self.server.port == 0 {
            push(ConfigSeverity::Error, "server.port".into(), "port must be greater than 0");
        }
        if self.server.host.is_empty() {
            push(ConfigSeverity::Error, "server.host".into(), "host must not be empty");
        }

        if self.assistant.base_url.is_empty() {
            push(
                ConfigSeverity::Error,
                "assistant.base_url".into(),
                "base_url must not be empty",
            );
        }
        if self.assistant.max_depth == 0 {
            push(
                ConfigSeverity::Error,
                "assistant.max_depth".into(),
                "max_depth must be at least 1",
            );
        }
        if self.assistant.max_attempts == 0 {
            push(
                ConfigSeverity::Error,
                "assistant.max_attempts".into(),
                "max_attempts must be at least 1",
            );
        }
        if self.assistant.part_delimiter.is_empty() {
            push(
                ConfigSeverity::Error,
                "assistant.part_delimiter".into(),
                "part_delimiter must not be empty",
            );
        }

        if self.debounce.window_secs == 0 {
            push(
                ConfigSeverity::Warning,
                "debounce.window_secs".into(),
                "a zero window flushes every message individually",
            );
        }
        if self.followups.tick_secs == 0 {
            push(
                ConfigSeverity::Error,
                "followups.tick_secs".into(),
                "tick_secs must be greater than 0",
            );
        }

        if self.tenants.is_empty() {
            push(ConfigSeverity::Warning, "tenants".into(), "no tenants configured");
        }

        for (id, tenant) in &self.tenants {
            if tenant.assistant_id.is_empty() {
                push(
                    ConfigSeverity::Error,
                    format!("tenants.{id}.assistant_id"),
                    "assistant_id must not be empty",
                );
            }
            if tenant.timezone.parse::<chrono_tz::Tz>().is_err() {
                push(
                    ConfigSeverity::Error,
                    format!("tenants.{id}.timezone"),
                    "unknown IANA timezone",
                );
            }
            if tenant.tools.contains(&ToolCategory::Handoff) && tenant.active_staff().next().is_none() {
                push(
                    ConfigSeverity::Warning,
                    format!("tenants.{id}.staff"),
                    "handoff is enabled but no staff member has a positive weight",
                );
            }
            for (i, member) in tenant.staff.iter().enumerate() {
                if member.phone.is_empty() {
                    push(
                        ConfigSeverity::Error,
                        format!("tenants.{id}.staff[{i}].phone"),
                        "phone must not be empty",
                    );
                }
            }
        }

        if self.server.cors.allowed_origins.len() == 1 && self.server.cors.allowed_origins[0] == "*" {
            push(
                ConfigSeverity::Warning,
                "server.cors.allowed_origins".into(),
                "wildcard \"*\" allows all origins (not recommended for production)",
            );
        }

        errors
    }

    /// Look up a tenant by id.
    pub fn tenant(&self, tenant_id: &str) -> Option<&TenantConfig> {
        self.tenants.get(tenant_id)
    }
}
