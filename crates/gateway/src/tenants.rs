//! Tenant strategy table.
//!
//! Resolves a tenant id to its configured profile once per turn, so the
//! orchestration code never branches on tenant identity.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;

use rd_domain::config::{Config, ReportFormat, TenantConfig, ToolCategory};

/// One tenant's resolved profile.
#[derive(Debug, Clone)]
pub struct Tenant {
    pub id: String,
    pub config: TenantConfig,
    pub tz: chrono_tz::Tz,
    debounce_window: Duration,
}

impl Tenant {
    pub fn new(id: impl Into<String>, config: TenantConfig, default_window_secs: u64) -> Self {
        let tz = config.tz();
        let window = config.debounce_window_secs.unwrap_or(default_window_secs);
        Self {
            id: id.into(),
            config,
            tz,
            debounce_window: Duration::from_secs(window),
        }
    }

    pub fn debounce_window(&self) -> Duration {
        self.debounce_window
    }

    pub fn has_tool(&self, category: ToolCategory) -> bool {
        self.config.has_tool(category)
    }

    pub fn display_name(&self) -> &str {
        if self.config.name.is_empty() {
            &self.id
        } else {
            &self.config.name
        }
    }

    /// Lay out a staff-facing notification according to the tenant's
    /// report format.  `details` is appended one field per line in the
    /// detailed format and dropped in the compact one.
    pub fn notification(&self, headline: &str, details: &[(&str, &str)]) -> String {
        match self.config.report_format {
            ReportFormat::Compact => headline.to_owned(),
            ReportFormat::Detailed => {
                let mut out = headline.to_owned();
                for (k, v) in details.iter().filter(|(_, v)| !v.is_empty()) {
                    out.push('\n');
                    out.push_str(k);
                    out.push_str(": ");
                    out.push_str(v);
                }
                out
            }
        }
    }
}

/// Substitute `{name}` placeholders.  Unknown placeholders are left as-is.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    let re = PLACEHOLDER
        .get_or_init(|| Regex::new(r"\{([a-z_]+)\}").expect("placeholder pattern is valid"));
    re.replace_all(template, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        vars.iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| (*v).to_owned())
            .unwrap_or_else(|| caps[0].to_owned())
    })
    .into_owned()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct TenantRegistry {
    tenants: HashMap<String, Arc<Tenant>>,
}

impl TenantRegistry {
    pub fn from_config(config: &Config) -> Self {
        let tenants = config
            .tenants
            .iter()
            .map(|(id, cfg)| {
                (
                    id.clone(),
                    Arc::new(Tenant::new(id.clone(), cfg.clone(), config.debounce.window_secs)),
                )
            })
            .collect();
        Self { tenants }
    }

    pub fn get(&self, id: &str) -> Option<Arc<Tenant>> {
        self.tenants.get(id).cloned()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.tenants.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}
