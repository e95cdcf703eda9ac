//! `relaydesk config ...` subcommands.
//!
//! Both commands render to a `String` so `main` only decides where the text
//! goes and which exit code to use.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use rd_domain::config::{Config, ConfigError, ConfigSeverity, TenantConfig};

/// Outcome of `config validate`.
pub struct ValidationReport {
    pub text: String,
    pub ok: bool,
}

/// Validate the config.  Global issues come first, then one block per
/// tenant (sorted by id) with its resolved strategy and its own issues.
pub fn validate(config: &Config, config_path: &str) -> ValidationReport {
    let issues = config.validate();
    let errors = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    let warnings = issues.len() - errors;

    let mut out = String::new();
    let (tenant_issues, global): (Vec<&ConfigError>, Vec<&ConfigError>) =
        issues.iter().partition(|i| i.field.starts_with("tenants."));
    for issue in global {
        let _ = writeln!(out, "{issue}");
    }

    let mut ids: Vec<&String> = config.tenants.keys().collect();
    ids.sort();
    for id in ids {
        let tenant = &config.tenants[id];
        let _ = writeln!(out, "{}", tenant_line(id, tenant));
        let prefix = format!("tenants.{id}.");
        for issue in tenant_issues.iter().filter(|i| i.field.starts_with(&prefix)) {
            let _ = writeln!(out, "  {issue}");
        }
    }

    if issues.is_empty() {
        let _ = writeln!(
            out,
            "Config OK ({config_path}, {} tenant(s))",
            config.tenants.len()
        );
    } else {
        let _ = writeln!(out, "\n{errors} error(s), {warnings} warning(s) in {config_path}");
    }

    ValidationReport {
        text: out,
        ok: errors == 0,
    }
}

/// `acme: asst=asst_1 tz=America/Sao_Paulo tools=[followups, tagging] staff=2/3`
fn tenant_line(id: &str, tenant: &TenantConfig) -> String {
    let assistant = if tenant.assistant_id.is_empty() {
        "<unset>"
    } else {
        tenant.assistant_id.as_str()
    };
    let tools: Vec<String> = tenant
        .tools
        .iter()
        .map(|t| {
            serde_json::to_value(t)
                .ok()
                .and_then(|v| v.as_str().map(str::to_owned))
                .unwrap_or_else(|| format!("{t:?}"))
        })
        .collect();
    format!(
        "{id}: asst={assistant} tz={} tools=[{}] staff={}/{}",
        tenant.timezone,
        tools.join(", "),
        tenant.active_staff().count(),
        tenant.staff.len()
    )
}

/// The resolved config (defaults filled in) as TOML.  With `tenant`, only
/// that tenant's table, still nested under `tenants` so it can be pasted
/// back into a config file.
pub fn show(config: &Config, tenant: Option<&str>) -> anyhow::Result<String> {
    match tenant {
        None => Ok(toml::to_string_pretty(config)?),
        Some(id) => {
            let entry = config
                .tenant(id)
                .ok_or_else(|| anyhow::anyhow!("no tenant '{id}' in config"))?;
            let tenants = BTreeMap::from([(id, entry)]);
            Ok(toml::to_string_pretty(&BTreeMap::from([("tenants", tenants)]))?)
        }
    }
}
