pub mod config;

use clap::{Parser, Subcommand};

/// relaydesk: multi-tenant conversation turn orchestration.
#[derive(Debug, Parser)]
#[command(name = "relaydesk", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report issues per tenant.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show {
        /// Only print this tenant's table.
        #[arg(long)]
        tenant: Option<String>,
    },
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path specified by `RD_CONFIG` (or
/// `config.toml` by default).  Returns the parsed [`Config`] and the
/// path that was used.  A missing file yields the default config.
///
/// [`Config`]: rd_domain::config::Config
pub fn load_config() -> anyhow::Result<(rd_domain::config::Config, String)> {
    let config_path = std::env::var("RD_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = load_config_from(&config_path)?;
    Ok((config, config_path))
}

pub fn load_config_from(config_path: &str) -> anyhow::Result<rd_domain::config::Config> {
    if !std::path::Path::new(config_path).exists() {
        return Ok(rd_domain::config::Config::default());
    }
    let raw = std::fs::read_to_string(config_path)
        .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
    toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))
}
