pub mod config;
pub mod doctor;

use clap::{Parser, Subcommand};

/// agentrt — a tool-using, self-critiquing, validated-output agent runtime.
#[derive(Debug, Parser)]
#[command(name = "agentrt", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Run diagnostic checks against the current configuration.
    Doctor,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path specified by `AGENTRT_CONFIG` (or
/// `config.toml` by default). Returns the parsed [`GatewayConfig`] and the
/// path that was used.
///
/// This is shared by `serve`, `doctor`, and `config` subcommands so the
/// logic lives in one place.
pub fn load_config() -> anyhow::Result<(crate::config::GatewayConfig, String)> {
    let config_path = std::env::var("AGENTRT_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = crate::config::GatewayConfig::load(&config_path)?;
    Ok((config, config_path))
}
