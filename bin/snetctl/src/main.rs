//! ---
//! snet_section: "05-operator-interfaces"
//! snet_subsection: "binary"
//! snet_type: "source"
//! snet_scope: "code"
//! snet_description: "Operator CLI for watching a broker and sending actuator commands."
//! snet_version: "v0.0.0-prealpha"
//! snet_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use snet_common::AppConfig;
use tracing::debug;

mod command;
mod watch;

const CONFIG_CANDIDATES: &[&str] = &["snet.toml", "/etc/snet/snet.toml"];

#[derive(Debug, Parser)]
#[command(author, version, about = "SensorNet operator utility", long_about = None)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides applied on top of the loaded configuration.
#[derive(Debug, Args)]
pub struct ConnectionArgs {
    /// Configuration file (defaults to SNET_CONFIG, ./snet.toml, /etc/snet/snet.toml).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Broker host.
    #[arg(long, global = true, value_name = "HOST")]
    host: Option<String>,

    /// Broker port.
    #[arg(long, global = true, value_name = "PORT")]
    port: Option<u16>,

    /// Identifier announced at registration.
    #[arg(long = "node-id", global = true, value_name = "ID")]
    node_id: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Register as a control panel and follow broker traffic.
    Watch(watch::WatchCommand),
    /// Send one actuator command and exit.
    Command(command::SendCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = resolve_config(&cli.connection)?;
    match cli.command {
        Commands::Watch(cmd) => watch::run(cmd, &config),
        Commands::Command(cmd) => command::run(cmd, &config),
    }
}

fn resolve_config(args: &ConnectionArgs) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::from_path(path)?,
        None => load_or_default()?,
    };
    if let Some(host) = &args.host {
        config.session.host = host.clone();
    }
    if let Some(port) = args.port {
        config.session.port = port;
    }
    if let Some(node_id) = &args.node_id {
        config.session.node_id = node_id.clone();
    }
    config
        .validate()
        .context("invalid configuration after command line overrides")?;
    Ok(config)
}

fn load_or_default() -> Result<AppConfig> {
    let env_set = std::env::var_os(AppConfig::ENV_CONFIG_PATH).is_some();
    let any_candidate = CONFIG_CANDIDATES
        .iter()
        .any(|candidate| std::path::Path::new(candidate).exists());
    if env_set || any_candidate {
        let loaded = AppConfig::load_with_source(CONFIG_CANDIDATES)?;
        debug!(source = %loaded.source.display(), "configuration loaded");
        Ok(loaded.config)
    } else {
        Ok(AppConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_overrides_win() {
        let cli = Cli::try_parse_from([
            "snetctl",
            "--host",
            "10.0.0.5",
            "--port",
            "6000",
            "command",
            "--actuator",
            "heater",
            "--action",
            "SET",
            "--value",
            "30",
            "--node-id",
            "panel-9",
        ])
        .expect("parses");
        let config = resolve_config(&ConnectionArgs {
            config: None,
            ..cli.connection
        })
        .expect("valid");
        assert_eq!(config.session.host, "10.0.0.5");
        assert_eq!(config.session.port, 6000);
        assert_eq!(config.session.node_id, "panel-9");
        assert!(matches!(cli.command, Commands::Command(_)));
    }

    #[test]
    fn command_requires_actuator_and_action() {
        assert!(Cli::try_parse_from(["snetctl", "command", "--action", "ON"]).is_err());
        assert!(Cli::try_parse_from(["snetctl", "watch", "--interval", "5"]).is_ok());
    }
}
