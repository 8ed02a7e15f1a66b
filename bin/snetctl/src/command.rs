//! ---
//! snet_section: "05-operator-interfaces"
//! snet_subsection: "binary"
//! snet_type: "source"
//! snet_scope: "code"
//! snet_description: "Operator CLI for watching a broker and sending actuator commands."
//! snet_version: "v0.0.0-prealpha"
//! snet_owner: "tbd"
//! ---
use anyhow::{anyhow, Context, Result};
use clap::Args;
use snet_client::{Session, SessionOptions, WorkerPool};
use snet_common::{AppConfig, SessionKind};
use snet_wire::Message;
use tracing::info;

#[derive(Debug, Args)]
pub struct SendCommand {
    /// Node owning the actuator; omit to broadcast.
    #[arg(long, value_name = "NODE")]
    target: Option<String>,

    /// Actuator type, e.g. heater.
    #[arg(long, value_name = "NAME")]
    actuator: String,

    /// Action verb, e.g. SET or ON.
    #[arg(long, value_name = "ACTION")]
    action: String,

    /// Optional action argument.
    #[arg(long, value_name = "VALUE")]
    value: Option<String>,
}

pub fn run(cmd: SendCommand, config: &AppConfig) -> Result<()> {
    snet_common::init();

    let session = Session::with_options(SessionKind::ControlPanel, SessionOptions::from(config));
    let pool = WorkerPool::from_config("snetctl", &config.workers)?;
    session
        .open(
            &config.session.host,
            config.session.port,
            &config.session.node_id,
        )
        .with_context(|| {
            format!(
                "unable to register with {}:{}",
                config.session.host, config.session.port
            )
        })?;

    let message = Message::actuator_command(cmd.target, cmd.actuator, cmd.action, cmd.value);
    session.send_via(&pool, message.clone())?;
    // joins the worker, so the send has completed or failed by now
    pool.shutdown();

    let sent = session.metrics().sent;
    session.close();
    if sent < 2 {
        return Err(anyhow!(
            "actuator command was not delivered: {}",
            message.encode()
        ));
    }
    info!(payload = %message.encode(), "actuator command sent");
    Ok(())
}
