//! ---
//! snet_section: "05-operator-interfaces"
//! snet_subsection: "binary"
//! snet_type: "source"
//! snet_scope: "code"
//! snet_description: "Operator CLI for watching a broker and sending actuator commands."
//! snet_version: "v0.0.0-prealpha"
//! snet_owner: "tbd"
//! ---
use std::collections::BTreeMap;
use std::io::{self, BufRead};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;
use snet_client::{ClientError, Session, SessionObserver, SessionOptions, SessionState};
use snet_common::{AppConfig, SessionKind};
use snet_state::{HistoryAggregator, StateCache, Statistics};
use snet_wire::Message;
use tracing::{info, warn};

const POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Args)]
pub struct WatchCommand {
    /// Print the state snapshot every N seconds as well as on exit.
    #[arg(long, value_name = "SECONDS")]
    interval: Option<u64>,
}

struct TrafficLog;

impl SessionObserver for TrafficLog {
    fn on_message(&self, message: &Message) {
        info!(kind = message.kind(), payload = %message.encode(), "broker message");
    }

    fn on_state_change(&self, previous: SessionState, current: SessionState) {
        info!(from = %previous, to = %current, "session state");
    }

    fn on_error(&self, error: &ClientError) {
        warn!(error = %error, "session failed");
    }
}

pub fn run(cmd: WatchCommand, config: &AppConfig) -> Result<()> {
    snet_common::init_tracing("snetctl", &config.logging)?;

    let session = Session::with_options(SessionKind::ControlPanel, SessionOptions::from(config));
    session.add_observer(Arc::new(TrafficLog));
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
    info!("watching; close stdin (Ctrl-D) to stop");

    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    thread::Builder::new()
        .name("snetctl-stdin".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                if line.is_err() {
                    break;
                }
            }
            let _ = stop_tx.send(());
        })
        .context("failed to spawn stdin watcher")?;

    let interval = cmd.interval.map(Duration::from_secs);
    let mut since_print = Duration::ZERO;
    loop {
        match stop_rx.recv_timeout(POLL) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        if session.state().is_terminal() {
            warn!(state = %session.state(), "session ended");
            break;
        }
        since_print += POLL;
        if let Some(every) = interval {
            if since_print >= every {
                since_print = Duration::ZERO;
                print_state(session.cache(), session.history())?;
            }
        }
    }

    session.close();
    print_state(session.cache(), session.history())?;
    let metrics = session.metrics();
    info!(
        sent = metrics.sent,
        received = metrics.received,
        dropped = metrics.dropped,
        unroutable = metrics.unroutable,
        "watch finished"
    );
    Ok(())
}

fn print_state(cache: &StateCache, history: &HistoryAggregator) -> Result<()> {
    let statistics: BTreeMap<String, Statistics> = history
        .keys()
        .into_iter()
        .map(|key| {
            let stats = history.get_statistics(&key);
            (key, stats)
        })
        .collect();
    let document = json!({
        "snapshot": cache.snapshot(),
        "statistics": statistics,
    });
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}
