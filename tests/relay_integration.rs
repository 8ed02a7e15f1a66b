//! ---
//! snet_section: "15-testing-qa"
//! snet_subsection: "integration-tests"
//! snet_type: "source"
//! snet_scope: "code"
//! snet_description: "Integration tests spanning wire, state and client crates."
//! snet_version: "v0.0.0-prealpha"
//! snet_owner: "tbd"
//! ---
use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use snet_client::{Session, SessionState};
use snet_common::{AppConfig, SessionKind};
use snet_wire::{read_frame, write_frame, Message, RegisterAck};

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn relay(mut from: TcpStream, mut to: TcpStream) -> JoinHandle<()> {
    thread::spawn(move || {
        while let Ok(payload) = read_frame(&mut from) {
            if write_frame(&mut to, &payload).is_err() {
                break;
            }
        }
    })
}

/// Minimal broker: acknowledges one node and one panel, then forwards every
/// frame between them.
fn spawn_broker(listener: TcpListener, ready: mpsc::Sender<()>) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut node: Option<TcpStream> = None;
        let mut panel: Option<TcpStream> = None;
        while node.is_none() || panel.is_none() {
            let (mut stream, _) = listener.accept().expect("accept");
            let payload = read_frame(&mut stream).expect("registration");
            let registration = Message::from_payload(&payload).expect("routable");
            let (role, slot) = match &registration {
                Message::RegisterNode(_) => ("SENSOR_NODE", &mut node),
                Message::RegisterControlPanel(_) => ("CONTROL_PANEL", &mut panel),
                other => panic!("unexpected registration {other:?}"),
            };
            let ack = Message::RegisterAck(RegisterAck {
                protocol_version: Some("1.0".into()),
                role: Some(role.into()),
                ..RegisterAck::default()
            });
            write_frame(&mut stream, &ack.to_payload()).expect("ack");
            *slot = Some(stream);
        }
        let (node, panel) = (node.expect("node"), panel.expect("panel"));
        let up = relay(
            node.try_clone().expect("clone"),
            panel.try_clone().expect("clone"),
        );
        let down = relay(panel, node);
        ready.send(()).expect("ready");
        up.join().expect("node relay");
        down.join().expect("panel relay");
    })
}

#[test]
fn node_readings_reach_the_panel_and_commands_reach_the_node() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let (ready_tx, ready_rx) = mpsc::channel();
    let broker = spawn_broker(listener, ready_tx);

    let node = Session::new(SessionKind::Node);
    let panel = Session::new(SessionKind::ControlPanel);
    node.open("127.0.0.1", port, "7").expect("node open");
    panel.open("127.0.0.1", port, "panel-1").expect("panel open");
    ready_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("broker relaying");

    for value in [10.0, 20.0, 30.0] {
        node.publish_sensor("temperature", value, Some("C"))
            .expect("publish");
    }
    assert!(wait_until(|| panel.history().get_reading_count("7/temperature") == 3));
    let stats = panel.history().get_statistics("7/temperature");
    assert_eq!((stats.min, stats.max, stats.average), (10.0, 30.0, 20.0));
    let latest = panel.cache().sensor("7", "temperature").expect("cached");
    assert_eq!(latest.value, 30.0);
    assert_eq!(panel.protocol_version().as_deref(), Some("1.0"));

    panel
        .send_command(Some("7"), "heater", "SET", Some("30"))
        .expect("command");
    assert!(wait_until(|| node.cache().actuator("7", "heater").is_some()));
    assert_eq!(
        node.cache().actuator("7", "heater").map(|reading| reading.state),
        Some("30".to_owned())
    );
    assert!(panel.cache().actuator_count() == 0);

    panel.close();
    node.close();
    assert_eq!(panel.state(), SessionState::Closed);
    assert_eq!(node.state(), SessionState::Closed);
    broker.join().expect("broker thread");
}

#[test]
fn sessions_are_built_from_a_config_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(
        file,
        r#"
[session]
kind = "node"
node_id = "7"
max_frame_bytes = 4096

[history]
retention = 3600
"#
    )
    .expect("write config");

    let config = AppConfig::from_path(file.path()).expect("config loads");
    let session = Session::from_config(&config);
    assert_eq!(session.kind(), SessionKind::Node);
    assert_eq!(session.history().retention(), Duration::from_secs(3600));
    assert_eq!(session.state(), SessionState::Disconnected);
}
