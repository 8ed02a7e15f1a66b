//! ---
//! snet_section: "02-wire-protocol"
//! snet_subsection: "integration-tests"
//! snet_type: "source"
//! snet_scope: "code"
//! snet_description: "Frame, flat object and message codecs."
//! snet_version: "v0.0.0-prealpha"
//! snet_owner: "tbd"
//! ---
use std::io::Cursor;
use std::net::{TcpListener, TcpStream};
use std::thread;

use snet_wire::{flat, peek_type, read_frame, write_frame, Message, WireError};

#[test]
fn stream_of_messages_decodes_in_order() {
    let outbound = vec![
        Message::register_node("SENSOR_NODE", "7"),
        Message::sensor_data("7", "temperature", "22.9"),
        Message::heartbeat("CLIENT_TO_SERVER"),
        Message::actuator_command(None, "fan", "OFF", None),
    ];

    let mut wire = Vec::new();
    for message in &outbound {
        write_frame(&mut wire, &message.to_payload()).expect("write frame");
    }

    let mut reader = Cursor::new(wire);
    let mut inbound = Vec::new();
    loop {
        match read_frame(&mut reader) {
            Ok(payload) => inbound.push(Message::from_payload(&payload).expect("routable")),
            Err(WireError::Closed) => break,
            Err(err) => panic!("unexpected error: {err}"),
        }
    }
    assert_eq!(inbound, outbound);
}

#[test]
fn frames_cross_a_real_socket_intact() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut received = Vec::new();
        while let Ok(payload) = read_frame(&mut stream) {
            received.push(payload);
        }
        received
    });

    let payloads: Vec<Vec<u8>> = vec![Vec::new(), b"{}".to_vec(), vec![0xAB; 200_000]];
    {
        let mut client = TcpStream::connect(addr).expect("connect");
        for payload in &payloads {
            write_frame(&mut client, payload).expect("write");
        }
    }

    let received = server.join().expect("server thread");
    assert_eq!(received, payloads);
}

#[test]
fn unroutable_payloads_still_expose_their_type() {
    let text = r#"{"type":"FIRMWARE_UPDATE","image":"v2"}"#;
    assert!(Message::decode(text).is_none());
    assert_eq!(peek_type(text).as_deref(), Some("FIRMWARE_UPDATE"));
    assert_eq!(flat::decode(text).get("image"), Some("v2"));
}
