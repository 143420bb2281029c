//! Transport-level round trip: handshake, dispatch, enforcement updates,
//! and malformed input over a real socket.

use scenegate::bridge::dispatch::Dispatcher;
use scenegate::bridge::server::BridgeServer;
use scenegate::core::editor::{HeadlessEditor, NullSourceControl, NullTransactor};
use scenegate::core::gate::WriteGate;
use scenegate::core::policy::PolicyStore;
use scenegate::core::settings::BridgeSettings;
use serde_json::{Value, json};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

fn start_bridge() -> std::net::SocketAddr {
    let settings = BridgeSettings {
        allow_write: true,
        dry_run: true,
        allowed_content_roots: vec!["/Game".to_string()],
        ..BridgeSettings::default()
    };
    let policy = Arc::new(PolicyStore::new(Some(settings)));
    let gate = WriteGate::new(policy.clone(), Arc::new(NullSourceControl));
    let mut dispatcher = Dispatcher::new(
        policy.clone(),
        gate,
        Arc::new(HeadlessEditor),
        Arc::new(NullTransactor),
    );
    dispatcher.install_probes();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = BridgeServer::new(Arc::new(dispatcher), policy, "unused");
    thread::spawn(move || server.serve_listener(listener));
    addr
}

struct Client {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Client {
    fn connect(addr: std::net::SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        let writer = stream.try_clone().unwrap();
        Self {
            reader: BufReader::new(stream),
            writer,
        }
    }

    fn read_line(&mut self) -> Value {
        let mut line = String::new();
        self.reader.read_line(&mut line).unwrap();
        serde_json::from_str(&line).unwrap()
    }

    fn send_raw(&mut self, line: &str) {
        writeln!(self.writer, "{}", line).unwrap();
    }

    fn roundtrip(&mut self, request: Value) -> Value {
        self.send_raw(&serde_json::to_string(&request).unwrap());
        self.read_line()
    }
}

#[test]
fn test_bridge_session() {
    let addr = start_bridge();
    let mut client = Client::connect(addr);

    // Handshake arrives before any request.
    let hello = client.read_line();
    assert_eq!(hello["bridge"], "scenegate");
    assert_eq!(hello["protocol"], 1);

    // Query probe.
    let response = client.roundtrip(json!({"id": "p1", "command": "bridge.ping"}));
    assert_eq!(response["id"], "p1");
    assert_eq!(response["ok"], true);
    assert_eq!(response["result"]["pong"], true);

    // Remote enforcement starts locked down: writes denied.
    let response = client.roundtrip(json!({
        "id": "m1",
        "command": "actor.spawn",
        "params": {"class": "PointLight"},
    }));
    assert_eq!(response["ok"], false);
    assert_eq!(response["error"]["code"], "WRITE_NOT_ALLOWED");
    assert_eq!(response["audit"]["dryRun"], true);
    assert_eq!(response["audit"]["executed"], false);

    // Companion process opens the gate. Local dry-run still wins.
    let response = client.roundtrip(json!({
        "id": "e1",
        "command": "enforcement.update",
        "params": {
            "allowWrite": true,
            "dryRun": false,
            "allowedPaths": ["/Game"],
            "allowedTools": [],
            "deniedTools": [],
        },
    }));
    assert_eq!(response["ok"], true);
    assert_eq!(response["result"]["applied"], true);

    let response = client.roundtrip(json!({
        "id": "m2",
        "command": "actor.spawn",
        "params": {"class": "PointLight"},
    }));
    assert_eq!(response["ok"], true);
    assert_eq!(response["result"]["planned"], true);
    assert_eq!(response["audit"]["executed"], false);
    assert_eq!(response["audit"]["actions"][0]["op"], "spawn");

    // Garbage does not kill the connection.
    client.send_raw("this is not json");
    let response = client.read_line();
    assert_eq!(response["ok"], false);
    assert_eq!(response["error"]["code"], "BAD_REQUEST");

    let response = client.roundtrip(json!({"id": "p2", "command": "bridge.ping"}));
    assert_eq!(response["ok"], true);
}

#[test]
fn test_two_clients_share_enforcement_state() {
    let addr = start_bridge();
    let mut first = Client::connect(addr);
    let mut second = Client::connect(addr);
    first.read_line();
    second.read_line();

    first.roundtrip(json!({
        "id": "e1",
        "command": "enforcement.update",
        "params": {"allowWrite": true, "dryRun": false, "allowedPaths": ["/Game"]},
    }));

    // The other connection sees the pushed state on its next decision.
    let response = second.roundtrip(json!({
        "id": "m1",
        "command": "asset.delete",
        "params": {"objectPaths": ["/Game/X.X"]},
    }));
    assert_eq!(response["ok"], true);
    assert_eq!(response["result"]["planned"], true);
    assert_eq!(response["audit"]["actions"][0]["args"]["objectPath"], "/Game/X.X");
}
