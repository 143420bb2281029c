//! TCP transport.
//!
//! Newline-delimited JSON over a plain socket. Each connection gets its own
//! thread; every command is handed to the main context and the socket
//! thread blocks on the result. Enforcement updates from the companion
//! process are applied right here on the socket thread, which is why the
//! policy store guards its remote state with a mutex.

use crate::bridge::dispatch::Dispatcher;
use crate::bridge::executor::{MainLoop, MainLoopHandle};
use crate::bridge::protocol::{
    CMD_ENFORCEMENT_UPDATE, CODE_EXCEPTION, CommandRequest, CommandResponse, bad_request_error,
    default_request_id, hello,
};
use crate::core::error::BridgeError;
use crate::core::gate::ErrorPayload;
use crate::core::policy::{PolicyStore, RemoteEnforcement};
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

pub struct BridgeServer {
    dispatcher: Arc<Dispatcher>,
    policy: Arc<PolicyStore>,
    listen: String,
}

impl BridgeServer {
    pub fn new(dispatcher: Arc<Dispatcher>, policy: Arc<PolicyStore>, listen: &str) -> Self {
        Self {
            dispatcher,
            policy,
            listen: listen.to_string(),
        }
    }

    /// Bind and serve. The calling thread becomes the main execution
    /// context and never returns while connections can still arrive.
    pub fn serve(self) -> Result<(), BridgeError> {
        let listener = TcpListener::bind(&self.listen).map_err(BridgeError::IoError)?;
        self.serve_listener(listener)
    }

    pub fn serve_listener(self, listener: TcpListener) -> Result<(), BridgeError> {
        let (main_loop, handle) = MainLoop::new();
        let dispatcher = self.dispatcher;
        let policy = self.policy;
        thread::spawn(move || accept_loop(listener, dispatcher, policy, handle));
        main_loop.run();
        Ok(())
    }
}

fn accept_loop(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    policy: Arc<PolicyStore>,
    main: MainLoopHandle,
) {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let dispatcher = dispatcher.clone();
                let policy = policy.clone();
                let main = main.clone();
                thread::spawn(move || {
                    if let Err(e) = handle_connection(stream, dispatcher, policy, main) {
                        eprintln!("scenegate: connection closed: {}", e);
                    }
                });
            }
            Err(e) => eprintln!("scenegate: accept failed: {}", e),
        }
    }
}

fn handle_connection(
    stream: TcpStream,
    dispatcher: Arc<Dispatcher>,
    policy: Arc<PolicyStore>,
    main: MainLoopHandle,
) -> Result<(), BridgeError> {
    let mut writer = stream.try_clone().map_err(BridgeError::IoError)?;
    write_line(&mut writer, &serde_json::to_string(&hello()).unwrap())?;

    let reader = BufReader::new(stream);
    for line in reader.lines() {
        let line = line.map_err(BridgeError::IoError)?;
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(&line, &dispatcher, &policy, &main);
        write_line(&mut writer, &serde_json::to_string(&response).unwrap())?;
    }
    Ok(())
}

/// One request line to one response. Request-level errors never tear down
/// the connection.
fn handle_line(
    line: &str,
    dispatcher: &Arc<Dispatcher>,
    policy: &PolicyStore,
    main: &MainLoopHandle,
) -> CommandResponse {
    let request: CommandRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            return CommandResponse::failure(&default_request_id(), bad_request_error(&e.to_string()));
        }
    };

    // Trusted companion pushes; applied without a main-context round trip.
    if request.command == CMD_ENFORCEMENT_UPDATE {
        return apply_enforcement_update(&request, policy);
    }

    let dispatcher = dispatcher.clone();
    let dispatched = request.clone();
    match main.call(move || dispatcher.execute(&dispatched)) {
        Ok(response) => response,
        Err(e) => CommandResponse::failure(
            &request.id,
            ErrorPayload::new(CODE_EXCEPTION, format!("Bridge unavailable: {}", e)),
        ),
    }
}

pub fn apply_enforcement_update(request: &CommandRequest, policy: &PolicyStore) -> CommandResponse {
    match serde_json::from_value::<RemoteEnforcement>(request.params.clone()) {
        Ok(update) => {
            policy.update_remote_enforcement(update);
            CommandResponse::success(&request.id, json!({ "applied": true }))
        }
        Err(e) => CommandResponse::failure(
            &request.id,
            bad_request_error(&format!("invalid enforcement update: {}", e)),
        ),
    }
}

fn write_line(writer: &mut TcpStream, line: &str) -> Result<(), BridgeError> {
    writeln!(writer, "{}", line).map_err(BridgeError::IoError)
}
