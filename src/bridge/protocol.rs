//! Wire envelope for the bridge.
//!
//! Requests and responses are newline-delimited JSON. The response shape is
//! fixed: `ok` plus at most one of `result`/`error`, and an `audit` record
//! on every mutation-classified command.

use crate::core::gate::ErrorPayload;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use ulid::Ulid;

pub const PROTOCOL_VERSION: u32 = 1;

/// Command the trusted companion process uses to push enforcement state.
/// Applied on the socket thread, never dispatched to a handler.
pub const CMD_ENFORCEMENT_UPDATE: &str = "enforcement.update";

pub const CODE_BAD_REQUEST: &str = "BAD_REQUEST";
pub const CODE_UNKNOWN_COMMAND: &str = "UNKNOWN_COMMAND";
pub const CODE_COMMAND_FAILED: &str = "COMMAND_FAILED";
pub const CODE_EXCEPTION: &str = "EXCEPTION";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommandRequest {
    /// Correlation id echoed back in the response.
    #[serde(default = "default_request_id")]
    pub id: String,
    pub command: String,
    #[serde(default)]
    pub params: Value,
}

pub fn default_request_id() -> String {
    Ulid::new().to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit: Option<Value>,
}

impl CommandResponse {
    pub fn success(id: &str, result: Value) -> Self {
        Self {
            id: id.to_string(),
            ok: true,
            result: Some(result),
            error: None,
            audit: None,
        }
    }

    pub fn failure(id: &str, error: ErrorPayload) -> Self {
        Self {
            id: id.to_string(),
            ok: false,
            result: None,
            error: Some(error),
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: Value) -> Self {
        self.audit = Some(audit);
        self
    }
}

/// Handshake line written once per connection before any request is read.
pub fn hello() -> Value {
    json!({
        "bridge": "scenegate",
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": PROTOCOL_VERSION,
        "ts": crate::core::time::now_epoch_z(),
    })
}

pub fn unknown_command_error(command: &str) -> ErrorPayload {
    ErrorPayload::new(CODE_UNKNOWN_COMMAND, format!("Unknown command '{}'", command))
        .with_details(json!({ "command": command }))
}

pub fn bad_request_error(reason: &str) -> ErrorPayload {
    ErrorPayload::new(CODE_BAD_REQUEST, format!("Malformed request: {}", reason))
}
