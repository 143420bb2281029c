//! Flat stringification of JSON values for audit arguments.
//!
//! Mutation-action arguments are flat string maps so an audit record reads
//! the same everywhere. One total function covers every value kind; call
//! sites never type-sniff on their own.

use serde_json::Value;

/// Sentinel for missing/null parameter values.
pub const NULL_SENTINEL: &str = "<null>";

pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => NULL_SENTINEL.to_string(),
        Value::Bool(b) => {
            if *b {
                "true".to_string()
            } else {
                "false".to_string()
            }
        }
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        // Arrays and objects flatten to canonical JSON text.
        other => serde_json::to_string(other).unwrap_or_else(|_| NULL_SENTINEL.to_string()),
    }
}
