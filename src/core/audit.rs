//! Audit trail.
//!
//! Every mutation-classified response carries one uniformly shaped audit
//! record: what was planned, whether it was simulated, and whether it
//! executed. The same shape covers denials, dry-run previews, and real
//! executions so clients render "what would happen" and "what did happen"
//! through one code path. Records are also appended to a JSONL event log.

use crate::core::error::BridgeError;
use crate::core::plan::MutationPlan;
use crate::core::time;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

/// Label of the engine transaction wrapping every executed mutation.
pub const TRANSACTION_LABEL: &str = "MCP Mutation";

/// Render a plan plus its execution outcome into the canonical audit
/// record. The shape never varies; only the flags and action contents do.
pub fn build_audit_json(plan: &MutationPlan, executed: bool) -> Value {
    let actions: Vec<Value> = plan
        .actions
        .iter()
        .map(|action| json!({ "op": action.op(), "args": action.args_json() }))
        .collect();
    json!({
        "mutation": true,
        "dryRun": plan.dry_run,
        "executed": executed,
        "transaction": TRANSACTION_LABEL,
        "undoAvailable": executed,
        "actions": actions,
    })
}

/// One line of the audit event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub ts: String,
    pub event_id: String,
    pub command: String,
    pub params_hash: String,
    pub outcome: String,
    pub audit: Value,
}

/// Append-only JSONL sink for audit events.
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn record(
        &self,
        command: &str,
        params: &Value,
        outcome: &str,
        audit: &Value,
    ) -> Result<(), BridgeError> {
        let event = AuditEvent {
            ts: time::now_epoch_z(),
            event_id: time::new_event_id(),
            command: command.to_string(),
            params_hash: hash_params(params),
            outcome: outcome.to_string(),
            audit: audit.clone(),
        };
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(BridgeError::IoError)?;
        writeln!(f, "{}", serde_json::to_string(&event).unwrap()).map_err(BridgeError::IoError)
    }

    /// Read back up to `limit` most recent events.
    pub fn tail(&self, limit: usize) -> Result<Vec<AuditEvent>, BridgeError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path).map_err(BridgeError::IoError)?;
        let mut events: Vec<AuditEvent> = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        if events.len() > limit {
            events.drain(..events.len() - limit);
        }
        Ok(events)
    }
}

fn hash_params(params: &Value) -> String {
    format!(
        "{:x}",
        Sha256::digest(serde_json::to_string(params).unwrap_or_default())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plan::{MutationAction, MutationPlan};

    fn plan(dry_run: bool, ops: &[&str]) -> MutationPlan {
        MutationPlan {
            dry_run,
            actions: ops
                .iter()
                .map(|op| MutationAction::new(*op).with_arg("actor", "A"))
                .collect(),
        }
    }

    #[test]
    fn test_audit_shape_is_invariant() {
        for (dry_run, executed, actions) in [
            (true, false, vec!["destroy"]),
            (false, true, vec!["destroy", "destroy"]),
            (true, true, vec![]),
        ] {
            let record = build_audit_json(&plan(dry_run, &actions), executed);
            assert_eq!(record["mutation"], true);
            assert_eq!(record["dryRun"], dry_run);
            assert_eq!(record["executed"], executed);
            assert_eq!(record["transaction"], TRANSACTION_LABEL);
            assert_eq!(record["undoAvailable"], executed);
            assert_eq!(record["actions"].as_array().unwrap().len(), actions.len());
        }
    }

    #[test]
    fn test_audit_actions_render_args() {
        let record = build_audit_json(&plan(false, &["destroy"]), true);
        assert_eq!(record["actions"][0]["op"], "destroy");
        assert_eq!(record["actions"][0]["args"]["actor"], "A");
    }

    #[test]
    fn test_log_append_and_tail() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("audit.events.jsonl"));
        let audit = build_audit_json(&plan(true, &["destroy"]), false);
        log.record("actor.destroy", &serde_json::json!({"actors": ["A"]}), "planned", &audit)
            .unwrap();
        log.record("actor.destroy", &serde_json::json!({"actors": ["A"]}), "executed", &audit)
            .unwrap();

        let events = log.tail(10).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].outcome, "planned");
        assert_eq!(events[1].outcome, "executed");
        assert_eq!(events[0].params_hash, events[1].params_hash);

        let events = log.tail(1).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, "executed");
    }

    #[test]
    fn test_tail_of_missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("missing.jsonl"));
        assert!(log.tail(5).unwrap().is_empty());
    }
}
