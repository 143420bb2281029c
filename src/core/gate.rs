//! Write gate.
//!
//! The admission façade in front of every mutation: tool policy, write
//! policy, and path policy composed in order, first failure wins. Also owns
//! the checkout pre-flight and the canonical error payloads surfaced to
//! remote clients.

use crate::core::classify::normalize_content_path;
use crate::core::editor::SourceControl;
use crate::core::policy::PolicyStore;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

pub const CODE_WRITE_NOT_ALLOWED: &str = "WRITE_NOT_ALLOWED";
pub const CODE_PATH_NOT_ALLOWED: &str = "PATH_NOT_ALLOWED";
pub const CODE_TOOL_DENIED: &str = "TOOL_DENIED";
pub const CODE_SOURCE_CONTROL_REQUIRED: &str = "SOURCE_CONTROL_REQUIRED";

/// Structured error surfaced to the remote client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorPayload {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Which admission check refused a mutation, with the policy reason.
#[derive(Debug, Clone)]
pub enum Denial {
    Tool { reason: String },
    Write { reason: String },
    Path { reason: String },
}

impl Denial {
    pub fn reason(&self) -> &str {
        match self {
            Denial::Tool { reason } | Denial::Write { reason } | Denial::Path { reason } => reason,
        }
    }
}

pub struct WriteGate {
    policy: Arc<PolicyStore>,
    source_control: Arc<dyn SourceControl>,
}

impl WriteGate {
    pub fn new(policy: Arc<PolicyStore>, source_control: Arc<dyn SourceControl>) -> Self {
        Self {
            policy,
            source_control,
        }
    }

    pub fn policy(&self) -> &PolicyStore {
        &self.policy
    }

    /// Admission decision for a classified mutation. Checks run in order:
    /// tool, write, path; the first refusal carries the reason.
    /// `sc.status` is mutation-classified but read-only, so it skips the
    /// write switch.
    pub fn can_mutate(&self, command: &str, path: &str) -> Result<(), Denial> {
        if let Err(reason) = self.policy.is_tool_allowed(command) {
            return Err(Denial::Tool { reason });
        }
        if command != "sc.status" && !self.policy.is_write_allowed() {
            return Err(Denial::Write {
                reason: "write operations are disabled by policy".to_string(),
            });
        }
        if let Err(reason) = self.policy.is_path_allowed(path) {
            return Err(Denial::Path { reason });
        }
        Ok(())
    }

    /// Checkout pre-flight. No-op when the policy does not require
    /// checkout, the path is empty, or the path is not a content package.
    /// Everything else fails closed: conversion failure, provider error,
    /// or any per-file refusal blocks the mutation.
    pub fn ensure_checkout_for_content_path(&self, path: &str) -> Result<(), ErrorPayload> {
        if !self.policy.require_checkout() {
            return Ok(());
        }
        let normalized = normalize_content_path(path);
        if normalized.is_empty() || !is_long_package_name(&normalized) {
            return Ok(());
        }

        let files = match self.source_control.asset_paths_to_files(&[normalized.clone()]) {
            Ok(files) => files,
            Err(e) => {
                return Err(source_control_required_error(&normalized, Some(&e.to_string())));
            }
        };
        if files.is_empty() {
            return Err(source_control_required_error(
                &normalized,
                Some("package path resolved to no files"),
            ));
        }
        match self.source_control.checkout(&files) {
            Ok(results) => match results.iter().find(|r| !r.ok) {
                Some(failed) => Err(source_control_required_error(
                    &normalized,
                    Some(&format!("checkout declined for {}", failed.file)),
                )),
                None => Ok(()),
            },
            Err(e) => Err(source_control_required_error(&normalized, Some(&e.to_string()))),
        }
    }
}

/// A content package path: rooted, at least `/Root/Name`, no empty
/// segments. Object suffixes (`/Game/X.X`) count via their package part.
pub fn is_long_package_name(path: &str) -> bool {
    let package = path.split('.').next().unwrap_or(path);
    let Some(rest) = package.strip_prefix('/') else {
        return false;
    };
    let segments: Vec<&str> = rest.split('/').collect();
    segments.len() >= 2 && segments.iter().all(|s| !s.is_empty())
}

pub fn write_not_allowed_error(tool: &str, reason: &str) -> ErrorPayload {
    ErrorPayload::new(CODE_WRITE_NOT_ALLOWED, format!("Write not allowed: {}", reason))
        .with_details(json!({ "tool": tool }))
}

pub fn path_not_allowed_error(path: &str, reason: &str) -> ErrorPayload {
    ErrorPayload::new(CODE_PATH_NOT_ALLOWED, format!("Path not allowed: {}", reason))
        .with_details(json!({ "path": path }))
}

pub fn tool_denied_error(tool: &str, reason: &str) -> ErrorPayload {
    ErrorPayload::new(CODE_TOOL_DENIED, format!("Tool denied: {}", reason))
        .with_details(json!({ "tool": tool }))
}

pub fn source_control_required_error(asset: &str, reason: Option<&str>) -> ErrorPayload {
    let details = match reason {
        Some(r) => json!({ "asset": asset, "reason": r }),
        None => json!({ "asset": asset }),
    };
    ErrorPayload::new(
        CODE_SOURCE_CONTROL_REQUIRED,
        format!("Source control checkout required for {}", asset),
    )
    .with_details(details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::editor::{FileState, NullSourceControl};
    use crate::core::error::BridgeError;
    use crate::core::settings::BridgeSettings;
    use crate::core::policy::RemoteEnforcement;

    fn open_store(roots: &[&str]) -> Arc<PolicyStore> {
        let store = PolicyStore::new(Some(BridgeSettings {
            allow_write: true,
            dry_run: false,
            allowed_content_roots: roots.iter().map(|s| s.to_string()).collect(),
            ..BridgeSettings::default()
        }));
        store.update_remote_enforcement(RemoteEnforcement {
            allow_write: true,
            dry_run: false,
            allowed_paths: roots.iter().map(|s| s.to_string()).collect(),
            allowed_tools: Vec::new(),
            denied_tools: Vec::new(),
        });
        Arc::new(store)
    }

    fn gate(policy: Arc<PolicyStore>) -> WriteGate {
        WriteGate::new(policy, Arc::new(NullSourceControl))
    }

    #[test]
    fn test_admission_order_tool_first() {
        let store = PolicyStore::new(Some(BridgeSettings {
            denied_tools: vec!["actor.spawn".to_string()],
            ..BridgeSettings::default()
        }));
        let gate = gate(Arc::new(store));
        // Tool denial outranks the (also failing) write check.
        assert!(matches!(
            gate.can_mutate("actor.spawn", ""),
            Err(Denial::Tool { .. })
        ));
    }

    #[test]
    fn test_write_denied_when_remote_disagrees() {
        let store = PolicyStore::new(Some(BridgeSettings {
            allow_write: true,
            dry_run: false,
            ..BridgeSettings::default()
        }));
        let gate = gate(Arc::new(store));
        assert!(matches!(
            gate.can_mutate("actor.spawn", ""),
            Err(Denial::Write { .. })
        ));
    }

    #[test]
    fn test_sc_status_skips_write_check() {
        let store = PolicyStore::new(Some(BridgeSettings::default()));
        let gate = gate(Arc::new(store));
        assert!(gate.can_mutate("sc.status", "").is_ok());
        assert!(gate.can_mutate("sc.submit", "").is_err());
    }

    #[test]
    fn test_path_denied_outside_roots() {
        let gate = gate(open_store(&["/Game/Film"]));
        assert!(gate.can_mutate("actor.spawn", "/Game/Film/Shot01").is_ok());
        assert!(matches!(
            gate.can_mutate("actor.spawn", "/Game/Props/Crate"),
            Err(Denial::Path { .. })
        ));
    }

    #[test]
    fn test_checkout_noop_when_not_required() {
        let gate = gate(open_store(&["/Game"]));
        assert!(gate.ensure_checkout_for_content_path("/Game/Props/Crate").is_ok());
    }

    struct RefusingProvider;

    impl SourceControl for RefusingProvider {
        fn asset_paths_to_files(&self, paths: &[String]) -> Result<Vec<String>, BridgeError> {
            NullSourceControl.asset_paths_to_files(paths)
        }

        fn checkout(&self, files: &[String]) -> Result<Vec<FileState>, BridgeError> {
            Ok(files
                .iter()
                .map(|f| FileState {
                    file: f.clone(),
                    ok: false,
                })
                .collect())
        }

        fn mark_for_add(&self, files: &[String]) -> Result<Vec<FileState>, BridgeError> {
            self.checkout(files)
        }
    }

    fn checkout_policy() -> Arc<PolicyStore> {
        Arc::new(PolicyStore::new(Some(BridgeSettings {
            allow_write: true,
            dry_run: false,
            require_checkout: true,
            ..BridgeSettings::default()
        })))
    }

    #[test]
    fn test_checkout_refusal_fails_closed() {
        let gate = WriteGate::new(checkout_policy(), Arc::new(RefusingProvider));
        let err = gate
            .ensure_checkout_for_content_path("/Game/Props/Crate")
            .unwrap_err();
        assert_eq!(err.code, CODE_SOURCE_CONTROL_REQUIRED);
        let details = err.details.unwrap();
        assert_eq!(details["asset"], "/Game/Props/Crate");
        assert!(details["reason"].as_str().unwrap().contains("declined"));
    }

    #[test]
    fn test_checkout_skips_non_package_paths() {
        let gate = WriteGate::new(checkout_policy(), Arc::new(RefusingProvider));
        assert!(gate.ensure_checkout_for_content_path("").is_ok());
        // A bare root is not a content package.
        assert!(gate.ensure_checkout_for_content_path("/Game").is_ok());
    }

    struct OfflineProvider;

    impl SourceControl for OfflineProvider {
        fn asset_paths_to_files(&self, _paths: &[String]) -> Result<Vec<String>, BridgeError> {
            Err(BridgeError::SourceControlError("provider offline".to_string()))
        }

        fn checkout(&self, _files: &[String]) -> Result<Vec<FileState>, BridgeError> {
            Err(BridgeError::SourceControlError("provider offline".to_string()))
        }

        fn mark_for_add(&self, _files: &[String]) -> Result<Vec<FileState>, BridgeError> {
            Err(BridgeError::SourceControlError("provider offline".to_string()))
        }
    }

    #[test]
    fn test_provider_error_propagates_reason() {
        let gate = WriteGate::new(checkout_policy(), Arc::new(OfflineProvider));
        let err = gate
            .ensure_checkout_for_content_path("/Game/Props/Crate")
            .unwrap_err();
        assert_eq!(err.code, CODE_SOURCE_CONTROL_REQUIRED);
        let reason = err.details.unwrap()["reason"].as_str().unwrap().to_string();
        assert!(reason.contains("provider offline"));
    }

    #[test]
    fn test_checkout_success_passes() {
        let gate = WriteGate::new(checkout_policy(), Arc::new(NullSourceControl));
        assert!(gate.ensure_checkout_for_content_path("/Game/Props/Crate").is_ok());
    }

    #[test]
    fn test_long_package_names() {
        assert!(is_long_package_name("/Game/Props/Crate"));
        assert!(is_long_package_name("/Game/X.X"));
        assert!(!is_long_package_name("/Game"));
        assert!(!is_long_package_name("Game/Props"));
        assert!(!is_long_package_name("/Game//Crate"));
    }

    #[test]
    fn test_error_payload_shapes() {
        let err = write_not_allowed_error("actor.spawn", "disabled");
        assert_eq!(err.code, CODE_WRITE_NOT_ALLOWED);
        assert_eq!(err.details.unwrap()["tool"], "actor.spawn");

        let err = path_not_allowed_error("/Game/B", "outside roots");
        assert_eq!(err.code, CODE_PATH_NOT_ALLOWED);
        assert_eq!(err.details.unwrap()["path"], "/Game/B");

        let err = source_control_required_error("/Game/A", None);
        assert!(err.details.unwrap().get("reason").is_none());
    }
}
