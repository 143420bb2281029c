//! Bridge configuration.
//!
//! Settings are loaded once at startup and treated as read-only by the
//! policy layer. Every default is the locked-down value: a bridge with no
//! configuration file refuses writes and forces dry-run.

use crate::core::error::BridgeError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "scenegate.toml";
pub const DEFAULT_AUDIT_LOG: &str = "audit.events.jsonl";
pub const DEFAULT_LISTEN: &str = "127.0.0.1:32458";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// Master write switch. Remote enforcement must also agree.
    #[serde(default)]
    pub allow_write: bool,
    /// Plan mutations without executing them.
    #[serde(default = "default_true")]
    pub dry_run: bool,
    /// Check out version-controlled assets before any write touches them.
    #[serde(default)]
    pub require_checkout: bool,
    /// Content roots mutations may touch. Empty means nothing is allowed.
    #[serde(default)]
    pub allowed_content_roots: Vec<String>,
    /// Commands the bridge will accept. Empty means no restriction.
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    /// Commands the bridge always refuses.
    #[serde(default)]
    pub denied_tools: Vec<String>,
    /// Socket address the bridge listens on.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Append-only audit event log.
    #[serde(default = "default_audit_log")]
    pub audit_log: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

fn default_audit_log() -> PathBuf {
    PathBuf::from(DEFAULT_AUDIT_LOG)
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            allow_write: false,
            dry_run: true,
            require_checkout: false,
            allowed_content_roots: Vec::new(),
            allowed_tools: Vec::new(),
            denied_tools: Vec::new(),
            listen: default_listen(),
            audit_log: default_audit_log(),
        }
    }
}

impl BridgeSettings {
    pub fn load(path: &Path) -> Result<Self, BridgeError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        toml::from_str(&raw)
            .map_err(|e| BridgeError::ConfigError(format!("invalid {}: {}", path.display(), e)))
    }

    /// Load the optional configuration file. `None` (missing file) is a
    /// valid state and resolves to the locked-down policy downstream.
    pub fn load_optional(path: &Path) -> Result<Option<Self>, BridgeError> {
        if !path.exists() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fail_closed() {
        let settings = BridgeSettings::default();
        assert!(!settings.allow_write);
        assert!(settings.dry_run);
        assert!(settings.allowed_content_roots.is_empty());
    }

    #[test]
    fn test_partial_toml_keeps_locked_defaults() {
        let settings: BridgeSettings =
            toml::from_str(r#"allowed_content_roots = ["/Game/Maps"]"#).unwrap();
        assert!(!settings.allow_write);
        assert!(settings.dry_run);
        assert_eq!(settings.allowed_content_roots, vec!["/Game/Maps"]);
        assert_eq!(settings.listen, DEFAULT_LISTEN);
    }

    #[test]
    fn test_full_toml_round_trip() {
        let settings: BridgeSettings = toml::from_str(
            r#"
            allow_write = true
            dry_run = false
            require_checkout = true
            allowed_content_roots = ["/Game/Film", "/Game/Props"]
            denied_tools = ["asset.delete"]
            listen = "127.0.0.1:9000"
            "#,
        )
        .unwrap();
        assert!(settings.allow_write);
        assert!(!settings.dry_run);
        assert!(settings.require_checkout);
        assert_eq!(settings.denied_tools, vec!["asset.delete"]);
        assert_eq!(settings.listen, "127.0.0.1:9000");
    }
}
