//! Policy store.
//!
//! Merges the read-only local settings with remote enforcement pushed at
//! runtime by a trusted companion process. Every query composes both sides
//! and resolves ambiguity closed: write permission is the AND of both
//! switches, dry-run is the OR, and the allowed-root set is the prefix
//! intersection — empty whenever either side configured nothing.
//!
//! Remote state lives behind one mutex. It is replaced wholesale by
//! [`PolicyStore::update_remote_enforcement`] and copied out for every
//! decision; no gating logic runs while the lock is held.

use crate::core::classify::normalize_content_path;
use crate::core::settings::BridgeSettings;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEnforcement {
    pub allow_write: bool,
    pub dry_run: bool,
    #[serde(default)]
    pub allowed_paths: Vec<String>,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub denied_tools: Vec<String>,
}

impl Default for RemoteEnforcement {
    /// Locked-down startup state: nothing may write until the companion
    /// process pushes an enforcement update.
    fn default() -> Self {
        Self {
            allow_write: false,
            dry_run: true,
            allowed_paths: Vec::new(),
            allowed_tools: Vec::new(),
            denied_tools: Vec::new(),
        }
    }
}

pub struct PolicyStore {
    settings: Option<BridgeSettings>,
    remote: Mutex<RemoteEnforcement>,
}

impl PolicyStore {
    pub fn new(settings: Option<BridgeSettings>) -> Self {
        Self {
            settings,
            remote: Mutex::new(RemoteEnforcement::default()),
        }
    }

    pub fn settings(&self) -> Option<&BridgeSettings> {
        self.settings.as_ref()
    }

    fn remote_snapshot(&self) -> RemoteEnforcement {
        match self.remote.lock() {
            Ok(guard) => guard.clone(),
            // A poisoned lock means a panic mid-replace; the locked-down
            // default is the only safe answer.
            Err(_) => RemoteEnforcement::default(),
        }
    }

    /// Replace the remote enforcement state wholesale. Lists are trimmed,
    /// normalized, and deduplicated before storage.
    pub fn update_remote_enforcement(&self, update: RemoteEnforcement) {
        let normalized = RemoteEnforcement {
            allow_write: update.allow_write,
            dry_run: update.dry_run,
            allowed_paths: normalize_path_list(&update.allowed_paths),
            allowed_tools: normalize_tool_list(&update.allowed_tools),
            denied_tools: normalize_tool_list(&update.denied_tools),
        };
        if let Ok(mut guard) = self.remote.lock() {
            *guard = normalized;
        }
    }

    /// Both the local settings and the remote enforcement must agree.
    /// Missing settings deny.
    pub fn is_write_allowed(&self) -> bool {
        let local = match &self.settings {
            Some(s) => s.allow_write,
            None => return false,
        };
        local && self.remote_snapshot().allow_write
    }

    /// Either side can force simulation. Missing settings always simulate.
    pub fn should_dry_run(&self) -> bool {
        let local = match &self.settings {
            Some(s) => s.dry_run,
            None => return true,
        };
        local || self.remote_snapshot().dry_run
    }

    pub fn require_checkout(&self) -> bool {
        self.settings.as_ref().is_some_and(|s| s.require_checkout)
    }

    /// Intersect local roots with remote allowed paths. Either side empty
    /// means no effective roots: nothing with a path is allowed.
    pub fn effective_allowed_roots(&self) -> Vec<String> {
        let local = match &self.settings {
            Some(s) => normalize_path_list(&s.allowed_content_roots),
            None => return Vec::new(),
        };
        let remote = self.remote_snapshot().allowed_paths;
        if local.is_empty() || remote.is_empty() {
            return Vec::new();
        }
        let mut effective = Vec::new();
        for l in &local {
            for r in &remote {
                // The tighter of an overlapping pair wins.
                let winner = if path_has_root(l, r) {
                    l
                } else if path_has_root(r, l) {
                    r
                } else {
                    continue;
                };
                if !effective.contains(winner) {
                    effective.push(winner.clone());
                }
            }
        }
        effective
    }

    /// Empty input paths are editor-state-only mutations and always pass;
    /// the other gate checks still apply to them.
    pub fn is_path_allowed(&self, path: &str) -> Result<(), String> {
        if path.trim().is_empty() {
            return Ok(());
        }
        let normalized = normalize_content_path(path);
        let roots = self.effective_allowed_roots();
        if roots.is_empty() {
            return Err(format!(
                "path '{}' denied: no allowed content roots are configured",
                normalized
            ));
        }
        if roots.iter().any(|root| path_has_root(&normalized, root)) {
            Ok(())
        } else {
            Err(format!(
                "path '{}' is outside the allowed content roots",
                normalized
            ))
        }
    }

    /// Deny lists (local or remote) always win; every non-empty allow list
    /// is a conjunctive gate. Matching is case-insensitive.
    pub fn is_tool_allowed(&self, command: &str) -> Result<(), String> {
        let remote = self.remote_snapshot();
        let local_denied = self
            .settings
            .as_ref()
            .map(|s| s.denied_tools.as_slice())
            .unwrap_or_default();
        if contains_tool(local_denied, command) || contains_tool(&remote.denied_tools, command) {
            return Err(format!("tool '{}' is denied by policy", command));
        }
        if let Some(settings) = &self.settings {
            if !settings.allowed_tools.is_empty() && !contains_tool(&settings.allowed_tools, command)
            {
                return Err(format!("tool '{}' is not in the local allow list", command));
            }
        }
        if !remote.allowed_tools.is_empty() && !contains_tool(&remote.allowed_tools, command) {
            return Err(format!("tool '{}' is not in the remote allow list", command));
        }
        Ok(())
    }
}

fn contains_tool(list: &[String], command: &str) -> bool {
    list.iter().any(|t| t.eq_ignore_ascii_case(command))
}

fn normalize_tool_list(list: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tool in list {
        let trimmed = tool.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !out.iter().any(|t| t.eq_ignore_ascii_case(trimmed)) {
            out.push(trimmed.to_string());
        }
    }
    out
}

fn normalize_path_list(list: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for path in list {
        let normalized = normalize_content_path(path);
        if normalized.is_empty() {
            continue;
        }
        if !out.contains(&normalized) {
            out.push(normalized);
        }
    }
    out
}

/// Boundary-aware prefix match: `/Game/A` covers `/Game/A` and
/// `/Game/A/Thing` but not `/Game/AB`.
pub fn path_has_root(path: &str, root: &str) -> bool {
    let root = root.trim_end_matches('/');
    if root.is_empty() {
        return false;
    }
    match path.strip_prefix(root) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
