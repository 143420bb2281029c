//! Collaborator contracts for the live editor session.
//!
//! The bridge never talks to engine subsystems directly. Everything it needs
//! from the editor is behind these three seams: world queries, source
//! control, and the undo transaction. The null implementations back the
//! standalone binary and tests.

use crate::core::error::BridgeError;

/// Read-only queries against the live editor world.
pub trait EditorContext: Send + Sync {
    /// Package path of the currently loaded level, when one is open.
    fn current_level_package(&self) -> Option<String>;
}

/// Per-file result of a source-control operation.
#[derive(Debug, Clone)]
pub struct FileState {
    pub file: String,
    pub ok: bool,
}

/// Source-control provider capability.
pub trait SourceControl: Send + Sync {
    /// Map content package paths to on-disk file paths.
    fn asset_paths_to_files(&self, package_paths: &[String]) -> Result<Vec<String>, BridgeError>;
    fn checkout(&self, files: &[String]) -> Result<Vec<FileState>, BridgeError>;
    fn mark_for_add(&self, files: &[String]) -> Result<Vec<FileState>, BridgeError>;
}

/// Engine transaction seam. `begin`/`end` bracket every executed mutation.
pub trait Transactor: Send + Sync {
    fn begin(&self, label: &str);
    fn end(&self);
}

/// Editor context with no world loaded. Used by the offline CLI commands.
pub struct HeadlessEditor;

impl EditorContext for HeadlessEditor {
    fn current_level_package(&self) -> Option<String> {
        None
    }
}

/// Provider for sessions without a source-control backend: package paths map
/// to a conventional `Content/` layout and every operation reports success.
pub struct NullSourceControl;

impl NullSourceControl {
    fn to_file(package_path: &str) -> String {
        let trimmed = package_path
            .strip_prefix("/Game/")
            .unwrap_or(package_path)
            .trim_start_matches('/');
        // Object suffixes ("/Game/X.X") collapse to the package file.
        let package = trimmed.split('.').next().unwrap_or(trimmed);
        format!("Content/{}.uasset", package)
    }
}

impl SourceControl for NullSourceControl {
    fn asset_paths_to_files(&self, package_paths: &[String]) -> Result<Vec<String>, BridgeError> {
        Ok(package_paths.iter().map(|p| Self::to_file(p)).collect())
    }

    fn checkout(&self, files: &[String]) -> Result<Vec<FileState>, BridgeError> {
        Ok(files
            .iter()
            .map(|f| FileState {
                file: f.clone(),
                ok: true,
            })
            .collect())
    }

    fn mark_for_add(&self, files: &[String]) -> Result<Vec<FileState>, BridgeError> {
        self.checkout(files)
    }
}

/// Transaction sink that discards begin/end pairs.
pub struct NullTransactor;

impl Transactor for NullTransactor {
    fn begin(&self, _label: &str) {}
    fn end(&self) {}
}
