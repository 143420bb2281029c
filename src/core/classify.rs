//! Command classification.
//!
//! Decides, from a command id and its parameters alone, whether a command
//! mutates persistent or world state and which content path it would touch.
//! Both answers feed the write gate; neither touches engine state except
//! the one level-package query behind [`EditorContext`].

use crate::core::editor::EditorContext;
use serde_json::Value;

/// Commands that change persistent content, world state, or source-control
/// state. `camera.bookmark` is handled conditionally below.
pub const MUTATING_COMMANDS: &[&str] = &[
    "actor.attach",
    "actor.destroy",
    "actor.spawn",
    "actor.tag",
    "actor.transform",
    "asset.batch_import",
    "asset.create_folder",
    "asset.delete",
    "asset.fix_redirectors",
    "asset.rename",
    "asset.save_all",
    "blueprint.add_component",
    "blueprint.create",
    "material.apply",
    "material.create",
    "material.set_scalar",
    "sc.add",
    "sc.checkout",
    "sc.revert",
    "sc.status",
    "sc.submit",
    "sequence.bind",
    "sequence.create",
    "sequence.unbind",
    "widget.create",
];

/// Candidate parameter keys scanned, in priority order, when no family rule
/// resolves the target path.
const PATH_KEYS: &[&str] = &[
    "path",
    "asset_path",
    "asset",
    "objectPath",
    "fromObjectPath",
    "toPackagePath",
    "blueprint_path",
    "content_path",
    "target_path",
    "parent_path",
    "widget_path",
    "source_path",
    "package_path",
    "destPath",
    "sequencePath",
];

pub fn is_mutation_command(command: &str, params: &Value) -> bool {
    if command == "camera.bookmark" {
        return is_persist_bookmark_set(params);
    }
    MUTATING_COMMANDS.contains(&command) || command.starts_with("sc.")
}

/// A session-only bookmark set is not a mutation; persisting the bookmark
/// into the level package is.
fn is_persist_bookmark_set(params: &Value) -> bool {
    let op_is_set = params
        .get("op")
        .and_then(Value::as_str)
        .is_some_and(|op| op.eq_ignore_ascii_case("set"));
    let persist = params
        .get("persist")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    op_is_set && persist
}

/// Resolve the content path a command would touch. Empty string means the
/// mutation is editor-state-only and the path allowlist does not apply.
pub fn resolve_path_for_command(command: &str, params: &Value, editor: &dyn EditorContext) -> String {
    // Persisting a bookmark writes into the current level package.
    if command == "camera.bookmark" {
        if !is_persist_bookmark_set(params) {
            return String::new();
        }
        return match editor.current_level_package() {
            Some(package) => normalize_content_path(&package),
            None => String::new(),
        };
    }

    // Source-control batches target their first asset.
    if command.starts_with("sc.") {
        return first_array_string(params, "assets");
    }

    for key in PATH_KEYS {
        if let Some(value) = params.get(*key).and_then(Value::as_str) {
            return normalize_content_path(value);
        }
    }

    // Blueprint and widget commands are created by name before any package
    // path exists for them.
    if command.contains("blueprint") {
        if let Some(name) = params.get("name").and_then(Value::as_str) {
            return normalize_content_path(name);
        }
    }
    if command.starts_with("widget.") {
        if let Some(name) = params
            .get("widget_name")
            .or_else(|| params.get("name"))
            .and_then(Value::as_str)
        {
            return normalize_content_path(name);
        }
    }

    match command {
        "asset.delete" => first_array_string(params, "objectPaths"),
        "asset.fix_redirectors" => first_array_string(params, "paths"),
        "asset.save_all" => first_array_string(params, "packages"),
        _ => String::new(),
    }
}

fn first_array_string(params: &Value, key: &str) -> String {
    params
        .get(key)
        .and_then(Value::as_array)
        .and_then(|items| items.iter().find_map(Value::as_str))
        .map(normalize_content_path)
        .unwrap_or_default()
}

/// Trim and root a content path. Paths not rooted at `/` are assumed to be
/// relative to the game content root.
pub fn normalize_content_path(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/Game/{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::editor::HeadlessEditor;
    use serde_json::json;

    struct LevelOpen;

    impl EditorContext for LevelOpen {
        fn current_level_package(&self) -> Option<String> {
            Some("/Game/Maps/Stage".to_string())
        }
    }

    #[test]
    fn test_known_mutations_classified() {
        assert!(is_mutation_command("actor.spawn", &json!({})));
        assert!(is_mutation_command("asset.delete", &json!({})));
        assert!(is_mutation_command("sc.status", &json!({})));
        assert!(!is_mutation_command("actor.list", &json!({})));
        assert!(!is_mutation_command("asset.find", &json!({})));
    }

    #[test]
    fn test_bookmark_mutation_requires_persist_set() {
        assert!(is_mutation_command(
            "camera.bookmark",
            &json!({"op": "set", "persist": true})
        ));
        assert!(is_mutation_command(
            "camera.bookmark",
            &json!({"op": "SET", "persist": true})
        ));
        assert!(!is_mutation_command(
            "camera.bookmark",
            &json!({"op": "set", "persist": false})
        ));
        assert!(!is_mutation_command(
            "camera.bookmark",
            &json!({"op": "jump", "persist": true})
        ));
        assert!(!is_mutation_command("camera.bookmark", &json!({})));
    }

    #[test]
    fn test_bookmark_resolves_to_level_package() {
        let params = json!({"op": "set", "persist": true, "slot": 3});
        assert_eq!(
            resolve_path_for_command("camera.bookmark", &params, &LevelOpen),
            "/Game/Maps/Stage"
        );
        // No world loaded: editor-state-only.
        assert_eq!(
            resolve_path_for_command("camera.bookmark", &params, &HeadlessEditor),
            ""
        );
    }

    #[test]
    fn test_sc_resolves_first_asset() {
        let params = json!({"assets": ["/Game/A", "/Game/B"]});
        assert_eq!(
            resolve_path_for_command("sc.checkout", &params, &HeadlessEditor),
            "/Game/A"
        );
    }

    #[test]
    fn test_key_scan_priority() {
        // `path` outranks `objectPath` for any non-special-cased command.
        let params = json!({"objectPath": "/Game/B", "path": "/Game/A"});
        assert_eq!(
            resolve_path_for_command("material.apply", &params, &HeadlessEditor),
            "/Game/A"
        );
    }

    #[test]
    fn test_blueprint_name_fallback() {
        let params = json!({"name": "BP_Turret"});
        assert_eq!(
            resolve_path_for_command("blueprint.create", &params, &HeadlessEditor),
            "/Game/BP_Turret"
        );
    }

    #[test]
    fn test_widget_name_fallback() {
        let params = json!({"widget_name": "HUD_Main"});
        assert_eq!(
            resolve_path_for_command("widget.create", &params, &HeadlessEditor),
            "/Game/HUD_Main"
        );
    }

    #[test]
    fn test_array_special_cases() {
        assert_eq!(
            resolve_path_for_command(
                "asset.delete",
                &json!({"objectPaths": ["/Game/X.X", "/Game/Y.Y"]}),
                &HeadlessEditor
            ),
            "/Game/X.X"
        );
        assert_eq!(
            resolve_path_for_command(
                "asset.fix_redirectors",
                &json!({"paths": ["Props"]}),
                &HeadlessEditor
            ),
            "/Game/Props"
        );
    }

    #[test]
    fn test_no_path_is_empty() {
        assert_eq!(
            resolve_path_for_command("actor.destroy", &json!({"actors": ["A"]}), &HeadlessEditor),
            ""
        );
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_content_path("  /Game/A "), "/Game/A");
        assert_eq!(normalize_content_path("Props/Crate"), "/Game/Props/Crate");
        assert_eq!(normalize_content_path(""), "");
        assert_eq!(normalize_content_path("/Engine/Basic"), "/Engine/Basic");
    }
}
