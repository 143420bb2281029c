//! Mutation planning.
//!
//! Every mutation command gets a plan before anything executes: an ordered
//! list of the atomic actions the command intends to perform. Plans power
//! the dry-run preview and the audit record, so per-item commands plan one
//! action per affected item rather than one opaque batch entry.
//!
//! Adding a command family: append one entry to `PLANNERS` and write its
//! builder. Commands without an entry fall back to a generic single-action
//! plan over their raw parameters.

use crate::core::classify::normalize_content_path;
use crate::core::policy::PolicyStore;
use crate::core::stringify::stringify;
use serde_json::Value;

/// One atomic intended side effect. Argument order is preserved because the
/// audit record renders arguments in insertion order.
#[derive(Debug, Clone)]
pub struct MutationAction {
    op: String,
    args: Vec<(String, String)>,
}

impl MutationAction {
    pub fn new(op: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            args: Vec::new(),
        }
    }

    pub fn with_arg(mut self, key: &str, value: impl Into<String>) -> Self {
        self.push_arg(key, value);
        self
    }

    /// Keys are unique; a repeated key replaces the earlier value in place.
    pub fn push_arg(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(existing) = self.args.iter_mut().find(|(k, _)| k == key) {
            existing.1 = value;
        } else {
            self.args.push((key.to_string(), value));
        }
    }

    pub fn op(&self) -> &str {
        &self.op
    }

    pub fn args(&self) -> &[(String, String)] {
        &self.args
    }

    pub fn arg(&self, key: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn args_json(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (key, value) in &self.args {
            map.insert(key.clone(), Value::String(value.clone()));
        }
        Value::Object(map)
    }
}

/// The ordered actions a mutation command intends to perform. Built fresh
/// per invocation; the dispatcher flips `dry_run` off when execution
/// actually proceeds and reuses the same plan for the audit record.
#[derive(Debug, Clone)]
pub struct MutationPlan {
    pub dry_run: bool,
    pub actions: Vec<MutationAction>,
}

struct PlannerEntry {
    command: &'static str,
    build: fn(&str, &Value) -> Vec<MutationAction>,
}

const PLANNERS: &[PlannerEntry] = &[
    PlannerEntry { command: "actor.attach", build: plan_actor_attach },
    PlannerEntry { command: "actor.destroy", build: plan_actor_destroy },
    PlannerEntry { command: "actor.spawn", build: plan_actor_spawn },
    PlannerEntry { command: "actor.tag", build: plan_actor_tag },
    PlannerEntry { command: "actor.transform", build: plan_actor_transform },
    PlannerEntry { command: "asset.batch_import", build: plan_batch_import },
    PlannerEntry { command: "asset.create_folder", build: plan_create_folder },
    PlannerEntry { command: "asset.delete", build: plan_asset_delete },
    PlannerEntry { command: "asset.fix_redirectors", build: plan_fix_redirectors },
    PlannerEntry { command: "asset.rename", build: plan_asset_rename },
    PlannerEntry { command: "asset.save_all", build: plan_save_all },
    PlannerEntry { command: "camera.bookmark", build: plan_bookmark_persist },
    PlannerEntry { command: "sc.add", build: plan_source_control },
    PlannerEntry { command: "sc.checkout", build: plan_source_control },
    PlannerEntry { command: "sc.revert", build: plan_source_control },
    PlannerEntry { command: "sc.status", build: plan_source_control },
    PlannerEntry { command: "sc.submit", build: plan_source_control },
    PlannerEntry { command: "sequence.create", build: plan_sequence_create },
];

/// Build the mutation plan for a command. `dry_run` is copied from policy
/// at build time.
pub fn build_plan(policy: &PolicyStore, command: &str, params: &Value) -> MutationPlan {
    let actions = match PLANNERS.iter().find(|p| p.command == command) {
        Some(entry) => (entry.build)(command, params),
        None if command.starts_with("sc.") => plan_source_control(command, params),
        None => plan_generic(command, params),
    };
    MutationPlan {
        dry_run: policy.should_dry_run(),
        actions,
    }
}

fn str_param<'a>(params: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| params.get(*k).and_then(Value::as_str))
}

fn push_if_present(action: &mut MutationAction, params: &Value, key: &str) {
    if let Some(value) = params.get(key) {
        action.push_arg(key, stringify(value));
    }
}

fn plan_create_folder(_command: &str, params: &Value) -> Vec<MutationAction> {
    let path = str_param(params, &["path"]).unwrap_or_default();
    vec![MutationAction::new("create_folder").with_arg("path", normalize_content_path(path))]
}

fn plan_asset_rename(_command: &str, params: &Value) -> Vec<MutationAction> {
    let from = str_param(params, &["fromObjectPath", "from"]).unwrap_or_default();
    let to = str_param(params, &["toPackagePath", "to"]).unwrap_or_default();
    vec![
        MutationAction::new("rename")
            .with_arg("from", normalize_content_path(from))
            .with_arg("to", normalize_content_path(to)),
    ]
}

fn plan_actor_spawn(_command: &str, params: &Value) -> Vec<MutationAction> {
    let mut action = MutationAction::new("spawn");
    if let Some(class) = str_param(params, &["class", "actor_class"]) {
        action.push_arg("class", class);
    }
    if let Some(name) = str_param(params, &["name"]) {
        action.push_arg("name", name);
    }
    push_if_present(&mut action, params, "location");
    push_if_present(&mut action, params, "rotation");
    vec![action]
}

fn plan_actor_attach(_command: &str, params: &Value) -> Vec<MutationAction> {
    vec![
        MutationAction::new("attach")
            .with_arg("child", str_param(params, &["child", "child_actor"]).unwrap_or_default())
            .with_arg(
                "parent",
                str_param(params, &["parent", "parent_actor"]).unwrap_or_default(),
            ),
    ]
}

fn plan_actor_transform(_command: &str, params: &Value) -> Vec<MutationAction> {
    let mut action = MutationAction::new("transform")
        .with_arg("actor", str_param(params, &["actor"]).unwrap_or_default());
    push_if_present(&mut action, params, "location");
    push_if_present(&mut action, params, "rotation");
    push_if_present(&mut action, params, "scale");
    vec![action]
}

fn plan_actor_tag(_command: &str, params: &Value) -> Vec<MutationAction> {
    vec![
        MutationAction::new("tag")
            .with_arg("actor", str_param(params, &["actor"]).unwrap_or_default())
            .with_arg("tag", str_param(params, &["tag"]).unwrap_or_default()),
    ]
}

fn plan_save_all(_command: &str, params: &Value) -> Vec<MutationAction> {
    let mut action = MutationAction::new("save_all");
    push_if_present(&mut action, params, "packages");
    push_if_present(&mut action, params, "only_modified");
    vec![action]
}

/// One `delete` per object path so the audit shows exactly which assets a
/// batch touched.
fn plan_asset_delete(_command: &str, params: &Value) -> Vec<MutationAction> {
    array_items(params, "objectPaths")
        .map(|item| {
            MutationAction::new("delete").with_arg("objectPath", normalized_item(item))
        })
        .collect()
}

fn plan_actor_destroy(_command: &str, params: &Value) -> Vec<MutationAction> {
    array_items(params, "actors")
        .map(|item| MutationAction::new("destroy").with_arg("actor", stringify(item)))
        .collect()
}

fn plan_fix_redirectors(_command: &str, params: &Value) -> Vec<MutationAction> {
    array_items(params, "paths")
        .map(|item| MutationAction::new("fix_redirector").with_arg("path", normalized_item(item)))
        .collect()
}

fn plan_batch_import(_command: &str, params: &Value) -> Vec<MutationAction> {
    array_items(params, "files")
        .map(|item| {
            let mut action = MutationAction::new("import");
            match item.as_object() {
                Some(fields) => {
                    for (key, value) in fields {
                        action.push_arg(key, stringify(value));
                    }
                }
                None => action.push_arg("file", stringify(item)),
            }
            action
        })
        .collect()
}

/// Source-control batches plan one action per asset; the action name is the
/// command suffix (`sc.checkout` -> `checkout`).
fn plan_source_control(command: &str, params: &Value) -> Vec<MutationAction> {
    let op = command.strip_prefix("sc.").unwrap_or(command).to_string();
    array_items(params, "assets")
        .map(|item| MutationAction::new(op.clone()).with_arg("asset", normalized_item(item)))
        .collect()
}

/// Mirrors the multi-step engine operation: optional overwrite-delete,
/// create, optional camera rigging, then one bind per requested actor.
fn plan_sequence_create(_command: &str, params: &Value) -> Vec<MutationAction> {
    let path = normalize_content_path(
        str_param(params, &["path", "sequencePath"]).unwrap_or_default(),
    );
    let mut actions = Vec::new();

    if params.get("overwrite").and_then(Value::as_bool).unwrap_or(false) {
        actions.push(MutationAction::new("delete_sequence").with_arg("path", path.clone()));
    }

    let mut create = MutationAction::new("create_sequence").with_arg("path", path.clone());
    if let Some(name) = str_param(params, &["name"]) {
        create.push_arg("name", name);
    }
    push_if_present(&mut create, params, "frame_rate");
    actions.push(create);

    if params
        .get("spawn_camera")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        let mut camera = MutationAction::new("spawn_camera");
        if let Some(name) = str_param(params, &["camera_name"]) {
            camera.push_arg("name", name);
        }
        actions.push(camera);
        actions.push(MutationAction::new("add_camera_cut").with_arg("path", path));
    }

    for actor in array_items(params, "bindActors") {
        actions.push(MutationAction::new("bind_actor").with_arg("actor", stringify(actor)));
    }
    actions
}

fn plan_bookmark_persist(_command: &str, params: &Value) -> Vec<MutationAction> {
    let slot = params
        .get("slot")
        .or_else(|| params.get("index"))
        .map(stringify)
        .unwrap_or_else(|| "0".to_string());
    vec![MutationAction::new("bookmark_persist").with_arg("slot", slot)]
}

/// Fallback for families without a dedicated builder: one action named
/// after the command, one argument per top-level parameter.
fn plan_generic(command: &str, params: &Value) -> Vec<MutationAction> {
    let mut action = MutationAction::new(command);
    if let Some(fields) = params.as_object() {
        for (key, value) in fields {
            action.push_arg(key, stringify(value));
        }
    }
    vec![action]
}

fn array_items<'a>(params: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    params
        .get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter())
        .unwrap_or_default()
}

fn normalized_item(item: &Value) -> String {
    match item.as_str() {
        Some(s) => normalize_content_path(s),
        None => stringify(item),
    }
}
