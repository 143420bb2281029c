//! Command dispatch.
//!
//! One switchboard for every inbound command. Mutations pass through the
//! gating sequence in a fixed order: classify, tool policy, plan,
//! admission, dry-run short-circuit, checkout pre-flight, then
//! transaction-scoped execution. The first refusal terminates the sequence
//! and still yields an audit record of what was attempted.

use crate::bridge::handlers::{CommandHandler, HandlerRegistry, HandlerResult};
use crate::bridge::protocol::{
    CODE_COMMAND_FAILED, CODE_EXCEPTION, CommandRequest, CommandResponse, unknown_command_error,
};
use crate::core::audit::{AuditLog, TRANSACTION_LABEL, build_audit_json};
use crate::core::classify::{is_mutation_command, resolve_path_for_command};
use crate::core::editor::{EditorContext, Transactor};
use crate::core::gate::{
    Denial, ErrorPayload, WriteGate, path_not_allowed_error, tool_denied_error,
    write_not_allowed_error,
};
use crate::core::plan::{MutationPlan, build_plan};
use crate::core::policy::PolicyStore;
use serde_json::{Value, json};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// Closes the engine transaction on every exit path, including unwinding.
struct TransactionScope<'a> {
    transactor: &'a dyn Transactor,
}

impl<'a> TransactionScope<'a> {
    fn open(transactor: &'a dyn Transactor, label: &str) -> Self {
        transactor.begin(label);
        Self { transactor }
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        self.transactor.end();
    }
}

pub struct Dispatcher {
    policy: Arc<PolicyStore>,
    gate: WriteGate,
    editor: Arc<dyn EditorContext>,
    transactor: Arc<dyn Transactor>,
    handlers: HandlerRegistry,
    audit_log: Option<AuditLog>,
}

impl Dispatcher {
    pub fn new(
        policy: Arc<PolicyStore>,
        gate: WriteGate,
        editor: Arc<dyn EditorContext>,
        transactor: Arc<dyn Transactor>,
    ) -> Self {
        Self {
            policy,
            gate,
            editor,
            transactor,
            handlers: HandlerRegistry::new(),
            audit_log: None,
        }
    }

    pub fn with_audit_log(mut self, log: AuditLog) -> Self {
        self.audit_log = Some(log);
        self
    }

    pub fn register(&mut self, command: &str, handler: Box<dyn CommandHandler>) {
        self.handlers.register(command, handler);
    }

    pub fn register_fn<F>(&mut self, command: &str, f: F)
    where
        F: Fn(&Value) -> HandlerResult + Send + Sync + 'static,
    {
        self.handlers.register_fn(command, f);
    }

    /// Register the built-in query probes. Call after all real handlers so
    /// `bridge.capabilities` reports the full command surface.
    pub fn install_probes(&mut self) {
        self.handlers
            .register_fn("bridge.ping", |_params| HandlerResult::Ok(json!({ "pong": true })));
        let mut commands = self.handlers.commands();
        commands.push("bridge.capabilities".to_string());
        commands.sort();
        let payload = json!({
            "bridge": "scenegate",
            "version": env!("CARGO_PKG_VERSION"),
            "commands": commands,
        });
        self.handlers
            .register_fn("bridge.capabilities", move |_params| {
                HandlerResult::Ok(payload.clone())
            });
    }

    pub fn policy(&self) -> &PolicyStore {
        &self.policy
    }

    pub fn execute(&self, request: &CommandRequest) -> CommandResponse {
        let command = request.command.trim();
        let params = &request.params;
        let is_mutation = is_mutation_command(command, params);
        let target_path = if is_mutation {
            resolve_path_for_command(command, params, self.editor.as_ref())
        } else {
            String::new()
        };

        // Tool policy applies to every command. A denied mutation still
        // reports what was attempted, as a dry-run-forced audit.
        if let Err(reason) = self.policy.is_tool_allowed(command) {
            let response =
                CommandResponse::failure(&request.id, tool_denied_error(command, &reason));
            if is_mutation {
                let mut plan = build_plan(&self.policy, command, params);
                plan.dry_run = true;
                let audit = build_audit_json(&plan, false);
                self.log_audit(command, params, "denied", &audit);
                return response.with_audit(audit);
            }
            return response;
        }

        if !is_mutation {
            return match self.handlers.get(command) {
                Some(handler) => self.run_handler(request, handler, false, None),
                None => CommandResponse::failure(&request.id, unknown_command_error(command)),
            };
        }

        let mut plan = build_plan(&self.policy, command, params);

        if let Err(denial) = self.gate.can_mutate(command, &target_path) {
            plan.dry_run = true;
            let audit = build_audit_json(&plan, false);
            self.log_audit(command, params, "denied", &audit);
            let error = match &denial {
                Denial::Tool { reason } => tool_denied_error(command, reason),
                Denial::Write { reason } => write_not_allowed_error(command, reason),
                Denial::Path { reason } => path_not_allowed_error(&target_path, reason),
            };
            return CommandResponse::failure(&request.id, error).with_audit(audit);
        }

        // Admitted + dry-run: report the full plan without executing.
        if self.policy.should_dry_run() {
            let audit = build_audit_json(&plan, false);
            self.log_audit(command, params, "planned", &audit);
            return CommandResponse::success(&request.id, json!({ "planned": true }))
                .with_audit(audit);
        }

        let Some(handler) = self.handlers.get(command) else {
            plan.dry_run = true;
            let audit = build_audit_json(&plan, false);
            self.log_audit(command, params, "unknown", &audit);
            return CommandResponse::failure(&request.id, unknown_command_error(command))
                .with_audit(audit);
        };

        // Source-control commands talk to the provider themselves; the
        // pre-flight would recurse into it.
        if !command.starts_with("sc.") {
            if let Err(error) = self.gate.ensure_checkout_for_content_path(&target_path) {
                let audit = build_audit_json(&plan, false);
                self.log_audit(command, params, "checkout_denied", &audit);
                return CommandResponse::failure(&request.id, error).with_audit(audit);
            }
        }

        plan.dry_run = false;
        self.run_handler(request, handler, true, Some(plan))
    }

    fn run_handler(
        &self,
        request: &CommandRequest,
        handler: &dyn CommandHandler,
        is_mutation: bool,
        plan: Option<MutationPlan>,
    ) -> CommandResponse {
        let transactor = self.transactor.as_ref();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let _scope =
                is_mutation.then(|| TransactionScope::open(transactor, TRANSACTION_LABEL));
            handler.handle(&request.params)
        }));

        let command = request.command.trim();
        match outcome {
            Ok(HandlerResult::Ok(result)) => {
                let mut response = CommandResponse::success(&request.id, result);
                if let Some(plan) = &plan {
                    let audit = build_audit_json(plan, true);
                    self.log_audit(command, &request.params, "executed", &audit);
                    response = response.with_audit(audit);
                }
                response
            }
            Ok(HandlerResult::Failed { code, message }) => {
                let error = ErrorPayload::new(
                    code.as_deref().unwrap_or(CODE_COMMAND_FAILED),
                    message.unwrap_or_else(|| "Command failed".to_string()),
                );
                let mut response = CommandResponse::failure(&request.id, error);
                if let Some(plan) = &plan {
                    let audit = build_audit_json(plan, false);
                    self.log_audit(command, &request.params, "failed", &audit);
                    response = response.with_audit(audit);
                }
                response
            }
            Err(panic) => {
                let error = ErrorPayload::new(
                    CODE_EXCEPTION,
                    format!("Handler panicked: {}", panic_message(panic.as_ref())),
                );
                let mut response = CommandResponse::failure(&request.id, error);
                if let Some(plan) = &plan {
                    let audit = build_audit_json(plan, false);
                    self.log_audit(command, &request.params, "error", &audit);
                    response = response.with_audit(audit);
                }
                response
            }
        }
    }

    fn log_audit(&self, command: &str, params: &Value, outcome: &str, audit: &Value) {
        if let Some(log) = &self.audit_log {
            // The response must go out even if the log is unwritable.
            let _ = log.record(command, params, outcome, audit);
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
