//! Scenegate: a write-mediated command bridge for live editor sessions.
//!
//! External clients drive a running editor over a TCP socket with
//! structured JSON commands (spawn actors, edit assets, rig sequences).
//! Every command flows through one switchboard, and every *mutation* is
//! intercepted by the write gate before it can touch engine state.
//!
//! # The corridor
//!
//! 1. **Classify**: is this command a mutation, and which content path
//!    would it touch?
//! 2. **Gate**: tool policy, write policy (local AND remote), path
//!    allowlist (local ∩ remote). First refusal wins.
//! 3. **Plan**: the ordered list of atomic actions the command intends.
//! 4. **Dry-run**: either side of the policy can force simulation; the
//!    plan is reported instead of executed.
//! 5. **Checkout pre-flight**: version-controlled assets are checked out
//!    before any write, when policy requires it.
//! 6. **Execute**: transaction-scoped, panic-isolated handler dispatch.
//! 7. **Audit**: one uniformly shaped record per mutation, attached to the
//!    response and appended to the event log.
//!
//! Everything resolves closed: missing configuration denies writes and
//! forces dry-run, empty allowlists allow nothing, and a failed checkout
//! blocks the mutation.
//!
//! # Crate structure
//!
//! - [`core`]: classification, policy store, planner, write gate, audit
//! - [`bridge`]: wire protocol, handler registry, dispatcher, transport

pub mod bridge;
pub mod core;

use crate::bridge::dispatch::Dispatcher;
use crate::bridge::server::BridgeServer;
use crate::core::audit::{AuditLog, build_audit_json};
use crate::core::classify::{is_mutation_command, resolve_path_for_command};
use crate::core::editor::{HeadlessEditor, NullSourceControl, NullTransactor};
use crate::core::error::BridgeError;
use crate::core::gate::WriteGate;
use crate::core::plan::build_plan;
use crate::core::policy::{PolicyStore, RemoteEnforcement};
use crate::core::settings::{BridgeSettings, DEFAULT_CONFIG_FILE};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[clap(
    name = "scenegate",
    version = env!("CARGO_PKG_VERSION"),
    about = "Write-mediated command bridge for live editor sessions"
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the bridge server
    Serve(ServeCli),
    /// Evaluate admission policy for a command without executing anything
    Check(CheckCli),
    /// Print the mutation plan and audit preview for a command
    Plan(PlanCli),
    /// Show the audit event log
    Audit(AuditCli),
}

#[derive(clap::Args, Debug)]
struct ServeCli {
    /// Configuration file (locked-down defaults when absent).
    #[clap(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Override the configured listen address.
    #[clap(long)]
    listen: Option<String>,
}

#[derive(clap::Args, Debug)]
struct CheckCli {
    #[clap(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Command id to evaluate (e.g. `asset.delete`).
    #[clap(long)]
    command: String,
    /// Target content path; resolved from --params when omitted.
    #[clap(long)]
    path: Option<String>,
    /// Command parameters as a JSON object.
    #[clap(long)]
    params: Option<String>,
}

#[derive(clap::Args, Debug)]
struct PlanCli {
    #[clap(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[clap(long)]
    command: String,
    /// Command parameters as a JSON object.
    #[clap(long)]
    params: Option<String>,
}

#[derive(clap::Args, Debug)]
struct AuditCli {
    #[clap(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Most recent events to show.
    #[clap(long, default_value = "50")]
    limit: usize,
}

pub fn run() -> Result<(), BridgeError> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(serve_cli) => run_serve(serve_cli),
        Command::Check(check_cli) => run_check(check_cli),
        Command::Plan(plan_cli) => run_plan(plan_cli),
        Command::Audit(audit_cli) => run_audit(audit_cli),
    }
}

fn run_serve(cli: ServeCli) -> Result<(), BridgeError> {
    let settings = BridgeSettings::load_optional(&cli.config)?;
    if settings.is_none() {
        println!(
            "{} no configuration at {}: bridge is locked down (writes denied, dry-run forced)",
            "⚠".bright_yellow(),
            cli.config.display()
        );
    }
    let listen = cli
        .listen
        .clone()
        .or_else(|| settings.as_ref().map(|s| s.listen.clone()))
        .unwrap_or_else(|| crate::core::settings::DEFAULT_LISTEN.to_string());
    let audit_path = settings
        .as_ref()
        .map(|s| s.audit_log.clone())
        .unwrap_or_else(|| PathBuf::from(crate::core::settings::DEFAULT_AUDIT_LOG));

    let policy = Arc::new(PolicyStore::new(settings));
    let gate = WriteGate::new(policy.clone(), Arc::new(NullSourceControl));
    let mut dispatcher = Dispatcher::new(
        policy.clone(),
        gate,
        Arc::new(HeadlessEditor),
        Arc::new(NullTransactor),
    )
    .with_audit_log(AuditLog::new(audit_path.clone()));
    dispatcher.install_probes();

    println!();
    println!("  {}", "S C E N E G A T E".bright_cyan().bold());
    println!(
        "  {} listening on {}",
        "▸".bright_cyan(),
        listen.bright_white()
    );
    println!(
        "  {} write {} · dry-run {} · checkout {}",
        "▸".bright_cyan(),
        on_off(policy.is_write_allowed()),
        on_off(policy.should_dry_run()),
        on_off(policy.require_checkout()),
    );
    println!(
        "  {} audit log {}",
        "▸".bright_cyan(),
        audit_path.display().to_string().bright_black()
    );
    println!();

    BridgeServer::new(Arc::new(dispatcher), policy, &listen).serve()
}

fn run_check(cli: CheckCli) -> Result<(), BridgeError> {
    let params = parse_params(cli.params.as_deref())?;
    let policy = mirrored_policy(&cli.config)?;
    let gate = WriteGate::new(policy.clone(), Arc::new(NullSourceControl));

    let command = cli.command.trim();
    let is_mutation = is_mutation_command(command, &params);
    let path = match &cli.path {
        Some(path) => path.clone(),
        None => resolve_path_for_command(command, &params, &HeadlessEditor),
    };

    if !is_mutation {
        return match policy.is_tool_allowed(command) {
            Ok(()) => {
                println!(
                    "{} {} is not a mutation; tool policy admits it",
                    "ℹ".bright_blue(),
                    command.bright_white()
                );
                Ok(())
            }
            Err(reason) => {
                println!(
                    "{} {} denied: {}",
                    "✗".bright_red(),
                    command.bright_white().bold(),
                    reason
                );
                Err(BridgeError::ValidationError(reason))
            }
        };
    }
    match gate.can_mutate(command, &path) {
        Ok(()) => {
            println!(
                "{} {} admitted{}",
                "✓".bright_green(),
                command.bright_white().bold(),
                if path.is_empty() {
                    String::new()
                } else {
                    format!(" for {}", path)
                }
            );
            if policy.should_dry_run() {
                println!("  {} dry-run is active: execution would be simulated", "▸".bright_yellow());
            }
            Ok(())
        }
        Err(denial) => {
            println!(
                "{} {} denied: {}",
                "✗".bright_red(),
                command.bright_white().bold(),
                denial.reason()
            );
            Err(BridgeError::ValidationError(denial.reason().to_string()))
        }
    }
}

fn run_plan(cli: PlanCli) -> Result<(), BridgeError> {
    let params = parse_params(cli.params.as_deref())?;
    let policy = mirrored_policy(&cli.config)?;
    let command = cli.command.trim();

    if !is_mutation_command(command, &params) {
        println!(
            "{} {} is not a mutation; nothing to plan",
            "ℹ".bright_blue(),
            command.bright_white()
        );
        return Ok(());
    }
    let plan = build_plan(&policy, command, &params);
    let preview = build_audit_json(&plan, false);
    println!("{}", serde_json::to_string_pretty(&preview).unwrap());
    Ok(())
}

fn run_audit(cli: AuditCli) -> Result<(), BridgeError> {
    let settings = BridgeSettings::load_optional(&cli.config)?.unwrap_or_default();
    let log = AuditLog::new(settings.audit_log);
    let events = log.tail(cli.limit)?;
    if events.is_empty() {
        println!("No audit events recorded.");
        return Ok(());
    }
    for event in events {
        println!("{}", serde_json::to_string(&event).unwrap());
    }
    Ok(())
}

fn parse_params(raw: Option<&str>) -> Result<serde_json::Value, BridgeError> {
    match raw {
        None => Ok(serde_json::json!({})),
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| BridgeError::ValidationError(format!("invalid --params JSON: {}", e))),
    }
}

/// Policy store for offline evaluation: remote enforcement mirrors the
/// local settings, i.e. the answer assumes the companion process agrees.
/// Without a configuration file this is the locked-down startup state.
fn mirrored_policy(config: &PathBuf) -> Result<Arc<PolicyStore>, BridgeError> {
    let settings = BridgeSettings::load_optional(config)?;
    let policy = Arc::new(PolicyStore::new(settings.clone()));
    if let Some(settings) = settings {
        policy.update_remote_enforcement(RemoteEnforcement {
            allow_write: settings.allow_write,
            dry_run: settings.dry_run,
            allowed_paths: settings.allowed_content_roots.clone(),
            allowed_tools: settings.allowed_tools.clone(),
            denied_tools: settings.denied_tools.clone(),
        });
    }
    Ok(policy)
}

fn on_off(flag: bool) -> colored::ColoredString {
    if flag {
        "on".bright_green()
    } else {
        "off".bright_red()
    }
}
