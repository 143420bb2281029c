//! Command handler registry.
//!
//! Handlers are the mutations (and queries) themselves: thin wrappers
//! around editor subsystems, registered by the embedding process. The
//! bridge only routes to them; everything policy-shaped happens before a
//! handler runs.

use rustc_hash::FxHashMap;
use serde_json::Value;

/// What a handler reports back. A `Failed` without code/message surfaces
/// as the generic `COMMAND_FAILED`.
#[derive(Debug, Clone)]
pub enum HandlerResult {
    Ok(Value),
    Failed {
        code: Option<String>,
        message: Option<String>,
    },
}

impl HandlerResult {
    pub fn failed(code: &str, message: &str) -> Self {
        Self::Failed {
            code: Some(code.to_string()),
            message: Some(message.to_string()),
        }
    }
}

pub trait CommandHandler: Send + Sync {
    fn handle(&self, params: &Value) -> HandlerResult;
}

impl<F> CommandHandler for F
where
    F: Fn(&Value) -> HandlerResult + Send + Sync,
{
    fn handle(&self, params: &Value) -> HandlerResult {
        self(params)
    }
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: FxHashMap<String, Box<dyn CommandHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a command id. The latest registration wins.
    pub fn register(&mut self, command: &str, handler: Box<dyn CommandHandler>) {
        self.handlers.insert(command.to_string(), handler);
    }

    pub fn register_fn<F>(&mut self, command: &str, f: F)
    where
        F: Fn(&Value) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(command, Box::new(f));
    }

    pub fn get(&self, command: &str) -> Option<&dyn CommandHandler> {
        self.handlers.get(command).map(|h| h.as_ref())
    }

    pub fn commands(&self) -> Vec<String> {
        let mut commands: Vec<String> = self.handlers.keys().cloned().collect();
        commands.sort();
        commands
    }
}
