//! Action registry and dispatch bridge.
//!
//! Named operations the agent surface can invoke. Registration is static at
//! startup; dispatch validates arguments against the declared parameter
//! schema before the handler runs, and every outcome (success or failure)
//! leaves as a wire envelope.

pub mod builtin;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use crate::auth::Identity;
use crate::protocol::Envelope;

pub const CODE_UNKNOWN_ACTION: &str = "UNKNOWN_ACTION";
pub const CODE_INVALID_ARGUMENTS: &str = "INVALID_ARGUMENTS";
pub const CODE_AUTH_REQUIRED: &str = "AUTH_REQUIRED";
pub const CODE_ACTION_FAILED: &str = "ACTION_FAILED";

/// Declared type of an action parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Number,
    Boolean,
}

impl ParamKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Number => value.is_number(),
            ParamKind::Boolean => value.is_boolean(),
        }
    }
}

/// One declared parameter of an action.
#[derive(Debug, Clone, Serialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamKind,
    pub required: bool,
    pub description: String,
}

impl Parameter {
    pub fn required(name: &str, kind: ParamKind, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: true,
            description: description.to_string(),
        }
    }

    pub fn optional(name: &str, kind: ParamKind, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: false,
            description: description.to_string(),
        }
    }
}

/// What a successful handler produced.
#[derive(Debug, Clone)]
pub enum ActionOutcome {
    /// Plain assistant text.
    Message(String),
    /// Structured event payload with a heading and summary line.
    Events {
        events: Vec<Value>,
        title: String,
        message: String,
    },
}

/// Domain failure from a handler. The message is user-facing.
#[derive(Debug, Error)]
pub enum ActionFailure {
    #[error("{0}")]
    Domain(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn run(
        &self,
        args: &Map<String, Value>,
        identity: Option<&Identity>,
    ) -> Result<ActionOutcome, ActionFailure>;
}

/// Registration-time errors.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("action already registered: {0}")]
    DuplicateAction(String),
}

struct ActionDef {
    description: String,
    parameters: Vec<Parameter>,
    requires_auth: bool,
    handler: Arc<dyn ActionHandler>,
}

/// Read-only listing entry for one registered action.
#[derive(Debug, Clone, Serialize)]
pub struct ActionDescription {
    pub name: String,
    pub description: String,
    pub parameters: Vec<Parameter>,
}

#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<String, ActionDef>,
    order: Vec<String>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: &str,
        description: &str,
        parameters: Vec<Parameter>,
        requires_auth: bool,
        handler: Arc<dyn ActionHandler>,
    ) -> Result<(), ActionError> {
        if self.actions.contains_key(name) {
            return Err(ActionError::DuplicateAction(name.to_string()));
        }
        self.actions.insert(
            name.to_string(),
            ActionDef {
                description: description.to_string(),
                parameters,
                requires_auth,
                handler,
            },
        );
        self.order.push(name.to_string());
        Ok(())
    }

    /// Listing in registration order, for the action-listing endpoint.
    pub fn describe(&self) -> Vec<ActionDescription> {
        self.order
            .iter()
            .filter_map(|name| {
                self.actions.get(name).map(|def| ActionDescription {
                    name: name.clone(),
                    description: def.description.clone(),
                    parameters: def.parameters.clone(),
                })
            })
            .collect()
    }

    /// Invoke an action by name.
    ///
    /// Never returns a transport error: unknown names, missing credentials
    /// and schema violations all come back as `error` envelopes, and
    /// validation failures never reach the handler.
    pub async fn dispatch(
        &self,
        name: &str,
        args: &Value,
        identity: Option<&Identity>,
    ) -> Envelope {
        let Some(def) = self.actions.get(name) else {
            return Envelope::error(format!("unknown action: {name}"), Some(CODE_UNKNOWN_ACTION));
        };

        if def.requires_auth && identity.is_none() {
            return Envelope::error(
                format!("action {name} requires authentication"),
                Some(CODE_AUTH_REQUIRED),
            );
        }

        let empty = Map::new();
        let args = match args {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => {
                return Envelope::error(
                    "action arguments must be an object",
                    Some(CODE_INVALID_ARGUMENTS),
                );
            }
        };

        let problems = validate_args(&def.parameters, args);
        if !problems.is_empty() {
            return Envelope::error(
                format!("invalid arguments for {name}: {}", problems.join(", ")),
                Some(CODE_INVALID_ARGUMENTS),
            );
        }

        match def.handler.run(args, identity).await {
            Ok(ActionOutcome::Message(text)) => Envelope::assistant_message(text),
            Ok(ActionOutcome::Events { events, title, message }) => {
                Envelope::events(events, title, message)
            }
            Err(ActionFailure::Domain(message)) => {
                Envelope::error(message, Some(CODE_ACTION_FAILED))
            }
            Err(ActionFailure::Internal(e)) => {
                warn!(action = name, error = %e, "action handler failed");
                Envelope::error(format!("action {name} failed"), Some(CODE_ACTION_FAILED))
            }
        }
    }
}

fn validate_args(parameters: &[Parameter], args: &Map<String, Value>) -> Vec<String> {
    let mut problems = Vec::new();
    for param in parameters {
        match args.get(&param.name) {
            None | Some(Value::Null) => {
                if param.required {
                    problems.push(format!("missing required parameter: {}", param.name));
                }
            }
            Some(value) => {
                if !param.kind.matches(value) {
                    problems.push(format!("parameter {} has the wrong type", param.name));
                }
            }
        }
    }
    problems
}
