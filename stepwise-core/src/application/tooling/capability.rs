use crate::types::Arguments;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// Why a capability refused its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    MissingArgument,
    InvalidArgument,
    NotFound,
    NotAFile,
    NotADirectory,
    Forbidden,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    Accept { advisory: Option<String> },
    Reject { kind: RejectionKind, reason: String },
}

impl Validation {
    pub fn accept() -> Self {
        Validation::Accept { advisory: None }
    }

    pub fn advise(message: impl Into<String>) -> Self {
        Validation::Accept {
            advisory: Some(message.into()),
        }
    }

    pub fn reject(kind: RejectionKind, reason: impl Into<String>) -> Self {
        Validation::Reject {
            kind,
            reason: reason.into(),
        }
    }

    pub fn missing(argument: &str) -> Self {
        Self::reject(
            RejectionKind::MissingArgument,
            format!("Missing required parameter: '{argument}'"),
        )
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Validation::Accept { .. })
    }
}

/// Callable action exposed to the model.
///
/// `validate` is pure and runs before every execution. `execute` never fails:
/// faults are reported in the returned text, which should stay bounded.
#[async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &str;

    fn describe(&self) -> String;

    fn is_read_only(&self) -> bool;

    fn validate(&self, args: &Arguments) -> Validation;

    async fn execute(&self, args: &Arguments) -> String;

    /// Execution bound for these arguments. `None` uses the dispatcher default.
    fn timeout(&self, _args: &Arguments) -> Option<Duration> {
        None
    }
}

/// Registry-independent view of a capability, used for manifests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub description: String,
    pub read_only: bool,
}

impl CapabilityDescriptor {
    pub fn of(capability: &dyn Capability) -> Self {
        Self {
            name: capability.name().to_string(),
            description: capability.describe(),
            read_only: capability.is_read_only(),
        }
    }
}
