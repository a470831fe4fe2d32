use super::capability::{Capability, Validation};
use super::recovery::{DirectoryListingRecovery, RecoveryPolicy};
use super::registry::CapabilityRegistry;
use crate::application::agent::runtime::codec::CallRequest;
use crate::types::{Arguments, CallStatus};
use futures::FutureExt;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

pub const DEFAULT_CAPABILITY_TIMEOUT: Duration = Duration::from_secs(10);

/// Exactly one per call request.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub status: CallStatus,
    pub output: String,
    pub advisory: Option<String>,
    /// Name of the capability that ran in place of a rejected call.
    pub substitute: Option<String>,
}

impl DispatchOutcome {
    fn new(status: CallStatus, output: impl Into<String>) -> Self {
        Self {
            status,
            output: output.into(),
            advisory: None,
            substitute: None,
        }
    }
}

/// Validates, de-duplicates and executes call requests for one run.
pub struct Dispatcher {
    registry: CapabilityRegistry,
    recovery: Option<Box<dyn RecoveryPolicy>>,
    default_timeout: Duration,
    executed: HashSet<String>,
}

impl Dispatcher {
    pub fn new(registry: CapabilityRegistry) -> Self {
        Self {
            registry,
            recovery: Some(Box::new(DirectoryListingRecovery)),
            default_timeout: DEFAULT_CAPABILITY_TIMEOUT,
            executed: HashSet::new(),
        }
    }

    pub fn with_recovery(mut self, recovery: Option<Box<dyn RecoveryPolicy>>) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn with_default_timeout(mut self, default_timeout: Duration) -> Self {
        self.default_timeout = default_timeout;
        self
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Distinct calls executed so far.
    pub fn executed_count(&self) -> usize {
        self.executed.len()
    }

    pub async fn handle(&mut self, call: &CallRequest) -> DispatchOutcome {
        if let Some(notice) = self.redundant_notice(call) {
            return DispatchOutcome::new(CallStatus::Redundant, notice);
        }

        let validation = match self.registry.validate(&call.name, &call.arguments) {
            Ok(validation) => validation,
            Err(err) => {
                warn!(capability = call.name.as_str(), "Unknown capability requested");
                return DispatchOutcome::new(CallStatus::NotFound, err.user_message());
            }
        };

        match validation {
            Validation::Accept { advisory } => {
                let mut output = self.run(call).await;
                if let Some(advisory) = &advisory {
                    output = format!("Tool input warning: {advisory}\n{output}");
                }
                DispatchOutcome {
                    status: CallStatus::Executed,
                    output,
                    advisory,
                    substitute: None,
                }
            }
            Validation::Reject { kind, reason } => {
                info!(capability = call.name.as_str(), ?kind, %reason, "Call rejected");
                let substitute = self
                    .recovery
                    .as_ref()
                    .and_then(|policy| policy.recover(kind, call, &self.registry));

                let Some(substitute) = substitute else {
                    return DispatchOutcome::new(
                        CallStatus::Rejected,
                        format!("Tool input validation failed: {reason}"),
                    );
                };
                self.run_substitute(&reason, substitute).await
            }
        }
    }

    async fn run_substitute(&mut self, reason: &str, substitute: CallRequest) -> DispatchOutcome {
        let accepted = self
            .registry
            .validate(&substitute.name, &substitute.arguments)
            .map(|validation| validation.is_accepted())
            .unwrap_or(false);
        if !accepted {
            return DispatchOutcome::new(
                CallStatus::Rejected,
                format!("Tool input validation failed: {reason}"),
            );
        }
        if let Some(notice) = self.redundant_notice(&substitute) {
            return DispatchOutcome::new(CallStatus::Redundant, notice);
        }

        info!(substitute = substitute.name.as_str(), "Recovering rejected call");
        let output = self.run(&substitute).await;
        DispatchOutcome {
            status: CallStatus::Executed,
            output: format!(
                "{reason}\nSince this is a directory, {} was used instead.\n{output}",
                substitute.name
            ),
            advisory: None,
            substitute: Some(substitute.name),
        }
    }

    fn redundant_notice(&self, call: &CallRequest) -> Option<String> {
        if self.executed.contains(&canonical_key(call)) {
            debug!(capability = call.name.as_str(), "Skipping repeated call");
            Some(format!(
                "Skipping redundant tool call: {} with same parameters",
                call.name
            ))
        } else {
            None
        }
    }

    async fn run(&mut self, call: &CallRequest) -> String {
        self.executed.insert(canonical_key(call));
        match self.registry.get(&call.name) {
            Some(capability) => {
                self.dispatch(capability.as_ref(), &call.name, &call.arguments)
                    .await
            }
            None => format!("Error: Tool '{}' not found", call.name),
        }
    }

    /// Execute an accepted call under the capability's timeout. Never fails.
    pub async fn dispatch(&self, capability: &dyn Capability, name: &str, args: &Arguments) -> String {
        let limit = match std::panic::catch_unwind(AssertUnwindSafe(|| capability.timeout(args))) {
            Ok(limit) => limit.unwrap_or(self.default_timeout),
            Err(_) => {
                warn!(capability = name, "Capability panicked while computing its timeout");
                return format!("Error: {name} failed unexpectedly");
            }
        };
        info!(capability = name, timeout_secs = limit.as_secs(), "Executing capability");

        let execution = AssertUnwindSafe(capability.execute(args)).catch_unwind();
        match timeout(limit, execution).await {
            Ok(Ok(output)) => output,
            Ok(Err(_)) => {
                warn!(capability = name, "Capability panicked");
                format!("Error: {name} failed unexpectedly")
            }
            Err(_) => {
                warn!(capability = name, "Capability timed out");
                format!("Error: {name} timed out after {} seconds", limit.as_secs())
            }
        }
    }
}

/// `name:` followed by the arguments serialized with recursively sorted keys.
pub fn canonical_key(call: &CallRequest) -> String {
    let arguments = canonicalize(&Value::Object(call.arguments.clone()));
    format!("{}:{}", call.name, arguments)
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let sorted: Map<String, Value> = entries
                .into_iter()
                .map(|(key, value)| (key.clone(), canonicalize(value)))
                .collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
