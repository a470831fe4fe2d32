use super::runtime::ProtocolError;
use crate::application::tooling::RegistryError;
use crate::infrastructure::invoker::InvokeError;
use stepwise_log::RunLogError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("task prompt is empty")]
    EmptyPrompt,
    #[error("max_steps must be between 1 and {ceiling}, got {value}")]
    InvalidMaxSteps { value: usize, ceiling: usize },
    #[error("unknown persona '{persona}'")]
    UnknownPersona {
        persona: String,
        available: Vec<String>,
    },
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Invoke(#[from] InvokeError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Log(#[from] RunLogError),
}

impl AgentError {
    pub fn user_message(&self) -> String {
        match self {
            AgentError::EmptyPrompt => "Instruction cannot be empty.".to_string(),
            AgentError::InvalidMaxSteps { ceiling, .. } => {
                format!("max_steps must be between 1 and {ceiling}")
            }
            AgentError::UnknownPersona { persona, available } => format!(
                "Agent '{persona}' not found. Available: {}",
                available.join(", ")
            ),
            AgentError::Protocol(err) => err.user_message(),
            AgentError::Invoke(err) => err.user_message(),
            AgentError::Registry(err) => err.user_message(),
            AgentError::Log(err) => format!("Could not write the run log: {err}"),
        }
    }
}
