use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("capability '{name}' is already registered")]
    Duplicate { name: String },
    #[error("capability '{name}' not found")]
    NotFound { name: String },
}

impl RegistryError {
    pub fn user_message(&self) -> String {
        match self {
            RegistryError::Duplicate { name } => {
                format!("Tool \"{name}\" is registered more than once.")
            }
            RegistryError::NotFound { name } => format!("Error: Tool '{name}' not found"),
        }
    }
}

/// Faults raised while a capability runs. They are rendered into the
/// capability's result text and never end a run.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to spawn command: {0}")]
    Spawn(#[source] io::Error),
    #[error("invalid pattern: {0}")]
    Pattern(String),
    #[error("invalid todo store: {0}")]
    Store(#[from] serde_json::Error),
    #[error("{0}")]
    Rejected(String),
}
