pub mod app;
pub mod defaults;
pub mod error;
pub mod loader;
pub mod persona;
pub mod provider;

pub use crate::constants::CONFIG_PATH;
pub use app::{AgentConfig, AppConfig, LimitsConfig};
pub use error::ConfigError;
pub use loader::ensure_env_loaded;
pub use persona::{Persona, ToolFilter, builtin_personas};
pub use provider::{ModelInfo, ModelProviderConfig};
