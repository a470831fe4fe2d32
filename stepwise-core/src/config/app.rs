use super::defaults::*;
use super::error::ConfigError;
use super::persona::Persona;
use super::provider::ModelProviderConfig;
use crate::infrastructure::invoker::RetryPolicy;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Request-rate and retry settings (`[limits]`).
#[derive(Debug, Clone, PartialEq)]
pub struct LimitsConfig {
    pub requests_per_minute: usize,
    pub max_attempts: u32,
    pub initial_retry_delay_secs: f64,
    pub max_retry_delay_secs: f64,
    pub attempt_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_retry_delay_secs: DEFAULT_INITIAL_RETRY_DELAY_SECS,
            max_retry_delay_secs: DEFAULT_MAX_RETRY_DELAY_SECS,
            attempt_timeout_secs: DEFAULT_ATTEMPT_TIMEOUT_SECS,
        }
    }
}

impl LimitsConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_secs_f64(self.initial_retry_delay_secs),
            max_delay: Duration::from_secs_f64(self.max_retry_delay_secs),
            attempt_timeout: Duration::from_secs(self.attempt_timeout_secs),
        }
    }
}

/// Step-loop settings (`[agent]`).
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub max_steps: usize,
    pub temperature: f32,
    pub min_answer_chars: usize,
    pub log_dir: PathBuf,
    pub default_persona: String,
    pub capability_timeout_secs: u64,
    pub workdir: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            temperature: DEFAULT_TEMPERATURE,
            min_answer_chars: DEFAULT_MIN_ANSWER_CHARS,
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            default_persona: DEFAULT_PERSONA.to_string(),
            capability_timeout_secs: DEFAULT_CAPABILITY_TIMEOUT_SECS,
            workdir: None,
        }
    }
}

/// Application configuration loaded from stepwise.toml
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub default_provider: String,
    pub model: String,
    pub providers: Vec<ModelProviderConfig>,
    pub limits: LimitsConfig,
    pub agent: AgentConfig,
    pub personas: Vec<Persona>,
}

impl AppConfig {
    /// Load configuration from a file path (or default path if None)
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        super::loader::load_config(path)
    }

    pub fn persona(&self, name: &str) -> Option<&Persona> {
        self.personas.iter().find(|persona| persona.name == name)
    }

    pub fn persona_names(&self) -> Vec<&str> {
        self.personas.iter().map(|persona| persona.name.as_str()).collect()
    }

    pub fn provider(&self, id: &str) -> Option<&ModelProviderConfig> {
        self.providers.iter().find(|provider| provider.id == id)
    }

    /// Make `model` routable through the default provider.
    pub fn allow_model(&mut self, model: &str) {
        let default_provider = self.default_provider.clone();
        if let Some(provider) = self
            .providers
            .iter_mut()
            .find(|provider| provider.id == default_provider)
        {
            provider.ensure_model(model);
        }
    }
}
