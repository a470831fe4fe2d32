use super::app::{AgentConfig, AppConfig, LimitsConfig};
use super::defaults::MAX_STEPS_CEILING;
use super::error::ConfigError;
use super::persona::{RawPersona, merge_personas};
use super::provider::{ModelProviderConfig, RawProviderConfig};
use crate::constants::{CONFIG_PATH, ENV_PATH};
use dotenvy::from_filename;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tracing::debug;

static ENV_LOADER: Once = Once::new();

/// Raw configuration structure for deserialization from TOML
#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    model: Option<String>,
    default_provider: Option<String>,
    #[serde(default)]
    providers: Vec<RawProviderConfig>,
    #[serde(default)]
    limits: RawLimits,
    #[serde(default)]
    agent: RawAgent,
    #[serde(default)]
    personas: Vec<RawPersona>,
}

#[derive(Debug, Deserialize, Default)]
struct RawLimits {
    requests_per_minute: Option<usize>,
    max_attempts: Option<u32>,
    initial_retry_delay_secs: Option<f64>,
    max_retry_delay_secs: Option<f64>,
    attempt_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct RawAgent {
    max_steps: Option<usize>,
    temperature: Option<f32>,
    min_answer_chars: Option<usize>,
    log_dir: Option<String>,
    default_persona: Option<String>,
    capability_timeout_secs: Option<u64>,
    workdir: Option<String>,
}

/// Ensures environment variables are loaded from config/.env
pub fn ensure_env_loaded() {
    ENV_LOADER.call_once(|| {
        let _ = from_filename(ENV_PATH);
    });
}

/// Load and validate configuration from a file path
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    ensure_env_loaded();
    let config_path = path.unwrap_or_else(|| Path::new(CONFIG_PATH));
    read_config(config_path)
}

fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    debug!(path = %path.display(), "Reading configuration file");

    let content = fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    let parsed: RawConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    validate_and_build(parsed)
}

fn validate_and_build(parsed: RawConfig) -> Result<AppConfig, ConfigError> {
    let model = parsed.model.ok_or(ConfigError::MissingModel)?;
    let default_provider = parsed
        .default_provider
        .ok_or(ConfigError::MissingDefaultProvider)?;

    if parsed.providers.is_empty() {
        return Err(ConfigError::NoProvidersConfigured);
    }

    let mut providers: Vec<ModelProviderConfig> = Vec::new();
    for raw_provider in parsed.providers {
        if raw_provider.endpoint.is_none() {
            return Err(ConfigError::MissingEndpoint {
                provider: raw_provider.id.clone(),
            });
        }
        providers.push(ModelProviderConfig::from(raw_provider));
    }
    if !providers.iter().any(|p| p.id == default_provider) {
        return Err(ConfigError::ProviderNotFound {
            provider: default_provider,
        });
    }

    let limits = build_limits(parsed.limits)?;
    let agent = build_agent(parsed.agent)?;
    let personas = merge_personas(parsed.personas)?;
    if !personas.iter().any(|p| p.name == agent.default_persona) {
        return Err(ConfigError::UnknownPersona {
            persona: agent.default_persona,
        });
    }

    // Persona models route through the default provider as well.
    if let Some(provider) = providers.iter_mut().find(|p| p.id == default_provider) {
        provider.ensure_model(&model);
        for persona_model in personas.iter().filter_map(|p| p.model.as_deref()) {
            provider.ensure_model(persona_model);
        }
    }

    Ok(AppConfig {
        default_provider,
        model,
        providers,
        limits,
        agent,
        personas,
    })
}

fn build_limits(raw: RawLimits) -> Result<LimitsConfig, ConfigError> {
    let defaults = LimitsConfig::default();
    let limits = LimitsConfig {
        requests_per_minute: raw
            .requests_per_minute
            .unwrap_or(defaults.requests_per_minute),
        max_attempts: raw.max_attempts.unwrap_or(defaults.max_attempts),
        initial_retry_delay_secs: raw
            .initial_retry_delay_secs
            .unwrap_or(defaults.initial_retry_delay_secs),
        max_retry_delay_secs: raw
            .max_retry_delay_secs
            .unwrap_or(defaults.max_retry_delay_secs),
        attempt_timeout_secs: raw
            .attempt_timeout_secs
            .unwrap_or(defaults.attempt_timeout_secs),
    };

    if limits.requests_per_minute == 0 {
        return Err(invalid("limits.requests_per_minute", "must be at least 1"));
    }
    if limits.max_attempts == 0 {
        return Err(invalid("limits.max_attempts", "must be at least 1"));
    }
    for (field, value) in [
        ("limits.initial_retry_delay_secs", limits.initial_retry_delay_secs),
        ("limits.max_retry_delay_secs", limits.max_retry_delay_secs),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(invalid(field, "must be a non-negative number of seconds"));
        }
    }
    if limits.attempt_timeout_secs == 0 {
        return Err(invalid("limits.attempt_timeout_secs", "must be at least 1"));
    }

    Ok(limits)
}

fn build_agent(raw: RawAgent) -> Result<AgentConfig, ConfigError> {
    let defaults = AgentConfig::default();
    let log_dir = match raw.log_dir {
        Some(dir) => expand_path("agent.log_dir", &dir)?,
        None => defaults.log_dir,
    };
    let workdir = raw
        .workdir
        .map(|dir| expand_path("agent.workdir", &dir))
        .transpose()?;

    let agent = AgentConfig {
        max_steps: raw.max_steps.unwrap_or(defaults.max_steps),
        temperature: raw.temperature.unwrap_or(defaults.temperature),
        min_answer_chars: raw.min_answer_chars.unwrap_or(defaults.min_answer_chars),
        log_dir,
        default_persona: raw.default_persona.unwrap_or(defaults.default_persona),
        capability_timeout_secs: raw
            .capability_timeout_secs
            .unwrap_or(defaults.capability_timeout_secs),
        workdir,
    };

    if !(1..=MAX_STEPS_CEILING).contains(&agent.max_steps) {
        return Err(invalid(
            "agent.max_steps",
            format!("must be between 1 and {MAX_STEPS_CEILING}"),
        ));
    }
    if !(0.0..=2.0).contains(&agent.temperature) {
        return Err(invalid("agent.temperature", "must be between 0.0 and 2.0"));
    }
    if agent.capability_timeout_secs == 0 {
        return Err(invalid("agent.capability_timeout_secs", "must be at least 1"));
    }

    Ok(agent)
}

fn expand_path(field: &'static str, raw: &str) -> Result<PathBuf, ConfigError> {
    shellexpand::full(raw)
        .map(|expanded| PathBuf::from(expanded.as_ref()))
        .map_err(|err| ConfigError::InvalidPath {
            field,
            reason: err.to_string(),
        })
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidLimit {
        field,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<AppConfig, ConfigError> {
        let raw: RawConfig = toml::from_str(content).expect("valid toml");
        validate_and_build(raw)
    }

    const MINIMAL: &str = r#"
        default_provider = "moonshot"
        model = "kimi-k2-0905-preview"

        [[providers]]
        id = "moonshot"
        endpoint = "https://api.moonshot.cn"
        api_key = "KIMI_API_KEY"
    "#;

    #[test]
    fn applies_defaults_for_absent_tables() {
        let config = parse(MINIMAL).expect("valid config");
        assert_eq!(config.limits, LimitsConfig::default());
        assert_eq!(config.agent, AgentConfig::default());
        assert_eq!(config.providers[0].provider_type, "openai");
        assert_eq!(config.providers[0].models[0].name, "kimi-k2-0905-preview");
        assert_eq!(config.persona_names().len(), 4);
    }

    #[test]
    fn rejects_out_of_range_step_budget() {
        let content = format!("{MINIMAL}\n[agent]\nmax_steps = 21\n");
        assert!(matches!(
            parse(&content),
            Err(ConfigError::InvalidLimit {
                field: "agent.max_steps",
                ..
            })
        ));
    }

    #[test]
    fn rejects_zero_rate_limit() {
        let content = format!("{MINIMAL}\n[limits]\nrequests_per_minute = 0\n");
        assert!(matches!(
            parse(&content),
            Err(ConfigError::InvalidLimit {
                field: "limits.requests_per_minute",
                ..
            })
        ));
    }

    #[test]
    fn rejects_unknown_default_persona() {
        let content = format!("{MINIMAL}\n[agent]\ndefault_persona = \"ghost\"\n");
        assert!(matches!(
            parse(&content),
            Err(ConfigError::UnknownPersona { .. })
        ));
    }

    #[test]
    fn expands_home_in_log_dir() {
        let content = format!("{MINIMAL}\n[agent]\nlog_dir = \"~/stepwise-logs\"\n");
        let config = parse(&content).expect("valid config");
        assert!(!config.agent.log_dir.starts_with("~"));
        assert!(config.agent.log_dir.ends_with("stepwise-logs"));
    }
}
