//! Provider factory - creates clients from config

use super::clients::OpenAIClient;
use super::traits::ModelClient;
use crate::config::ModelProviderConfig;
use std::env;
use tracing::warn;

/// Resolve an API key from the environment variable named in config.
///
/// Both `VAR_NAME` and `${VAR_NAME}` are accepted.
pub fn resolve_api_key(provider: &str, spec: Option<&str>) -> Option<String> {
    let raw = spec.map(str::trim)?;
    let name = raw
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
        .unwrap_or(raw)
        .trim();
    if name.is_empty() {
        return None;
    }
    match env::var(name) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(
                provider,
                env_var = name,
                %err,
                "API key environment variable is not set"
            );
            None
        }
    }
}

/// Factory for creating model clients from provider config.
pub struct ProviderFactory;

impl ProviderFactory {
    /// Creates a model client based on provider type.
    ///
    /// Every provider type is served by the OpenAI-compatible
    /// chat-completions client; the type only selects defaults.
    pub fn create(config: &ModelProviderConfig) -> Box<dyn ModelClient> {
        if !config.is_openai_compatible() {
            warn!(
                provider = config.id.as_str(),
                provider_type = config.provider_type.as_str(),
                "Unrecognised provider type, using OpenAI-compatible client"
            );
        }
        Box::new(OpenAIClient::from_config(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_blank_key_spec_resolves_to_none() {
        assert_eq!(resolve_api_key("p", None), None);
        assert_eq!(resolve_api_key("p", Some("  ")), None);
        assert_eq!(resolve_api_key("p", Some("${}")), None);
    }

    #[test]
    fn resolves_from_path_variable() {
        // PATH is always present in the test environment.
        assert!(resolve_api_key("p", Some("PATH")).is_some());
        assert!(resolve_api_key("p", Some("${PATH}")).is_some());
    }
}
