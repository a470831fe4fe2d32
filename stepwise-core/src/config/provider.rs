//! # Provider Configuration
//!
//! Completion-service endpoints. Every provider speaks the OpenAI-compatible
//! chat-completions protocol; `type` is kept for documentation and defaults.
//!
//! ```toml
//! [[providers]]
//! id = "moonshot"
//! type = "openai"
//! endpoint = "https://api.moonshot.cn"
//! api_key = "KIMI_API_KEY"
//! models = ["kimi-k2-0905-preview"]
//! ```

use serde::{Deserialize, Serialize};

/// Information about an available model from a provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelInfo {
    /// Model identifier used in API calls
    pub name: String,
    /// Human-readable display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Configuration for a completion-service provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelProviderConfig {
    /// Unique identifier for this provider
    pub id: String,
    #[serde(rename = "type")]
    pub provider_type: String,
    /// API endpoint URL
    pub endpoint: String,
    /// Name of the environment variable holding the API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Custom API path override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_path: Option<String>,
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct RawProviderConfig {
    pub(super) id: String,
    #[serde(rename = "type", default)]
    pub(super) provider_type: String,
    pub(super) endpoint: Option<String>,
    pub(super) api_key: Option<String>,
    #[serde(default)]
    pub(super) api_path: Option<String>,
    #[serde(default)]
    pub(super) models: Vec<RawModelInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(super) enum RawModelInfo {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        display_name: Option<String>,
    },
}

impl From<RawModelInfo> for ModelInfo {
    fn from(value: RawModelInfo) -> Self {
        match value {
            RawModelInfo::Name(name) => Self {
                name,
                display_name: None,
            },
            RawModelInfo::Detailed { name, display_name } => Self { name, display_name },
        }
    }
}

impl From<RawProviderConfig> for ModelProviderConfig {
    fn from(raw: RawProviderConfig) -> Self {
        let provider_type = if raw.provider_type.trim().is_empty() {
            "openai".to_string()
        } else {
            raw.provider_type
        };

        Self {
            id: raw.id,
            provider_type,
            endpoint: raw.endpoint.unwrap_or_default(),
            api_key: raw.api_key,
            api_path: raw.api_path,
            models: raw.models.into_iter().map(ModelInfo::from).collect(),
        }
    }
}

impl ModelProviderConfig {
    /// Ensure a model exists in this provider's model list
    pub fn ensure_model(&mut self, model: &str) {
        if self.models.iter().all(|info| info.name != model) {
            self.models.push(ModelInfo {
                name: model.to_string(),
                display_name: None,
            });
        }
    }

    /// Provider types served by the chat-completions client as-is.
    ///
    /// ```
    /// use stepwise_core::config::ModelProviderConfig;
    ///
    /// let provider = ModelProviderConfig {
    ///     id: "moonshot".to_string(),
    ///     provider_type: "OpenAI".to_string(),
    ///     endpoint: "https://api.moonshot.cn".to_string(),
    ///     api_key: Some("KIMI_API_KEY".to_string()),
    ///     api_path: None,
    ///     models: vec![],
    /// };
    /// assert!(provider.is_openai_compatible());
    /// ```
    pub fn is_openai_compatible(&self) -> bool {
        matches!(
            self.provider_type.to_lowercase().as_str(),
            "openai" | "moonshot" | "kimi" | "deepseek" | "groq" | "mistral" | "openrouter"
        )
    }
}
