//! Chat-completions client for OpenAI-compatible services.
//!
//! The agent exchanges a single text payload per round: the whole normalized
//! transcript goes out, the first choice's text comes back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::base::HttpClientBase;
use crate::config::ModelProviderConfig;
use crate::constants::DEFAULT_OPENAI_API_PATH;
use crate::infrastructure::model::adapter::MessageAdapter;
use crate::infrastructure::model::factory::resolve_api_key;
use crate::infrastructure::model::traits::ModelClient;
use crate::infrastructure::model::types::{ModelError, ModelRequest, ModelResponse};

/// Client for any `/v1/chat/completions` endpoint (Moonshot, OpenAI, Groq, ...).
#[derive(Clone)]
pub struct OpenAIClient {
    base: HttpClientBase,
    api_path: String,
}

impl OpenAIClient {
    pub fn from_config(config: &ModelProviderConfig) -> Self {
        let api_key = resolve_api_key(&config.id, config.api_key.as_deref());
        Self {
            base: HttpClientBase::new(config.id.clone(), config.endpoint.clone(), api_key),
            api_path: config
                .api_path
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_API_PATH.to_string()),
        }
    }
}

#[async_trait]
impl ModelClient for OpenAIClient {
    fn id(&self) -> &str {
        &self.base.id
    }

    async fn chat(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let url = self.base.build_url(&self.api_path);
        let payload = CompletionPayload {
            model: &request.model,
            messages: MessageAdapter::to_openai_format(&request.messages),
            temperature: request.temperature,
            stream: false,
        };

        info!(
            provider = self.base.id.as_str(),
            model = request.model.as_str(),
            messages = request.messages.len(),
            "Submitting chat completion"
        );
        let reply: CompletionReply = self
            .base
            .post_with_bearer(&url, &payload, request.timeout)
            .await?;

        let text = first_choice_text(reply).ok_or_else(|| {
            ModelError::invalid_response(&self.base.id, "completion carried no choices")
        })?;
        debug!(chars = text.len(), "Chat completion received");
        Ok(ModelResponse::new(text))
    }
}

/// Text of the first choice. A choice whose content is null (a refusal or a
/// bare tool-call turn) counts as an empty reply.
fn first_choice_text(reply: CompletionReply) -> Option<String> {
    reply
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.and_then(|message| message.content).unwrap_or_default())
}

#[derive(Serialize)]
struct CompletionPayload<'a> {
    model: &'a str,
    messages: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionReply {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reply(value: serde_json::Value) -> CompletionReply {
        serde_json::from_value(value).expect("reply shape")
    }

    #[test]
    fn takes_the_first_choice() {
        let text = first_choice_text(reply(json!({
            "choices": [
                {"message": {"role": "assistant", "content": "first"}},
                {"message": {"role": "assistant", "content": "second"}}
            ]
        })));
        assert_eq!(text.as_deref(), Some("first"));
    }

    #[test]
    fn null_content_is_an_empty_reply_and_no_choices_is_none() {
        let text = first_choice_text(reply(json!({"choices": [{"message": {"content": null}}]})));
        assert_eq!(text.as_deref(), Some(""));
        assert_eq!(first_choice_text(reply(json!({"choices": []}))), None);
    }

    #[test]
    fn payload_omits_unset_temperature() {
        let payload = CompletionPayload {
            model: "kimi-k2-0905-preview",
            messages: Vec::new(),
            temperature: None,
            stream: false,
        };
        let value = serde_json::to_value(&payload).expect("serialize");
        assert_eq!(
            value,
            json!({"model": "kimi-k2-0905-preview", "messages": [], "stream": false})
        );
    }
}
