//! Embedded function-call protocol.
//!
//! A model reply is decoded, in order of precedence, as
//! 1. a `<FunctionCallBegin>{"name":..,"parameters":{..}}<FunctionCallEnd>` call,
//! 2. a `<Name>..</Name>` tag call where `Name` is a known capability or ends
//!    in `Tool`,
//! 3. plain text.

use crate::constants::{CALL_BEGIN, CALL_END};
use crate::model::ModelRequest;
use crate::types::{Arguments, ChatMessage, MessageRole};
use regex::Regex;
use serde_json::{Value, json};
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    pub name: String,
    pub arguments: Arguments,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Call(CallRequest),
    Text(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("failed to parse tool call: {payload}: {reason}")]
    InvalidJson { payload: String, reason: String },
    #[error("tool call payload must be a JSON object: {payload}")]
    NotAnObject { payload: String },
    #[error("tool call is missing a string 'name': {payload}")]
    MissingName { payload: String },
    #[error("tool call '{name}' has non-object 'parameters'")]
    InvalidParameters { name: String },
}

impl ProtocolError {
    pub fn user_message(&self) -> String {
        format!("{self}. Please check the format.")
    }
}

/// Decode one model reply. `is_known` tells whether a tag name refers to a
/// capability of the active registry.
pub fn decode(reply: &str, is_known: impl Fn(&str) -> bool) -> Result<Decoded, ProtocolError> {
    if let Some(payload) = delimited_payload(reply) {
        return parse_call_payload(payload).map(Decoded::Call);
    }

    if let Some(call) = tagged_call(reply, is_known) {
        return Ok(Decoded::Call(call));
    }

    Ok(Decoded::Text(reply.to_string()))
}

/// Canonical delimited rendering of a call.
pub fn encode_call(name: &str, arguments: &Arguments) -> String {
    let payload = json!({ "name": name, "parameters": arguments });
    format!("{CALL_BEGIN}{payload}{CALL_END}")
}

/// Where and how a request is sent.
#[derive(Debug, Clone)]
pub struct RequestSettings {
    pub provider: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub timeout: Option<Duration>,
}

/// Build a service request from normalized messages, appending the rendered
/// capability manifest to the system entry.
pub fn encode_request(
    mut messages: Vec<ChatMessage>,
    manifest: &str,
    settings: &RequestSettings,
) -> ModelRequest {
    if !manifest.is_empty() {
        match messages
            .iter_mut()
            .find(|message| message.role == MessageRole::System)
        {
            Some(system) => {
                system.content.push_str("\n\n");
                system.content.push_str(manifest);
            }
            None => messages.insert(0, ChatMessage::new(MessageRole::System, manifest)),
        }
    }

    ModelRequest {
        provider: settings.provider.clone(),
        model: settings.model.clone(),
        messages,
        temperature: settings.temperature,
        timeout: settings.timeout,
    }
}

fn delimited_payload(reply: &str) -> Option<&str> {
    let start = reply.find(CALL_BEGIN)? + CALL_BEGIN.len();
    let end = reply[start..].find(CALL_END)? + start;
    Some(reply[start..end].trim())
}

fn parse_call_payload(payload: &str) -> Result<CallRequest, ProtocolError> {
    let value = extract_json(payload).map_err(|reason| ProtocolError::InvalidJson {
        payload: payload.to_string(),
        reason,
    })?;

    let Value::Object(mut map) = value else {
        return Err(ProtocolError::NotAnObject {
            payload: payload.to_string(),
        });
    };

    let name = match map.remove("name") {
        Some(Value::String(name)) if !name.trim().is_empty() => name,
        _ => {
            return Err(ProtocolError::MissingName {
                payload: payload.to_string(),
            });
        }
    };

    let arguments = match map.remove("parameters") {
        None | Some(Value::Null) => Arguments::new(),
        Some(Value::Object(arguments)) => arguments,
        Some(_) => return Err(ProtocolError::InvalidParameters { name }),
    };

    Ok(CallRequest { name, arguments })
}

fn tagged_call(reply: &str, is_known: impl Fn(&str) -> bool) -> Option<CallRequest> {
    static OPEN_TAG: OnceLock<Option<Regex>> = OnceLock::new();
    let open_tag = OPEN_TAG
        .get_or_init(|| Regex::new(r"<(\w+)>").ok())
        .as_ref()?;

    for captures in open_tag.captures_iter(reply) {
        let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let name = name.as_str();
        if !(name.ends_with("Tool") || is_known(name)) {
            continue;
        }
        let close = format!("</{name}>");
        let Some(body_len) = reply[whole.end()..].find(&close) else {
            continue;
        };
        let body = reply[whole.end()..whole.end() + body_len].trim();
        return Some(CallRequest {
            name: name.to_string(),
            arguments: parse_tag_body(body),
        });
    }

    None
}

fn parse_tag_body(body: &str) -> Arguments {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        return map;
    }

    body.lines()
        .filter_map(|line| line.trim().split_once(':'))
        .map(|(key, value)| {
            let key = key.trim().trim_matches('"').to_string();
            let value = value.trim().trim_matches(|c| matches!(c, '"' | ',' | ' '));
            (key, Value::String(value.to_string()))
        })
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

fn extract_json(content: &str) -> Result<Value, String> {
    let trimmed = content.trim();

    let first_error = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => return Ok(value),
        Err(err) => err.to_string(),
    };

    if trimmed.starts_with("```") {
        let stripped = trimmed.trim_start_matches("```json");
        let stripped = stripped.trim_start_matches("```JSON");
        let stripped = stripped.trim_start_matches("```");
        if let Some(end) = stripped.rfind("```") {
            let slice = &stripped[..end];
            if let Ok(value) = serde_json::from_str::<Value>(slice.trim()) {
                return Ok(value);
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            let candidate = &trimmed[start..=end];
            if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                return Ok(value);
            }
        }
    }

    Err(first_error)
}
