use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// JSON object carried as capability arguments.
pub type Arguments = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// Service-agnostic message as sent to a completion service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// How a call request was resolved by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Executed,
    Rejected,
    NotFound,
    Redundant,
}

/// Unit of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Text {
        text: String,
    },
    Call {
        id: String,
        name: String,
        arguments: Arguments,
    },
    CallResult {
        call_id: String,
        name: String,
        status: CallStatus,
        output: String,
    },
}

impl Block {
    pub fn text(text: impl Into<String>) -> Self {
        Block::Text { text: text.into() }
    }

    pub fn call(name: impl Into<String>, arguments: Arguments) -> Self {
        Block::Call {
            id: short_id("call"),
            name: name.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<Block>),
}

/// One transcript entry. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    pub content: MessageContent,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn build(role: MessageRole, content: MessageContent) -> Self {
        Self {
            id: short_id(role.as_str()),
            role,
            content,
            timestamp: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::build(MessageRole::System, MessageContent::Text(content.into()))
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::build(MessageRole::User, MessageContent::Text(content.into()))
    }

    pub fn assistant(blocks: Vec<Block>) -> Self {
        Self::build(MessageRole::Assistant, MessageContent::Blocks(blocks))
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::assistant(vec![Block::text(text)])
    }

    /// Outcome record for a previously issued call, addressed back to the model.
    pub fn call_result(
        call_id: impl Into<String>,
        name: impl Into<String>,
        status: CallStatus,
        output: impl Into<String>,
    ) -> Self {
        Self::build(
            MessageRole::User,
            MessageContent::Blocks(vec![Block::CallResult {
                call_id: call_id.into(),
                name: name.into(),
                status,
                output: output.into(),
            }]),
        )
    }

    pub fn blocks(&self) -> &[Block] {
        match &self.content {
            MessageContent::Blocks(blocks) => blocks,
            MessageContent::Text(_) => &[],
        }
    }

    /// Concatenated text blocks (or the plain text content).
    pub fn text(&self) -> Option<String> {
        match &self.content {
            MessageContent::Text(text) => Some(text.clone()),
            MessageContent::Blocks(blocks) => {
                let parts: Vec<&str> = blocks
                    .iter()
                    .filter_map(|block| match block {
                        Block::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect();
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join("\n"))
                }
            }
        }
    }
}

/// `<prefix>_<8 hex chars>`
pub fn short_id(prefix: &str) -> String {
    let simple = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &simple[..8])
}
