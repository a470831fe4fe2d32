//! Ordered transcript of one task run and its service-agnostic projection.

use crate::application::agent::runtime::codec::encode_call;
use crate::types::{Block, ChatMessage, Message, MessageContent, MessageRole};
use stepwise_log::LogEntry;

/// Append-only message history. Append order is causal order.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Project the transcript into the request form sent to a completion
    /// service. Only the first system message is kept and it always leads.
    pub fn normalize(&self) -> Vec<ChatMessage> {
        let mut normalized = Vec::with_capacity(self.messages.len());

        if let Some(system) = self
            .messages
            .iter()
            .find(|message| message.role == MessageRole::System)
        {
            normalized.push(ChatMessage::new(MessageRole::System, render(system)));
        }

        normalized.extend(
            self.messages
                .iter()
                .filter(|message| message.role != MessageRole::System)
                .map(|message| ChatMessage::new(message.role, render(message))),
        );

        normalized
    }

    /// Text of the most recent assistant message that carried any.
    pub fn last_assistant_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .filter(|message| message.role == MessageRole::Assistant)
            .find_map(Message::text)
    }

    /// Number of call blocks issued by the assistant so far.
    pub fn call_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|message| message.role == MessageRole::Assistant)
            .flat_map(Message::blocks)
            .filter(|block| matches!(block, Block::Call { .. }))
            .count()
    }

    pub fn log_entries(&self) -> Vec<LogEntry> {
        self.messages
            .iter()
            .map(|message| LogEntry::new(message.timestamp, message.role.as_str(), render(message)))
            .collect()
    }
}

fn render(message: &Message) -> String {
    match &message.content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Blocks(blocks) => match message.role {
            MessageRole::Assistant => render_assistant(blocks),
            _ => render_user(blocks),
        },
    }
}

fn render_assistant(blocks: &[Block]) -> String {
    let first_call = blocks.iter().find_map(|block| match block {
        Block::Call {
            name, arguments, ..
        } => Some(encode_call(name, arguments)),
        _ => None,
    });
    if let Some(call) = first_call {
        return call;
    }

    blocks
        .iter()
        .filter_map(|block| match block {
            Block::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_user(blocks: &[Block]) -> String {
    blocks
        .iter()
        .filter_map(|block| match block {
            Block::Text { text } => Some(text.clone()),
            Block::CallResult { name, output, .. } => Some(format!("Tool {name} returned: {output}")),
            Block::Call { .. } => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}
