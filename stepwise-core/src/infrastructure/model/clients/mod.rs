//! Model clients

mod base;
mod openai;

pub use base::{HttpClientBase, parse_retry_after};
pub use openai::OpenAIClient;
