pub mod application;
pub mod capabilities;
pub mod config;
pub mod constants;
pub mod domain;
pub mod infrastructure;

pub use application::{agent, conversation, tooling};
pub use config::{AppConfig, ModelProviderConfig};
pub use domain::types;
pub use infrastructure::{invoker, limiter, model};
