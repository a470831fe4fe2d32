//! Application constants
//!
//! Single source of truth for paths and other constants.

/// Default configuration file path
pub const CONFIG_PATH: &str = "config/stepwise.toml";

/// Default environment file path
pub const ENV_PATH: &str = "config/.env";

/// Default chat-completions path for OpenAI-compatible providers
pub const DEFAULT_OPENAI_API_PATH: &str = "/v1/chat/completions";

/// Opening delimiter of an embedded function call
pub const CALL_BEGIN: &str = "<FunctionCallBegin>";

/// Closing delimiter of an embedded function call
pub const CALL_END: &str = "<FunctionCallEnd>";
