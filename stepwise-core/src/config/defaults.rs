pub const DEFAULT_REQUESTS_PER_MINUTE: usize = 3;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_INITIAL_RETRY_DELAY_SECS: f64 = 5.0;
pub const DEFAULT_MAX_RETRY_DELAY_SECS: f64 = 10.0;
pub const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_MAX_STEPS: usize = 20;
pub const MAX_STEPS_CEILING: usize = 20;
pub const DEFAULT_TEMPERATURE: f32 = 0.6;
pub const DEFAULT_MIN_ANSWER_CHARS: usize = 0;
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_PERSONA: &str = "general-purpose";
pub const DEFAULT_CAPABILITY_TIMEOUT_SECS: u64 = 10;
