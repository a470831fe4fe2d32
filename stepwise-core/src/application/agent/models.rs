use super::errors::AgentError;
use crate::config::defaults::MAX_STEPS_CEILING;
use crate::config::{AgentConfig, Persona};
use crate::conversation::Transcript;
use crate::types::{Arguments, CallStatus};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_LOG_NAME: &str = "task_logs";
const DEFAULT_MAX_STEPS: usize = 20;

/// What to run, as requested by the caller.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub prompt: String,
    pub persona: String,
    pub max_steps: usize,
    pub safe_mode: bool,
    pub model: Option<String>,
    pub log_name: String,
    pub fork: u32,
    pub side: u32,
}

impl TaskRequest {
    pub fn new(prompt: impl Into<String>, defaults: &AgentConfig) -> Self {
        Self {
            prompt: prompt.into(),
            persona: defaults.default_persona.clone(),
            max_steps: defaults.max_steps,
            safe_mode: false,
            model: None,
            log_name: DEFAULT_LOG_NAME.to_string(),
            fork: 0,
            side: 1,
        }
    }

    pub fn validate(&self, personas: &[Persona]) -> Result<(), AgentError> {
        if self.prompt.trim().is_empty() {
            return Err(AgentError::EmptyPrompt);
        }
        if !(1..=MAX_STEPS_CEILING).contains(&self.max_steps) {
            return Err(AgentError::InvalidMaxSteps {
                value: self.max_steps,
                ceiling: MAX_STEPS_CEILING,
            });
        }
        if !personas.iter().any(|persona| persona.name == self.persona) {
            return Err(AgentError::UnknownPersona {
                persona: self.persona.clone(),
                available: personas.iter().map(|persona| persona.name.clone()).collect(),
            });
        }
        Ok(())
    }
}

/// Resolved settings for one run of the step loop.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub provider: String,
    pub model: String,
    pub system_prompt: String,
    pub max_steps: usize,
    pub temperature: Option<f32>,
    /// Trimmed text at least this long ends the run; shorter text is a remark.
    pub min_answer_chars: usize,
    pub request_timeout: Option<Duration>,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            provider: String::new(),
            model: String::new(),
            system_prompt: String::new(),
            max_steps: DEFAULT_MAX_STEPS,
            temperature: None,
            min_answer_chars: 0,
            request_timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    Completed,
    StepLimitReached,
    Fatal,
    Cancelled,
}

impl TerminalState {
    pub fn as_str(self) -> &'static str {
        match self {
            TerminalState::Completed => "completed",
            TerminalState::StepLimitReached => "step limit reached",
            TerminalState::Fatal => "failed",
            TerminalState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TerminalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStatistics {
    pub elapsed: Duration,
    pub capability_calls: usize,
    pub service_requests: usize,
    pub steps_used: usize,
    pub max_steps: usize,
    pub model: String,
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "- Elapsed: {}", format_duration(self.elapsed))?;
        writeln!(f, "- Capability calls: {}", self.capability_calls)?;
        writeln!(f, "- Service requests: {}", self.service_requests)?;
        writeln!(f, "- Steps: {}/{}", self.steps_used, self.max_steps)?;
        write!(f, "- Model: {}", self.model)
    }
}

/// `Ns Mms`, or `Ns` on a whole second.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    let (seconds, remainder) = (millis / 1000, millis % 1000);
    if remainder > 0 {
        format!("{seconds}s {remainder}ms")
    } else {
        format!("{seconds}s")
    }
}

/// Terminal report of a run. Produced for every terminal state.
#[derive(Debug)]
pub struct RunOutcome {
    pub state: TerminalState,
    pub answer: String,
    pub statistics: RunStatistics,
    pub error: Option<AgentError>,
    pub transcript: Transcript,
}

/// Events streamed while a run is in progress.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    Started {
        model: String,
        capabilities: Vec<String>,
    },
    Requesting {
        step: usize,
        max_steps: usize,
    },
    Remark {
        step: usize,
        text: String,
    },
    CallIssued {
        step: usize,
        name: String,
        arguments: Arguments,
    },
    CallFinished {
        step: usize,
        name: String,
        status: CallStatus,
        output: String,
    },
    Finished {
        state: TerminalState,
    },
}
