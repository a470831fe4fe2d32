//! Task orchestration: the step loop that alternates model rounds with
//! capability calls until a final answer, a failure, cancellation or the
//! step budget ends the run.

mod errors;
mod models;
mod runner;
pub mod runtime;

#[cfg(test)]
mod tests;

pub use errors::AgentError;
pub use models::{
    AgentOptions, DEFAULT_LOG_NAME, Progress, RunOutcome, RunStatistics, TaskRequest,
    TerminalState, format_duration,
};
pub use runner::Agent;
