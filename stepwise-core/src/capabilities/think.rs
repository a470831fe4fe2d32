use super::str_arg;
use crate::tooling::{Capability, RejectionKind, Validation};
use crate::types::Arguments;
use async_trait::async_trait;
use chrono::Local;

/// Records a reasoning step without touching anything.
pub struct ThinkTool;

#[async_trait]
impl Capability for ThinkTool {
    fn name(&self) -> &str {
        "ThinkTool"
    }

    fn describe(&self) -> String {
        "Think about something. Obtains no new information and changes nothing; the thought \
         is only logged. Use it to brainstorm fixes for a bug, plan a refactoring, or reason \
         about failing test results. Required parameter: 'thought'."
            .into()
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn validate(&self, args: &Arguments) -> Validation {
        match str_arg(args, "thought") {
            None => Validation::reject(
                RejectionKind::MissingArgument,
                "Missing required parameter: 'thought' (the thinking content to log)",
            ),
            Some(thought) if thought.trim().is_empty() => Validation::reject(
                RejectionKind::InvalidArgument,
                "Parameter 'thought' cannot be empty or only whitespace",
            ),
            Some(_) => Validation::accept(),
        }
    }

    async fn execute(&self, args: &Arguments) -> String {
        let thought = str_arg(args, "thought").unwrap_or_default();
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        format!(
            "Thought logged successfully at {timestamp}:\n\n{thought}\n\n\
             This thought has been recorded for transparency."
        )
    }
}
