use clap::Parser;
use stepwise_core::agent::Progress;
use stepwise_core::types::CallStatus;

const OUTPUT_PREVIEW_CHARS: usize = 200;

#[derive(Parser, Debug)]
#[command(
    name = "stepwise",
    version,
    about = "Run a task to completion with a tool-using model"
)]
pub struct Cli {
    /// Configuration file (defaults to config/stepwise.toml)
    #[arg(long)]
    pub config: Option<String>,
    /// Persona to run the task with
    #[arg(long)]
    pub persona: Option<String>,
    /// Only offer read-only tools
    #[arg(long)]
    pub safe_mode: bool,
    /// Step budget for this run (1-20)
    #[arg(long)]
    pub max_steps: Option<usize>,
    /// Model override for this run
    #[arg(long)]
    pub model: Option<String>,
    /// Directory name for this run's log under the log dir
    #[arg(long)]
    pub log_name: Option<String>,
    #[arg(long)]
    pub prompt_file: Option<String>,
    /// Silence diagnostics and progress output
    #[arg(long, short)]
    pub quiet: bool,
    #[arg()]
    pub prompt: Vec<String>,
}

/// One line per progress event; `None` for events that print nothing.
pub fn render_progress(event: &Progress) -> Option<String> {
    match event {
        Progress::Started {
            model,
            capabilities,
        } => Some(format!(
            "Model: {model} | Tools: {}",
            if capabilities.is_empty() {
                "none".to_string()
            } else {
                capabilities.join(", ")
            }
        )),
        Progress::Requesting { step, max_steps } => {
            Some(format!("[step {step}/{max_steps}] Waiting for the model..."))
        }
        Progress::Remark { step, text } => Some(format!("[step {step}] {}", text.trim())),
        Progress::CallIssued {
            step,
            name,
            arguments,
        } => Some(format!(
            "[step {step}] Calling {name} {}",
            serde_json::Value::Object(arguments.clone())
        )),
        Progress::CallFinished {
            step,
            name,
            status,
            output,
        } => Some(format!(
            "[step {step}] {name} {}: {}",
            status_label(*status),
            preview(output)
        )),
        Progress::Finished { .. } => None,
    }
}

fn status_label(status: CallStatus) -> &'static str {
    match status {
        CallStatus::Executed => "done",
        CallStatus::Rejected => "rejected",
        CallStatus::NotFound => "not found",
        CallStatus::Redundant => "skipped",
    }
}

fn preview(output: &str) -> String {
    let flat = output.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(OUTPUT_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}
