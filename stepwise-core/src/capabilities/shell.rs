use super::{str_arg, truncate_chars};
use crate::tooling::{Capability, CapabilityError, RejectionKind, Validation};
use crate::types::Arguments;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const MAX_TIMEOUT_SECS: u64 = 600;
const OUTPUT_LIMIT_CHARS: usize = 2000;
const DANGEROUS_PATTERNS: [&str; 7] = ["sudo", "rm -rf", "mv /", "cp /", "dd ", "shutdown", "rm -r"];
const PYTHON_ADVISORY: &str =
    "Warning: Consider using 'python3' instead of 'python' for compatibility";

static MISSING_MODULE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"No module named '?(\w+)'?").ok());
static MISSING_COMMAND: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"([\w.-]+): (?:command )?not found").ok());

pub struct BashTool {
    workdir: PathBuf,
}

impl BashTool {
    pub fn new(workdir: PathBuf) -> Self {
        Self { workdir }
    }
}

fn uses_bare_python(command: &str) -> bool {
    command.contains("python ") && !command.contains("python3 ")
}

fn timeout_secs(args: &Arguments) -> u64 {
    args.get("timeout")
        .and_then(Value::as_u64)
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_TIMEOUT_SECS)
        .min(MAX_TIMEOUT_SECS)
}

fn render_stream(label: &str, raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let (head, truncated) = truncate_chars(&text, OUTPUT_LIMIT_CHARS);
    let ellipsis = if truncated { "..." } else { "" };
    format!("{label}:\n{head}{ellipsis}")
}

fn suggestion(stderr: &str) -> Option<String> {
    if let Some(module) = MISSING_MODULE
        .as_ref()
        .and_then(|re| re.captures(stderr))
        .and_then(|caps| caps.get(1))
    {
        return Some(format!(
            "Suggestion: Install missing module with 'pip3 install {}'",
            module.as_str()
        ));
    }
    MISSING_COMMAND
        .as_ref()
        .and_then(|re| re.captures(stderr))
        .and_then(|caps| caps.get(1))
        .map(|command| {
            format!(
                "Suggestion: Install missing command or check spelling of '{}'",
                command.as_str()
            )
        })
}

#[async_trait]
impl Capability for BashTool {
    fn name(&self) -> &str {
        "BashTool"
    }

    fn describe(&self) -> String {
        "Execute shell commands in the working directory. Required parameter: 'command' \
         (e.g. 'git log --oneline', 'ls -la'). Optional: 'timeout' in seconds (default 10). \
         For Python commands always use 'python3' instead of 'python'."
            .into()
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn validate(&self, args: &Arguments) -> Validation {
        let Some(command) = str_arg(args, "command") else {
            return Validation::missing("command");
        };
        if let Some(pattern) = DANGEROUS_PATTERNS
            .iter()
            .find(|pattern| command.contains(*pattern))
        {
            return Validation::reject(
                RejectionKind::Forbidden,
                format!("Potentially dangerous command rejected: {pattern}"),
            );
        }
        if let Some(value) = args.get("timeout") {
            match value.as_u64() {
                None => {
                    return Validation::reject(
                        RejectionKind::InvalidArgument,
                        "Parameter 'timeout' must be a positive integer number of seconds",
                    );
                }
                Some(secs) if secs > MAX_TIMEOUT_SECS => {
                    return Validation::reject(
                        RejectionKind::InvalidArgument,
                        format!("Parameter 'timeout' must not exceed {MAX_TIMEOUT_SECS} seconds"),
                    );
                }
                Some(_) => {}
            }
        }
        if uses_bare_python(command) {
            return Validation::advise(PYTHON_ADVISORY);
        }
        Validation::accept()
    }

    async fn execute(&self, args: &Arguments) -> String {
        let original = str_arg(args, "command").unwrap_or_default();
        let secs = timeout_secs(args);

        let (command, note) = if uses_bare_python(original) {
            (
                original.replace("python ", "python3 "),
                Some("Note: Command modified to use 'python3' for compatibility.\n"),
            )
        } else {
            (original.to_string(), None)
        };

        debug!(command = %command, timeout_secs = secs, "Running shell command");
        let child = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(Duration::from_secs(secs), child).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                let err = CapabilityError::Spawn(source);
                return format!("Error executing command: {err}");
            }
            Err(_) => return format!("Command timed out after {secs} seconds: {command}"),
        };

        let mut sections: Vec<String> = note.map(str::to_string).into_iter().collect();
        if !output.stdout.is_empty() {
            sections.push(render_stream("Output", &output.stdout));
        }
        if !output.stderr.is_empty() {
            sections.push(render_stream("Errors", &output.stderr));
            if let Some(hint) = suggestion(&String::from_utf8_lossy(&output.stderr)) {
                sections.push(hint);
            }
        }
        let code = output
            .status
            .code()
            .map_or_else(|| "terminated by signal".to_string(), |code| code.to_string());
        sections.push(format!("Exit code: {code}"));
        sections.join("\n")
    }

    /// The command bounds itself; the dispatcher allows one extra second.
    fn timeout(&self, args: &Arguments) -> Option<Duration> {
        Some(Duration::from_secs(timeout_secs(args).saturating_add(1)))
    }
}
