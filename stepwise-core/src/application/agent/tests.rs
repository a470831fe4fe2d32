use super::runtime::ProtocolError;
use super::*;
use crate::capabilities::{FileReadTool, ListDirectoryTool};
use crate::config::{AgentConfig, AppConfig, LimitsConfig, ModelInfo, builtin_personas};
use crate::invoker::{InvokeError, RetryPolicy, RetryingInvoker};
use crate::limiter::RateLimiter;
use crate::model::{ModelError, ModelProvider, ModelRequest, ModelResponse};
use crate::tooling::{Capability, CapabilityRegistry, Dispatcher, Validation};
use crate::types::{Arguments, Block, CallStatus, MessageRole};
use crate::ModelProviderConfig;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stepwise_log::TranscriptLog;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

enum Step {
    Reply(String),
    RateLimited,
    Hang,
}

#[derive(Clone)]
struct ScriptedProvider {
    steps: Arc<Mutex<VecDeque<Step>>>,
    recordings: Arc<Mutex<Vec<ModelRequest>>>,
}

impl ScriptedProvider {
    fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps.into())),
            recordings: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn replies(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Step::Reply((*r).to_string())).collect())
    }

    fn requests(&self) -> Vec<ModelRequest> {
        self.recordings.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    async fn chat(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        self.recordings.lock().unwrap().push(request);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Reply(text)) => Ok(ModelResponse::new(text)),
            Some(Step::RateLimited) => Err(ModelError::rate_limited("svc", None, "429")),
            Some(Step::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(ModelResponse::new("late"))
            }
            None => Err(ModelError::invalid_response("svc", "script exhausted")),
        }
    }
}

struct EchoTool {
    runs: Arc<AtomicUsize>,
}

#[async_trait]
impl Capability for EchoTool {
    fn name(&self) -> &str {
        "EchoTool"
    }

    fn describe(&self) -> String {
        "Echo 'text' back.".into()
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn validate(&self, args: &Arguments) -> Validation {
        match args.get("text").and_then(Value::as_str) {
            Some(_) => Validation::accept(),
            None => Validation::missing("text"),
        }
    }

    async fn execute(&self, args: &Arguments) -> String {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let text = args.get("text").and_then(Value::as_str).unwrap_or_default();
        format!("echo: {text}")
    }
}

struct CrashingTool;

#[async_trait]
impl Capability for CrashingTool {
    fn name(&self) -> &str {
        "CrashingTool"
    }

    fn describe(&self) -> String {
        "Always fails internally.".into()
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn validate(&self, _args: &Arguments) -> Validation {
        Validation::accept()
    }

    async fn execute(&self, _args: &Arguments) -> String {
        panic!("internal fault")
    }
}

fn call(name: &str, parameters: Value) -> String {
    format!(
        "<FunctionCallBegin>{}<FunctionCallEnd>",
        json!({"name": name, "parameters": parameters})
    )
}

fn options() -> AgentOptions {
    AgentOptions {
        provider: "svc".into(),
        model: "m".into(),
        system_prompt: "You are a test agent.".into(),
        max_steps: 5,
        ..AgentOptions::default()
    }
}

fn agent_with(
    provider: ScriptedProvider,
    capabilities: Vec<Arc<dyn Capability>>,
    options: AgentOptions,
) -> Agent<ScriptedProvider> {
    let mut registry = CapabilityRegistry::new();
    for capability in capabilities {
        registry.register(capability).expect("unique capability");
    }
    let invoker = RetryingInvoker::new(
        provider,
        Arc::new(RateLimiter::per_minute(60)),
        RetryPolicy::default(),
    );
    Agent::new(invoker, Dispatcher::new(registry), options)
}

fn echo_agent(provider: ScriptedProvider) -> (Agent<ScriptedProvider>, Arc<AtomicUsize>) {
    let runs = Arc::new(AtomicUsize::new(0));
    let echo = Arc::new(EchoTool { runs: runs.clone() });
    (agent_with(provider, vec![echo], options()), runs)
}

fn call_statuses(outcome: &RunOutcome) -> Vec<(CallStatus, String)> {
    outcome
        .transcript
        .messages()
        .iter()
        .flat_map(|message| message.blocks())
        .filter_map(|block| match block {
            Block::CallResult { status, output, .. } => Some((*status, output.clone())),
            _ => None,
        })
        .collect()
}

fn drain(mut events: mpsc::Receiver<Progress>) -> Vec<Progress> {
    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        collected.push(event);
    }
    collected
}

#[tokio::test]
async fn plain_text_reply_completes_the_run() {
    let provider = ScriptedProvider::replies(&["All done."]);
    let (agent, _) = echo_agent(provider.clone());

    let outcome = agent.run("say hi", CancellationToken::new(), None).await;

    assert_eq!(outcome.state, TerminalState::Completed);
    assert_eq!(outcome.answer, "All done.");
    assert_eq!(outcome.statistics.steps_used, 1);
    assert_eq!(outcome.statistics.service_requests, 1);
    assert_eq!(outcome.statistics.capability_calls, 0);
    assert!(outcome.error.is_none());

    let requests = provider.requests();
    let first = &requests[0].messages;
    assert_eq!(first[0].role, MessageRole::System);
    assert!(first[0].content.starts_with("You are a test agent."));
    assert!(first[0].content.contains("- EchoTool: Echo 'text' back."));
    assert_eq!(first[1].role, MessageRole::User);
    assert_eq!(first[1].content, "say hi");
}

#[tokio::test]
async fn call_result_is_fed_back_before_the_answer() {
    let first_call = call("EchoTool", json!({"text": "hi"}));
    let provider = ScriptedProvider::replies(&[&first_call, "Finished."]);
    let (agent, runs) = echo_agent(provider.clone());
    let (sender, receiver) = mpsc::channel(64);

    let outcome = agent
        .run("echo something", CancellationToken::new(), Some(sender))
        .await;

    assert_eq!(outcome.state, TerminalState::Completed);
    assert_eq!(outcome.answer, "Finished.");
    assert_eq!(outcome.statistics.steps_used, 2);
    assert_eq!(outcome.statistics.capability_calls, 1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let requests = provider.requests();
    let second = &requests[1].messages;
    assert_eq!(second.len(), 4);
    assert_eq!(second[2].role, MessageRole::Assistant);
    assert!(second[2].content.starts_with("<FunctionCallBegin>"));
    assert_eq!(second[3].content, "Tool EchoTool returned: echo: hi");

    let events = drain(receiver);
    assert!(matches!(events.first(), Some(Progress::Started { .. })));
    assert!(events.contains(&Progress::CallFinished {
        step: 1,
        name: "EchoTool".into(),
        status: CallStatus::Executed,
        output: "echo: hi".into(),
    }));
    assert_eq!(
        events.last(),
        Some(&Progress::Finished {
            state: TerminalState::Completed
        })
    );
}

#[tokio::test]
async fn repeated_call_is_skipped_without_executing() {
    let repeated = call("EchoTool", json!({"text": "same"}));
    let provider = ScriptedProvider::replies(&[&repeated, &repeated, "ok"]);
    let (agent, runs) = echo_agent(provider);

    let outcome = agent.run("repeat", CancellationToken::new(), None).await;

    assert_eq!(outcome.state, TerminalState::Completed);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    let statuses = call_statuses(&outcome);
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[0].0, CallStatus::Executed);
    assert_eq!(statuses[1].0, CallStatus::Redundant);
    assert_eq!(
        statuses[1].1,
        "Skipping redundant tool call: EchoTool with same parameters"
    );
    assert_eq!(outcome.statistics.capability_calls, 2);
}

#[tokio::test]
async fn malformed_call_payload_is_fatal() {
    let provider =
        ScriptedProvider::replies(&["<FunctionCallBegin>{not json}<FunctionCallEnd>", "never"]);
    let (agent, _) = echo_agent(provider.clone());

    let outcome = agent.run("break it", CancellationToken::new(), None).await;

    assert_eq!(outcome.state, TerminalState::Fatal);
    assert!(matches!(
        outcome.error,
        Some(AgentError::Protocol(ProtocolError::InvalidJson { .. }))
    ));
    assert!(outcome.answer.ends_with("Please check the format."));
    assert_eq!(provider.requests().len(), 1);
}

#[tokio::test]
async fn step_budget_ends_the_run() {
    let first = call("EchoTool", json!({"text": "a"}));
    let second = call("EchoTool", json!({"text": "b"}));
    let provider = ScriptedProvider::replies(&[&first, &second, "too late"]);
    let agent = agent_with(
        provider.clone(),
        vec![Arc::new(EchoTool {
            runs: Arc::new(AtomicUsize::new(0)),
        })],
        AgentOptions {
            max_steps: 2,
            ..options()
        },
    );

    let outcome = agent.run("loop", CancellationToken::new(), None).await;

    assert_eq!(outcome.state, TerminalState::StepLimitReached);
    assert_eq!(outcome.statistics.steps_used, 2);
    assert_eq!(
        outcome.answer,
        "Reached the maximum of 2 steps without a final answer."
    );
    assert_eq!(provider.requests().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn persistent_rate_limiting_fails_the_run() {
    let provider = ScriptedProvider::new((0..6).map(|_| Step::RateLimited).collect());
    let (agent, _) = echo_agent(provider.clone());

    let outcome = agent.run("busy service", CancellationToken::new(), None).await;

    assert_eq!(outcome.state, TerminalState::Fatal);
    assert!(matches!(
        outcome.error,
        Some(AgentError::Invoke(InvokeError::RetriesExhausted { attempts: 5, .. }))
    ));
    assert_eq!(outcome.statistics.service_requests, 5);
    assert_eq!(provider.requests().len(), 5);
    assert!(outcome.answer.starts_with("Gave up after 5 attempts."));
    assert_eq!(
        outcome.transcript.last_assistant_text().as_deref(),
        Some(outcome.answer.as_str())
    );
}

#[tokio::test]
async fn reading_a_directory_falls_back_to_a_listing() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir(dir.path().join("src")).expect("mkdir");
    std::fs::write(dir.path().join("src").join("main.rs"), "fn main() {}\n").expect("write");
    let target = dir.path().join("src");

    let read_dir = call("FileReadTool", json!({"path": target.to_string_lossy()}));
    let provider = ScriptedProvider::replies(&[&read_dir, "It holds main.rs."]);
    let agent = agent_with(
        provider,
        vec![
            Arc::new(FileReadTool::new(dir.path().to_path_buf())),
            Arc::new(ListDirectoryTool::new(dir.path().to_path_buf())),
        ],
        options(),
    );

    let outcome = agent.run("what is in src?", CancellationToken::new(), None).await;

    assert_eq!(outcome.state, TerminalState::Completed);
    let statuses = call_statuses(&outcome);
    assert_eq!(statuses.len(), 1);
    let (status, output) = &statuses[0];
    assert_eq!(*status, CallStatus::Executed);
    assert!(output.contains("Since this is a directory, ListDirectoryTool was used instead."));
    assert!(output.contains("- main.rs"));
}

#[tokio::test]
async fn unknown_capability_is_reported_and_the_run_continues() {
    let ghost = call("GhostTool", json!({}));
    let provider = ScriptedProvider::replies(&[&ghost, "ok"]);
    let (agent, _) = echo_agent(provider);

    let outcome = agent.run("use a ghost", CancellationToken::new(), None).await;

    assert_eq!(outcome.state, TerminalState::Completed);
    assert_eq!(
        call_statuses(&outcome),
        vec![(CallStatus::NotFound, "Error: Tool 'GhostTool' not found".to_string())]
    );
}

#[tokio::test]
async fn short_text_is_a_remark_not_an_answer() {
    let provider = ScriptedProvider::replies(&["hmm", "This is the full answer."]);
    let agent = agent_with(
        provider,
        Vec::new(),
        AgentOptions {
            min_answer_chars: 10,
            ..options()
        },
    );
    let (sender, receiver) = mpsc::channel(64);

    let outcome = agent
        .run("think first", CancellationToken::new(), Some(sender))
        .await;

    assert_eq!(outcome.state, TerminalState::Completed);
    assert_eq!(outcome.answer, "This is the full answer.");
    assert_eq!(outcome.statistics.steps_used, 2);
    assert!(drain(receiver).contains(&Progress::Remark {
        step: 1,
        text: "hmm".into(),
    }));
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_a_pending_request() {
    let provider = ScriptedProvider::new(vec![Step::Hang]);
    let (agent, _) = echo_agent(provider);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let outcome = agent.run("wait forever", cancel, None).await;

    assert_eq!(outcome.state, TerminalState::Cancelled);
    assert_eq!(outcome.answer, "Task cancelled before a final answer.");
    assert_eq!(outcome.statistics.steps_used, 1);
    assert!(outcome.error.is_none());
}

#[tokio::test]
async fn cancelled_before_start_sends_nothing() {
    let provider = ScriptedProvider::replies(&["unused"]);
    let (agent, _) = echo_agent(provider.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = agent.run("never mind", cancel, None).await;

    assert_eq!(outcome.state, TerminalState::Cancelled);
    assert_eq!(outcome.statistics.steps_used, 0);
    assert!(provider.requests().is_empty());
}

#[tokio::test]
async fn run_log_holds_one_line_per_message() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = TranscriptLog::for_run(dir.path(), DEFAULT_LOG_NAME, 0, 1).expect("log");
    let log_path = log.path().to_path_buf();

    let echo = call("EchoTool", json!({"text": "line\nbreak"}));
    let provider = ScriptedProvider::replies(&[&echo, "Done."]);
    let (agent, _) = echo_agent(provider);
    let outcome = agent
        .with_log(log)
        .run("log it", CancellationToken::new(), None)
        .await;

    assert_eq!(outcome.state, TerminalState::Completed);
    let written = std::fs::read_to_string(&log_path).expect("log written");
    assert_eq!(written.lines().count(), outcome.transcript.len());
    assert_eq!(written.lines().count(), 5);
    assert!(log_path.ends_with("task_logs/fork0_side1.log"));
}

#[tokio::test]
async fn unwritable_run_log_is_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = TranscriptLog::new(dir.path().join("missing").join("run.log"));

    let provider = ScriptedProvider::replies(&["Done."]);
    let (agent, _) = echo_agent(provider);
    let outcome = agent
        .with_log(log)
        .run("log it", CancellationToken::new(), None)
        .await;

    assert_eq!(outcome.state, TerminalState::Fatal);
    assert!(matches!(outcome.error, Some(AgentError::Log(_))));
    assert!(outcome.answer.starts_with("Could not write the run log"));
}

fn app_config(root: &std::path::Path) -> AppConfig {
    AppConfig {
        default_provider: "svc".into(),
        model: "m".into(),
        providers: vec![ModelProviderConfig {
            id: "svc".into(),
            provider_type: "openai".into(),
            endpoint: "http://localhost:9".into(),
            api_key: None,
            api_path: None,
            models: vec![ModelInfo {
                name: "m".into(),
                display_name: None,
            }],
        }],
        limits: LimitsConfig::default(),
        agent: AgentConfig {
            log_dir: root.join("logs"),
            workdir: Some(root.to_path_buf()),
            ..AgentConfig::default()
        },
        personas: builtin_personas(),
    }
}

#[tokio::test]
async fn safe_mode_task_only_offers_read_only_capabilities() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = app_config(dir.path());
    let mut task = TaskRequest::new("look around", &config.agent);
    task.safe_mode = true;

    let provider = ScriptedProvider::replies(&["Nothing to change."]);
    let agent = Agent::for_task(
        &config,
        provider.clone(),
        Arc::new(RateLimiter::per_minute(60)),
        &task,
    )
    .expect("agent");
    assert_eq!(agent.options().model, "m");

    let outcome = agent.run(task.prompt.clone(), CancellationToken::new(), None).await;
    assert_eq!(outcome.state, TerminalState::Completed);

    let system = &provider.requests()[0].messages[0].content;
    assert!(system.contains("Working directory: "));
    assert!(system.contains("- FileReadTool:"));
    assert!(system.contains("- GrepTool:"));
    assert!(!system.contains("- FileWriteTool:"));
    assert!(!system.contains("- BashTool:"));
    assert!(dir
        .path()
        .join("logs")
        .join(DEFAULT_LOG_NAME)
        .join("fork0_side1.log")
        .exists());
}

#[tokio::test]
async fn task_model_override_wins_over_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = app_config(dir.path());
    let mut task = TaskRequest::new("x", &config.agent);
    task.model = Some("other".into());

    let agent = Agent::for_task(
        &config,
        ScriptedProvider::replies(&[]),
        Arc::new(RateLimiter::per_minute(60)),
        &task,
    )
    .expect("agent");
    assert_eq!(agent.options().model, "other");

    task.persona = "nobody".into();
    let err = Agent::for_task(
        &config,
        ScriptedProvider::replies(&[]),
        Arc::new(RateLimiter::per_minute(60)),
        &task,
    )
    .err()
    .expect("unknown persona");
    assert!(matches!(err, AgentError::UnknownPersona { .. }));
}

#[tokio::test]
async fn capability_fault_is_reported_and_the_run_continues() {
    let crash = call("CrashingTool", json!({}));
    let provider = ScriptedProvider::replies(&[&crash, "Recovered without it."]);
    let agent = agent_with(provider.clone(), vec![Arc::new(CrashingTool)], options());

    let outcome = agent.run("try it", CancellationToken::new(), None).await;

    assert_eq!(outcome.state, TerminalState::Completed);
    assert_eq!(outcome.answer, "Recovered without it.");
    assert_eq!(
        call_statuses(&outcome),
        vec![(
            CallStatus::Executed,
            "Error: CrashingTool failed unexpectedly".to_string()
        )]
    );
    let requests = provider.requests();
    let fed_back = requests[1].messages.last().expect("call result message");
    assert!(fed_back.content.contains("Error: CrashingTool failed unexpectedly"));
}
