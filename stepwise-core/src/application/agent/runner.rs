use super::errors::AgentError;
use super::models::{
    AgentOptions, Progress, RunOutcome, RunStatistics, TaskRequest, TerminalState,
};
use super::runtime::codec::{self, Decoded, RequestSettings};
use super::runtime::{ManifestRenderer, TextManifest};
use crate::capabilities::builtin_catalog;
use crate::config::AppConfig;
use crate::conversation::Transcript;
use crate::infrastructure::invoker::RetryingInvoker;
use crate::infrastructure::limiter::RateLimiter;
use crate::model::ModelProvider;
use crate::tooling::{CapabilityRegistry, Dispatcher};
use crate::types::{Block, CallStatus, Message, short_id};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use stepwise_log::TranscriptLog;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How a single round left the loop.
enum Round {
    Continue,
    Answered(String),
    Failed(AgentError),
    Cancelled,
}

struct ProgressSink(Option<mpsc::Sender<Progress>>);

impl ProgressSink {
    async fn emit(&self, event: Progress) {
        if let Some(sender) = &self.0 {
            // A closed receiver only means nobody is watching.
            let _ = sender.send(event).await;
        }
    }
}

/// One task run: the step loop over a transcript, an invoker and a dispatcher.
pub struct Agent<P: ModelProvider> {
    invoker: RetryingInvoker<P>,
    dispatcher: Dispatcher,
    log: Option<TranscriptLog>,
    options: AgentOptions,
}

impl<P: ModelProvider> Agent<P> {
    pub fn new(invoker: RetryingInvoker<P>, dispatcher: Dispatcher, options: AgentOptions) -> Self {
        Self {
            invoker,
            dispatcher,
            log: None,
            options,
        }
    }

    pub fn with_log(mut self, log: TranscriptLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Wire a validated task to the configured persona, capabilities and
    /// run log.
    pub fn for_task(
        config: &AppConfig,
        provider: P,
        limiter: Arc<RateLimiter>,
        task: &TaskRequest,
    ) -> Result<Self, AgentError> {
        task.validate(&config.personas)?;
        let persona = config
            .persona(&task.persona)
            .ok_or_else(|| AgentError::UnknownPersona {
                persona: task.persona.clone(),
                available: config.persona_names().iter().map(|n| n.to_string()).collect(),
            })?;

        let workdir = match &config.agent.workdir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        };
        let registry = CapabilityRegistry::select(
            builtin_catalog(&workdir),
            task.safe_mode,
            &persona.tools,
        )?;
        let dispatcher = Dispatcher::new(registry)
            .with_default_timeout(Duration::from_secs(config.agent.capability_timeout_secs));
        let invoker = RetryingInvoker::new(provider, limiter, config.limits.retry_policy());

        let options = AgentOptions {
            provider: config.default_provider.clone(),
            model: task
                .model
                .clone()
                .or_else(|| persona.model.clone())
                .unwrap_or_else(|| config.model.clone()),
            system_prompt: format!(
                "{}\n\nWorking directory: {}",
                persona.system_prompt,
                workdir.display()
            ),
            max_steps: task.max_steps,
            temperature: Some(config.agent.temperature),
            min_answer_chars: config.agent.min_answer_chars,
            request_timeout: Some(Duration::from_secs(config.limits.attempt_timeout_secs)),
        };
        let log = TranscriptLog::for_run(&config.agent.log_dir, &task.log_name, task.fork, task.side)?;
        info!(
            persona = persona.name.as_str(),
            model = options.model.as_str(),
            safe_mode = task.safe_mode,
            log = %log.path().display(),
            "Prepared task run"
        );

        Ok(Self::new(invoker, dispatcher, options).with_log(log))
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    /// Drive the step loop to a terminal state. Never fails: every ending,
    /// including errors and cancellation, is reported in the outcome.
    pub async fn run(
        mut self,
        prompt: impl Into<String>,
        cancel: CancellationToken,
        progress: Option<mpsc::Sender<Progress>>,
    ) -> RunOutcome {
        let started = Instant::now();
        let requests_before = self.invoker.attempts_made();
        let events = ProgressSink(progress);

        let mut transcript = Transcript::new();
        transcript.append(Message::system(self.options.system_prompt.clone()));
        transcript.append(Message::user(prompt));

        let registry = self.dispatcher.registry();
        let manifest = TextManifest.render(&registry.descriptors());
        let capabilities: Vec<String> = registry.names().into_iter().map(str::to_string).collect();
        let settings = RequestSettings {
            provider: self.options.provider.clone(),
            model: self.options.model.clone(),
            temperature: self.options.temperature,
            timeout: self.options.request_timeout,
        };

        info!(
            model = settings.model.as_str(),
            max_steps = self.options.max_steps,
            capabilities = capabilities.len(),
            "Agent run started"
        );
        events
            .emit(Progress::Started {
                model: settings.model.clone(),
                capabilities,
            })
            .await;

        let mut steps = 0;
        let (state, answer, error) = loop {
            if cancel.is_cancelled() {
                break (TerminalState::Cancelled, cancelled_answer(&transcript), None);
            }
            if steps >= self.options.max_steps {
                warn!(max_steps = self.options.max_steps, "Step limit reached");
                let answer = transcript.last_assistant_text().unwrap_or_else(|| {
                    format!(
                        "Reached the maximum of {} steps without a final answer.",
                        self.options.max_steps
                    )
                });
                break (TerminalState::StepLimitReached, answer, None);
            }
            steps += 1;

            let round = self
                .round(steps, &mut transcript, &manifest, &settings, &cancel, &events)
                .await;

            if let Err(err) = self.flush(&transcript) {
                let err = AgentError::from(err);
                warn!(error = %err, "Run log write failed");
                break (TerminalState::Fatal, err.user_message(), Some(err));
            }

            match round {
                Round::Continue => {}
                Round::Answered(text) => break (TerminalState::Completed, text, None),
                Round::Failed(err) => break (TerminalState::Fatal, err.user_message(), Some(err)),
                Round::Cancelled => {
                    break (TerminalState::Cancelled, cancelled_answer(&transcript), None);
                }
            }
        };

        let statistics = RunStatistics {
            elapsed: started.elapsed(),
            capability_calls: transcript.call_count(),
            service_requests: self.invoker.attempts_made() - requests_before,
            steps_used: steps,
            max_steps: self.options.max_steps,
            model: self.options.model.clone(),
        };
        info!(
            state = %state,
            steps = statistics.steps_used,
            capability_calls = statistics.capability_calls,
            service_requests = statistics.service_requests,
            distinct_calls = self.dispatcher.executed_count(),
            "Agent run finished"
        );
        events.emit(Progress::Finished { state }).await;

        RunOutcome {
            state,
            answer,
            statistics,
            error,
            transcript,
        }
    }

    async fn round(
        &mut self,
        step: usize,
        transcript: &mut Transcript,
        manifest: &str,
        settings: &RequestSettings,
        cancel: &CancellationToken,
        events: &ProgressSink,
    ) -> Round {
        let request = codec::encode_request(transcript.normalize(), manifest, settings);
        events
            .emit(Progress::Requesting {
                step,
                max_steps: self.options.max_steps,
            })
            .await;
        debug!(step, messages = request.messages.len(), "Submitting round to model");

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Round::Cancelled,
            response = self.invoker.invoke(request) => response,
        };
        let reply = match response {
            Ok(response) => response.content().to_string(),
            Err(err) => {
                let err = AgentError::from(err);
                transcript.append(Message::assistant_text(err.user_message()));
                return Round::Failed(err);
            }
        };

        let registry = self.dispatcher.registry();
        let decoded = match codec::decode(&reply, |name| registry.contains(name)) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!(step, error = %err, "Malformed call in model reply");
                let err = AgentError::from(err);
                transcript.append(Message::assistant_text(err.user_message()));
                return Round::Failed(err);
            }
        };

        let call = match decoded {
            Decoded::Text(text) => {
                transcript.append(Message::assistant_text(text.clone()));
                if text.trim().chars().count() >= self.options.min_answer_chars {
                    info!(step, "Model returned final answer");
                    return Round::Answered(text);
                }
                events.emit(Progress::Remark { step, text }).await;
                return Round::Continue;
            }
            Decoded::Call(call) => call,
        };

        let call_id = short_id("call");
        transcript.append(Message::assistant(vec![Block::Call {
            id: call_id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        }]));
        info!(step, capability = call.name.as_str(), "Model requested capability");
        events
            .emit(Progress::CallIssued {
                step,
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            })
            .await;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                transcript.append(Message::call_result(
                    call_id.clone(),
                    call.name.clone(),
                    CallStatus::Rejected,
                    "Cancelled before completion",
                ));
                return Round::Cancelled;
            }
            outcome = self.dispatcher.handle(&call) => outcome,
        };

        transcript.append(Message::call_result(
            call_id,
            call.name.clone(),
            outcome.status,
            outcome.output.clone(),
        ));
        events
            .emit(Progress::CallFinished {
                step,
                name: call.name,
                status: outcome.status,
                output: outcome.output,
            })
            .await;
        Round::Continue
    }

    fn flush(&self, transcript: &Transcript) -> Result<(), stepwise_log::RunLogError> {
        match &self.log {
            Some(log) => log.rewrite(&transcript.log_entries()),
            None => Ok(()),
        }
    }
}

fn cancelled_answer(transcript: &Transcript) -> String {
    transcript
        .last_assistant_text()
        .unwrap_or_else(|| "Task cancelled before a final answer.".to_string())
}
