mod cli;

use clap::Parser;
use cli::{Cli, render_progress};
use std::error::Error;
use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::Path;
use std::sync::Arc;
use stepwise_core::agent::{Agent, TaskRequest, TerminalState};
use stepwise_core::config::AppConfig;
use stepwise_core::limiter::RateLimiter;
use stepwise_core::model::DynamicModelProvider;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.quiet);
    info!("Starting stepwise");
    debug!(config = ?cli.config, persona = ?cli.persona, safe_mode = cli.safe_mode, "CLI arguments parsed");

    let mut config = AppConfig::load(cli.config.as_deref().map(Path::new))?;
    let prompt = load_prompt(&cli)?;

    let mut task = TaskRequest::new(prompt, &config.agent);
    task.safe_mode = cli.safe_mode;
    task.model = cli.model.clone();
    if let Some(persona) = &cli.persona {
        task.persona = persona.clone();
    }
    if let Some(max_steps) = cli.max_steps {
        task.max_steps = max_steps;
    }
    if let Some(log_name) = &cli.log_name {
        task.log_name = log_name.clone();
    }
    if let Some(model) = &task.model {
        config.allow_model(model);
    }

    let provider = DynamicModelProvider::from_configs(&config.providers);
    let limiter = Arc::new(RateLimiter::per_minute(config.limits.requests_per_minute));
    let agent = Agent::for_task(&config, provider, limiter, &task)
        .map_err(|err| err.user_message())?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            interrupt.cancel();
        }
    });

    let (sender, mut receiver) = mpsc::channel(32);
    let quiet = cli.quiet;
    let printer = tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            if quiet {
                continue;
            }
            if let Some(line) = render_progress(&event) {
                println!("{line}");
            }
        }
    });

    let outcome = agent.run(task.prompt.clone(), cancel, Some(sender)).await;
    if let Err(err) = printer.await {
        warn!(error = %err, "Progress printer stopped unexpectedly");
    }

    println!("\n{}", outcome.answer);
    println!("\nRun {}:\n{}", outcome.state, outcome.statistics);

    match (outcome.state, outcome.error) {
        (TerminalState::Fatal, Some(err)) => Err(err.into()),
        _ => {
            info!("stepwise finished");
            Ok(())
        }
    }
}

fn init_tracing(quiet: bool) {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = if quiet {
            EnvFilter::new("off")
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
        };
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_level(true)
            .with_writer(io::stderr)
            .init();
    });
}

fn load_prompt(cli: &Cli) -> Result<String, Box<dyn Error>> {
    if !cli.prompt.is_empty() {
        info!("Using prompt provided through CLI arguments");
        return Ok(normalize_prompt(cli.prompt.join(" ")));
    }

    if let Some(path) = &cli.prompt_file {
        info!(path = %path, "Loading prompt from file");
        let content = fs::read_to_string(path)?;
        return Ok(normalize_prompt(content));
    }

    if !io::stdin().is_terminal() {
        info!("Reading prompt from standard input");
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        return Ok(normalize_prompt(buffer));
    }

    warn!("Prompt not provided via arguments, file, or stdin");
    Err("prompt required via arguments, file, or stdin".into())
}

fn normalize_prompt(prompt: String) -> String {
    prompt.trim().to_string()
}
