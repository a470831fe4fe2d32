// Config loading tests - AppConfig::load from files on disk
//
// Covers required fields, defaults for absent tables and persona merging.

use serial_test::serial;
use std::fs;
use std::path::{Path, PathBuf};
use stepwise_core::config::{AppConfig, ConfigError, ToolFilter};
use tempfile::tempdir;

const PROVIDER: &str = r#"
[[providers]]
id = "moonshot"
type = "openai"
endpoint = "https://api.moonshot.cn"
api_key = "KIMI_API_KEY"
models = ["kimi-k2-0905-preview"]
"#;

fn write_config(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("stepwise.toml");
    fs::write(&path, content).expect("Failed to write config");
    path
}

fn with_header(body: &str) -> String {
    format!(
        "default_provider = \"moonshot\"\nmodel = \"kimi-k2-0905-preview\"\n{PROVIDER}\n{body}"
    )
}

#[test]
fn returns_error_when_file_not_found() {
    let result = AppConfig::load(Some(Path::new("/nonexistent/path/stepwise.toml")));
    assert!(matches!(result, Err(ConfigError::NotFound { .. })));
}

#[test]
fn returns_error_when_model_missing() {
    let dir = tempdir().expect("tempdir");
    let path = write_config(dir.path(), &format!("default_provider = \"moonshot\"\n{PROVIDER}"));
    assert!(matches!(AppConfig::load(Some(&path)), Err(ConfigError::MissingModel)));
}

#[test]
fn returns_error_when_default_provider_missing() {
    let dir = tempdir().expect("tempdir");
    let path = write_config(dir.path(), &format!("model = \"kimi-k2-0905-preview\"\n{PROVIDER}"));
    assert!(matches!(
        AppConfig::load(Some(&path)),
        Err(ConfigError::MissingDefaultProvider)
    ));
}

#[test]
fn returns_error_when_default_provider_unknown() {
    let dir = tempdir().expect("tempdir");
    let path = write_config(
        dir.path(),
        &format!("default_provider = \"openai\"\nmodel = \"gpt-4o\"\n{PROVIDER}"),
    );
    assert!(matches!(
        AppConfig::load(Some(&path)),
        Err(ConfigError::ProviderNotFound { provider }) if provider == "openai"
    ));
}

#[test]
fn returns_error_when_no_providers() {
    let dir = tempdir().expect("tempdir");
    let path = write_config(
        dir.path(),
        "default_provider = \"moonshot\"\nmodel = \"kimi-k2-0905-preview\"\n",
    );
    assert!(matches!(
        AppConfig::load(Some(&path)),
        Err(ConfigError::NoProvidersConfigured)
    ));
}

#[test]
fn returns_parse_error_for_broken_toml() {
    let dir = tempdir().expect("tempdir");
    let path = write_config(dir.path(), "model = \"unterminated\n");
    assert!(matches!(AppConfig::load(Some(&path)), Err(ConfigError::Parse { .. })));
}

#[test]
fn applies_defaults_for_absent_tables() {
    let dir = tempdir().expect("tempdir");
    let path = write_config(dir.path(), &with_header(""));
    let config = AppConfig::load(Some(&path)).expect("valid config");

    assert_eq!(config.limits.requests_per_minute, 3);
    assert_eq!(config.limits.max_attempts, 5);
    assert_eq!(config.limits.attempt_timeout_secs, 30);
    assert_eq!(config.agent.max_steps, 20);
    assert_eq!(config.agent.min_answer_chars, 0);
    assert_eq!(config.agent.default_persona, "general-purpose");
    assert_eq!(
        config.persona_names(),
        vec!["general-purpose", "code-reviewer", "researcher", "data-scientist"]
    );
}

#[test]
fn reads_limits_and_agent_tables() {
    let dir = tempdir().expect("tempdir");
    let path = write_config(
        dir.path(),
        &with_header(
            r#"
[limits]
requests_per_minute = 10
max_attempts = 2

[agent]
max_steps = 8
min_answer_chars = 40
default_persona = "researcher"
"#,
        ),
    );
    let config = AppConfig::load(Some(&path)).expect("valid config");

    assert_eq!(config.limits.requests_per_minute, 10);
    assert_eq!(config.limits.retry_policy().max_attempts, 2);
    assert_eq!(config.agent.max_steps, 8);
    assert_eq!(config.agent.min_answer_chars, 40);
    assert_eq!(config.agent.default_persona, "researcher");
}

#[test]
fn configured_personas_merge_over_builtins() {
    let dir = tempdir().expect("tempdir");
    let path = write_config(
        dir.path(),
        &with_header(
            r#"
[[personas]]
name = "researcher"
model = "kimi-latest"

[[personas]]
name = "auditor"
system_prompt = "You audit repositories."
tools = ["GrepTool", "FileReadTool"]
"#,
        ),
    );
    let config = AppConfig::load(Some(&path)).expect("valid config");

    let researcher = config.persona("researcher").expect("builtin kept");
    assert_eq!(researcher.model.as_deref(), Some("kimi-latest"));
    assert!(researcher.system_prompt.starts_with("You are a researcher."));

    let auditor = config.persona("auditor").expect("custom persona");
    assert_eq!(
        auditor.tools,
        ToolFilter::Only(vec!["GrepTool".into(), "FileReadTool".into()])
    );

    let provider = config.provider("moonshot").expect("provider");
    assert!(provider.models.iter().any(|model| model.name == "kimi-latest"));
}

#[test]
fn rejects_malformed_persona_tools() {
    let dir = tempdir().expect("tempdir");
    let path = write_config(
        dir.path(),
        &with_header(
            r#"
[[personas]]
name = "auditor"
system_prompt = "You audit repositories."
tools = "everything"
"#,
        ),
    );
    assert!(matches!(
        AppConfig::load(Some(&path)),
        Err(ConfigError::InvalidToolFilter { persona, .. }) if persona == "auditor"
    ));
}

#[test]
fn rejects_custom_persona_without_prompt() {
    let dir = tempdir().expect("tempdir");
    let path = write_config(dir.path(), &with_header("[[personas]]\nname = \"silent\"\n"));
    assert!(matches!(
        AppConfig::load(Some(&path)),
        Err(ConfigError::MissingPersonaPrompt { .. })
    ));
}

#[test]
#[serial]
fn loads_default_path_relative_to_working_directory() {
    let dir = tempdir().expect("tempdir");
    fs::create_dir(dir.path().join("config")).expect("config dir");
    write_config(&dir.path().join("config"), &with_header(""));

    let previous = std::env::current_dir().expect("cwd");
    std::env::set_current_dir(dir.path()).expect("enter tempdir");
    let result = AppConfig::load(None);
    std::env::set_current_dir(previous).expect("restore cwd");

    let config = result.expect("default config path");
    assert_eq!(config.model, "kimi-k2-0905-preview");
}

#[test]
#[serial]
fn missing_default_path_is_not_found() {
    let dir = tempdir().expect("tempdir");

    let previous = std::env::current_dir().expect("cwd");
    std::env::set_current_dir(dir.path()).expect("enter tempdir");
    let result = AppConfig::load(None);
    std::env::set_current_dir(previous).expect("restore cwd");

    assert!(matches!(result, Err(ConfigError::NotFound { .. })));
}
