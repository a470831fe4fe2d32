//! Personas: named bundles of system prompt, model choice and capability
//! allow-list selected for a run.

use super::error::ConfigError;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolFilter {
    All,
    Only(Vec<String>),
}

impl ToolFilter {
    /// Exact, case-sensitive match against the allow-list.
    pub fn allows(&self, name: &str) -> bool {
        match self {
            ToolFilter::All => true,
            ToolFilter::Only(names) => names.iter().any(|allowed| allowed == name),
        }
    }

    fn only(names: &[&str]) -> Self {
        ToolFilter::Only(names.iter().map(|name| (*name).to_string()).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Persona {
    pub name: String,
    pub system_prompt: String,
    pub model: Option<String>,
    pub tools: ToolFilter,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct RawPersona {
    pub(super) name: String,
    pub(super) system_prompt: Option<String>,
    pub(super) model: Option<String>,
    pub(super) tools: Option<RawToolFilter>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(super) enum RawToolFilter {
    Wildcard(String),
    Names(Vec<String>),
}

impl RawToolFilter {
    fn into_filter(self, persona: &str) -> Result<ToolFilter, ConfigError> {
        match self {
            RawToolFilter::Wildcard(value) if value.trim() == "*" => Ok(ToolFilter::All),
            RawToolFilter::Wildcard(value) => Err(ConfigError::InvalidToolFilter {
                persona: persona.to_string(),
                value,
            }),
            RawToolFilter::Names(names) => Ok(ToolFilter::Only(names)),
        }
    }
}

/// Lay configured personas over the built-in set. A configured persona with
/// a built-in name overrides only the fields it sets.
pub(super) fn merge_personas(raw: Vec<RawPersona>) -> Result<Vec<Persona>, ConfigError> {
    let mut personas = builtin_personas();

    for entry in raw {
        let tools = entry
            .tools
            .map(|tools| tools.into_filter(&entry.name))
            .transpose()?;

        match personas.iter_mut().find(|persona| persona.name == entry.name) {
            Some(existing) => {
                if let Some(prompt) = entry.system_prompt {
                    existing.system_prompt = prompt;
                }
                if entry.model.is_some() {
                    existing.model = entry.model;
                }
                if let Some(tools) = tools {
                    existing.tools = tools;
                }
            }
            None => {
                let system_prompt = entry
                    .system_prompt
                    .filter(|prompt| !prompt.trim().is_empty())
                    .ok_or_else(|| ConfigError::MissingPersonaPrompt {
                        persona: entry.name.clone(),
                    })?;
                personas.push(Persona {
                    name: entry.name,
                    system_prompt,
                    model: entry.model,
                    tools: tools.unwrap_or(ToolFilter::All),
                });
            }
        }
    }

    Ok(personas)
}

pub fn builtin_personas() -> Vec<Persona> {
    vec![
        Persona {
            name: "general-purpose".into(),
            system_prompt: concat!(
                "You are a general-purpose AI agent. Use tools to complete tasks step by step. ",
                "First understand the task, then choose appropriate tools. ",
                "When using tools, you must wrap the call in <FunctionCallBegin> and <FunctionCallEnd> tags. ",
                "The format must be: <FunctionCallBegin>{\"name\":\"TOOL_NAME\",\"parameters\":{\"key\":\"value\"}}<FunctionCallEnd> ",
                "Never use other formats like <TOOL_NAME> or XML tags. ",
                "Optimize tool usage to minimize API calls - avoid redundant calls to the same tool with same parameters."
            )
            .into(),
            model: None,
            tools: ToolFilter::All,
        },
        Persona {
            name: "code-reviewer".into(),
            system_prompt: concat!(
                "You are a code reviewer. Follow these steps:\n",
                "1. Use GlobTool to find relevant source files (for example pattern: '**/*.py')\n",
                "2. Select the most relevant file and use FileReadTool to read its content\n",
                "3. Analyze the code directly from the content provided\n",
                "4. If you need to run linters (like flake8), first check if they're installed. ",
                "If not, install them with 'pip3 install flake8' before running\n",
                "5. For Python commands, always use 'python3' instead of 'python'\n",
                "6. After gathering necessary information, provide a comprehensive code review\n",
                "\n",
                "When using tools, wrap calls in <FunctionCallBegin> and <FunctionCallEnd> with valid JSON. ",
                "Avoid redundant tool calls. After completing your analysis, provide your final review."
            )
            .into(),
            model: None,
            tools: ToolFilter::only(&[
                "GrepTool",
                "FileReadTool",
                "ListDirectoryTool",
                "GlobTool",
                "BashTool",
                "FileEditTool",
                "FileWriteTool",
                "ThinkTool",
                "TodoWriteTool",
            ]),
        },
        Persona {
            name: "researcher".into(),
            system_prompt: concat!(
                "You are a researcher. Use GlobTool to find relevant files, ",
                "use GrepTool to locate relevant passages and FileReadTool to extract information. ",
                "When using tools, you must wrap the call in <FunctionCallBegin> and <FunctionCallEnd> tags. ",
                "Optimize tool usage to minimize API calls."
            )
            .into(),
            model: None,
            tools: ToolFilter::only(&[
                "GrepTool",
                "FileReadTool",
                "ListDirectoryTool",
                "GlobTool",
                "ThinkTool",
            ]),
        },
        Persona {
            name: "data-scientist".into(),
            system_prompt: concat!(
                "You are a data scientist working with notebooks and data files. ",
                "Use FileReadTool to read notebook and data contents, ",
                "and BashTool to execute notebooks or scripts when needed (always with python3). ",
                "When using tools, you must wrap the call in <FunctionCallBegin> and <FunctionCallEnd> tags."
            )
            .into(),
            model: None,
            tools: ToolFilter::only(&[
                "FileReadTool",
                "ListDirectoryTool",
                "BashTool",
                "ThinkTool",
                "TodoWriteTool",
            ]),
        },
    ]
}
