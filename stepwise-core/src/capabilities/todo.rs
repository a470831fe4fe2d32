use super::str_arg;
use crate::tooling::{Capability, CapabilityError, RejectionKind, Validation};
use crate::types::Arguments;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::warn;

pub const TODO_FILE: &str = ".todo.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

impl TodoStatus {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TodoItem {
    id: String,
    content: String,
    status: TodoStatus,
    priority: Priority,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct TodoUpdate {
    content: Option<String>,
    status: Option<TodoStatus>,
    priority: Option<Priority>,
}

#[derive(Debug)]
enum TodoOp {
    Create {
        content: String,
        status: TodoStatus,
        priority: Priority,
    },
    Update {
        id: String,
        update: TodoUpdate,
    },
    Delete {
        id: String,
    },
    Clear,
    Batch(Vec<Value>),
}

const OPERATIONS: &str = "create, update, delete, clear, batch";

fn id_arg(args: &Arguments) -> Option<String> {
    match args.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn parse_status(value: Option<&Value>) -> Result<Option<TodoStatus>, String> {
    value
        .map(|raw| {
            raw.as_str().and_then(TodoStatus::parse).ok_or_else(|| {
                "Invalid status. Must be one of: pending, in_progress, completed".to_string()
            })
        })
        .transpose()
}

fn parse_priority(value: Option<&Value>) -> Result<Option<Priority>, String> {
    value
        .map(|raw| {
            raw.as_str()
                .and_then(Priority::parse)
                .ok_or_else(|| "Invalid priority. Must be one of: low, medium, high".to_string())
        })
        .transpose()
}

fn parse_op(args: &Arguments) -> Result<TodoOp, Validation> {
    let Some(operation) = str_arg(args, "operation") else {
        return Err(Validation::reject(
            RejectionKind::MissingArgument,
            format!("Missing required parameter: 'operation' ({OPERATIONS})"),
        ));
    };
    let invalid = |reason: String| Validation::reject(RejectionKind::InvalidArgument, reason);

    match operation {
        "create" => {
            let Some(content) = str_arg(args, "content") else {
                return Err(Validation::reject(
                    RejectionKind::MissingArgument,
                    "Missing required parameter: 'content' (todo item description)",
                ));
            };
            let status = parse_status(args.get("status")).map_err(invalid)?;
            let priority = parse_priority(args.get("priority")).map_err(invalid)?;
            Ok(TodoOp::Create {
                content: content.to_string(),
                status: status.unwrap_or(TodoStatus::Pending),
                priority: priority.unwrap_or(Priority::Medium),
            })
        }
        "update" => {
            let Some(id) = id_arg(args) else {
                return Err(Validation::reject(
                    RejectionKind::MissingArgument,
                    "Missing required parameter: 'id' (todo item ID to update)",
                ));
            };
            let Some(fields) = args
                .get("updates")
                .and_then(Value::as_object)
                .filter(|fields| !fields.is_empty())
            else {
                return Err(Validation::reject(
                    RejectionKind::MissingArgument,
                    "Missing or empty parameter: 'updates' (fields to update)",
                ));
            };
            let mut update = TodoUpdate::default();
            for (field, value) in fields {
                match field.as_str() {
                    "content" => {
                        let content = value.as_str().ok_or_else(|| {
                            invalid("Field 'content' must be a string".to_string())
                        })?;
                        update.content = Some(content.to_string());
                    }
                    "status" => update.status = parse_status(Some(value)).map_err(invalid)?,
                    "priority" => update.priority = parse_priority(Some(value)).map_err(invalid)?,
                    other => {
                        return Err(invalid(format!(
                            "Invalid update field: {other}. Valid fields: content, status, priority"
                        )));
                    }
                }
            }
            Ok(TodoOp::Update { id, update })
        }
        "delete" => id_arg(args).map(|id| TodoOp::Delete { id }).ok_or_else(|| {
            Validation::reject(
                RejectionKind::MissingArgument,
                "Missing required parameter: 'id' (todo item ID to delete)",
            )
        }),
        "clear" => Ok(TodoOp::Clear),
        "batch" => match args.get("operations") {
            Some(Value::Array(items)) => Ok(TodoOp::Batch(items.clone())),
            _ => Err(Validation::reject(
                RejectionKind::MissingArgument,
                "Missing or invalid parameter: 'operations' (list of operations)",
            )),
        },
        _ => Err(invalid(format!(
            "Invalid operation. Must be one of: {OPERATIONS}"
        ))),
    }
}

fn next_id(todos: &[TodoItem]) -> String {
    let highest = todos
        .iter()
        .filter_map(|todo| todo.id.parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    (highest + 1).to_string()
}

fn has_other_in_progress(todos: &[TodoItem], except: Option<&str>) -> bool {
    todos
        .iter()
        .any(|todo| todo.status == TodoStatus::InProgress && Some(todo.id.as_str()) != except)
}

const SINGLE_IN_PROGRESS: &str =
    "Error: Cannot have more than one task in 'in_progress' state at a time.";

/// Applies one non-batch operation to the in-memory list.
fn apply(todos: &mut Vec<TodoItem>, op: TodoOp) -> Result<String, String> {
    let now = Utc::now();
    match op {
        TodoOp::Create {
            content,
            status,
            priority,
        } => {
            if status == TodoStatus::InProgress && has_other_in_progress(todos, None) {
                return Err(SINGLE_IN_PROGRESS.into());
            }
            let id = next_id(todos);
            let message = format!("Successfully created todo item (ID: {id}): {content}");
            todos.push(TodoItem {
                id,
                content,
                status,
                priority,
                created_at: now,
                updated_at: now,
            });
            Ok(message)
        }
        TodoOp::Update { id, update } => {
            if update.status == Some(TodoStatus::InProgress)
                && has_other_in_progress(todos, Some(id.as_str()))
            {
                return Err(SINGLE_IN_PROGRESS.into());
            }
            let Some(todo) = todos.iter_mut().find(|todo| todo.id == id) else {
                return Err(format!("Error: Todo item with ID {id} not found"));
            };
            let mut fields = Vec::new();
            if let Some(content) = update.content {
                todo.content = content;
                fields.push("content");
            }
            if let Some(status) = update.status {
                todo.status = status;
                fields.push("status");
            }
            if let Some(priority) = update.priority {
                todo.priority = priority;
                fields.push("priority");
            }
            todo.updated_at = now;
            Ok(format!(
                "Successfully updated todo item (ID: {id}) with: {}",
                fields.join(", ")
            ))
        }
        TodoOp::Delete { id } => {
            let before = todos.len();
            todos.retain(|todo| todo.id != id);
            if todos.len() == before {
                return Err(format!("Error: Todo item with ID {id} not found"));
            }
            Ok(format!("Successfully deleted todo item (ID: {id})"))
        }
        TodoOp::Clear => {
            todos.clear();
            Ok("Successfully cleared all todo items".into())
        }
        TodoOp::Batch(_) => Err("Error: Nested batch operations are not supported".into()),
    }
}

fn apply_batch(todos: &mut Vec<TodoItem>, items: Vec<Value>) -> String {
    let mut succeeded = 0;
    let mut failures = Vec::new();
    for item in items {
        let parsed = match item.as_object() {
            Some(args) => parse_op(args),
            None => Err(Validation::reject(
                RejectionKind::InvalidArgument,
                "each operation must be an object",
            )),
        };
        let outcome = match parsed {
            Ok(op) => apply(todos, op),
            Err(Validation::Reject { reason, .. }) => Err(format!("Invalid operation: {reason}")),
            Err(Validation::Accept { .. }) => continue,
        };
        match outcome {
            Ok(_) => succeeded += 1,
            Err(reason) => failures.push(reason),
        }
    }

    let mut summary = format!(
        "Batch operation completed. {succeeded} successful, {} failed.",
        failures.len()
    );
    for failure in failures {
        summary.push_str("\n- ");
        summary.push_str(&failure);
    }
    summary
}

fn status_summary(todos: &[TodoItem]) -> String {
    let count = |status: TodoStatus| todos.iter().filter(|todo| todo.status == status).count();
    format!(
        "\n\nCurrent todo status: {} pending, {} in progress, {} completed",
        count(TodoStatus::Pending),
        count(TodoStatus::InProgress),
        count(TodoStatus::Completed)
    )
}

/// Task list persisted as JSON in the working directory.
pub struct TodoWriteTool {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TodoWriteTool {
    pub fn new(workdir: PathBuf) -> Self {
        Self {
            path: workdir.join(TODO_FILE),
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Vec<TodoItem> {
        let Ok(raw) = fs::read_to_string(&self.path).await else {
            return Vec::new();
        };
        serde_json::from_str(&raw).unwrap_or_else(|err| {
            warn!(path = %self.path.display(), error = %err, "Ignoring unreadable todo store");
            Vec::new()
        })
    }

    async fn save(&self, todos: &[TodoItem]) -> Result<(), CapabilityError> {
        let body = serde_json::to_string_pretty(todos)?;
        write_store(&self.path, body).await
    }
}

async fn write_store(path: &Path, body: String) -> Result<(), CapabilityError> {
    fs::write(path, body)
        .await
        .map_err(|source| CapabilityError::Write {
            path: path.to_path_buf(),
            source,
        })
}

#[async_trait]
impl Capability for TodoWriteTool {
    fn name(&self) -> &str {
        "TodoWriteTool"
    }

    fn describe(&self) -> String {
        "Create and manage todo items to track progress. Required parameter: 'operation', one of \
         'create' (needs 'content'; optional 'status' pending|in_progress|completed and \
         'priority' low|medium|high), 'update' (needs 'id' and an 'updates' object), \
         'delete' (needs 'id'), 'clear', or 'batch' (needs an 'operations' list). \
         Only one item may be in_progress at a time."
            .into()
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn validate(&self, args: &Arguments) -> Validation {
        match parse_op(args) {
            Ok(_) => Validation::accept(),
            Err(rejection) => rejection,
        }
    }

    async fn execute(&self, args: &Arguments) -> String {
        let op = match parse_op(args) {
            Ok(op) => op,
            Err(Validation::Reject { reason, .. }) => return format!("Error managing todos: {reason}"),
            Err(Validation::Accept { .. }) => return "Error managing todos".into(),
        };

        let _guard = self.lock.lock().await;
        let mut todos = self.load().await;
        let message = match op {
            TodoOp::Batch(items) => apply_batch(&mut todos, items),
            op => match apply(&mut todos, op) {
                Ok(message) => message,
                Err(error) => return error,
            },
        };

        if let Err(err) = self.save(&todos).await {
            return format!("Error managing todos: {err}");
        }
        message + &status_summary(&todos)
    }
}
