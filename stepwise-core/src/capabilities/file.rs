use super::{resolve, str_arg, truncate_chars};
use crate::tooling::{Capability, CapabilityError, RejectionKind, Validation};
use crate::types::Arguments;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

const READ_LIMIT_CHARS: usize = 3000;
const LIST_LIMIT_ENTRIES: usize = 200;

pub struct FileReadTool {
    workdir: PathBuf,
}

impl FileReadTool {
    pub fn new(workdir: PathBuf) -> Self {
        Self { workdir }
    }
}

#[async_trait]
impl Capability for FileReadTool {
    fn name(&self) -> &str {
        "FileReadTool"
    }

    fn describe(&self) -> String {
        "Read content from local files. Required parameter: 'path' (full file path). \
         Optional: 'lines' (e.g., '1-50')."
            .into()
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn validate(&self, args: &Arguments) -> Validation {
        let Some(raw) = str_arg(args, "path") else {
            return Validation::missing("path");
        };
        let path = resolve(&self.workdir, raw);
        if !path.exists() {
            return Validation::reject(RejectionKind::NotFound, format!("File not found: {raw}"));
        }
        if !path.is_file() {
            return Validation::reject(RejectionKind::NotAFile, format!("Not a file: {raw}"));
        }
        Validation::accept()
    }

    async fn execute(&self, args: &Arguments) -> String {
        let raw = str_arg(args, "path").unwrap_or_default();
        let path = resolve(&self.workdir, raw);

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(source) => {
                let err = CapabilityError::Read { path, source };
                return format!("Error reading file: {err}");
            }
        };

        let (selected, warning) = match str_arg(args, "lines") {
            Some(range) => match select_lines(&content, range) {
                Some(selected) => (selected, None),
                None => (
                    content.clone(),
                    Some("Warning: Invalid line range format, returning all lines.\n"),
                ),
            },
            None => (content, None),
        };

        let warning = warning.unwrap_or_default();
        match truncate_chars(&selected, READ_LIMIT_CHARS) {
            (head, true) => {
                format!("{warning}Content of {raw} (truncated):\n{head}\n...[content truncated]")
            }
            (all, false) => format!("{warning}Content of {raw}:\n{all}"),
        }
    }
}

/// One-based, inclusive `a-b` line selection.
fn select_lines(content: &str, range: &str) -> Option<String> {
    let (start, end) = range.split_once('-')?;
    let start: usize = start.trim().parse().ok()?;
    let end: usize = end.trim().parse().ok()?;

    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let from = start.saturating_sub(1).min(lines.len());
    let to = end.min(lines.len()).max(from);
    Some(lines[from..to].concat())
}

pub struct ListDirectoryTool {
    workdir: PathBuf,
}

impl ListDirectoryTool {
    pub fn new(workdir: PathBuf) -> Self {
        Self { workdir }
    }
}

#[async_trait]
impl Capability for ListDirectoryTool {
    fn name(&self) -> &str {
        "ListDirectoryTool"
    }

    fn describe(&self) -> String {
        "List the entries of a directory. Required parameter: 'path' (directory path). \
         Subdirectories are suffixed with '/'."
            .into()
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn validate(&self, args: &Arguments) -> Validation {
        let Some(raw) = str_arg(args, "path") else {
            return Validation::missing("path");
        };
        let path = resolve(&self.workdir, raw);
        if !path.exists() {
            return Validation::reject(
                RejectionKind::NotFound,
                format!("Directory not found: {raw}"),
            );
        }
        if !path.is_dir() {
            return Validation::reject(
                RejectionKind::NotADirectory,
                format!("Not a directory: {raw}"),
            );
        }
        Validation::accept()
    }

    async fn execute(&self, args: &Arguments) -> String {
        let raw = str_arg(args, "path").unwrap_or_default();
        let path = resolve(&self.workdir, raw);

        let mut entries = match list_entries(&path).await {
            Ok(entries) => entries,
            Err(err) => return format!("Error listing directory: {err}"),
        };
        if entries.is_empty() {
            return format!("Directory {raw} is empty");
        }
        entries.sort();

        let mut lines = vec![format!("Contents of {raw} ({} entries):", entries.len())];
        lines.extend(
            entries
                .iter()
                .take(LIST_LIMIT_ENTRIES)
                .map(|entry| format!("- {entry}")),
        );
        if entries.len() > LIST_LIMIT_ENTRIES {
            lines.push(format!(
                "... and {} more entries",
                entries.len() - LIST_LIMIT_ENTRIES
            ));
        }
        lines.join("\n")
    }
}

async fn list_entries(path: &Path) -> Result<Vec<String>, CapabilityError> {
    let read_err = |source| CapabilityError::Read {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = fs::read_dir(path).await.map_err(read_err)?;
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await.map_err(read_err)? {
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type().await.map(|kind| kind.is_dir()).unwrap_or(false) {
            name.push('/');
        }
        entries.push(name);
    }
    Ok(entries)
}

/// Checks shared by the mutating file capabilities.
fn check_target(tool: &str, args: &Arguments) -> Result<PathBuf, Validation> {
    let Some(raw) = str_arg(args, "file_path") else {
        return Err(Validation::reject(
            RejectionKind::MissingArgument,
            "Missing required parameter: 'file_path' (must be an absolute path)",
        ));
    };
    let path = PathBuf::from(raw);
    if !path.is_absolute() {
        return Err(Validation::reject(
            RejectionKind::InvalidArgument,
            format!("file_path must be an absolute path, got: {raw}"),
        ));
    }
    if path.extension().is_some_and(|ext| ext == "ipynb") {
        return Err(Validation::reject(
            RejectionKind::Forbidden,
            format!("Jupyter notebooks (.ipynb) cannot be modified with {tool}"),
        ));
    }
    Ok(path)
}

fn check_parent(path: &Path) -> Option<Validation> {
    let parent = path.parent()?;
    if !parent.exists() {
        return Some(Validation::reject(
            RejectionKind::NotFound,
            format!(
                "Parent directory does not exist: {}. Use ListDirectoryTool to verify correct path.",
                parent.display()
            ),
        ));
    }
    if !parent.is_dir() {
        return Some(Validation::reject(
            RejectionKind::NotADirectory,
            format!("Parent path is not a directory: {}", parent.display()),
        ));
    }
    None
}

pub struct FileWriteTool;

#[async_trait]
impl Capability for FileWriteTool {
    fn name(&self) -> &str {
        "FileWriteTool"
    }

    fn describe(&self) -> String {
        "Write a file to the local filesystem, overwriting any existing file. \
         Required parameters: 'file_path' (absolute path) and 'content'. \
         Read the file first and verify the parent directory exists."
            .into()
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn validate(&self, args: &Arguments) -> Validation {
        let path = match check_target(self.name(), args) {
            Ok(path) => path,
            Err(rejection) => return rejection,
        };
        if str_arg(args, "content").is_none() {
            return Validation::reject(
                RejectionKind::MissingArgument,
                "Missing required parameter: 'content' (the content to write to the file)",
            );
        }
        check_parent(&path).unwrap_or_else(Validation::accept)
    }

    async fn execute(&self, args: &Arguments) -> String {
        let path = PathBuf::from(str_arg(args, "file_path").unwrap_or_default());
        let content = str_arg(args, "content").unwrap_or_default();
        let overwrite = fs::try_exists(&path).await.unwrap_or(false);

        if let Err(source) = fs::write(&path, content).await {
            let err = CapabilityError::Write { path, source };
            return format!("Error writing to file: {err}");
        }

        let verb = if overwrite {
            "overwrote existing file"
        } else {
            "created new file"
        };
        format!(
            "Successfully {verb}: {}\nWrote {} characters.",
            path.display(),
            content.chars().count()
        )
    }
}

pub struct FileEditTool;

#[async_trait]
impl Capability for FileEditTool {
    fn name(&self) -> &str {
        "FileEditTool"
    }

    fn describe(&self) -> String {
        "Edit a file by replacing ONE occurrence of text. Required parameters: \
         'file_path' (absolute path), 'old_string' (must match the file exactly and uniquely, \
         including whitespace; empty to create a new file) and 'new_string'. \
         Use BashTool with 'mv' to move or rename files and FileWriteTool for larger rewrites."
            .into()
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn validate(&self, args: &Arguments) -> Validation {
        let path = match check_target(self.name(), args) {
            Ok(path) => path,
            Err(rejection) => return rejection,
        };
        let old_string = str_arg(args, "old_string").unwrap_or_default();
        if !old_string.is_empty() && !path.exists() {
            return Validation::reject(
                RejectionKind::NotFound,
                format!("File not found: {}", path.display()),
            );
        }
        if str_arg(args, "new_string").is_none() {
            return Validation::missing("new_string");
        }
        if old_string.is_empty() && !path.exists() {
            if let Some(rejection) = check_parent(&path) {
                return rejection;
            }
        }
        Validation::accept()
    }

    async fn execute(&self, args: &Arguments) -> String {
        let path = PathBuf::from(str_arg(args, "file_path").unwrap_or_default());
        let old_string = str_arg(args, "old_string").unwrap_or_default();
        let new_string = str_arg(args, "new_string").unwrap_or_default();

        if old_string.is_empty() && !fs::try_exists(&path).await.unwrap_or(false) {
            return match fs::write(&path, new_string).await {
                Ok(()) => format!("Successfully created new file: {}", path.display()),
                Err(source) => {
                    let err = CapabilityError::Write { path, source };
                    format!("Error editing file: {err}")
                }
            };
        }

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(source) => {
                let err = CapabilityError::Read { path, source };
                return format!("Error editing file: {err}");
            }
        };

        let occurrences = if old_string.is_empty() {
            0
        } else {
            content.matches(old_string).count()
        };
        match occurrences {
            0 => {
                return "Error: old_string not found in file. Ensure exact match including \
                        whitespace and indentation."
                    .into();
            }
            1 => {}
            count => {
                return format!(
                    "Error: old_string appears {count} times in file. Must uniquely identify \
                     a single instance with sufficient context."
                );
            }
        }

        let updated = content.replacen(old_string, new_string, 1);
        if let Err(source) = fs::write(&path, updated).await {
            let err = CapabilityError::Write { path, source };
            return format!("Error editing file: {err}");
        }

        let changed = new_string.chars().count().abs_diff(old_string.chars().count());
        format!(
            "Successfully modified file: {}\nChanged {changed} characters. \
             One occurrence of the specified text was replaced.",
            path.display()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn args(value: serde_json::Value) -> Arguments {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn reads_a_line_range() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "one\ntwo\nthree\nfour\n").unwrap();
        let tool = FileReadTool::new(dir.path().to_path_buf());

        let call = args(json!({"path": "notes.txt", "lines": "2-3"}));
        assert!(tool.validate(&call).is_accepted());
        assert_eq!(tool.execute(&call).await, "Content of notes.txt:\ntwo\nthree\n");
    }

    #[tokio::test]
    async fn long_files_are_truncated() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("big.txt"), "x".repeat(5000)).unwrap();
        let tool = FileReadTool::new(dir.path().to_path_buf());

        let output = tool.execute(&args(json!({"path": "big.txt"}))).await;
        assert!(output.starts_with("Content of big.txt (truncated):\n"));
        assert!(output.ends_with("\n...[content truncated]"));
    }

    #[test]
    fn reading_a_directory_is_not_a_file() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        let tool = FileReadTool::new(dir.path().to_path_buf());

        assert_eq!(
            tool.validate(&args(json!({"path": "src"}))),
            Validation::reject(RejectionKind::NotAFile, "Not a file: src")
        );
        assert_eq!(
            tool.validate(&args(json!({"path": "missing.rs"}))),
            Validation::reject(RejectionKind::NotFound, "File not found: missing.rs")
        );
    }

    #[tokio::test]
    async fn lists_directories_with_suffix() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "").unwrap();
        let tool = ListDirectoryTool::new(dir.path().to_path_buf());

        let output = tool.execute(&args(json!({"path": "."}))).await;
        assert_eq!(output, "Contents of . (2 entries):\n- Cargo.toml\n- src/");
    }

    #[tokio::test]
    async fn write_requires_absolute_path_and_existing_parent() {
        let dir = tempdir().unwrap();
        let tool = FileWriteTool;

        let relative = tool.validate(&args(json!({"file_path": "out.txt", "content": "x"})));
        assert!(matches!(
            relative,
            Validation::Reject {
                kind: RejectionKind::InvalidArgument,
                ..
            }
        ));

        let orphan = dir.path().join("nope/out.txt");
        let orphaned = tool.validate(&args(json!({"file_path": orphan, "content": "x"})));
        assert!(matches!(
            orphaned,
            Validation::Reject {
                kind: RejectionKind::NotFound,
                ..
            }
        ));

        let target = dir.path().join("out.txt");
        let call = args(json!({"file_path": target, "content": "hello"}));
        assert!(tool.validate(&call).is_accepted());
        let output = tool.execute(&call).await;
        assert!(output.starts_with("Successfully created new file"));
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "hello");
    }

    #[test]
    fn notebooks_are_refused() {
        let call = args(json!({"file_path": "/tmp/analysis.ipynb", "content": "{}"}));
        assert!(matches!(
            FileWriteTool.validate(&call),
            Validation::Reject {
                kind: RejectionKind::Forbidden,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn edit_replaces_a_unique_occurrence() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("lib.rs");
        std::fs::write(&target, "fn a() {}\nfn b() {}\n").unwrap();

        let call = args(json!({
            "file_path": target,
            "old_string": "fn b() {}",
            "new_string": "fn c() {}"
        }));
        assert!(FileEditTool.validate(&call).is_accepted());
        let output = FileEditTool.execute(&call).await;
        assert!(output.starts_with("Successfully modified file"));
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "fn a() {}\nfn c() {}\n");
    }

    #[tokio::test]
    async fn edit_refuses_ambiguous_matches() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("dup.txt");
        std::fs::write(&target, "x\nx\n").unwrap();

        let call = args(json!({"file_path": target, "old_string": "x", "new_string": "y"}));
        let output = FileEditTool.execute(&call).await;
        assert!(output.starts_with("Error: old_string appears 2 times"));
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "x\nx\n");
    }

    #[tokio::test]
    async fn edit_with_empty_old_string_creates_file() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("new.txt");

        let call = args(json!({"file_path": target, "old_string": "", "new_string": "fresh"}));
        assert!(FileEditTool.validate(&call).is_accepted());
        let output = FileEditTool.execute(&call).await;
        assert!(output.starts_with("Successfully created new file"));
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "fresh");
    }
}
