//! Built-in capabilities offered to the model.

mod file;
mod search;
mod shell;
mod think;
mod todo;

pub use file::{FileEditTool, FileReadTool, FileWriteTool, ListDirectoryTool};
pub use search::{GlobTool, GrepTool};
pub use shell::BashTool;
pub use think::ThinkTool;
pub use todo::{TODO_FILE, TodoWriteTool};

use crate::tooling::Capability;
use crate::types::Arguments;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Every built-in capability, rooted at `workdir` for relative paths.
pub fn builtin_catalog(workdir: &Path) -> Vec<Arc<dyn Capability>> {
    let workdir = workdir.to_path_buf();
    vec![
        Arc::new(FileReadTool::new(workdir.clone())),
        Arc::new(ListDirectoryTool::new(workdir.clone())),
        Arc::new(GlobTool::new(workdir.clone())),
        Arc::new(GrepTool::new(workdir.clone())),
        Arc::new(ThinkTool),
        Arc::new(FileWriteTool),
        Arc::new(FileEditTool),
        Arc::new(BashTool::new(workdir.clone())),
        Arc::new(TodoWriteTool::new(workdir)),
    ]
}

pub(crate) fn str_arg<'a>(args: &'a Arguments, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

pub(crate) fn resolve(workdir: &Path, raw: &str) -> PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workdir.join(path)
    }
}

/// Cut `text` to at most `limit` characters, on a char boundary.
pub(crate) fn truncate_chars(text: &str, limit: usize) -> (&str, bool) {
    match text.char_indices().nth(limit) {
        Some((index, _)) => (&text[..index], true),
        None => (text, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_names_are_unique() {
        let catalog = builtin_catalog(Path::new("."));
        let mut names: Vec<_> = catalog.iter().map(|c| c.name().to_string()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 9);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), ("hé", true));
        assert_eq!(truncate_chars("abc", 3), ("abc", false));
    }

    #[test]
    fn relative_paths_resolve_against_workdir() {
        assert_eq!(resolve(Path::new("/work"), "a.txt"), PathBuf::from("/work/a.txt"));
        assert_eq!(resolve(Path::new("/work"), "/etc/hosts"), PathBuf::from("/etc/hosts"));
    }
}
