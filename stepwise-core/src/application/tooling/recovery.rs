use super::capability::RejectionKind;
use super::registry::CapabilityRegistry;
use crate::application::agent::runtime::codec::CallRequest;
use crate::types::Arguments;
use serde_json::Value;

pub const LIST_DIRECTORY: &str = "ListDirectoryTool";
pub const SHELL: &str = "BashTool";

/// Hook that may replace a rejected call with a substitute call.
pub trait RecoveryPolicy: Send + Sync {
    fn recover(
        &self,
        kind: RejectionKind,
        call: &CallRequest,
        registry: &CapabilityRegistry,
    ) -> Option<CallRequest>;
}

/// Turns "read a directory" mistakes into a directory listing.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectoryListingRecovery;

impl RecoveryPolicy for DirectoryListingRecovery {
    fn recover(
        &self,
        kind: RejectionKind,
        call: &CallRequest,
        registry: &CapabilityRegistry,
    ) -> Option<CallRequest> {
        if kind != RejectionKind::NotAFile {
            return None;
        }
        if !registry.get(&call.name)?.is_read_only() {
            return None;
        }

        let path = ["path", "file_path"]
            .iter()
            .find_map(|key| call.arguments.get(*key).and_then(Value::as_str))?;

        let mut arguments = Arguments::new();
        if registry.contains(LIST_DIRECTORY) {
            arguments.insert("path".into(), Value::String(path.to_string()));
            return Some(CallRequest {
                name: LIST_DIRECTORY.to_string(),
                arguments,
            });
        }
        if registry.contains(SHELL) {
            arguments.insert(
                "command".into(),
                Value::String(format!("ls -la {}", shell_quote(path))),
            );
            return Some(CallRequest {
                name: SHELL.to_string(),
                arguments,
            });
        }
        None
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
