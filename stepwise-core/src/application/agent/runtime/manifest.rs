use crate::application::tooling::CapabilityDescriptor;
use crate::constants::{CALL_BEGIN, CALL_END};

/// Renders the capability manifest appended to the system entry.
pub trait ManifestRenderer: Send + Sync {
    fn render(&self, capabilities: &[CapabilityDescriptor]) -> String;
}

/// Plain-text manifest: one line per capability plus the call format.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextManifest;

impl ManifestRenderer for TextManifest {
    fn render(&self, capabilities: &[CapabilityDescriptor]) -> String {
        let mut lines = Vec::with_capacity(capabilities.len() + 4);

        if capabilities.is_empty() {
            lines.push("No tools are available for this task; answer directly.".to_string());
            return lines.join("\n");
        }

        lines.push("Available tools:".to_string());
        for descriptor in capabilities {
            lines.push(format!("- {}: {}", descriptor.name, descriptor.description));
        }
        lines.push(String::new());
        lines.push(format!(
            "When calling a tool, always use the {CALL_BEGIN} and {CALL_END} tags with valid JSON."
        ));
        lines.push(format!(
            "The format must be: {CALL_BEGIN}{{\"name\":\"TOOL_NAME\",\"parameters\":{{\"key\":\"value\"}}}}{CALL_END}"
        ));
        lines.push(
            "Call at most one tool per reply. Reply with plain text once the task is complete."
                .to_string(),
        );

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_every_capability_with_call_format() {
        let descriptors = vec![
            CapabilityDescriptor {
                name: "GlobTool".into(),
                description: "Find files".into(),
                read_only: true,
            },
            CapabilityDescriptor {
                name: "BashTool".into(),
                description: "Run commands".into(),
                read_only: false,
            },
        ];
        let manifest = TextManifest.render(&descriptors);
        assert!(manifest.starts_with("Available tools:\n- GlobTool: Find files\n- BashTool: Run commands"));
        assert!(manifest.contains(
            r#"<FunctionCallBegin>{"name":"TOOL_NAME","parameters":{"key":"value"}}<FunctionCallEnd>"#
        ));
    }

    #[test]
    fn empty_registry_asks_for_direct_answer() {
        assert!(TextManifest.render(&[]).contains("answer directly"));
    }
}
