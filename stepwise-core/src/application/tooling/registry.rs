use super::capability::{Capability, CapabilityDescriptor, Validation};
use super::error::RegistryError;
use crate::config::ToolFilter;
use crate::types::Arguments;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Capabilities active for one run, keyed by unique name.
#[derive(Default, Clone)]
pub struct CapabilityRegistry {
    entries: Vec<Arc<dyn Capability>>,
    index: HashMap<String, usize>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-run registration: the catalog, narrowed to read-only capabilities
    /// in safe mode, then to the persona's allow-list.
    pub fn select(
        catalog: Vec<Arc<dyn Capability>>,
        safe_mode: bool,
        filter: &ToolFilter,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for capability in catalog {
            if safe_mode && !capability.is_read_only() {
                debug!(capability = capability.name(), "Skipping mutating capability in safe mode");
                continue;
            }
            if !filter.allows(capability.name()) {
                continue;
            }
            registry.register(capability)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, capability: Arc<dyn Capability>) -> Result<(), RegistryError> {
        let name = capability.name().to_string();
        if self.index.contains_key(&name) {
            return Err(RegistryError::Duplicate { name });
        }
        self.index.insert(name, self.entries.len());
        self.entries.push(capability);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Capability>> {
        self.index.get(name).map(|&position| &self.entries[position])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|capability| capability.name()).collect()
    }

    pub fn descriptors(&self) -> Vec<CapabilityDescriptor> {
        self.entries
            .iter()
            .map(|capability| CapabilityDescriptor::of(capability.as_ref()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn validate(&self, name: &str, args: &Arguments) -> Result<Validation, RegistryError> {
        self.get(name)
            .map(|capability| capability.validate(args))
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
            })
    }
}
