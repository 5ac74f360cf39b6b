//! Cache of tool descriptors discovered from a server.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::protocol::ToolDescriptor;

/// Tool descriptors keyed by name.
///
/// Replaced wholesale on every discovery and cleared on teardown.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, ToolDescriptor>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached tools; later duplicates of a name win.
    pub fn replace(&self, tools: Vec<ToolDescriptor>) {
        let map = tools
            .into_iter()
            .map(|tool| (tool.name.clone(), tool))
            .collect();
        *self.tools.write() = map;
    }

    /// Snapshot of all cached tools, sorted by name.
    pub fn list(&self) -> Vec<ToolDescriptor> {
        let mut tools: Vec<_> = self.tools.read().values().cloned().collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Look up one tool.
    pub fn get(&self, name: &str) -> Option<ToolDescriptor> {
        self.tools.read().get(name).cloned()
    }

    /// Whether a tool with this name is cached.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    /// Number of cached tools.
    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }

    /// Drop all cached tools.
    pub fn clear(&self) {
        self.tools.write().clear();
    }
}
