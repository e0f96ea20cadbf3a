//! Resolution of plugin names to plugin handles.

use std::collections::HashMap;
use std::sync::Arc;

use crate::{FlavorPlugin, InstancePlugin};

/// Resolves plugin names found in group specs.
pub trait PluginLookup: Send + Sync {
    fn instance_plugin(&self, name: &str) -> Option<Arc<dyn InstancePlugin>>;

    fn flavor_plugin(&self, name: &str) -> Option<Arc<dyn FlavorPlugin>>;
}

/// A fixed table of plugins registered at startup.
#[derive(Default, Clone)]
pub struct StaticPlugins {
    instances: HashMap<String, Arc<dyn InstancePlugin>>,
    flavors: HashMap<String, Arc<dyn FlavorPlugin>>,
}

impl StaticPlugins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instance plugin under `name`, replacing any previous one.
    pub fn with_instance(mut self, name: impl Into<String>, plugin: Arc<dyn InstancePlugin>) -> Self {
        self.instances.insert(name.into(), plugin);
        self
    }

    /// Register a flavor plugin under `name`, replacing any previous one.
    pub fn with_flavor(mut self, name: impl Into<String>, plugin: Arc<dyn FlavorPlugin>) -> Self {
        self.flavors.insert(name.into(), plugin);
        self
    }
}

impl PluginLookup for StaticPlugins {
    fn instance_plugin(&self, name: &str) -> Option<Arc<dyn InstancePlugin>> {
        self.instances.get(name).cloned()
    }

    fn flavor_plugin(&self, name: &str) -> Option<Arc<dyn FlavorPlugin>> {
        self.flavors.get(name).cloned()
    }
}

impl std::fmt::Debug for StaticPlugins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut instances: Vec<_> = self.instances.keys().collect();
        let mut flavors: Vec<_> = self.flavors.keys().collect();
        instances.sort();
        flavors.sort();
        f.debug_struct("StaticPlugins")
            .field("instances", &instances)
            .field("flavors", &flavors)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryInstancePlugin, VanillaFlavor};

    #[test]
    fn test_lookup_by_name() {
        let plugins = StaticPlugins::new()
            .with_instance("memory", Arc::new(MemoryInstancePlugin::new()))
            .with_flavor("vanilla", Arc::new(VanillaFlavor));

        assert!(plugins.instance_plugin("memory").is_some());
        assert!(plugins.instance_plugin("aws").is_none());
        assert!(plugins.flavor_plugin("vanilla").is_some());
        assert!(plugins.flavor_plugin("memory").is_none());
    }
}
