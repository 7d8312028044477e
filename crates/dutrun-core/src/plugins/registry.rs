//! Plugin registry and capability dispatch.

use tracing::{debug, error};

use super::traits::{Plugin, PluginParams, PluginType};

/// Listing entry describing one registered plugin.
#[derive(Debug, Clone)]
pub struct PluginInfo {
    pub name: String,
    pub plugin_type: PluginType,
    pub capabilities: Vec<String>,
    pub required_parameters: Vec<String>,
    pub stable: bool,
    /// Whether the current host platform can run this plugin. Unsupported
    /// plugins stay listed; they are only skipped for dispatch.
    pub os_supported: bool,
}

/// Registry of copy/reset plugins.
///
/// Registration happens once at startup; after that the registry is
/// read-only and `call` takes `&self`, so concurrent dispatch from
/// multiple runs is safe.
#[derive(Default)]
pub struct PluginRegistry {
    /// Insertion order is the dispatch tie-break for overlapping
    /// capabilities: first registered wins.
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register and set up a plugin.
    ///
    /// Fails (logged, `false`) on a duplicate name or when the plugin's
    /// own `setup` step fails.
    pub fn register(&mut self, mut plugin: Box<dyn Plugin>) -> bool {
        if self.plugins.iter().any(|p| p.name() == plugin.name()) {
            error!(plugin = plugin.name(), "plugin load failed: already loaded");
            return false;
        }
        if !plugin.setup() {
            error!(plugin = plugin.name(), "plugin load failed: setup failed");
            return false;
        }
        debug!(plugin = plugin.name(), type_ = %plugin.plugin_type(), "plugin registered");
        self.plugins.push(plugin);
        true
    }

    /// Dispatch a capability call.
    ///
    /// Plugins are tried in registration order; the first one whose type
    /// matches and whose capability set contains `capability` executes.
    /// Plugins unsupported on this OS are skipped. `false` when nothing
    /// matches.
    pub fn call(
        &self,
        plugin_type: PluginType,
        capability: &str,
        params: &PluginParams,
    ) -> bool {
        for plugin in &self.plugins {
            if plugin.plugin_type() == plugin_type
                && plugin.capabilities().contains(&capability)
            {
                if !plugin.is_os_supported() {
                    debug!(
                        plugin = plugin.name(),
                        capability, "skipping plugin unsupported on this OS"
                    );
                    continue;
                }
                debug!(plugin = plugin.name(), capability, "dispatching plugin call");
                return plugin.execute(capability, params);
            }
        }
        error!(type_ = %plugin_type, capability, "no plugin declares capability");
        false
    }

    /// All capabilities declared by plugins of one type, sorted.
    pub fn capabilities_of(&self, plugin_type: PluginType) -> Vec<String> {
        let mut caps: Vec<String> = self
            .plugins
            .iter()
            .filter(|p| p.plugin_type() == plugin_type)
            .flat_map(|p| p.capabilities().iter().map(|c| c.to_string()))
            .collect();
        caps.sort();
        caps
    }

    /// Listing of every registered plugin, unsupported ones included.
    pub fn plugin_info(&self) -> Vec<PluginInfo> {
        self.plugins
            .iter()
            .map(|p| PluginInfo {
                name: p.name().to_string(),
                plugin_type: p.plugin_type(),
                capabilities: p.capabilities().iter().map(|c| c.to_string()).collect(),
                required_parameters: p
                    .required_parameters()
                    .iter()
                    .map(|r| r.to_string())
                    .collect(),
                stable: p.stable(),
                os_supported: p.is_os_supported(),
            })
            .collect()
    }
}
