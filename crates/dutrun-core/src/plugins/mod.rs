//! Flashing and reset plugins.
//!
//! Plugins map named hardware-operation capabilities to concrete
//! implementations; the registry dispatches by `(type, capability)` with
//! required-parameter and host-platform validation.

pub mod copy;
pub mod mount;
pub mod registry;
pub mod reset;
pub mod traits;

use std::sync::Arc;

pub use copy::{CopyShellPlugin, CopyTargetPlugin};
pub use mount::{DeviceResolver, wait_for_mount};
pub use registry::{PluginInfo, PluginRegistry};
pub use reset::{ResetRebootTxtPlugin, ResetTargetPlugin};
pub use traits::{Plugin, PluginParams, PluginType, check_parameters, run_command};

/// Build a registry with the built-in plugins in their fixed order.
///
/// Registration order matters: for overlapping capabilities the first
/// registered plugin wins dispatch.
pub fn builtin_registry(resolver: Option<Arc<dyn DeviceResolver>>) -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    registry.register(Box::new(CopyTargetPlugin::new(resolver.clone())));
    registry.register(Box::new(CopyShellPlugin::new(resolver.clone())));
    registry.register(Box::new(ResetTargetPlugin));
    registry.register(Box::new(ResetRebootTxtPlugin::new(resolver)));
    registry
}
