//! Plugin trait and call parameters.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Command;

use tracing::{debug, error};

/// What a plugin does to the DUT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginType {
    /// Flashes an image onto the target.
    CopyMethod,
    /// Resets the target.
    ResetMethod,
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginType::CopyMethod => write!(f, "CopyMethod"),
            PluginType::ResetMethod => write!(f, "ResetMethod"),
        }
    }
}

/// Named string parameters passed to a plugin call.
#[derive(Debug, Clone, Default)]
pub struct PluginParams {
    values: BTreeMap<String, String>,
}

impl PluginParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn get_path(&self, name: &str) -> Option<PathBuf> {
        self.get(name).map(PathBuf::from)
    }

    pub fn get_u64(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(|v| v.parse().ok())
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|v| v.parse().ok())
    }

    /// Whether the parameter is present with a non-empty value.
    pub fn has_nonempty(&self, name: &str) -> bool {
        self.get(name).is_some_and(|v| !v.is_empty())
    }
}

/// A hardware-operation capability provider.
///
/// A plugin declares the capabilities it can perform and the parameters
/// each call must carry; the registry dispatches by `(type, capability)`.
pub trait Plugin: Send + Sync {
    /// Unique plugin name; registration identity.
    fn name(&self) -> &str;

    fn plugin_type(&self) -> PluginType;

    /// Capability names this plugin can execute.
    fn capabilities(&self) -> &[&str];

    /// Parameters that must be present and non-empty on every call.
    fn required_parameters(&self) -> &[&str];

    /// Whether the plugin is considered stable.
    fn stable(&self) -> bool {
        true
    }

    /// Whether the current host platform can run this plugin.
    fn is_os_supported(&self) -> bool {
        true
    }

    /// One-time configuration; called at registration. A `false` result
    /// rejects the plugin.
    fn setup(&mut self) -> bool {
        true
    }

    /// Execute a capability. `false` on any failure; failures are logged
    /// inside the plugin, never raised across the registry boundary.
    fn execute(&self, capability: &str, params: &PluginParams) -> bool;
}

/// Validate that every required parameter is present and non-empty.
///
/// A missing parameter is a logged error and a `false` result.
pub fn check_parameters(plugin: &dyn Plugin, capability: &str, params: &PluginParams) -> bool {
    let mut ok = true;
    for &name in plugin.required_parameters() {
        if !params.has_nonempty(name) {
            error!(
                plugin = plugin.name(),
                capability,
                parameter = name,
                "required parameter missing or empty"
            );
            ok = false;
        }
    }
    ok
}

/// Shell out one command line, logging output on failure.
///
/// Shared by plugins whose capability is a platform command rather than a
/// library call.
pub fn run_command(cmd: &str) -> bool {
    debug!(cmd, "running command");
    let output = if cfg!(windows) {
        Command::new("cmd").args(["/C", cmd]).output()
    } else {
        Command::new("sh").args(["-c", cmd]).output()
    };

    match output {
        Ok(output) if output.status.success() => true,
        Ok(output) => {
            error!(
                cmd,
                status = %output.status,
                stdout = %String::from_utf8_lossy(&output.stdout).trim_end(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim_end(),
                "command failed"
            );
            false
        }
        Err(e) => {
            error!(cmd, error = %e, "command could not be started");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy;

    impl Plugin for Dummy {
        fn name(&self) -> &str {
            "dummy"
        }
        fn plugin_type(&self) -> PluginType {
            PluginType::CopyMethod
        }
        fn capabilities(&self) -> &[&str] {
            &["default"]
        }
        fn required_parameters(&self) -> &[&str] {
            &["image_path", "destination_disk"]
        }
        fn execute(&self, _capability: &str, _params: &PluginParams) -> bool {
            true
        }
    }

    #[test]
    fn typed_getters() {
        let params = PluginParams::new()
            .set("polling_timeout", "60")
            .set("program_cycle_s", "2.5")
            .set("image_path", "/tmp/test.bin");

        assert_eq!(params.get_u64("polling_timeout"), Some(60));
        assert_eq!(params.get_f64("program_cycle_s"), Some(2.5));
        assert_eq!(params.get_path("image_path"), Some("/tmp/test.bin".into()));
        assert_eq!(params.get("missing"), None);
    }

    #[test]
    fn check_parameters_rejects_missing_and_empty() {
        let params = PluginParams::new()
            .set("image_path", "test.bin")
            .set("destination_disk", "");
        assert!(!check_parameters(&Dummy, "default", &params));

        let params = params.set("destination_disk", "/mnt/dut");
        assert!(check_parameters(&Dummy, "default", &params));
    }

    #[test]
    #[cfg(unix)]
    fn run_command_reports_status() {
        assert!(run_command("true"));
        assert!(!run_command("false"));
        assert!(!run_command("/no/such/binary_xyz 2>/dev/null || false"));
    }
}
