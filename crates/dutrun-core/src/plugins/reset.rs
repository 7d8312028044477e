//! Built-in reset plugins.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use tracing::error;

use super::mount::{DeviceResolver, wait_for_mount};
use super::traits::{Plugin, PluginParams, PluginType, check_parameters, run_command};
use crate::protocol::DEFAULT_BAUD_RATE;
use crate::transport::safe_send_break;

/// Default reset: open the console port and send a break condition.
pub struct ResetTargetPlugin;

impl Plugin for ResetTargetPlugin {
    fn name(&self) -> &str {
        "reset_target"
    }
    fn plugin_type(&self) -> PluginType {
        PluginType::ResetMethod
    }
    fn capabilities(&self) -> &[&str] {
        &["default"]
    }
    fn required_parameters(&self) -> &[&str] {
        &["serial_port"]
    }

    fn execute(&self, capability: &str, params: &PluginParams) -> bool {
        if !check_parameters(self, capability, params) {
            return false;
        }
        let port_name = params.get("serial_port").unwrap();
        let baud = params
            .get_u64("baud_rate")
            .map(|b| b as u32)
            .unwrap_or(DEFAULT_BAUD_RATE);

        match serialport::new(port_name, baud)
            .timeout(Duration::from_secs(1))
            .open()
        {
            Ok(mut port) => safe_send_break(port.as_mut()),
            Err(e) => {
                error!(port = port_name, error = %e, "cannot open serial port for reset");
                false
            }
        }
    }
}

/// MPS2-family reset: drop a `reboot.txt` onto the mount point.
pub struct ResetRebootTxtPlugin {
    resolver: Option<Arc<dyn DeviceResolver>>,
}

impl ResetRebootTxtPlugin {
    pub fn new(resolver: Option<Arc<dyn DeviceResolver>>) -> Self {
        Self { resolver }
    }
}

impl Plugin for ResetRebootTxtPlugin {
    fn name(&self) -> &str {
        "reset_reboot_txt"
    }
    fn plugin_type(&self) -> PluginType {
        PluginType::ResetMethod
    }
    fn capabilities(&self) -> &[&str] {
        &["reboot_txt"]
    }
    fn required_parameters(&self) -> &[&str] {
        &["destination_disk"]
    }
    fn stable(&self) -> bool {
        false
    }

    fn execute(&self, capability: &str, params: &PluginParams) -> bool {
        if !check_parameters(self, capability, params) {
            return false;
        }
        let disk = params.get_path("destination_disk").unwrap();
        let reboot_file = disk.join("reboot.txt");
        if let Err(e) = fs::write(&reboot_file, b"") {
            error!(path = %reboot_file.display(), error = %e, "cannot write reboot file");
            return false;
        }
        // Make sure the file reaches the board before we wait for it to
        // come back up.
        if cfg!(unix) {
            run_command(&format!("sync -f \"{}\"", reboot_file.display()));
        }
        std::thread::sleep(Duration::from_secs(3));

        let timeout = params.get_u64("polling_timeout").unwrap_or(60);
        let (ready, _) = wait_for_mount(
            &disk,
            params.get("target_id"),
            Duration::from_secs(timeout),
            self.resolver.as_deref(),
        );
        ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_target_requires_serial_port() {
        let plugin = ResetTargetPlugin;
        assert!(!plugin.execute("default", &PluginParams::new()));
    }

    #[test]
    fn reboot_txt_requires_disk() {
        let plugin = ResetRebootTxtPlugin::new(None);
        assert!(!plugin.execute("reboot_txt", &PluginParams::new()));
    }
}
