//! Built-in flashing (copy) plugins.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::error;

use super::mount::{DeviceResolver, wait_for_mount};
use super::traits::{Plugin, PluginParams, PluginType, check_parameters, run_command};

const DEFAULT_POLLING_TIMEOUT: u64 = 60;

fn mount_ready(
    params: &PluginParams,
    resolver: Option<&dyn DeviceResolver>,
) -> Option<std::path::PathBuf> {
    let disk = params.get_path("destination_disk")?;
    let timeout = params
        .get_u64("polling_timeout")
        .unwrap_or(DEFAULT_POLLING_TIMEOUT);
    let (ready, disk) = wait_for_mount(
        &disk,
        params.get("target_id"),
        Duration::from_secs(timeout),
        resolver,
    );
    ready.then_some(disk)
}

/// Generic drag-and-drop flashing: copy the image onto the mount point.
pub struct CopyTargetPlugin {
    resolver: Option<Arc<dyn DeviceResolver>>,
}

impl CopyTargetPlugin {
    pub fn new(resolver: Option<Arc<dyn DeviceResolver>>) -> Self {
        Self { resolver }
    }

    fn copy_image(&self, image_path: &Path, destination_disk: &Path) -> bool {
        let Some(file_name) = image_path.file_name() else {
            error!(image = %image_path.display(), "image path has no file name");
            return false;
        };
        let target = destination_disk.join(file_name);
        match fs::copy(image_path, &target) {
            Ok(_) => {
                // Force the image out to the device before the reset that
                // follows; a cached copy is an incomplete flash.
                if let Ok(file) = fs::File::open(&target) {
                    let _ = file.sync_all();
                }
                true
            }
            Err(e) => {
                error!(
                    image = %image_path.display(),
                    target = %target.display(),
                    error = %e,
                    "image copy failed"
                );
                false
            }
        }
    }
}

impl Plugin for CopyTargetPlugin {
    fn name(&self) -> &str {
        "copy_target"
    }
    fn plugin_type(&self) -> PluginType {
        PluginType::CopyMethod
    }
    fn capabilities(&self) -> &[&str] {
        &["default", "cp"]
    }
    fn required_parameters(&self) -> &[&str] {
        &["image_path", "destination_disk"]
    }

    fn execute(&self, capability: &str, params: &PluginParams) -> bool {
        if !check_parameters(self, capability, params) {
            return false;
        }
        let image_path = params.get_path("image_path").unwrap();
        let Some(disk) = mount_ready(params, self.resolver.as_deref()) else {
            return false;
        };
        self.copy_image(&image_path, &disk)
    }
}

/// Flashing through a platform shell copy command.
pub struct CopyShellPlugin {
    resolver: Option<Arc<dyn DeviceResolver>>,
}

impl CopyShellPlugin {
    pub fn new(resolver: Option<Arc<dyn DeviceResolver>>) -> Self {
        Self { resolver }
    }
}

impl Plugin for CopyShellPlugin {
    fn name(&self) -> &str {
        "copy_shell"
    }
    fn plugin_type(&self) -> PluginType {
        PluginType::CopyMethod
    }
    fn capabilities(&self) -> &[&str] {
        &["shell"]
    }
    fn required_parameters(&self) -> &[&str] {
        &["image_path", "destination_disk"]
    }

    fn execute(&self, capability: &str, params: &PluginParams) -> bool {
        if !check_parameters(self, capability, params) {
            return false;
        }
        let image_path = params.get_path("image_path").unwrap();
        let Some(disk) = mount_ready(params, self.resolver.as_deref()) else {
            return false;
        };

        let cmd = if cfg!(windows) {
            format!("copy \"{}\" \"{}\"", image_path.display(), disk.display())
        } else {
            format!("cp \"{}\" \"{}\"", image_path.display(), disk.display())
        };
        run_command(&cmd)
    }
}
