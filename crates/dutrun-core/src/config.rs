//! Run configuration.
//!
//! One [`RunConfig`] describes everything a single test run needs: the
//! target identity, the transport endpoint, flashing and reset method
//! selection, and all the timeouts bounding the run.

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::protocol::DEFAULT_BAUD_RATE;

/// Configuration for one test run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Target microcontroller name (platform identity).
    pub micro: Option<String>,
    /// Serial port of the target console.
    pub port: Option<String>,
    /// Console baud rate.
    pub baud_rate: u32,
    /// Target disk (mount point) used by drag-and-drop flashing.
    pub disk: Option<String>,
    /// Unique target id, used to re-resolve a moved mount point.
    pub target_id: Option<String>,
    /// Path to the binary image to flash.
    pub image_path: Option<String>,

    /// Copy (flash) method capability name.
    pub copy_method: Option<String>,
    /// Number of attempts to flash the target.
    pub retry_copy: u32,
    /// Forced reset method capability name.
    pub forced_reset_type: Option<String>,
    /// Idle delay in seconds after a forced reset.
    pub forced_reset_timeout: f64,
    /// Seconds to wait after copying the binary onto the target.
    pub program_cycle_s: f64,

    /// How many sync packets to send: 0 none, -1 forever, N times.
    pub sync_behavior: i32,
    /// Delay in seconds between sync packets.
    pub sync_timeout: f64,
    /// Overall test duration in seconds.
    pub duration: f64,
    /// Maximum time in seconds to wait for a spawned process to start.
    pub process_start_timeout: f64,
    /// Timeout in seconds for mount point / serial readiness polling.
    pub polling_timeout: u64,

    /// Remote resource manager locator backend module name.
    pub grm_module: Option<String>,
    /// Remote resource manager host.
    pub grm_host: Option<String>,
    /// Remote resource manager port.
    pub grm_port: Option<u16>,
    /// Comma separated device tags required when allocating a remote target.
    pub tag_filters: Option<String>,

    /// Simulator connection configuration name.
    pub sim_config: Option<String>,

    /// Path to a JSON file with host test configuration data.
    pub json_test_configuration: Option<String>,
    /// Host test name override; wins over the DUT-announced name.
    pub host_test_name: Option<String>,

    /// Skip the copy/flash plugin entirely.
    pub skip_flashing: bool,
    /// Skip the reset plugin.
    pub skip_reset: bool,
    /// Run-image mode: flash, reset and stream console output only.
    pub run_binary: bool,

    /// Save target serial output to this file.
    pub serial_output_file: Option<String>,
    /// Path to a JSON hooks file executed after the run.
    pub hooks_path: Option<String>,
    /// Build directory used as the fallback prefix for coverage artifacts.
    pub build_path: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            micro: None,
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            disk: None,
            target_id: None,
            image_path: None,
            copy_method: None,
            retry_copy: 3,
            forced_reset_type: None,
            forced_reset_timeout: 1.0,
            program_cycle_s: 4.0,
            sync_behavior: 2,
            sync_timeout: 5.0,
            duration: 10.0,
            process_start_timeout: 60.0,
            polling_timeout: 60,
            grm_module: None,
            grm_host: None,
            grm_port: None,
            tag_filters: None,
            sim_config: None,
            json_test_configuration: None,
            host_test_name: None,
            skip_flashing: false,
            skip_reset: false,
            run_binary: false,
            serial_output_file: None,
            hooks_path: None,
            build_path: None,
        }
    }
}

impl RunConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RunConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Tag filter list parsed from the comma separated `tag_filters` string.
    pub fn tags(&self) -> Vec<String> {
        self.tag_filters
            .as_deref()
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}
