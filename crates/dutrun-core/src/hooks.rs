//! Post-run shell hooks.
//!
//! A hooks file is JSON with a `hooks` map of hook name to shell command.
//! Commands may carry `{tag}` placeholders that are substituted from the
//! tag map before the command is shelled out. A missing or malformed file
//! disables hooks for the run; it never fails it.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use serde::Deserialize;
use tracing::{debug, error, info, warn};

#[derive(Debug, Deserialize, Default)]
struct HooksFile {
    #[serde(default)]
    hooks: BTreeMap<String, String>,
}

/// Runs named shell commands from a hooks file.
pub struct HookRunner {
    hooks: BTreeMap<String, String>,
}

impl HookRunner {
    /// Load hooks from `path`; any I/O or parse error leaves the runner
    /// with no hooks.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let hooks = match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<HooksFile>(&content) {
                Ok(file) => file.hooks,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "hooks file parse failed");
                    BTreeMap::new()
                }
            },
            Err(e) => {
                error!(path = %path.display(), error = %e, "hooks file read failed");
                BTreeMap::new()
            }
        };
        if !hooks.is_empty() {
            debug!(count = hooks.len(), path = %path.display(), "hooks loaded");
        }
        Self { hooks }
    }

    /// A runner with no hooks; every `run_hook` is a no-op.
    pub fn disabled() -> Self {
        Self {
            hooks: BTreeMap::new(),
        }
    }

    pub fn is_hooked_to(&self, name: &str) -> bool {
        self.hooks.contains_key(name)
    }

    /// Format and execute the named hook; `true` on exit status 0.
    ///
    /// `{tag}` placeholders in the command are replaced with their tag-map
    /// values. An unhooked name is a silent no-op returning `false`.
    pub fn run_hook(&self, name: &str, tags: &BTreeMap<String, String>) -> bool {
        let Some(template) = self.hooks.get(name) else {
            return false;
        };

        let mut cmd = template.clone();
        for (tag, value) in tags {
            cmd = cmd.replace(&format!("{{{tag}}}"), value);
        }

        info!(hook = %name, cmd = %cmd, "executing hook");
        let status = if cfg!(windows) {
            Command::new("cmd").args(["/C", &cmd]).status()
        } else {
            Command::new("sh").args(["-c", &cmd]).status()
        };

        match status {
            Ok(status) if status.success() => true,
            Ok(status) => {
                warn!(hook = %name, code = ?status.code(), "hook exited with failure");
                false
            }
            Err(e) => {
                error!(hook = %name, error = %e, "hook failed to start");
                false
            }
        }
    }
}
