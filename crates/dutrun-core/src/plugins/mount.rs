//! Mount point readiness polling.
//!
//! Drag-and-drop flashing exposes the DUT as a filesystem mount, and the
//! mount can take seconds to (re)appear after a flash or reset - or move
//! to a different path entirely when the OS re-enumerates the device.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

/// Maps a target id to its current mount point.
///
/// Installed once at startup; consulted while polling so a moved mount is
/// picked up mid-wait.
pub trait DeviceResolver: Send + Sync {
    fn mount_point(&self, target_id: &str) -> Option<PathBuf>;
}

/// Poll until `disk` exists and is writable, up to `timeout`.
///
/// When `target_id` and a resolver are given, the path is re-resolved on
/// every iteration and the returned path reflects where the mount ended
/// up. Timeout without readiness is `(false, last_path)`, never a panic.
pub fn wait_for_mount(
    disk: &Path,
    target_id: Option<&str>,
    timeout: Duration,
    resolver: Option<&dyn DeviceResolver>,
) -> (bool, PathBuf) {
    let start = Instant::now();
    let mut current = disk.to_path_buf();

    loop {
        if let (Some(id), Some(resolver)) = (target_id, resolver)
            && let Some(resolved) = resolver.mount_point(id)
            && resolved != current
        {
            info!(
                from = %current.display(),
                to = %resolved.display(),
                "mount point moved"
            );
            current = resolved;
        }

        if is_writable_dir(&current) {
            debug!(disk = %current.display(), elapsed = ?start.elapsed(), "mount point ready");
            return (true, current);
        }

        if start.elapsed() >= timeout {
            warn!(
                disk = %current.display(),
                timeout = ?timeout,
                "mount point not ready before timeout"
            );
            return (false, current);
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}

/// Probe-file check: the mount is ready when we can create a file on it.
fn is_writable_dir(path: &Path) -> bool {
    if !path.is_dir() {
        return false;
    }
    let probe = path.join(".dutrun-probe");
    match fs::write(&probe, b"") {
        Ok(()) => {
            let _ = fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}
