//! Transport layer abstraction.
//!
//! Defines the `Connector` trait mediating byte I/O with one DUT,
//! allowing different backends (serial, remote, simulator, mock).

use thiserror::Error;
use tracing::debug;

use crate::protocol::encode_kv;

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("Failed to open port {port}: {message}")]
    OpenFailed { port: String, message: String },

    #[error("Unknown backend: {0}")]
    UnknownBackend(String),

    #[error("Remote allocation failed: {0}")]
    AllocationFailed(String),

    #[error("Remote setup failed during {step}: {message}")]
    RemoteSetupFailed { step: String, message: String },

    #[error("Simulator setup failed during {step}: {message}")]
    SimulatorSetupFailed { step: String, message: String },

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstract byte-level connection to one DUT.
///
/// All backends funnel into the same read/write/reset surface so the rest
/// of the runner is transport-agnostic; only construction differs. Exactly
/// one connector exists per run, and exactly one thread owns it.
///
/// Read and write faults are reported through `last_error` and a `false` /
/// `Err` result, never a panic; the runner escalates them to a run verdict.
pub trait Connector: Send {
    /// Read up to `max` bytes; an empty result means the bounded read
    /// timeout elapsed with nothing available.
    fn read(&mut self, max: usize) -> Result<Vec<u8>, ConnectorError>;

    /// Write raw bytes; `false` on failure (details via `last_error`).
    fn write(&mut self, data: &[u8], log: bool) -> bool;

    /// Form and send one key-value protocol message.
    ///
    /// Returns the buffer sent to the DUT on success, `None` on failure.
    fn write_kv(&mut self, key: &str, value: &str) -> Option<String> {
        let kv_buff = encode_kv(key, value);
        if self.write(kv_buff.as_bytes(), false) {
            debug!(tx = %kv_buff.trim_end(), "TX");
            Some(kv_buff)
        } else {
            None
        }
    }

    /// Flush read/write channels; a no-op where the backend has none.
    fn flush(&mut self);

    /// Reset the DUT.
    fn reset(&mut self);

    /// Whether the read/write API can still reach the DUT.
    fn connected(&self) -> bool;

    /// Last error recorded by a failed read or write.
    fn last_error(&self) -> Option<String>;

    /// Release all backend resources. Idempotent; must succeed in
    /// releasing even after a failed open.
    fn finish(&mut self);
}
