//! dutrun-core: host-side test runner for embedded devices.
//!
//! Flashes a binary onto a device under test, resets it, and supervises
//! the run over a `{{key;value}}` line protocol spoken on the device
//! console, deriving a single pass/fail verdict per run.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Wire frames, reserved keys, coverage payload codec
//! - **Verdict**: The closed set of run outcomes
//! - **Transport**: Connector abstraction (serial, remote farm, simulator, mock)
//! - **Plugins**: Flash and reset methods dispatched by capability name
//! - **Dispatcher**: Event callbacks, host tests and the two-queue model
//! - **Runner**: Per-run orchestrator, I/O pump and output collection
//! - **Hooks**: Post-run shell hooks
//!
//! # Example
//!
//! ```no_run
//! use dutrun_core::config::RunConfig;
//! use dutrun_core::runner::TestRunner;
//!
//! let config = RunConfig {
//!     port: Some("/dev/ttyACM0".to_string()),
//!     image_path: Some("test.bin".to_string()),
//!     disk: Some("/media/DAPLINK".to_string()),
//!     ..Default::default()
//! };
//!
//! let report = TestRunner::new(config).run();
//! std::process::exit(report.verdict.legacy_code());
//! ```

pub mod config;
pub mod dispatcher;
pub mod hooks;
pub mod plugins;
pub mod protocol;
pub mod runner;
pub mod transport;
pub mod verdict;

// Re-exports for convenience
pub use config::RunConfig;
pub use dispatcher::{
    DispatchSignal, DutMessage, EventDispatcher, HostTest, HostTestRegistry, TestContext,
    TestHandle,
};
pub use hooks::HookRunner;
pub use plugins::{Plugin, PluginParams, PluginRegistry, PluginType, builtin_registry};
pub use protocol::{Frame, encode_kv};
pub use runner::{RunReport, TestRunner};
pub use transport::{Connector, ConnectorError, MockConnector};
pub use verdict::TestResult;
