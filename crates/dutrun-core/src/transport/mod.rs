//! Transport backends for DUT communication.

pub mod mock;
pub mod remote;
pub mod serial;
pub mod simulator;
pub mod traits;

pub use mock::MockConnector;
pub use remote::{
    AllocateRequirements, RemoteBackend, RemoteBackendRegistry, RemoteClient, RemoteConfig,
    RemoteConnector, RemoteResource, ResourceInfo,
};
pub use serial::{SerialConfig, SerialConnector, safe_send_break};
pub use simulator::{
    SimulatorBackend, SimulatorBackendRegistry, SimulatorConfig, SimulatorConnector,
    SimulatorControl,
};
pub use traits::{Connector, ConnectorError};
