//! Event dispatch and host-test logic.

pub mod builtin;
pub mod events;
pub mod queues;
pub mod registry;

pub use builtin::{DefaultAuto, Echo, HelloAuto};
pub use events::{EventDispatcher, Handler, RegisterError};
pub use host_test::{HostTest, TestContext};
pub use queues::{DispatchSignal, DutMessage, TestHandle};
pub use registry::{HostTestFactory, HostTestRegistry};
