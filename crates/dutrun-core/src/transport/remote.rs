//! Remote device-farm connector.
//!
//! A remote resource manager exposes a pool of physical DUTs over the
//! network. The connector allocates one resource matching a requirement
//! set, flashes and resets it as part of `open`, and routes byte I/O
//! through the resource's own channel. The manager backend itself is
//! resolved by module name through an explicit [`RemoteBackendRegistry`].

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{error, info, warn};

use super::traits::{Connector, ConnectorError};
use crate::protocol::DEFAULT_BAUD_RATE;

/// Requirements matched against the manager's resource listing.
#[derive(Debug, Clone, Default)]
pub struct AllocateRequirements {
    pub platform_name: Option<String>,
    pub power_on: bool,
    pub connected: bool,
    /// Required device tags; all must be present on the resource.
    pub tags: Vec<String>,
}

/// One entry of the manager's resource listing.
#[derive(Debug, Clone)]
pub struct ResourceInfo {
    pub platform_name: String,
    pub power_on: bool,
    pub connected: bool,
    pub tags: Vec<String>,
}

/// A live client session with a remote resource manager.
pub trait RemoteClient: Send {
    /// List resources currently known to the manager.
    fn get_resources(&mut self) -> Vec<ResourceInfo>;

    /// Allocate one resource matching the requirements.
    fn allocate(
        &mut self,
        requirements: &AllocateRequirements,
    ) -> Result<Box<dyn RemoteResource>, String>;
}

/// One allocated remote DUT.
///
/// The allocation is owned by the connector that acquired it and must be
/// released exactly once.
pub trait RemoteResource: Send {
    fn flash(&mut self, image_path: &str, forceflash: bool) -> bool;
    fn open_connection(&mut self, baud_rate: u32) -> bool;
    fn close_connection(&mut self) -> bool;
    fn reset(&mut self) -> bool;
    fn read(&mut self, count: usize) -> Result<Vec<u8>, String>;
    fn write(&mut self, data: &[u8]) -> Result<(), String>;
    fn is_allocated(&self) -> bool;
    fn is_connected(&self) -> bool;
    fn release(&mut self) -> bool;
}

/// A resource manager backend, selectable by module name.
pub trait RemoteBackend: Send + Sync {
    /// Connect to the manager service.
    fn create(
        &self,
        host: Option<&str>,
        port: Option<u16>,
    ) -> Result<Box<dyn RemoteClient>, String>;
}

/// Registry of known resource manager backends.
///
/// Replaces by-name dynamic module loading with an explicit table built
/// at startup.
#[derive(Default)]
pub struct RemoteBackendRegistry {
    backends: BTreeMap<String, Box<dyn RemoteBackend>>,
}

impl RemoteBackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, backend: Box<dyn RemoteBackend>) {
        self.backends.insert(name.into(), backend);
    }

    pub fn get(&self, name: &str) -> Option<&dyn RemoteBackend> {
        self.backends.get(name).map(|b| b.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.backends.keys().map(String::as_str).collect()
    }
}

/// Remote backend configuration.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Backend module name resolved through the registry.
    pub module: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub platform_name: Option<String>,
    pub image_path: Option<String>,
    pub baud_rate: u32,
    /// Post-reset idle delay in seconds.
    pub reset_delay: f64,
    pub tags: Vec<String>,
}

impl RemoteConfig {
    pub fn requirements(&self) -> AllocateRequirements {
        AllocateRequirements {
            platform_name: self.platform_name.clone(),
            power_on: true,
            connected: true,
            tags: self.tags.clone(),
        }
    }
}

/// Connector backed by an allocated remote resource.
pub struct RemoteConnector {
    resource: Option<Box<dyn RemoteResource>>,
    reset_delay: f64,
    last_error: Option<String>,
}

impl RemoteConnector {
    /// Resolve the backend, allocate a resource and prepare it.
    ///
    /// Preparation is flash -> connect -> reset; any failure is a hard
    /// construction error and the allocation is released best-effort
    /// before returning.
    pub fn open(
        registry: &RemoteBackendRegistry,
        config: &RemoteConfig,
    ) -> Result<Self, ConnectorError> {
        let backend = registry.get(&config.module).ok_or_else(|| {
            error!(module = %config.module, "unable to resolve remote resource manager backend");
            ConnectorError::UnknownBackend(config.module.clone())
        })?;

        info!(
            host = config.host.as_deref().unwrap_or("-"),
            port = config.port.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
            "remote resources initialization"
        );
        let mut client = backend
            .create(config.host.as_deref(), config.port)
            .map_err(ConnectorError::AllocationFailed)?;

        let resources = client.get_resources();
        info!(count = resources.len(), "remote resources listed");

        let mut resource = client
            .allocate(&config.requirements())
            .map_err(|reason| {
                error!(
                    platform = config.platform_name.as_deref().unwrap_or("-"),
                    reason = %reason,
                    "can't allocate resource"
                );
                ConnectorError::AllocationFailed(reason)
            })?;

        // Remote DUT flashing, connection and reset. A failure at any step
        // leaves no partial state behind: release and report a hard error.
        if let Err((step, message)) = Self::prepare(resource.as_mut(), config) {
            error!(step = %step, message = %message, "remote setup failed, releasing allocation");
            if !resource.release() {
                warn!("remote resource release failed");
            }
            return Err(ConnectorError::RemoteSetupFailed { step, message });
        }

        Ok(Self {
            resource: Some(resource),
            reset_delay: config.reset_delay,
            last_error: None,
        })
    }

    fn prepare(
        resource: &mut dyn RemoteResource,
        config: &RemoteConfig,
    ) -> Result<(), (String, String)> {
        if let Some(image) = &config.image_path {
            info!(image = %image, "remote resource flashing");
            if !resource.flash(image, true) {
                return Err(("flash".into(), "remote resource flashing failed".into()));
            }
        }

        info!(baud = config.baud_rate, "opening connection to remote platform");
        if !resource.open_connection(config.baud_rate) {
            return Err(("connect".into(), "open_connection() failed".into()));
        }

        info!("remote resource reset");
        if !resource.reset() {
            return Err(("reset".into(), "remote resource reset failed".into()));
        }
        if config.reset_delay > 0.0 {
            std::thread::sleep(Duration::from_secs_f64(config.reset_delay));
        }
        Ok(())
    }

    fn allocated(&self) -> bool {
        self.resource.as_ref().is_some_and(|r| r.is_allocated())
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            module: String::new(),
            host: None,
            port: None,
            platform_name: None,
            image_path: None,
            baud_rate: DEFAULT_BAUD_RATE,
            reset_delay: 0.0,
            tags: Vec::new(),
        }
    }
}

impl Connector for RemoteConnector {
    fn read(&mut self, max: usize) -> Result<Vec<u8>, ConnectorError> {
        if !self.connected() {
            return Err(ConnectorError::Disconnected);
        }
        let resource = self.resource.as_mut().unwrap();
        match resource.read(max) {
            Ok(data) => Ok(data),
            Err(e) => {
                self.last_error = Some(format!("remote read error: {e}"));
                // Transient remote read faults surface as "no data"; the
                // runner decides when the channel is truly gone.
                warn!(error = %e, "remote read failed");
                Ok(Vec::new())
            }
        }
    }

    fn write(&mut self, data: &[u8], log: bool) -> bool {
        if !self.connected() {
            self.last_error = Some("remote resource not connected".into());
            return false;
        }
        let resource = self.resource.as_mut().unwrap();
        match resource.write(data) {
            Ok(()) => {
                if log {
                    tracing::debug!(tx = %String::from_utf8_lossy(data).trim_end(), "TX");
                }
                true
            }
            Err(e) => {
                self.last_error = Some(format!("remote write error: {e}"));
                error!(error = %e, "remote write failed");
                false
            }
        }
    }

    fn flush(&mut self) {
        // Flush is ignored with a remote target.
    }

    fn reset(&mut self) {
        if let Some(resource) = self.resource.as_mut() {
            info!("remote resource reset");
            if !resource.reset() {
                self.last_error = Some("remote reset failed".into());
                error!("remote reset failed");
                return;
            }
            if self.reset_delay > 0.0 {
                std::thread::sleep(Duration::from_secs_f64(self.reset_delay));
            }
        }
    }

    fn connected(&self) -> bool {
        self.allocated() && self.resource.as_ref().is_some_and(|r| r.is_connected())
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }

    fn finish(&mut self) {
        // Disconnect then release; both best-effort and independently logged.
        if let Some(mut resource) = self.resource.take() {
            if resource.is_connected() && !resource.close_connection() {
                warn!("remote disconnect failed");
            }
            if resource.is_allocated() && !resource.release() {
                warn!("remote resource release failed");
            }
        }
    }
}

impl Drop for RemoteConnector {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeState {
        flashed: bool,
        connected: bool,
        reset_count: usize,
        released: usize,
        fail_step: Option<&'static str>,
    }

    struct FakeResource(Arc<Mutex<FakeState>>);

    impl RemoteResource for FakeResource {
        fn flash(&mut self, _image_path: &str, _forceflash: bool) -> bool {
            let mut s = self.0.lock().unwrap();
            if s.fail_step == Some("flash") {
                return false;
            }
            s.flashed = true;
            true
        }
        fn open_connection(&mut self, _baud_rate: u32) -> bool {
            let mut s = self.0.lock().unwrap();
            if s.fail_step == Some("connect") {
                return false;
            }
            s.connected = true;
            true
        }
        fn close_connection(&mut self) -> bool {
            self.0.lock().unwrap().connected = false;
            true
        }
        fn reset(&mut self) -> bool {
            self.0.lock().unwrap().reset_count += 1;
            true
        }
        fn read(&mut self, _count: usize) -> Result<Vec<u8>, String> {
            Ok(Vec::new())
        }
        fn write(&mut self, _data: &[u8]) -> Result<(), String> {
            Ok(())
        }
        fn is_allocated(&self) -> bool {
            self.0.lock().unwrap().released == 0
        }
        fn is_connected(&self) -> bool {
            self.0.lock().unwrap().connected
        }
        fn release(&mut self) -> bool {
            self.0.lock().unwrap().released += 1;
            true
        }
    }

    struct FakeClient(Arc<Mutex<FakeState>>);

    impl RemoteClient for FakeClient {
        fn get_resources(&mut self) -> Vec<ResourceInfo> {
            vec![ResourceInfo {
                platform_name: "K64F".into(),
                power_on: true,
                connected: true,
                tags: Vec::new(),
            }]
        }
        fn allocate(
            &mut self,
            _requirements: &AllocateRequirements,
        ) -> Result<Box<dyn RemoteResource>, String> {
            Ok(Box::new(FakeResource(self.0.clone())))
        }
    }

    struct FakeBackend(Arc<Mutex<FakeState>>);

    impl RemoteBackend for FakeBackend {
        fn create(
            &self,
            _host: Option<&str>,
            _port: Option<u16>,
        ) -> Result<Box<dyn RemoteClient>, String> {
            Ok(Box::new(FakeClient(self.0.clone())))
        }
    }

    fn registry_with(state: Arc<Mutex<FakeState>>) -> RemoteBackendRegistry {
        let mut registry = RemoteBackendRegistry::new();
        registry.register("fake_grm", Box::new(FakeBackend(state)));
        registry
    }

    fn config() -> RemoteConfig {
        RemoteConfig {
            module: "fake_grm".into(),
            platform_name: Some("K64F".into()),
            image_path: Some("test.bin".into()),
            ..RemoteConfig::default()
        }
    }

    #[test]
    fn open_flashes_connects_and_resets() {
        let state = Arc::new(Mutex::new(FakeState::default()));
        let registry = registry_with(state.clone());

        let mut connector = RemoteConnector::open(&registry, &config()).unwrap();
        {
            let s = state.lock().unwrap();
            assert!(s.flashed);
            assert!(s.connected);
            assert_eq!(s.reset_count, 1);
        }
        assert!(connector.connected());

        connector.finish();
        let s = state.lock().unwrap();
        assert!(!s.connected);
        assert_eq!(s.released, 1);
    }

    #[test]
    fn failed_setup_releases_allocation() {
        let state = Arc::new(Mutex::new(FakeState {
            fail_step: Some("connect"),
            ..FakeState::default()
        }));
        let registry = registry_with(state.clone());

        let result = RemoteConnector::open(&registry, &config());
        assert!(matches!(
            result,
            Err(ConnectorError::RemoteSetupFailed { .. })
        ));
        assert_eq!(state.lock().unwrap().released, 1);
    }

    #[test]
    fn unknown_module_is_hard_error() {
        let registry = RemoteBackendRegistry::new();
        let result = RemoteConnector::open(&registry, &config());
        assert!(matches!(result, Err(ConnectorError::UnknownBackend(_))));
    }

    #[test]
    fn finish_is_idempotent() {
        let state = Arc::new(Mutex::new(FakeState::default()));
        let registry = registry_with(state.clone());

        let mut connector = RemoteConnector::open(&registry, &config()).unwrap();
        connector.finish();
        connector.finish();
        assert_eq!(state.lock().unwrap().released, 1);
    }
}
