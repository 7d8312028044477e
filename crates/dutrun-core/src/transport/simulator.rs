//! Simulator connector.
//!
//! Runs the test image on a software model instead of hardware. The
//! simulator-control backend is resolved by name from an explicit
//! [`SimulatorBackendRegistry`]; a missing backend is a hard construction
//! error, reported before any process is launched.

use std::collections::BTreeMap;

use tracing::{error, info};

use super::traits::{Connector, ConnectorError};

/// Control surface of one simulator instance.
pub trait SimulatorControl: Send {
    /// Configure the model for a platform and named configuration.
    fn setup(&mut self, platform_name: &str, config: &str) -> Result<(), String>;
    /// Start the simulator process.
    fn launch(&mut self) -> bool;
    /// Load the test image into the model.
    fn load(&mut self, image_path: &str) -> bool;
    /// Start execution.
    fn run(&mut self) -> bool;
    fn read(&mut self, count: usize) -> Result<Vec<u8>, String>;
    fn write(&mut self, data: &[u8]) -> Result<(), String>;
    /// The simulator's own liveness flag.
    fn is_alive(&self) -> bool;
    /// Stop and reload; used for DUT reset requests.
    fn restart(&mut self) -> bool;
    /// Stop the simulator and reap its process.
    fn shutdown(&mut self);
}

/// Factory for simulator-control instances.
pub trait SimulatorBackend: Send + Sync {
    fn create(&self) -> Result<Box<dyn SimulatorControl>, String>;
}

/// Registry of known simulator-control backends.
#[derive(Default)]
pub struct SimulatorBackendRegistry {
    backends: BTreeMap<String, Box<dyn SimulatorBackend>>,
}

impl SimulatorBackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, backend: Box<dyn SimulatorBackend>) {
        self.backends.insert(name.into(), backend);
    }

    pub fn get(&self, name: &str) -> Option<&dyn SimulatorBackend> {
        self.backends.get(name).map(|b| b.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.backends.keys().map(String::as_str).collect()
    }
}

/// Simulator backend configuration.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Backend name resolved through the registry.
    pub backend: String,
    pub platform_name: String,
    /// Named simulator configuration (connection config).
    pub config: String,
    pub image_path: String,
}

/// Connector backed by a running simulator.
pub struct SimulatorConnector {
    sim: Option<Box<dyn SimulatorControl>>,
    last_error: Option<String>,
}

impl SimulatorConnector {
    /// Resolve the backend and bring the model up.
    ///
    /// Open sequence is setup -> launch -> load -> run; any failure is a
    /// hard construction error with the simulator shut down again.
    pub fn open(
        registry: &SimulatorBackendRegistry,
        config: &SimulatorConfig,
    ) -> Result<Self, ConnectorError> {
        let backend = registry.get(&config.backend).ok_or_else(|| {
            error!(backend = %config.backend, "unable to resolve simulator-control backend");
            ConnectorError::UnknownBackend(config.backend.clone())
        })?;

        info!(platform = %config.platform_name, config = %config.config, "initializing simulator");
        let mut sim = backend.create().map_err(|message| {
            ConnectorError::SimulatorSetupFailed {
                step: "create".into(),
                message,
            }
        })?;

        if let Err((step, message)) = Self::bring_up(sim.as_mut(), config) {
            error!(step = %step, message = %message, "simulator setup failed");
            sim.shutdown();
            return Err(ConnectorError::SimulatorSetupFailed { step, message });
        }

        Ok(Self {
            sim: Some(sim),
            last_error: None,
        })
    }

    fn bring_up(
        sim: &mut dyn SimulatorControl,
        config: &SimulatorConfig,
    ) -> Result<(), (String, String)> {
        sim.setup(&config.platform_name, &config.config)
            .map_err(|m| ("setup".to_string(), m))?;

        info!("launching simulator");
        if !sim.launch() {
            return Err(("launch".into(), "start_simulator() returned false".into()));
        }

        info!(image = %config.image_path, "loading test image");
        if !sim.load(&config.image_path) {
            return Err(("load".into(), "image load returned false".into()));
        }

        info!("running simulator");
        if !sim.run() {
            return Err(("run".into(), "run_simulator() returned false".into()));
        }
        Ok(())
    }
}

impl Connector for SimulatorConnector {
    fn read(&mut self, max: usize) -> Result<Vec<u8>, ConnectorError> {
        let Some(sim) = self.sim.as_mut() else {
            return Err(ConnectorError::Disconnected);
        };
        match sim.read(max) {
            Ok(data) => Ok(data),
            Err(e) => {
                self.last_error = Some(format!("simulator read error: {e}"));
                Err(ConnectorError::ReadFailed(e))
            }
        }
    }

    fn write(&mut self, data: &[u8], log: bool) -> bool {
        let Some(sim) = self.sim.as_mut() else {
            self.last_error = Some("simulator not running".into());
            return false;
        };
        match sim.write(data) {
            Ok(()) => {
                if log {
                    tracing::debug!(tx = %String::from_utf8_lossy(data).trim_end(), "TX");
                }
                true
            }
            Err(e) => {
                self.last_error = Some(format!("simulator write error: {e}"));
                error!(error = %e, "simulator write failed");
                false
            }
        }
    }

    fn flush(&mut self) {
        // The model has no driver buffers to drain.
    }

    fn reset(&mut self) {
        if let Some(sim) = self.sim.as_mut() {
            info!("restarting simulator");
            if !sim.restart() {
                self.last_error = Some("simulator restart failed".into());
                error!("simulator restart failed");
            }
        }
    }

    fn connected(&self) -> bool {
        self.sim.as_ref().is_some_and(|s| s.is_alive())
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }

    fn finish(&mut self) {
        if let Some(mut sim) = self.sim.take() {
            info!("shutting down simulator");
            sim.shutdown();
        }
    }
}

impl Drop for SimulatorConnector {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeSim {
        steps: Arc<Mutex<Vec<&'static str>>>,
        alive: Arc<Mutex<bool>>,
        fail_load: bool,
    }

    impl SimulatorControl for FakeSim {
        fn setup(&mut self, _platform_name: &str, _config: &str) -> Result<(), String> {
            self.steps.lock().unwrap().push("setup");
            Ok(())
        }
        fn launch(&mut self) -> bool {
            self.steps.lock().unwrap().push("launch");
            *self.alive.lock().unwrap() = true;
            true
        }
        fn load(&mut self, _image_path: &str) -> bool {
            self.steps.lock().unwrap().push("load");
            !self.fail_load
        }
        fn run(&mut self) -> bool {
            self.steps.lock().unwrap().push("run");
            true
        }
        fn read(&mut self, _count: usize) -> Result<Vec<u8>, String> {
            Ok(Vec::new())
        }
        fn write(&mut self, _data: &[u8]) -> Result<(), String> {
            Ok(())
        }
        fn is_alive(&self) -> bool {
            *self.alive.lock().unwrap()
        }
        fn restart(&mut self) -> bool {
            self.steps.lock().unwrap().push("restart");
            true
        }
        fn shutdown(&mut self) {
            self.steps.lock().unwrap().push("shutdown");
            *self.alive.lock().unwrap() = false;
        }
    }

    struct FakeBackend {
        steps: Arc<Mutex<Vec<&'static str>>>,
        alive: Arc<Mutex<bool>>,
        fail_load: bool,
    }

    impl SimulatorBackend for FakeBackend {
        fn create(&self) -> Result<Box<dyn SimulatorControl>, String> {
            Ok(Box::new(FakeSim {
                steps: self.steps.clone(),
                alive: self.alive.clone(),
                fail_load: self.fail_load,
            }))
        }
    }

    fn config() -> SimulatorConfig {
        SimulatorConfig {
            backend: "fvp".into(),
            platform_name: "FVP_MPS2_M3".into(),
            config: "DEFAULT".into(),
            image_path: "test.elf".into(),
        }
    }

    #[test]
    fn open_runs_setup_launch_load_run() {
        let steps = Arc::new(Mutex::new(Vec::new()));
        let alive = Arc::new(Mutex::new(false));
        let mut registry = SimulatorBackendRegistry::new();
        registry.register(
            "fvp",
            Box::new(FakeBackend {
                steps: steps.clone(),
                alive: alive.clone(),
                fail_load: false,
            }),
        );

        let mut connector = SimulatorConnector::open(&registry, &config()).unwrap();
        assert_eq!(
            *steps.lock().unwrap(),
            vec!["setup", "launch", "load", "run"]
        );
        assert!(connector.connected());

        connector.finish();
        assert!(!connector.connected());
        assert_eq!(steps.lock().unwrap().last(), Some(&"shutdown"));
    }

    #[test]
    fn failed_load_shuts_the_simulator_down() {
        let steps = Arc::new(Mutex::new(Vec::new()));
        let mut registry = SimulatorBackendRegistry::new();
        registry.register(
            "fvp",
            Box::new(FakeBackend {
                steps: steps.clone(),
                alive: Arc::new(Mutex::new(false)),
                fail_load: true,
            }),
        );

        let result = SimulatorConnector::open(&registry, &config());
        assert!(matches!(
            result,
            Err(ConnectorError::SimulatorSetupFailed { .. })
        ));
        assert_eq!(steps.lock().unwrap().last(), Some(&"shutdown"));
    }

    #[test]
    fn missing_backend_is_hard_error() {
        let registry = SimulatorBackendRegistry::new();
        let result = SimulatorConnector::open(&registry, &config());
        assert!(matches!(result, Err(ConnectorError::UnknownBackend(_))));
    }
}
