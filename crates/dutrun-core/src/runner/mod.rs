//! Run orchestration.
//!
//! One [`TestRunner`] drives one run through its states: flash the image,
//! build the transport, supervise the key-value exchange, collect the
//! captured output. Every exit path tears the pump down; the connector is
//! always released through `finish()`.

pub mod collect;
pub mod harness;
pub mod pump;

pub use collect::{
    MemoryMetrics, TestCaseResult, TestCaseSummary, ThreadStackInfo, get_coverage_data,
    get_memory_metrics, get_test_result, get_testcase_results, get_testcase_summary,
};
pub use harness::{HarnessError, HarnessOutcome, run_once, run_with_retries};
pub use pump::{PumpConfig, spawn_pump};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{RecvTimeoutError, channel};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::config::RunConfig;
use crate::dispatcher::{
    DispatchSignal, DutMessage, EventDispatcher, HostTest, HostTestRegistry, TestContext,
    TestHandle,
};
use crate::hooks::HookRunner;
use crate::plugins::{PluginParams, PluginRegistry, PluginType, builtin_registry};
use crate::transport::{
    Connector, RemoteBackendRegistry, RemoteConfig, RemoteConnector, SerialConfig,
    SerialConnector, SimulatorBackendRegistry, SimulatorConfig, SimulatorConnector,
};
use crate::verdict::TestResult;

/// Hook executed after every run when a hooks file is configured.
const HOOK_TEST_END: &str = "hook_test_end";

/// Everything one run produced.
#[derive(Debug)]
pub struct RunReport {
    pub verdict: TestResult,
    /// Captured console output, one line per received line.
    pub output: String,
    pub elapsed: Duration,
    pub testcases: Vec<TestCaseResult>,
    pub summary: Option<TestCaseSummary>,
    pub metrics: MemoryMetrics,
}

/// Orchestrates one test run end to end.
///
/// Registries are injected at construction and read-only afterwards; the
/// runner never mutates them during a run.
pub struct TestRunner {
    config: RunConfig,
    plugins: PluginRegistry,
    host_tests: HostTestRegistry,
    remote_backends: RemoteBackendRegistry,
    simulator_backends: SimulatorBackendRegistry,
}

impl TestRunner {
    /// A runner with the built-in plugins and host tests.
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            plugins: builtin_registry(None),
            host_tests: HostTestRegistry::with_builtins(),
            remote_backends: RemoteBackendRegistry::new(),
            simulator_backends: SimulatorBackendRegistry::new(),
        }
    }

    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn with_host_tests(mut self, host_tests: HostTestRegistry) -> Self {
        self.host_tests = host_tests;
        self
    }

    pub fn with_remote_backends(mut self, backends: RemoteBackendRegistry) -> Self {
        self.remote_backends = backends;
        self
    }

    pub fn with_simulator_backends(mut self, backends: SimulatorBackendRegistry) -> Self {
        self.simulator_backends = backends;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run the full state machine: flash, connect, supervise, collect.
    pub fn run(&self) -> RunReport {
        let started = Instant::now();

        if let Err(verdict) = self.flash() {
            return self.collect(verdict, String::new(), started);
        }
        let connector = match self.connect() {
            Ok(connector) => connector,
            Err(verdict) => return self.collect(verdict, String::new(), started),
        };

        let (verdict, output) = self.supervise(connector);
        self.collect(verdict, output, started)
    }

    /// Run supervision over a caller-supplied connector, skipping the
    /// flash and connect steps.
    pub fn run_with_connector(&self, connector: Box<dyn Connector>) -> RunReport {
        let started = Instant::now();
        let (verdict, output) = self.supervise(connector);
        self.collect(verdict, output, started)
    }

    /// Harness mode: supervise an external command instead of a DUT.
    ///
    /// Supervised failures (nonzero exit) are retried up to `retry_count`
    /// attempts and reported through the verdict; infrastructure faults
    /// (unstartable, signal-killed, silent past the start timeout) are
    /// returned as errors and never retried.
    pub fn run_harness(&self, cmd: &[String], retry_count: u32) -> Result<RunReport, HarnessError> {
        let started = Instant::now();
        let start_timeout = Duration::from_secs_f64(self.config.process_start_timeout.max(0.0));
        let duration = Duration::from_secs_f64(self.config.duration.max(0.0));

        let outcome = run_with_retries(cmd, start_timeout, duration, retry_count)?;
        let verdict = get_test_result(&outcome.output);
        info!(code = outcome.code, verdict = %verdict, "harness run finished");
        Ok(self.collect(verdict, outcome.output, started))
    }

    // ------------------------------------------------------------------
    // Flashing
    // ------------------------------------------------------------------

    fn flash(&self) -> Result<(), TestResult> {
        if self.config.skip_flashing {
            info!("flashing skipped by configuration");
            return Ok(());
        }
        if self.config.grm_module.is_some() || self.config.sim_config.is_some() {
            debug!("transport flashes at construction, no local copy step");
            return Ok(());
        }

        let Some(image) = self.config.image_path.as_deref() else {
            error!("no image path configured");
            return Err(TestResult::NoImage);
        };
        if !Path::new(image).is_file() {
            error!(image = %image, "image file does not exist");
            return Err(TestResult::NoImage);
        }
        let Some(disk) = self.config.disk.as_deref() else {
            error!("no destination disk configured for flashing");
            return Err(TestResult::IoerrCopy);
        };

        let capability = self.config.copy_method.as_deref().unwrap_or("default");
        let mut params = PluginParams::new()
            .set("image_path", image)
            .set("destination_disk", disk)
            .set("polling_timeout", self.config.polling_timeout.to_string());
        if let Some(id) = self.config.target_id.as_deref() {
            params = params.set("target_id", id);
        }

        let attempts = self.config.retry_copy.max(1);
        for attempt in 1..=attempts {
            info!(attempt, of = attempts, method = capability, image = %image, "flashing target");
            if self
                .plugins
                .call(PluginType::CopyMethod, capability, &params)
            {
                let cycle = Duration::from_secs_f64(self.config.program_cycle_s.max(0.0));
                info!(delay = ?cycle, "waiting for program cycle");
                std::thread::sleep(cycle);
                return Ok(());
            }
            warn!(attempt, "flash attempt failed");
        }
        error!(attempts, "copy retries exhausted");
        Err(TestResult::IoerrCopy)
    }

    // ------------------------------------------------------------------
    // Connecting
    // ------------------------------------------------------------------

    fn connect(&self) -> Result<Box<dyn Connector>, TestResult> {
        if let Some(module) = self.config.grm_module.as_deref() {
            let remote = RemoteConfig {
                module: module.to_string(),
                host: self.config.grm_host.clone(),
                port: self.config.grm_port,
                platform_name: self.config.micro.clone(),
                image_path: self.config.image_path.clone(),
                baud_rate: self.config.baud_rate,
                reset_delay: self.config.forced_reset_timeout,
                tags: self.config.tags(),
            };
            return RemoteConnector::open(&self.remote_backends, &remote)
                .map(|c| Box::new(c) as Box<dyn Connector>)
                .map_err(|e| {
                    error!(error = %e, "remote connection failed");
                    TestResult::IoerrSerial
                });
        }

        if let Some(sim) = self.config.sim_config.as_deref() {
            // "backend:config"; a bare name addresses both.
            let (backend, config_name) = sim.split_once(':').unwrap_or((sim, sim));
            let sim_config = SimulatorConfig {
                backend: backend.to_string(),
                platform_name: self.config.micro.clone().unwrap_or_default(),
                config: config_name.to_string(),
                image_path: self.config.image_path.clone().unwrap_or_default(),
            };
            return SimulatorConnector::open(&self.simulator_backends, &sim_config)
                .map(|c| Box::new(c) as Box<dyn Connector>)
                .map_err(|e| {
                    error!(error = %e, "simulator connection failed");
                    TestResult::IoerrSerial
                });
        }

        if let Some(port) = self.config.port.as_deref() {
            // A forced reset method must run before the pump owns the port.
            self.forced_reset(port);
            let serial = SerialConfig {
                port: port.to_string(),
                baud_rate: self.config.baud_rate,
                read_timeout: Duration::from_millis(50),
            };
            return SerialConnector::open(&serial)
                .map(|c| Box::new(c) as Box<dyn Connector>)
                .map_err(|e| {
                    error!(error = %e, "serial connection failed");
                    TestResult::IoerrSerial
                });
        }

        error!("no transport endpoint configured");
        Err(TestResult::NotDetected)
    }

    /// Dispatch a non-default reset method through the plugin registry.
    fn forced_reset(&self, port: &str) {
        if self.config.skip_reset {
            return;
        }
        let Some(kind) = self.config.forced_reset_type.as_deref() else {
            return;
        };
        if kind == "default" {
            return;
        }

        let mut params = PluginParams::new()
            .set("serial_port", port)
            .set("baud_rate", self.config.baud_rate.to_string())
            .set("polling_timeout", self.config.polling_timeout.to_string());
        if let Some(disk) = self.config.disk.as_deref() {
            params = params.set("destination_disk", disk);
        }
        if let Some(id) = self.config.target_id.as_deref() {
            params = params.set("target_id", id);
        }

        info!(method = kind, "forced reset");
        if !self.plugins.call(PluginType::ResetMethod, kind, &params) {
            warn!(method = kind, "forced reset failed");
        }
        std::thread::sleep(Duration::from_secs_f64(
            self.config.forced_reset_timeout.max(0.0),
        ));
    }

    // ------------------------------------------------------------------
    // Running
    // ------------------------------------------------------------------

    fn supervise(&self, connector: Box<dyn Connector>) -> (TestResult, String) {
        let (main_tx, main_rx) = channel();
        let (dut_tx, dut_rx) = channel();
        let handle = TestHandle::new(main_tx.clone(), dut_tx.clone());
        let mut dispatcher = EventDispatcher::new(handle.clone());

        let pump_config = PumpConfig {
            // Run-image mode only streams; no handshake.
            sync_behavior: if self.config.run_binary {
                0
            } else {
                self.config.sync_behavior
            },
            sync_timeout: Duration::from_secs_f64(self.config.sync_timeout.max(0.0)),
            idle_sleep: Duration::from_millis(10),
        };
        let pump = spawn_pump(connector, main_tx, dut_rx, pump_config);

        // Default reset goes through the pump, the sole connector owner.
        // A forced method already ran before the port was opened.
        if !self.config.skip_reset && self.config.forced_reset_type.is_none() {
            let _ = dut_tx.send(DutMessage::Reset);
        }

        let test_config = self.load_test_config();
        let mut host_test: Option<Box<dyn HostTest>> = None;
        let mut output = String::new();
        let started = Instant::now();
        let mut deadline = started + Duration::from_secs_f64(self.config.duration.max(0.0));

        let verdict = loop {
            let now = Instant::now();
            if now >= deadline {
                break self.expiry_verdict(host_test.as_deref_mut());
            }

            match main_rx.recv_timeout(deadline - now) {
                Ok(DispatchSignal::Frame(frame)) => {
                    dispatcher.dispatch(&frame);
                }
                Ok(DispatchSignal::RawLine(line)) => {
                    debug!(line = %line, "rx");
                    output.push_str(&line);
                    output.push('\n');
                }
                Ok(DispatchSignal::Print(text)) => {
                    info!(text = %text, "host test");
                }
                Ok(DispatchSignal::Complete(Some(passed))) => {
                    break if self.config.run_binary {
                        TestResult::Passive
                    } else if passed {
                        TestResult::Success
                    } else {
                        TestResult::Failure
                    };
                }
                Ok(DispatchSignal::Complete(None)) => {
                    // No verdict attached; the host test may have one.
                    if let Some(ht) = host_test.as_deref_mut()
                        && let Some(passed) = ht.result()
                    {
                        break if passed {
                            TestResult::Success
                        } else {
                            TestResult::Failure
                        };
                    }
                }
                Ok(DispatchSignal::ConnLost(reason)) => {
                    error!(reason = %reason, "connection lost");
                    break TestResult::IoerrSerial;
                }
                Ok(DispatchSignal::SyncFailed(reason)) => {
                    error!(reason = %reason, "sync handshake failed");
                    break TestResult::SyncFailed;
                }
                Ok(DispatchSignal::SyncObserved) => {
                    info!("DUT synchronized");
                }
                Ok(DispatchSignal::ResetRequest(kind)) => {
                    info!(kind = %kind, "host test requested DUT reset");
                    let _ = dut_tx.send(DutMessage::Reset);
                }
                Ok(DispatchSignal::HostTestName(name)) => {
                    if self.config.run_binary || host_test.is_some() {
                        debug!(name = %name, "host test announcement ignored");
                        continue;
                    }
                    match self.bind_host_test(&name, &mut dispatcher, &handle, &test_config) {
                        Ok(ht) => host_test = Some(ht),
                        Err(verdict) => break verdict,
                    }
                }
                Ok(DispatchSignal::TimeoutUpdate(secs)) => {
                    info!(secs, "DUT announced test duration");
                    deadline = started + Duration::from_secs(secs);
                }
                Err(RecvTimeoutError::Timeout) => {
                    break self.expiry_verdict(host_test.as_deref_mut());
                }
                Err(RecvTimeoutError::Disconnected) => {
                    error!("pump exited unexpectedly");
                    break TestResult::IoerrSerial;
                }
            }
        };

        let _ = dut_tx.send(DutMessage::Finish);
        drop(dut_tx);
        if pump.join().is_err() {
            error!("pump thread panicked");
        }
        if let Some(ht) = host_test.as_deref_mut() {
            ht.teardown();
        }

        info!(verdict = %verdict, "supervision finished");
        (verdict, output)
    }

    fn expiry_verdict(&self, host_test: Option<&mut (dyn HostTest + '_)>) -> TestResult {
        if self.config.run_binary {
            return TestResult::Passive;
        }
        match host_test.and_then(|ht| ht.result()) {
            Some(true) => TestResult::Success,
            Some(false) => TestResult::Failure,
            None => {
                error!("test duration expired without a verdict");
                TestResult::Timeout
            }
        }
    }

    fn bind_host_test(
        &self,
        announced: &str,
        dispatcher: &mut EventDispatcher,
        handle: &TestHandle,
        test_config: &serde_json::Value,
    ) -> Result<Box<dyn HostTest>, TestResult> {
        // The configured name wins over the DUT announcement.
        let name = self.config.host_test_name.as_deref().unwrap_or(announced);
        if name != announced {
            info!(announced = %announced, chosen = %name, "host test name overridden");
        }

        let Some(mut host_test) = self.host_tests.get(name) else {
            error!(name = %name, "host test not registered");
            return Err(TestResult::Error);
        };

        let mut ctx = TestContext::new(dispatcher, handle.clone(), test_config);
        if let Err(e) = host_test.setup(&mut ctx) {
            error!(name = %name, error = %e, "host test setup failed");
            return Err(TestResult::Error);
        }
        info!(name = %name, "host test bound");
        Ok(host_test)
    }

    fn load_test_config(&self) -> serde_json::Value {
        let Some(path) = self.config.json_test_configuration.as_deref() else {
            return serde_json::Value::Null;
        };
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(value) => value,
                Err(e) => {
                    error!(path = %path, error = %e, "test configuration parse failed");
                    serde_json::Value::Null
                }
            },
            Err(e) => {
                error!(path = %path, error = %e, "test configuration read failed");
                serde_json::Value::Null
            }
        }
    }

    // ------------------------------------------------------------------
    // Collecting
    // ------------------------------------------------------------------

    fn collect(&self, verdict: TestResult, output: String, started: Instant) -> RunReport {
        let build_path = self
            .config
            .build_path
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        get_coverage_data(&build_path, &output);

        if let Some(path) = self.config.serial_output_file.as_deref()
            && let Err(e) = std::fs::write(path, &output)
        {
            error!(path = %path, error = %e, "cannot save serial output");
        }

        let report = RunReport {
            verdict,
            testcases: get_testcase_results(&output),
            summary: get_testcase_summary(&output),
            metrics: get_memory_metrics(&output),
            elapsed: started.elapsed(),
            output,
        };
        self.run_end_hook(&report);
        report
    }

    fn run_end_hook(&self, report: &RunReport) {
        let Some(path) = self.config.hooks_path.as_deref() else {
            return;
        };
        let hooks = HookRunner::load(path);
        if !hooks.is_hooked_to(HOOK_TEST_END) {
            return;
        }

        let mut tags = BTreeMap::new();
        tags.insert("verdict".to_string(), report.verdict.to_string());
        if let Some(image) = self.config.image_path.as_deref() {
            tags.insert("image_path".to_string(), image.to_string());
        }
        if let Some(build) = self.config.build_path.as_deref() {
            tags.insert("build_path".to_string(), build.to_string());
        }
        hooks.run_hook(HOOK_TEST_END, &tags);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::dispatcher::HostTestFactory;
    use crate::protocol::{KEY_HOST_TEST_NAME, KEY_TIMEOUT};
    use crate::transport::MockConnector;

    fn fast_config() -> RunConfig {
        RunConfig {
            sync_behavior: 2,
            sync_timeout: 0.1,
            duration: 5.0,
            skip_reset: true,
            ..RunConfig::default()
        }
    }

    /// Completes the run when the DUT says hello.
    struct HelloFlag {
        seen: Arc<AtomicBool>,
    }

    impl HostTest for HelloFlag {
        fn setup(&mut self, ctx: &mut TestContext<'_>) -> anyhow::Result<()> {
            let seen = self.seen.clone();
            let handle = ctx.handle().clone();
            ctx.register_callback(
                "hello_world",
                Box::new(move |_key, value, _ts| {
                    let passed = value == "Hello World";
                    seen.store(passed, Ordering::SeqCst);
                    handle.notify_complete(Some(passed));
                    Ok(())
                }),
            )?;
            Ok(())
        }

        fn result(&mut self) -> Option<bool> {
            None
        }
    }

    fn hello_flag_registry(seen: Arc<AtomicBool>) -> HostTestRegistry {
        let mut registry = HostTestRegistry::empty();
        let factory: HostTestFactory = Box::new(move || {
            Box::new(HelloFlag {
                seen: seen.clone(),
            })
        });
        registry.register("hello_flag", factory);
        registry
    }

    #[test]
    fn hello_world_frame_completes_the_run() {
        let seen = Arc::new(AtomicBool::new(false));
        let runner =
            TestRunner::new(fast_config()).with_host_tests(hello_flag_registry(seen.clone()));

        let mock = MockConnector::new();
        mock.set_echo_sync(true);
        mock.queue_kv(KEY_HOST_TEST_NAME, "hello_flag");
        mock.queue_kv("hello_world", "Hello World");

        let report = runner.run_with_connector(Box::new(mock.clone()));
        assert_eq!(report.verdict, TestResult::Success);
        assert!(seen.load(Ordering::SeqCst));
        assert!(mock.finished());
    }

    /// Holds a fixed verdict for the run loop to consult at expiry.
    struct VerdictAtExpiry {
        passed: bool,
    }

    impl HostTest for VerdictAtExpiry {
        fn setup(&mut self, _ctx: &mut TestContext<'_>) -> anyhow::Result<()> {
            Ok(())
        }

        fn result(&mut self) -> Option<bool> {
            Some(self.passed)
        }
    }

    #[test]
    fn bound_host_test_result_decides_at_expiry() {
        let mut registry = HostTestRegistry::empty();
        let factory: HostTestFactory = Box::new(|| Box::new(VerdictAtExpiry { passed: true }));
        registry.register("verdict_at_expiry", factory);

        let config = RunConfig {
            duration: 0.5,
            ..fast_config()
        };
        let runner = TestRunner::new(config).with_host_tests(registry);

        let mock = MockConnector::new();
        mock.set_echo_sync(true);
        mock.queue_kv(KEY_HOST_TEST_NAME, "verdict_at_expiry");

        // No Complete signal ever arrives; the deadline expires and the
        // bound host test's own result must decide the run.
        let report = runner.run_with_connector(Box::new(mock.clone()));
        assert_eq!(report.verdict, TestResult::Success);
        assert!(mock.finished());
    }

    #[test]
    fn default_end_handler_yields_verdict_without_host_test() {
        let runner = TestRunner::new(fast_config());
        let mock = MockConnector::new();
        mock.set_echo_sync(true);
        mock.queue_kv("end", "failure");

        let report = runner.run_with_connector(Box::new(mock.clone()));
        assert_eq!(report.verdict, TestResult::Failure);
    }

    #[test]
    fn silence_expires_into_timeout() {
        let config = RunConfig {
            sync_behavior: 0,
            duration: 0.3,
            skip_reset: true,
            ..RunConfig::default()
        };
        let runner = TestRunner::new(config);
        let report = runner.run_with_connector(Box::new(MockConnector::new()));
        assert_eq!(report.verdict, TestResult::Timeout);
    }

    #[test]
    fn sync_exhaustion_yields_sync_failed() {
        let runner = TestRunner::new(fast_config());
        // No echo: the handshake can never complete.
        let report = runner.run_with_connector(Box::new(MockConnector::new()));
        assert_eq!(report.verdict, TestResult::SyncFailed);
    }

    #[test]
    fn lost_connection_yields_ioerr_serial() {
        let runner = TestRunner::new(fast_config());
        let mock = MockConnector::new();
        mock.set_echo_sync(true);
        mock.disconnect();

        let report = runner.run_with_connector(Box::new(mock.clone()));
        assert_eq!(report.verdict, TestResult::IoerrSerial);
        assert!(mock.finished());
    }

    #[test]
    fn missing_image_yields_no_image() {
        let config = RunConfig {
            image_path: Some("/no/such/image.bin".into()),
            ..RunConfig::default()
        };
        let report = TestRunner::new(config).run();
        assert_eq!(report.verdict, TestResult::NoImage);
    }

    #[test]
    fn no_endpoint_yields_not_detected() {
        let config = RunConfig {
            skip_flashing: true,
            ..RunConfig::default()
        };
        let report = TestRunner::new(config).run();
        assert_eq!(report.verdict, TestResult::NotDetected);
    }

    #[test]
    fn run_image_mode_streams_passively() {
        let config = RunConfig {
            run_binary: true,
            duration: 0.3,
            skip_reset: true,
            ..RunConfig::default()
        };
        let runner = TestRunner::new(config);
        let mock = MockConnector::new();
        mock.queue_rx(b"boot banner\n");

        let report = runner.run_with_connector(Box::new(mock.clone()));
        assert_eq!(report.verdict, TestResult::Passive);
        assert!(report.output.contains("boot banner"));
    }

    #[test]
    fn dut_announced_timeout_shortens_the_deadline() {
        let config = RunConfig {
            duration: 60.0,
            ..fast_config()
        };
        let runner = TestRunner::new(config);
        let mock = MockConnector::new();
        mock.set_echo_sync(true);
        mock.queue_kv(KEY_TIMEOUT, "1");

        let started = Instant::now();
        let report = runner.run_with_connector(Box::new(mock.clone()));
        assert_eq!(report.verdict, TestResult::Timeout);
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[test]
    fn collection_extracts_testcases_and_serial_output() {
        let dir = tempfile::tempdir().unwrap();
        let serial_out = dir.path().join("serial.log");
        let config = RunConfig {
            serial_output_file: Some(serial_out.display().to_string()),
            build_path: Some(dir.path().display().to_string()),
            ..fast_config()
        };
        let runner = TestRunner::new(config);

        let mock = MockConnector::new();
        mock.set_echo_sync(true);
        mock.queue_kv("__testcase_finish", "case-a;1;0");
        mock.queue_kv("__testcase_summary", "1;0");
        mock.queue_kv("end", "success");

        let report = runner.run_with_connector(Box::new(mock.clone()));
        assert_eq!(report.verdict, TestResult::Success);
        assert_eq!(report.testcases.len(), 1);
        assert_eq!(report.testcases[0].name, "case-a");
        assert_eq!(
            report.summary,
            Some(TestCaseSummary {
                passes: 1,
                failures: 0
            })
        );

        let saved = std::fs::read_to_string(serial_out).unwrap();
        assert!(saved.contains("__testcase_summary"));
    }

    #[test]
    #[cfg(unix)]
    fn harness_retries_until_marker_success() {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let counter = dir.path().join("attempts");
        let script = dir.path().join("flaky.sh");
        let mut f = std::fs::File::create(&script).unwrap();
        writeln!(
            f,
            "#!/bin/sh\n\
             n=$(cat {0} 2>/dev/null || echo 0)\n\
             n=$((n + 1))\n\
             echo $n > {0}\n\
             if [ $n -lt 3 ]; then echo attempt $n; exit 1; fi\n\
             echo '{{{{success}}}}'\n\
             exit 0",
            counter.display()
        )
        .unwrap();
        drop(f);
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = RunConfig {
            process_start_timeout: 10.0,
            duration: 10.0,
            ..RunConfig::default()
        };
        let runner = TestRunner::new(config);
        let report = runner
            .run_harness(&[script.display().to_string()], 3)
            .unwrap();
        assert_eq!(report.verdict, TestResult::Success);
        assert_eq!(std::fs::read_to_string(counter).unwrap().trim(), "3");
    }

    #[test]
    #[cfg(unix)]
    fn end_hook_runs_with_verdict_tag() {
        let dir = tempfile::tempdir().unwrap();
        let hook_out = dir.path().join("hook.out");
        let hooks = dir.path().join("hooks.json");
        std::fs::write(
            &hooks,
            format!(
                r#"{{"hooks": {{"hook_test_end": "printf %s {{verdict}} > {}"}}}}"#,
                hook_out.display()
            ),
        )
        .unwrap();

        let config = RunConfig {
            hooks_path: Some(hooks.display().to_string()),
            ..fast_config()
        };
        let runner = TestRunner::new(config);
        let mock = MockConnector::new();
        mock.set_echo_sync(true);
        mock.queue_kv("end", "success");

        let report = runner.run_with_connector(Box::new(mock));
        assert_eq!(report.verdict, TestResult::Success);
        assert_eq!(std::fs::read_to_string(hook_out).unwrap(), "success");
    }
}
