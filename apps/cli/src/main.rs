use clap::Parser;
use dutrun_core::config::RunConfig;
use dutrun_core::plugins::{PluginType, builtin_registry};
use dutrun_core::runner::TestRunner;
use dutrun_core::{HostTestRegistry, TestResult};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Host-side test runner for embedded DUTs", long_about = None)]
struct Args {
    /// Target microcontroller name
    #[arg(short, long)]
    micro: Option<String>,

    /// Serial port of the target console
    #[arg(short, long)]
    port: Option<String>,

    /// Serial port baud rate
    #[arg(long, default_value_t = 9600)]
    baud_rate: u32,

    /// Target mount point used for drag-and-drop flashing
    #[arg(short, long)]
    disk: Option<String>,

    /// Unique target id
    #[arg(short = 't', long)]
    target_id: Option<String>,

    /// Path to the binary image to flash
    #[arg(short = 'f', long)]
    image_path: Option<String>,

    /// Copy (flash) method
    #[arg(short = 'c', long)]
    copy: Option<String>,

    /// Number of attempts to flash the target
    #[arg(long, default_value_t = 3)]
    retry_copy: u32,

    /// Forced reset method
    #[arg(short = 'r', long)]
    reset: Option<String>,

    /// Idle delay in seconds after a forced reset
    #[arg(short = 'R', long, default_value_t = 1.0)]
    reset_timeout: f64,

    /// Seconds to wait after copying the binary onto the target
    #[arg(short = 'C', long, default_value_t = 4.0)]
    program_cycle_s: f64,

    /// Overall test duration in seconds
    #[arg(long, default_value_t = 10.0)]
    duration: f64,

    /// Maximum seconds to wait for a spawned process to start
    #[arg(long, default_value_t = 60.0)]
    process_start_timeout: f64,

    /// How many sync packets to send (0 none, -1 forever)
    #[arg(long, default_value_t = 2)]
    sync: i32,

    /// Delay in seconds between sync packets
    #[arg(long, default_value_t = 5.0)]
    sync_timeout: f64,

    /// Timeout in seconds for mount point readiness polling
    #[arg(short = 'P', long, default_value_t = 60)]
    polling_timeout: u64,

    /// Remote resource manager locator: module[:host[:port]]
    #[arg(long)]
    grm: Option<String>,

    /// Comma separated device tags required for remote allocation
    #[arg(long)]
    tag_filters: Option<String>,

    /// Simulator connection configuration name
    #[arg(long)]
    srm_config: Option<String>,

    /// Path to a JSON file with host test configuration data
    #[arg(long)]
    test_cfg: Option<String>,

    /// Host test name, overriding the DUT announcement
    #[arg(short = 'e', long)]
    host_test: Option<String>,

    /// Skip the copy/flash step
    #[arg(long)]
    skip_flashing: bool,

    /// Skip the reset step
    #[arg(long)]
    skip_reset: bool,

    /// Run-image mode: flash, reset and stream console output only
    #[arg(long)]
    run: bool,

    /// List registered host tests and plugins, then exit
    #[arg(long)]
    list: bool,

    /// Save target serial output to this file
    #[arg(long)]
    serial_output_file: Option<String>,

    /// Path to a JSON hooks file executed after the run
    #[arg(long)]
    hooks: Option<String>,

    /// Build directory for coverage artifacts
    #[arg(long)]
    build_path: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Split a `module[:host[:port]]` locator.
fn parse_grm(locator: &str) -> (String, Option<String>, Option<u16>) {
    let mut parts = locator.splitn(3, ':');
    let module = parts.next().unwrap_or_default().to_string();
    let host = parts.next().map(str::to_string);
    let port = parts.next().and_then(|p| p.parse().ok());
    (module, host, port)
}

fn config_from_args(args: &Args) -> RunConfig {
    let (grm_module, grm_host, grm_port) = match args.grm.as_deref() {
        Some(locator) => {
            let (module, host, port) = parse_grm(locator);
            (Some(module), host, port)
        }
        None => (None, None, None),
    };

    RunConfig {
        micro: args.micro.clone(),
        port: args.port.clone(),
        baud_rate: args.baud_rate,
        disk: args.disk.clone(),
        target_id: args.target_id.clone(),
        image_path: args.image_path.clone(),
        copy_method: args.copy.clone(),
        retry_copy: args.retry_copy,
        forced_reset_type: args.reset.clone(),
        forced_reset_timeout: args.reset_timeout,
        program_cycle_s: args.program_cycle_s,
        sync_behavior: args.sync,
        sync_timeout: args.sync_timeout,
        duration: args.duration,
        process_start_timeout: args.process_start_timeout,
        polling_timeout: args.polling_timeout,
        grm_module,
        grm_host,
        grm_port,
        tag_filters: args.tag_filters.clone(),
        sim_config: args.srm_config.clone(),
        json_test_configuration: args.test_cfg.clone(),
        host_test_name: args.host_test.clone(),
        skip_flashing: args.skip_flashing,
        skip_reset: args.skip_reset,
        run_binary: args.run,
        serial_output_file: args.serial_output_file.clone(),
        hooks_path: args.hooks.clone(),
        build_path: args.build_path.clone(),
    }
}

fn print_registries() {
    let host_tests = HostTestRegistry::with_builtins();
    println!("host tests:");
    for name in host_tests.names() {
        println!("  {name}");
    }

    let plugins = builtin_registry(None);
    println!("plugins:");
    for info in plugins.plugin_info() {
        let support = if info.os_supported { "" } else { " (unsupported here)" };
        println!(
            "  {} [{}]: {}{}",
            info.name,
            info.plugin_type,
            info.capabilities.join(", "),
            support
        );
    }
    println!("copy methods: {:?}", plugins.capabilities_of(PluginType::CopyMethod));
    println!("reset methods: {:?}", plugins.capabilities_of(PluginType::ResetMethod));
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if args.list {
        print_registries();
        return;
    }

    let config = config_from_args(&args);
    let runner = TestRunner::new(config);

    info!("starting test run");
    let report = runner.run();

    for case in &report.testcases {
        info!(
            name = %case.name,
            passed = case.passed,
            failed = case.failed,
            "test case"
        );
    }
    if let Some(summary) = &report.summary {
        info!(passes = summary.passes, failures = summary.failures, "test case summary");
    }

    info!(verdict = %report.verdict, elapsed = ?report.elapsed, "run finished");
    if !report.verdict.is_success() {
        error!(verdict = %report.verdict, "run did not pass");
    }
    std::process::exit(match report.verdict {
        TestResult::Passive => 0,
        verdict => verdict.legacy_code(),
    });
}
