//! pulsegen daemon entry point.
//!
//! Lifecycle coordinator: parses flags, loads configuration, initializes
//! the real-time environment, then runs the output driver and the control
//! channel as two threads at equal real-time priority. Termination signals
//! request cooperative shutdown; the driver thread is joined before exit,
//! the control thread is reclaimed by process exit.

mod signals;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use pulsegen_common::PulseConfig;
use pulsegen_gpio::{GpioOutput, SimulatedGpio};
use pulsegen_runtime::{
    apply_thread_scheduling, init_realtime, ControlChannel, ControlEndpoint,
    MessageQueueEndpoint, PulseContext, PulseDriver,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "pulsegen",
    about = "Real-time GPIO square-wave generator with runtime period retuning",
    version,
    long_about = None
)]
struct Args {
    /// Toggle period in nanoseconds.
    #[arg(short = 'p', long = "period", value_name = "NANOSECONDS")]
    period_ns: Option<u64>,

    /// GPIO pin to drive.
    #[arg(short = 'g', long = "gpio", value_name = "PIN")]
    gpio_pin: Option<u32>,

    /// Path to a configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Drive a simulated GPIO instead of /dev/mem (no XDDP endpoint).
    #[arg(long, short = 's')]
    simulated: bool,

    /// Maximum cycles to run (0 = infinite).
    #[arg(long, default_value = "0")]
    max_cycles: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    // Usage requests (-h/--help) and invalid flags are both setup
    // failures: print the usage text and exit 1, not clap's defaults
    // (0 for help, 2 for a bad flag).
    let args = Args::try_parse().unwrap_or_else(|e| {
        eprint!("{e}");
        std::process::exit(1);
    });

    init_logging(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "starting pulsegen");

    let mut config = load_config(&args)?;

    // Command-line overrides
    if let Some(period_ns) = args.period_ns {
        config.period_ns = period_ns;
    }
    if let Some(pin) = args.gpio_pin {
        config.gpio_pin = pin;
    }
    if config.period_ns == 0 {
        anyhow::bail!("period must be a positive number of nanoseconds");
    }

    // Startup announcement: effective pin and period.
    info!(
        gpio_pin = config.gpio_pin,
        period_ns = config.period_ns,
        "using GPIO {} with period {} ns",
        config.gpio_pin,
        config.period_ns
    );

    init_realtime(&config.realtime).context("failed to initialize real-time environment")?;

    let ctx = Arc::new(PulseContext::new(config.period_ns));
    signals::install(Arc::clone(&ctx)).context("failed to set up signal handlers")?;

    if args.simulated {
        info!("using simulated GPIO and in-process control endpoint");
        let (_control_tx, endpoint) = MessageQueueEndpoint::pair();
        let gpio: Box<dyn GpioOutput> = Box::new(SimulatedGpio::new());
        return run_generator(gpio, endpoint, &config, &ctx, args.max_cycles);
    }

    run_hardware(&config, &ctx, args.max_cycles)
}

/// Hardware mode: memory-mapped GPIO plus the XDDP control endpoint.
#[cfg(target_os = "linux")]
fn run_hardware(config: &PulseConfig, ctx: &Arc<PulseContext>, max_cycles: u64) -> Result<()> {
    let gpio: Box<dyn GpioOutput> =
        Box::new(pulsegen_gpio::Bcm2835Gpio::open().context("failed to map GPIO registers")?);
    let endpoint =
        pulsegen_runtime::XddpEndpoint::bind(config.control.port, config.control.pool_size)
            .context("failed to bind control endpoint")?;
    run_generator(gpio, endpoint, config, ctx, max_cycles)
}

#[cfg(not(target_os = "linux"))]
fn run_hardware(_config: &PulseConfig, _ctx: &Arc<PulseContext>, _max_cycles: u64) -> Result<()> {
    anyhow::bail!("hardware mode requires Linux; run with --simulated")
}

/// Spawn the two concurrent activities and wait for the driver to finish.
fn run_generator<E: ControlEndpoint + 'static>(
    gpio: Box<dyn GpioOutput>,
    endpoint: E,
    config: &PulseConfig,
    ctx: &Arc<PulseContext>,
    max_cycles: u64,
) -> Result<()> {
    let mut driver = PulseDriver::new(gpio, Arc::clone(ctx), config).max_cycles(max_cycles);
    driver.init().context("failed to configure GPIO output")?;

    // Control channel: detached by design, reclaimed at process exit. Its
    // setup already succeeded (the endpoint is bound), so nothing fatal can
    // happen past this point.
    let control_rt = config.realtime.clone();
    let control_ctx = Arc::clone(ctx);
    std::thread::Builder::new()
        .name("pulsegen-control".into())
        .spawn(move || {
            if let Err(e) = apply_thread_scheduling(&control_rt) {
                warn!(error = %e, "control thread scheduling failed");
            }
            ControlChannel::new(endpoint, control_ctx).run();
        })
        .context("failed to spawn control thread")?;

    let driver_rt = config.realtime.clone();
    let driver_handle = std::thread::Builder::new()
        .name("pulsegen-driver".into())
        .spawn(move || {
            if let Err(e) = apply_thread_scheduling(&driver_rt) {
                warn!(error = %e, "driver thread scheduling failed");
            }
            let result = driver.run();
            (result, driver.cycle_count(), driver.stats().max_jitter_ns())
        })
        .context("failed to spawn driver thread")?;

    let (result, cycles, max_jitter_ns) = driver_handle
        .join()
        .map_err(|_| anyhow!("driver thread panicked"))?;
    result.context("output driver failed")?;

    info!(cycles, max_jitter_ns, "shutdown complete");
    Ok(())
}

/// Initialize logging with the specified log level.
fn init_logging(level: &str) {
    let filter = format!(
        "pulsegen_daemon={level},pulsegen_runtime={level},pulsegen_gpio={level},pulsegen_common={level}"
    );

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `PULSEGEN_CONFIG_PATH` environment variable
/// 3. `/etc/pulsegen/config.toml` (system path)
/// 4. `config/default.toml` (local development)
/// 5. Built-in defaults
fn load_config(args: &Args) -> Result<PulseConfig> {
    if let Some(config_path) = &args.config {
        info!(?config_path, "loading config from command-line argument");
        return PulseConfig::from_file(config_path)
            .with_context(|| format!("failed to load config from {config_path:?}"));
    }

    if let Ok(env_path) = std::env::var("PULSEGEN_CONFIG_PATH") {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "loading config from PULSEGEN_CONFIG_PATH");
            return PulseConfig::from_file(&config_path).with_context(|| {
                format!("failed to load config from PULSEGEN_CONFIG_PATH={env_path:?}")
            });
        }
        warn!(
            path = %env_path,
            "PULSEGEN_CONFIG_PATH set but file does not exist, checking other locations"
        );
    }

    let system_path = PathBuf::from("/etc/pulsegen/config.toml");
    if system_path.exists() {
        info!(?system_path, "loading config from system path");
        return PulseConfig::from_file(&system_path)
            .with_context(|| format!("failed to load config from {system_path:?}"));
    }

    let local_path = PathBuf::from("config/default.toml");
    if local_path.exists() {
        info!(?local_path, "loading config from local path");
        return PulseConfig::from_file(&local_path)
            .with_context(|| format!("failed to load config from {local_path:?}"));
    }

    info!("no config file found, using built-in defaults");
    Ok(PulseConfig::default())
}
