//! # FPV Power Monitor
//!
//! Continuously samples drone power telemetry, flags readings outside the
//! configured safety bounds and delivers fault alerts.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Parse command line arguments and load the TOML configuration
//!    - Set up logging (stdout, or daily rotated files when `[logging] dir` is set)
//!    - Open the audit log and build the notification channel
//!
//! 2. **Monitoring**
//!    - Sample telemetry and evaluate it against the safety bounds on
//!      independent cadences until Ctrl+C or SIGTERM
//!
//! 3. **Graceful Shutdown**
//!    - Stop both loops, wait for in-flight alert deliveries to resolve
//!
//! # Exit codes
//!
//! - `0` clean shutdown, or `--check` passed
//! - `2` invalid configuration
//! - `1` any other startup or runtime failure
//!
//! # Examples
//!
//! ```bash
//! cargo run --release -- --config config/default.toml
//! RUST_LOG=debug cargo run -- --check
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

use fpv_power_monitor::alert::{build_sink, AlertDispatcher, DispatchOutcome};
use fpv_power_monitor::audit::AuditLog;
use fpv_power_monitor::config::{Config, LoggingConfig};
use fpv_power_monitor::error::MonitorError;
use fpv_power_monitor::pipeline::{PipelineSettings, TelemetryPipeline};
use fpv_power_monitor::telemetry::{HttpUplink, SampleStore, Sampler, SimulatedSource};

/// Exit code for an invalid configuration
const EXIT_CONFIG: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "fpv-power-monitor", version, about = "Drone power telemetry monitor")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    config: PathBuf,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration {}: {}", args.config.display(), e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    if args.check {
        println!("Configuration OK: {}", args.config.display());
        return ExitCode::SUCCESS;
    }

    // Dropping the guard flushes buffered file logs, so it lives until exit
    let _guard = match init_logging(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            exit_code(&e)
        }
    }
}

fn exit_code(e: &anyhow::Error) -> ExitCode {
    match e.downcast_ref::<MonitorError>() {
        Some(err) if err.is_config() => ExitCode::from(EXIT_CONFIG),
        _ => ExitCode::FAILURE,
    }
}

fn init_logging(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if logging.dir.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return Ok(None);
    }

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(&logging.file_prefix)
        .build(&logging.dir)
        .with_context(|| format!("creating log directory {}", logging.dir))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(Some(guard))
}

async fn run(config: Config) -> Result<()> {
    info!("FPV Power Monitor v{} starting...", env!("CARGO_PKG_VERSION"));

    let audit = if config.audit.enabled {
        AuditLog::open(&config.audit.path)
            .with_context(|| format!("opening audit log {}", config.audit.path))?
    } else {
        AuditLog::disabled()
    };

    let sink = build_sink(&config.notifier)?;
    info!("Notifying via {:?} channel", config.notifier.kind);
    let dispatcher = AlertDispatcher::new(sink, config.dispatcher_settings()?, audit.clone());

    let source = SimulatedSource::new(config.simulator_ranges()?);
    let sampler = Sampler::new(Box::new(source), SampleStore::new(), config.envelope()?, audit);

    let settings = PipelineSettings {
        sample_interval: config.sample_interval()?,
        evaluate_interval: config.evaluate_interval()?,
    };
    let mut pipeline = TelemetryPipeline::new(sampler, dispatcher, config.bounds()?, settings);

    if config.forwarder.enabled {
        info!("Forwarding telemetry to {}", config.forwarder.endpoint);
        pipeline = pipeline.with_forwarder(
            Arc::new(HttpUplink::new(&config.forwarder.endpoint)),
            config.forward_interval()?,
            config.forward_timeout()?,
        );
    }

    pipeline.start()?;
    info!("Press Ctrl+C to exit");

    wait_for_shutdown()
        .await
        .context("installing signal handlers")?;
    info!("Shutdown signal received");

    let reports = pipeline.stop().await?;
    let exhausted = reports
        .iter()
        .filter(|r| r.outcome == DispatchOutcome::Exhausted)
        .count();
    if exhausted > 0 {
        warn!("{} alert(s) could not be delivered before shutdown", exhausted);
    }

    let active = pipeline.alert_states().active_metrics();
    if !active.is_empty() {
        warn!("Exiting with active faults: {:?}", active);
    }

    info!("FPV Power Monitor stopped after {} evaluation ticks", pipeline.ticks());
    Ok(())
}

async fn wait_for_shutdown() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = term.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
