//! healthwatch - HTTP health checker
//!
//! Checks one URL on a fixed interval, keeps the latest result in SQLite
//! and notifies a webhook and/or pub/sub topics when the service goes down
//! or recovers.

mod config;
mod db;
mod notify;
mod probe;
mod scheduler;
mod threshold;

use clap::Parser;
use config::MonitorConfig;
use scheduler::{run_schedule, Monitor};

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cfg = MonitorConfig::parse();
    init_logging(&cfg)?;

    // Reject bad settings before anything is scheduled
    cfg.validate()?;
    let interval = cfg.interval()?;

    let monitor = Monitor::from_config(&cfg).await?;
    tracing::info!(
        "Checking {} every {:?} (failure threshold {}, success threshold {})",
        monitor.url(),
        interval,
        cfg.failure_threshold,
        cfg.success_threshold
    );

    let ran = run_schedule(&monitor, interval, cfg.count).await;
    tracing::info!("Finished after {} health check(s)", ran);

    Ok(())
}

fn init_logging(cfg: &MonitorConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (level, bad_level) = parse_level(&cfg.log_level);

    let (file, file_err) = match &cfg.log_file {
        Some(path) => match open_log_file(path) {
            Ok(file) => (Some(file), None),
            Err(e) => (None, Some(format!("{}: {}", path.display(), e))),
        },
        None => (None, None),
    };

    let file_layer = file.map(|f| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(f))
    });
    let stderr_layer = file_layer
        .is_none()
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::registry()
        .with(log_filter(rust_log.as_deref(), level))
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    if bad_level {
        tracing::info!(
            "Invalid log level {:?} specified. Using default \"info\" level.",
            cfg.log_level
        );
    }
    match (file_err, &cfg.log_file) {
        (Some(e), _) => tracing::error!("Failed to log to file {}, using stderr", e),
        (None, Some(path)) => tracing::info!("Logging to file: {}", path.display()),
        (None, None) => {}
    }

    Ok(())
}

/// Parse `--log-level`, falling back to `info`. The flag is true on fallback.
fn parse_level(raw: &str) -> (Level, bool) {
    match raw.parse::<Level>() {
        Ok(level) => (level, false),
        Err(_) => (Level::INFO, true),
    }
}

/// `RUST_LOG` directives when set, otherwise `--log-level` for this crate.
fn log_filter(rust_log: Option<&str>, level: Level) -> EnvFilter {
    match rust_log.map(str::trim).filter(|d| !d.is_empty()) {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::new(format!(
            "warn,healthwatch={}",
            level.as_str().to_lowercase()
        )),
    }
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}
