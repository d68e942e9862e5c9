use crate::config::{LogLevel, LoggingConfig};
use crate::error::{ClientError, Result};

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Trace => LevelFilter::TRACE,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Error => LevelFilter::ERROR,
    }
}

/// Installs the global stdout subscriber. `RUST_LOG` takes precedence over
/// the configured level.
pub fn init_logging(cfg: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(level_filter(cfg.level).into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(cfg.include_source)
        .with_line_number(cfg.include_source)
        .try_init()
        .map_err(|err| ClientError::Config(format!("failed to install logger: {}", err)))
}
