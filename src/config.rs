use crate::error::{ClientError, Result};

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SERVER_ADDRESS: &str = "http://127.0.0.1:9092";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub server_address: String,
    pub use_tls: bool,
    pub root_certificates: Option<PathBuf>,
    pub transport: Transport,
    /// Wait between two pulls that returned no task.
    pub poll_interval_secs: u64,
    pub logging: LoggingConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: DEFAULT_SERVER_ADDRESS.to_string(),
            use_tls: false,
            root_certificates: None,
            transport: Transport::Rere,
            poll_interval_secs: 3,
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Request/response calls against the Fleet service.
    Rere,
    /// One bidirectional stream to the legacy `FlowerService`.
    Bidi,
}

impl FromStr for Transport {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rere" | "grpc-rere" => Ok(Transport::Rere),
            "bidi" | "grpc-bidi" => Ok(Transport::Bidi),
            other => Err(ClientError::Config(format!("unknown transport '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub include_source: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            include_source: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl ClientConfig {
    pub fn load_required(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            ClientError::Config(format!(
                "failed to read config file {}: {}",
                path.display(),
                err
            ))
        })?;
        serde_yaml::from_str(&raw).map_err(|err| {
            ClientError::Config(format!(
                "failed to parse yaml config {}: {}",
                path.display(),
                err
            ))
        })
    }

    pub fn load_optional(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(Self::load_required(path)?))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}
