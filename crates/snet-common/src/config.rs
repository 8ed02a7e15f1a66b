//! ---
//! snet_section: "01-core-functionality"
//! snet_subsection: "module"
//! snet_type: "source"
//! snet_scope: "code"
//! snet_description: "Shared primitives and utilities for the SensorNet runtime."
//! snet_version: "v0.0.0-prealpha"
//! snet_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_port() -> u16 {
    5000
}

fn default_node_id() -> String {
    "panel-1".to_owned()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_max_frame_bytes() -> usize {
    1024 * 1024
}

fn default_retention() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_worker_threads() -> usize {
    2
}

fn default_queue_bound() -> usize {
    64
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Primary configuration object for a SensorNet client process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "SNET_CONFIG";

    /// Load configuration from disk, respecting the `SNET_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    /// Parse and validate a configuration file.
    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.session.validate()?;
        if self.history.retention.is_zero() {
            return Err(anyhow!("history retention must be greater than zero"));
        }
        self.workers.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Which side of the protocol a session registers as.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// A field node publishing sensor data and accepting actuator commands.
    Node,
    /// A supervisory client observing nodes and issuing commands.
    #[default]
    ControlPanel,
}

impl SessionKind {
    /// Role string announced in the registration message.
    pub fn role(&self) -> &'static str {
        match self {
            SessionKind::Node => "SENSOR_NODE",
            SessionKind::ControlPanel => "CONTROL_PANEL",
        }
    }
}

impl std::str::FromStr for SessionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "node" => Ok(SessionKind::Node),
            "control_panel" | "panel" => Ok(SessionKind::ControlPanel),
            other => Err(format!("unknown session kind: {}", other)),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub kind: SessionKind,
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_connect_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub connect_timeout: Duration,
    /// Upper bound applied to inbound frames before their payload is allocated.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            kind: SessionKind::default(),
            node_id: default_node_id(),
            host: default_host(),
            port: default_port(),
            connect_timeout: default_connect_timeout(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.node_id.trim().is_empty() {
            return Err(anyhow!("session node_id must not be empty"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("session host must not be empty"));
        }
        if self.max_frame_bytes == 0 {
            return Err(anyhow!("session max_frame_bytes must be greater than zero"));
        }
        Ok(())
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_retention")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub retention: Duration,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            retention: default_retention(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_threads")]
    pub threads: usize,
    #[serde(default = "default_queue_bound")]
    pub queue_bound: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            threads: default_worker_threads(),
            queue_bound: default_queue_bound(),
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(anyhow!("workers.threads must be at least 1"));
        }
        if self.queue_bound == 0 {
            return Err(anyhow!("workers.queue_bound must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}
