use crate::estimation::metadata::DEFAULT_TIMEZONE;
use crate::report::{DEFAULT_BATCH_SIZE, ReportSettings};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_DATABASE_PATH: &str = "store_monitoring.db";
pub const DEFAULT_OUTPUT_DIR: &str = "reports";
pub const DEFAULT_SERVER_PORT: u16 = 8000;
pub const DEFAULT_MAX_CONCURRENT_RUNS: usize = 1;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub database: Option<DatabaseSection>,
    #[serde(default)]
    pub report: Option<ReportSection>,
    #[serde(default)]
    pub server: Option<ServerSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSection {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportSection {
    /// Directory receiving the CSV artifacts (default: reports)
    pub output_dir: Option<PathBuf>,
    /// Stores per batch (default: 50)
    pub batch_size: Option<usize>,
    /// Zone assumed for stores without a recorded one
    pub default_timezone: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8000)
    pub port: Option<u16>,
    /// Report runs allowed in flight at once (default: 1)
    pub max_concurrent_runs: Option<usize>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}

impl Config {
    pub fn log_level(&self) -> &str {
        &self.logging.level
    }

    pub fn database_path(&self) -> &Path {
        self.database
            .as_ref()
            .and_then(|section| section.path.as_deref())
            .filter(|path| !path.as_os_str().is_empty())
            .unwrap_or(Path::new(DEFAULT_DATABASE_PATH))
    }

    /// Report settings with defaults applied. A zero batch size is raised to 1.
    pub fn report_settings(&self) -> ReportSettings {
        let section = self.report.as_ref();
        ReportSettings {
            output_dir: section
                .and_then(|s| s.output_dir.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            batch_size: section
                .and_then(|s| s.batch_size)
                .unwrap_or(DEFAULT_BATCH_SIZE)
                .max(1),
            default_timezone: section
                .and_then(|s| s.default_timezone.clone())
                .filter(|zone| !zone.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
        }
    }

    /// Returns the server port (default: 8000)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    pub fn max_concurrent_runs(&self) -> usize {
        self.server
            .as_ref()
            .and_then(|s| s.max_concurrent_runs)
            .unwrap_or(DEFAULT_MAX_CONCURRENT_RUNS)
            .max(1)
    }
}
