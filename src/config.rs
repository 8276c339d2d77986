use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::devices::sds5034::PartialReadPolicy;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    pub transport: TransportConfig,
    pub acquisition: AcquisitionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TransportConfig {
    /// Per-operation socket timeout
    pub timeout_ms: u64,
    /// Extra attempts for writes and queries that fail at the link level
    pub retries: u32,
    /// Largest single read requested from the instrument, in bytes
    pub chunk_size: usize,
    /// Pause before every command, for firmware that drops back-to-back traffic
    pub throttle_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AcquisitionConfig {
    pub partial_read: PartialReadPolicy,
    pub csv_sink: bool,
    pub csv_path: String,
    /// Pause between steps of the continuous timebase stepper
    pub step_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub log_level: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            retries: 1,
            chunk_size: 20 * 1024 * 1024,
            throttle_ms: 0,
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            partial_read: PartialReadPolicy::Tolerate,
            csv_sink: false,
            csv_path: "data.csv".to_string(),
            step_interval_ms: 500,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Load configuration from file with layered fallbacks
pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder()
        .add_source(Config::try_from(&AppConfig::default())?);

    if let Some(path) = config_path {
        if path.exists() {
            builder = builder.add_source(File::from(path));
        } else {
            return Err(ConfigError::Message(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
    } else if Path::new("labpanel.toml").exists() {
        builder = builder.add_source(File::with_name("labpanel.toml"));
    }

    // Environment overrides, e.g. LABPANEL__TRANSPORT__TIMEOUT_MS=10000
    builder = builder.add_source(
        Environment::with_prefix("LABPANEL")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize::<AppConfig>()
}

/// Load configuration, falling back to defaults when it can't be read
pub fn load_config_or_default(config_path: Option<&Path>) -> AppConfig {
    match load_config(config_path) {
        Ok(config) => {
            log::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            log::warn!("Failed to load config ({}), using defaults", e);
            AppConfig::default()
        }
    }
}
