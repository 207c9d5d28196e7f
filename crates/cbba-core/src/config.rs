use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration for an allocation agent
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CbbaConfig {
    /// Auction and scoring parameters
    #[serde(default)]
    pub allocation: AllocationConfig,

    /// Inbox sizing
    #[serde(default)]
    pub mailbox: MailboxConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// In-process fleet simulation settings
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Auction and scoring parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AllocationConfig {
    /// Maximum number of tasks one agent may hold
    #[serde(default = "default_max_assignments")]
    pub max_assignments: usize,

    /// Reward for completing a task at time zero
    #[serde(default = "default_reward")]
    pub reward: f64,

    /// Per-second discount applied to the reward, in (0, 1)
    #[serde(default = "default_time_discount_factor")]
    pub time_discount_factor: f64,

    /// Cruise speed in metres per second
    #[serde(default = "default_max_speed")]
    pub max_speed: f64,

    /// Minimum delay between allocation cycles (ms)
    #[serde(default = "default_cycle_interval_ms")]
    pub cycle_interval_ms: u64,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            max_assignments: default_max_assignments(),
            reward: default_reward(),
            time_discount_factor: default_time_discount_factor(),
            max_speed: default_max_speed(),
            cycle_interval_ms: default_cycle_interval_ms(),
        }
    }
}

/// Inbox sizing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MailboxConfig {
    /// Messages buffered between two drains before the oldest are dropped
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: default_inbox_capacity(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty", "json", "compact"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// In-process fleet simulation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationConfig {
    /// Probability that a single delivery is lost, in [0, 1)
    #[serde(default)]
    pub loss: f64,

    /// Seed for the loss generator
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Upper bound on synchronous rounds before giving up
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            loss: 0.0,
            seed: default_seed(),
            max_rounds: default_max_rounds(),
        }
    }
}

fn default_max_assignments() -> usize {
    5
}
fn default_reward() -> f64 {
    10.0
}
fn default_time_discount_factor() -> f64 {
    0.95
}
fn default_max_speed() -> f64 {
    10.0
}
fn default_cycle_interval_ms() -> u64 {
    50
}
fn default_inbox_capacity() -> usize {
    4096
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}
fn default_seed() -> u64 {
    0xACE1
}
fn default_max_rounds() -> usize {
    500
}

/// Name of the per-directory config file.
pub const LOCAL_CONFIG_FILE: &str = ".cbba.toml";

/// Configuration manager that loads from multiple sources
pub struct ConfigManager {
    config: CbbaConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Explicit config file (if given)
    /// 3. Config file (.cbba.toml in the current directory)
    /// 4. Defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    pub fn load_from(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_dotenv();

        let (config, config_path) = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.display().to_string()));
                }
                (Self::read_toml_file(path)?, Some(path.to_path_buf()))
            }
            None => Self::load_config_file()?,
        };

        let config = Self::apply_env_overrides(config, |key| std::env::var(key).ok());
        Self::validate_config(&config)?;

        if let Some(path) = &config_path {
            info!("Loaded configuration from {}", path.display());
        }

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Wrap an already-built configuration after validating it.
    pub fn from_config(config: CbbaConfig) -> Result<Self, ConfigError> {
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: None,
        })
    }

    fn load_dotenv() {
        if Path::new(".env").exists() {
            if let Err(e) = dotenv::from_filename(".env") {
                warn!("Failed to load .env file: {}", e);
            }
        }
    }

    fn load_config_file() -> Result<(CbbaConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }
        Ok((CbbaConfig::default(), None))
    }

    fn read_toml_file(path: &Path) -> Result<CbbaConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Apply `CBBA_*` overrides. Unparseable values are ignored with a warning.
    fn apply_env_overrides<F>(mut config: CbbaConfig, lookup: F) -> CbbaConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!("Ignoring unparseable {}={}", key, raw);
                    None
                }
            }
        }

        if let Some(v) = parsed("CBBA_MAX_ASSIGNMENTS", lookup("CBBA_MAX_ASSIGNMENTS")) {
            config.allocation.max_assignments = v;
        }
        if let Some(v) = parsed("CBBA_REWARD", lookup("CBBA_REWARD")) {
            config.allocation.reward = v;
        }
        if let Some(v) = parsed(
            "CBBA_TIME_DISCOUNT_FACTOR",
            lookup("CBBA_TIME_DISCOUNT_FACTOR"),
        ) {
            config.allocation.time_discount_factor = v;
        }
        if let Some(v) = parsed("CBBA_MAX_SPEED", lookup("CBBA_MAX_SPEED")) {
            config.allocation.max_speed = v;
        }
        if let Some(v) = parsed("CBBA_CYCLE_INTERVAL_MS", lookup("CBBA_CYCLE_INTERVAL_MS")) {
            config.allocation.cycle_interval_ms = v;
        }
        if let Some(v) = parsed("CBBA_INBOX_CAPACITY", lookup("CBBA_INBOX_CAPACITY")) {
            config.mailbox.inbox_capacity = v;
        }
        if let Some(level) = lookup("CBBA_LOG_LEVEL").or_else(|| lookup("RUST_LOG")) {
            // RUST_LOG may carry directives; only a bare level is taken over
            let level = level.to_ascii_lowercase();
            if matches!(
                level.as_str(),
                "trace" | "debug" | "info" | "warn" | "error"
            ) {
                config.logging.level = level;
            }
        }

        config
    }

    /// Validate configuration
    fn validate_config(config: &CbbaConfig) -> Result<(), ConfigError> {
        let alloc = &config.allocation;
        if alloc.max_assignments == 0 {
            return Err(ConfigError::ValidationError(
                "max_assignments must be at least 1".to_string(),
            ));
        }
        if !(alloc.time_discount_factor > 0.0 && alloc.time_discount_factor < 1.0) {
            return Err(ConfigError::ValidationError(format!(
                "time_discount_factor must be in (0, 1), got {}",
                alloc.time_discount_factor
            )));
        }
        if !(alloc.reward.is_finite() && alloc.reward > 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "reward must be positive, got {}",
                alloc.reward
            )));
        }
        if !(alloc.max_speed.is_finite() && alloc.max_speed > 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "max_speed must be positive, got {}",
                alloc.max_speed
            )));
        }
        if config.mailbox.inbox_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "inbox_capacity must be at least 1".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&config.simulation.loss) {
            return Err(ConfigError::ValidationError(format!(
                "simulation loss must be in [0, 1), got {}",
                config.simulation.loss
            )));
        }

        match config.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    other
                )))
            }
        }
        match config.logging.format.as_str() {
            "pretty" | "json" | "compact" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}. Must be one of: pretty, json, compact",
                    other
                )))
            }
        }

        Ok(())
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &CbbaConfig {
        &self.config
    }

    /// Get the path to the config file that was loaded, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Create a default config file
    pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        let config = CbbaConfig::default();
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::ReadError(e.to_string()))?;
            }
        }

        std::fs::write(path, toml_str).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = CbbaConfig::default();
        assert_eq!(config.allocation.max_assignments, 5);
        assert_eq!(config.allocation.reward, 10.0);
        assert_eq!(config.allocation.time_discount_factor, 0.95);
        assert_eq!(config.allocation.max_speed, 10.0);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_validation() {
        let config = CbbaConfig::default();
        assert!(ConfigManager::validate_config(&config).is_ok());

        let mut bad = config.clone();
        bad.allocation.time_discount_factor = 1.0;
        assert!(ConfigManager::validate_config(&bad).is_err());

        let mut bad = config.clone();
        bad.allocation.max_assignments = 0;
        assert!(ConfigManager::validate_config(&bad).is_err());

        let mut bad = config.clone();
        bad.logging.format = "xml".to_string();
        assert!(ConfigManager::validate_config(&bad).is_err());

        let mut bad = config;
        bad.simulation.loss = 1.0;
        assert!(ConfigManager::validate_config(&bad).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("CBBA_MAX_ASSIGNMENTS", "2"),
            ("CBBA_MAX_SPEED", "not-a-number"),
            ("RUST_LOG", "DEBUG"),
        ]
        .into_iter()
        .collect();

        let config = ConfigManager::apply_env_overrides(CbbaConfig::default(), |k| {
            env.get(k).map(|v| v.to_string())
        });
        assert_eq!(config.allocation.max_assignments, 2);
        assert_eq!(config.allocation.max_speed, 10.0);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_rust_log_directives_are_not_levels() {
        let config = ConfigManager::apply_env_overrides(CbbaConfig::default(), |k| {
            (k == "RUST_LOG").then(|| "cbba_engine=trace".to_string())
        });
        assert_eq!(config.logging.level, "info");
    }
}
