use anyhow::{bail, Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for repostat
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    /// Repository discovery settings
    #[serde(default)]
    pub scan: ScanConfig,

    /// Auto-sync and worker pool settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// How commands reach the repositories
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Repository discovery configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScanConfig {
    /// Maximum `find` depth below the target directory
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
}

/// Synchronization configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    /// Rebase-pull repositories that are cleanly behind their upstream
    #[serde(default)]
    pub auto_sync: bool,

    /// Maximum repositories processed at once
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

/// Command execution configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TransportConfig {
    /// Timeout for every external invocation, in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Shell used for batched scripts on the local machine
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Remote shell client
    #[serde(default = "default_ssh_program")]
    pub ssh_program: String,

    /// Extra arguments passed to the remote shell client before the destination
    #[serde(default = "default_ssh_options")]
    pub ssh_options: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Enable colored report output
    #[serde(default = "default_true")]
    pub color: bool,
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_max_depth() -> u32 {
    2
}
fn default_max_parallel() -> usize {
    4
}
fn default_timeout() -> u64 {
    120
}
fn default_shell() -> String {
    "sh".to_string()
}
fn default_ssh_program() -> String {
    "ssh".to_string()
}
fn default_ssh_options() -> Vec<String> {
    vec!["-o".to_string(), "BatchMode=yes".to_string()]
}
fn default_log_level() -> String {
    "warn".to_string()
}

// Default implementations
impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_sync: false,
            max_parallel: default_max_parallel(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            shell: default_shell(),
            ssh_program: default_ssh_program(),
            ssh_options: default_ssh_options(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            color: default_true(),
        }
    }
}

impl TransportConfig {
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl Config {
    /// Load configuration from the default location, falling back to defaults
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            tracing::debug!("No configuration at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {:?}", path))?;

        Ok(config)
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("repostat").join("config.yml"))
    }

    /// Reject values that would make a run meaningless
    pub fn validate(&self) -> Result<()> {
        if self.scan.max_depth == 0 {
            bail!("scan.max_depth must be at least 1");
        }
        if self.sync.max_parallel == 0 {
            bail!("sync.max_parallel must be at least 1");
        }
        if self.transport.timeout == 0 {
            bail!("transport.timeout must be at least 1 second");
        }
        Ok(())
    }
}
