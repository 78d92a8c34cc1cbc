//! Configuration management for the recomd daemon.
//!
//! Handles loading, parsing, and validation of the YAML file that tells
//! the daemon where the ventilation unit lives and how often to poll it.

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::sync::RwLock;

use crate::protocol::UnitIdBindingCfg;

/// Main configuration structure for the recomd daemon.
///
/// # Example
///
/// ```yaml
/// version: 1
/// name: "recom"
/// host: "10.0.0.5"
/// port: 502
/// scan_interval: 30
/// unit_id: 1
/// timeout_seconds: 3
/// unit_id_binding: auto
/// dbus: true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Configuration version for compatibility checking.
    pub version: u8,

    /// Hub name; also the device name shown to the host.
    #[serde(default = "defaults::name")]
    pub name: String,

    /// Hostname or IP address of the Modbus/TCP gateway.
    pub host: String,

    #[serde(default = "defaults::port")]
    pub port: u16,

    /// Polling interval in seconds.
    #[serde(default = "defaults::scan_interval")]
    pub scan_interval: u64,

    #[serde(default = "defaults::unit_id")]
    pub unit_id: u8,

    /// Connect and per-request I/O timeout in seconds.
    #[serde(default = "defaults::timeout_seconds")]
    pub timeout_seconds: u64,

    /// How the unit id reaches the Modbus client library.
    #[serde(default)]
    pub unit_id_binding: UnitIdBindingCfg,

    /// Whether to expose the session-bus interface.
    #[serde(default = "defaults::dbus")]
    pub dbus: bool,
}

impl Config {
    /// Validates the configuration for consistency.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use recomd::config::Config;
    ///
    /// let config: Config = serde_yaml::from_str("version: 1\nhost: 10.0.0.5")?;
    /// config.validate()?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            anyhow::bail!("Hub '{}' has an empty host", self.name);
        }
        if self.port == 0 {
            anyhow::bail!("Hub '{}' has port 0", self.name);
        }
        if self.scan_interval == 0 {
            anyhow::bail!("scan_interval must be at least 1 second");
        }
        if self.timeout_seconds == 0 {
            anyhow::bail!("timeout_seconds must be at least 1 second");
        }
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

mod defaults {
    pub fn name() -> String {
        "recom".to_string()
    }

    /// Standard Modbus/TCP port.
    pub fn port() -> u16 {
        502
    }

    pub fn scan_interval() -> u64 {
        30
    }

    pub fn unit_id() -> u8 {
        1
    }

    pub fn timeout_seconds() -> u64 {
        3
    }

    pub fn dbus() -> bool {
        true
    }
}

fn locate_config() -> Result<PathBuf> {
    if let Ok(env_path) = env::var("RECOMD_CONFIG") {
        return Ok(PathBuf::from(env_path));
    }

    if let Some(mut cfg_dir) = env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|h| Path::new(&h).join(".config")))
    {
        cfg_dir.push("recomd/config.yml");
        if cfg_dir.exists() {
            return Ok(cfg_dir);
        }
    }

    let etc = Path::new("/etc/recomd/config.yml");
    if etc.exists() {
        return Ok(etc.to_path_buf());
    }

    anyhow::bail!("Configuration file not found in any standard location")
}

/// Configuration manager that handles both config data and file operations.
///
/// # Example
///
/// ```no_run
/// use recomd::config::ConfigManager;
/// use std::path::PathBuf;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config_manager = ConfigManager::load(Some(PathBuf::from("config.yml"))).await?;
/// let host = config_manager.get().await.host.clone();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: Arc<RwLock<Config>>,
    path: PathBuf,
}

impl ConfigManager {
    pub fn new(config: Config, path: PathBuf) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            path,
        }
    }

    /// Loads configuration from file or standard locations.
    ///
    /// Searches for configuration in the following order:
    /// 1. Provided path parameter
    /// 2. RECOMD_CONFIG environment variable
    /// 3. XDG_CONFIG_HOME/recomd/config.yml or ~/.config/recomd/config.yml
    /// 4. /etc/recomd/config.yml
    pub async fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => locate_config().context("No configuration file found")?,
        };

        info!("Loading config from: {}", config_path.display());
        let config = Self::load_config_from_path(&config_path)?;

        Ok(Self::new(config, config_path))
    }

    pub async fn get(&self) -> tokio::sync::RwLockReadGuard<'_, Config> {
        self.config.read().await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn clone_config(&self) -> Config {
        self.config.read().await.clone()
    }

    fn load_config_from_path(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML in: {}", path.display()))?;

        if config.version != 1 {
            anyhow::bail!(
                "Unsupported config version {} in file: {}",
                config.version,
                path.display()
            );
        }

        config
            .validate()
            .with_context(|| format!("Configuration validation failed for: {}", path.display()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    fn load(content: &str) -> Result<Config> {
        let temp_file = create_temp_config(content);
        let manager = tokio_test::block_on(ConfigManager::load(Some(temp_file.path().to_path_buf())))?;
        Ok(tokio_test::block_on(manager.clone_config()))
    }

    fn minimal() -> Config {
        serde_yaml::from_str("version: 1\nhost: 10.0.0.5").unwrap()
    }

    #[test]
    fn config_load_full_yaml() {
        let config = load(
            r#"
version: 1
name: "attic"
host: "recom.local"
port: 5020
scan_interval: 10
unit_id: 3
timeout_seconds: 5
unit_id_binding: legacy
dbus: false
"#,
        )
        .unwrap();

        assert_eq!(config.name, "attic");
        assert_eq!(config.host, "recom.local");
        assert_eq!(config.port, 5020);
        assert_eq!(config.scan_interval(), Duration::from_secs(10));
        assert_eq!(config.unit_id, 3);
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.unit_id_binding, UnitIdBindingCfg::Legacy);
        assert!(!config.dbus);
    }

    #[test]
    fn config_defaults_apply() {
        let config = load("version: 1\nhost: 10.0.0.5\n").unwrap();

        assert_eq!(config.name, "recom");
        assert_eq!(config.port, 502);
        assert_eq!(config.scan_interval, 30);
        assert_eq!(config.unit_id, 1);
        assert_eq!(config.timeout_seconds, 3);
        assert_eq!(config.unit_id_binding, UnitIdBindingCfg::Auto);
        assert!(config.dbus);
    }

    #[test]
    fn config_requires_host() {
        let err = load("version: 1\nport: 502\n").unwrap_err();
        assert!(format!("{err:#}").contains("host"));
    }

    #[test]
    fn config_rejects_unknown_version() {
        let err = load("version: 2\nhost: 10.0.0.5\n").unwrap_err();
        assert!(err.to_string().contains("Unsupported config version 2"));
    }

    #[test]
    fn config_validate_rejects_bad_values() {
        let cases = [
            Config { host: "  ".to_string(), ..minimal() },
            Config { port: 0, ..minimal() },
            Config { scan_interval: 0, ..minimal() },
            Config { timeout_seconds: 0, ..minimal() },
        ];
        for config in cases {
            assert!(config.validate().is_err(), "{config:?} should be invalid");
        }
        assert!(minimal().validate().is_ok());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = tokio_test::block_on(ConfigManager::load(Some(PathBuf::from(
            "/nonexistent/recomd.yml",
        ))))
        .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/recomd.yml"));
    }
}
