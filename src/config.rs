use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::discovery::neighbors::PROC_NET_ARP;
use crate::platform::common::MAX_INTERFACE_NAME;

/// Commented example written by `netfence init`
pub const EXAMPLE_CONFIG: &str = include_str!("../example-config.yaml");

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Daemon configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub tunnel: TunnelSettings,
    #[serde(default)]
    pub discovery: DiscoverySettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub notifications: NotificationSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TunnelSettings {
    #[serde(default = "default_interface")]
    pub interface: String,

    /// Interface forwarded traffic leaves through (default route if unset)
    #[serde(default)]
    pub uplink: Option<String>,
}

fn default_interface() -> String {
    "nf0".to_string()
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            uplink: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DiscoverySettings {
    #[serde(default = "default_neighbor_table")]
    pub neighbor_table: PathBuf,

    #[serde(default = "default_true")]
    pub resolve_hostnames: bool,
}

fn default_neighbor_table() -> PathBuf {
    PathBuf::from(PROC_NET_ARP)
}

fn default_true() -> bool {
    true
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            neighbor_table: default_neighbor_table(),
            resolve_hostnames: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct StoreSettings {
    /// Settings file (platform default if unset)
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct NotificationSettings {
    #[serde(default)]
    pub desktop: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Get the platform-specific config file path
pub fn get_config_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/etc/netfence/config.yaml")
    }

    #[cfg(not(target_os = "linux"))]
    {
        match directories::ProjectDirs::from("", "", "netfence") {
            Some(dirs) => dirs.config_dir().join("config.yaml"),
            None => PathBuf::from("netfence.yaml"),
        }
    }
}

/// Load configuration from a YAML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse YAML config file: {}", path.display()))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load the configuration, using defaults when the file does not exist
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!("No config file at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    load_config(path)
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_interface_name(&config.tunnel.interface).context("Invalid tunnel.interface")?;

    if let Some(uplink) = &config.tunnel.uplink {
        validate_interface_name(uplink).context("Invalid tunnel.uplink")?;
    }

    if config.discovery.neighbor_table.as_os_str().is_empty() {
        anyhow::bail!("discovery.neighbor_table cannot be empty");
    }

    let level = config.logging.level.to_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        anyhow::bail!(
            "Unknown logging.level '{}' (expected one of: {})",
            config.logging.level,
            LOG_LEVELS.join(", ")
        );
    }

    Ok(())
}

fn validate_interface_name(name: &str) -> Result<()> {
    if name.is_empty() {
        anyhow::bail!("Interface name cannot be empty");
    }

    if name.len() > MAX_INTERFACE_NAME {
        anyhow::bail!(
            "Interface name '{}' is longer than {} characters",
            name,
            MAX_INTERFACE_NAME
        );
    }

    if name.contains(|c: char| c.is_whitespace() || c == '/') {
        anyhow::bail!("Interface name '{}' contains invalid characters", name);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(yaml: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_example_config_is_valid() {
        let config: Config = serde_yaml::from_str(EXAMPLE_CONFIG).unwrap();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_empty_sections_use_defaults() {
        let file = write_config("tunnel:\n  interface: fence0\n");
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.tunnel.interface, "fence0");
        assert_eq!(config.tunnel.uplink, None);
        assert_eq!(config.discovery.neighbor_table, PathBuf::from("/proc/net/arp"));
        assert!(config.discovery.resolve_hostnames);
        assert!(!config.notifications.desktop);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
tunnel:
  interface: nf1
  uplink: eth0
discovery:
  neighbor_table: /tmp/arp
  resolve_hostnames: false
store:
  path: /tmp/netfence/settings.json
notifications:
  desktop: true
logging:
  level: debug
"#;
        let file = write_config(yaml);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.tunnel.uplink.as_deref(), Some("eth0"));
        assert!(!config.discovery.resolve_hostnames);
        assert_eq!(
            config.store.path,
            Some(PathBuf::from("/tmp/netfence/settings.json"))
        );
        assert!(config.notifications.desktop);
    }

    #[test]
    fn test_validate_rejects_bad_interface_names() {
        let mut config = Config::default();
        config.tunnel.interface = String::new();
        assert!(validate_config(&config).is_err());

        config.tunnel.interface = "a-very-long-name0".to_string();
        assert!(validate_config(&config).is_err());

        config.tunnel.interface = "nf0".to_string();
        config.tunnel.uplink = Some("eth 0".to_string());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_rejects_empty_neighbor_table() {
        let mut config = Config::default();
        config.discovery.neighbor_table = PathBuf::new();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_log_level() {
        let file = write_config("logging:\n  level: loud\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("Unknown logging.level"));
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_or_default(&dir.path().join("missing.yaml")).unwrap();
        assert_eq!(config, Config::default());
    }
}
