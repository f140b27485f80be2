//! WolfHA Configuration
//!
//! This module provides configuration structures for the WolfHA
//! election daemon. Everything except the node section has defaults,
//! so a minimal file can be empty.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use crate::state::UserData;

/// Config file used by both binaries when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "wolfha.toml";

/// Largest user data payload a node may advertise. Leaves headroom below
/// the 65507 byte UDP payload limit for the other heartbeat fields.
pub const MAX_DATA_BYTES_LIMIT: usize = 60_000;

/// Main WolfHA configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WolfHaConfig {
    /// Node-specific configuration
    #[serde(default)]
    pub node: NodeConfig,

    /// Cluster protocol configuration
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Unique node name, also the election rank (defaults to the system hostname)
    #[serde(default)]
    pub hostname: Option<String>,

    /// Address advertised in heartbeats (defaults to the LAN interface address)
    #[serde(default)]
    pub address: Option<String>,

    /// Whether this node may ever become master
    #[serde(default = "default_true")]
    pub eligible: bool,

    /// Initial opaque data broadcast with every heartbeat
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Cluster protocol configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// UDP port used for broadcast heartbeats
    #[serde(default = "default_comm_port")]
    pub comm_port: u16,

    /// Heartbeat (tick) period in seconds
    #[serde(default = "default_heartbeat_freq")]
    pub heartbeat_freq: u64,

    /// Ticks per election evaluation (tock)
    #[serde(default = "default_check_beats")]
    pub check_beats: u32,

    /// Exit the process instead of stepping down when another master outranks us
    #[serde(default)]
    pub exit_on_conflict: bool,

    /// Broadcast address override (defaults to the LAN interface broadcast address)
    #[serde(default)]
    pub broadcast_ip: Option<String>,

    /// Maximum size of the serialized user data in bytes
    #[serde(default = "default_max_data_bytes")]
    pub max_data_bytes: usize,
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Enable HTTP API
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// HTTP API bind address
    #[serde(default = "default_api_address")]
    pub bind_address: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_comm_port() -> u16 {
    3014
}

fn default_heartbeat_freq() -> u64 {
    20
}

fn default_check_beats() -> u32 {
    3
}

fn default_max_data_bytes() -> usize {
    8192
}

fn default_api_address() -> String {
    "127.0.0.1:3015".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            hostname: None,
            address: None,
            eligible: true,
            data: None,
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            comm_port: default_comm_port(),
            heartbeat_freq: default_heartbeat_freq(),
            check_beats: default_check_beats(),
            exit_on_conflict: false,
            broadcast_ip: None,
            max_data_bytes: default_max_data_bytes(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_api_address(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl WolfHaConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: WolfHaConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if let Some(hostname) = &self.node.hostname {
            if hostname.trim().is_empty() {
                return Err(crate::Error::Config("node.hostname cannot be empty".into()));
            }
        }

        if self.cluster.comm_port == 0 {
            return Err(crate::Error::Config("cluster.comm_port cannot be 0".into()));
        }

        if self.cluster.heartbeat_freq == 0 {
            return Err(crate::Error::Config(
                "cluster.heartbeat_freq must be at least 1 second".into(),
            ));
        }

        if self.cluster.check_beats == 0 {
            return Err(crate::Error::Config("cluster.check_beats must be at least 1".into()));
        }

        if self.cluster.max_data_bytes > MAX_DATA_BYTES_LIMIT {
            return Err(crate::Error::Config(format!(
                "cluster.max_data_bytes cannot exceed {}",
                MAX_DATA_BYTES_LIMIT
            )));
        }

        self.broadcast_ip()?;
        self.initial_data()?;

        Ok(())
    }

    /// Node hostname: configured value or the system hostname
    pub fn hostname(&self) -> crate::Result<String> {
        if let Some(hostname) = &self.node.hostname {
            return Ok(hostname.clone());
        }

        let name = hostname::get()?;
        name.into_string()
            .map_err(|_| crate::Error::Config("system hostname is not valid UTF-8".into()))
    }

    /// Parsed broadcast address override, if configured
    pub fn broadcast_ip(&self) -> crate::Result<Option<Ipv4Addr>> {
        match &self.cluster.broadcast_ip {
            Some(ip) => ip
                .parse()
                .map(Some)
                .map_err(|_| crate::Error::Config(format!("invalid cluster.broadcast_ip: {}", ip))),
            None => Ok(None),
        }
    }

    /// Initial user data, checked against the configured size limit
    pub fn initial_data(&self) -> crate::Result<UserData> {
        match &self.node.data {
            Some(value) => UserData::from_value(value, self.cluster.max_data_bytes),
            None => Ok(UserData::empty()),
        }
    }

    /// Get heartbeat (tick) interval as Duration
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.cluster.heartbeat_freq)
    }

    /// Get evaluation (tock) interval as Duration; also the staleness limit
    pub fn tock_interval(&self) -> Duration {
        self.heartbeat_interval() * self.cluster.check_beats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_config() {
        let toml = r#"
[node]
hostname = "db1"
address = "10.0.10.5"
eligible = false

[node.data]
role = "primary-db"
weight = 3

[cluster]
comm_port = 4000
heartbeat_freq = 5
check_beats = 4
exit_on_conflict = true
broadcast_ip = "10.0.10.255"
"#;

        let config = WolfHaConfig::from_str(toml).unwrap();
        assert_eq!(config.hostname().unwrap(), "db1");
        assert!(!config.node.eligible);
        assert_eq!(config.cluster.comm_port, 4000);
        assert!(config.cluster.exit_on_conflict);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(5));
        assert_eq!(config.tock_interval(), Duration::from_secs(20));
        assert_eq!(
            config.broadcast_ip().unwrap(),
            Some(Ipv4Addr::new(10, 0, 10, 255))
        );

        let data = config.initial_data().unwrap();
        let value: serde_json::Value = serde_json::from_str(data.as_str()).unwrap();
        assert_eq!(value["role"], "primary-db");
        assert_eq!(value["weight"], 3);
    }

    #[test]
    fn test_defaults() {
        let config = WolfHaConfig::from_str("").unwrap();
        assert_eq!(config.cluster.comm_port, 3014);
        assert_eq!(config.cluster.heartbeat_freq, 20);
        assert_eq!(config.cluster.check_beats, 3);
        assert!(!config.cluster.exit_on_conflict);
        assert!(config.node.eligible);
        assert!(config.api.enabled);
        assert_eq!(config.tock_interval(), Duration::from_secs(60));
        assert_eq!(config.broadcast_ip().unwrap(), None);
        assert_eq!(config.initial_data().unwrap().as_str(), "{}");
    }

    #[test]
    fn test_validation_errors() {
        assert!(WolfHaConfig::from_str("[cluster]\nheartbeat_freq = 0").is_err());
        assert!(WolfHaConfig::from_str("[cluster]\ncheck_beats = 0").is_err());
        assert!(WolfHaConfig::from_str("[cluster]\ncomm_port = 0").is_err());
        assert!(WolfHaConfig::from_str("[cluster]\nbroadcast_ip = \"not-an-ip\"").is_err());
        assert!(WolfHaConfig::from_str("[node]\nhostname = \"  \"").is_err());
        assert!(WolfHaConfig::from_str("[cluster]\nmax_data_bytes = 100000").is_err());
    }

    #[test]
    fn test_oversized_initial_data_rejected() {
        let toml = r#"
[node.data]
blob = "0123456789012345678901234567890123456789"

[cluster]
max_data_bytes = 16
"#;
        let err = WolfHaConfig::from_str(toml).unwrap_err();
        assert!(matches!(err, crate::Error::PayloadTooLarge { .. }));
    }

    #[test]
    fn test_default_config_path_is_relative_toml() {
        assert_eq!(DEFAULT_CONFIG_PATH, "wolfha.toml");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[node]\nhostname = \"web3\"\n\n[cluster]\ncheck_beats = 2").unwrap();

        let config = WolfHaConfig::from_file(file.path()).unwrap();
        assert_eq!(config.hostname().unwrap(), "web3");
        assert_eq!(config.cluster.check_beats, 2);
    }
}
