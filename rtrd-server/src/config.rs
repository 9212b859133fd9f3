//! Server configuration.
//!
//! Configuration is loaded in the following order (later overrides
//! earlier):
//! 1. Default values
//! 2. YAML config file (if specified via RTRD_CONFIG)
//! 3. Environment variables

use crate::server::ServerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// RTR protocol settings and the plain TCP listener.
    pub rtr: RtrConfig,
    /// TLS listener.
    pub tls: TlsConfig,
    /// SSH listener.
    pub ssh: SshConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable
    /// overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("RTRD_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        self.rtr.apply_env_overrides();
        self.tls.apply_env_overrides();
        self.ssh.apply_env_overrides();
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rtr.validate()?;
        self.tls.validate()?;
        self.ssh.validate()
    }
}

/// RTR protocol settings and the plain TCP listener address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RtrConfig {
    /// host:port for the plain TCP listener; unset disables it.
    pub bind_addr: Option<String>,
    /// Maximum concurrent clients across all transports (0 = unlimited).
    pub max_connections: usize,
    /// Highest protocol version the server speaks (0, 1 or 2).
    pub base_protocol_version: u8,
    /// Refuse clients announcing any other version instead of
    /// downgrading.
    pub enforce_version: bool,
    /// Number of per-serial diffs to retain (0 keeps everything).
    pub keep_difference: usize,
    /// Fixed session id; unset picks a random one at startup.
    pub session_id: Option<u16>,
    /// End of Data intervals in seconds; zeros fall back to the
    /// protocol defaults.
    pub refresh_interval: u32,
    pub retry_interval: u32,
    pub expire_interval: u32,
    /// Never send Router Key PDUs.
    pub disable_bgpsec: bool,
    /// Never send ASPA PDUs.
    pub disable_aspa: bool,
}

impl Default for RtrConfig {
    fn default() -> Self {
        Self {
            bind_addr: Some("127.0.0.1:8282".to_string()),
            max_connections: 0,
            base_protocol_version: 1,
            enforce_version: false,
            keep_difference: 64,
            session_id: None,
            refresh_interval: 3600,
            retry_interval: 600,
            expire_interval: 7200,
            disable_bgpsec: false,
            disable_aspa: false,
        }
    }
}

impl RtrConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("RTRD_BIND") {
            self.bind_addr = if addr.is_empty() { None } else { Some(addr) };
        }
        if let Ok(max) = std::env::var("RTRD_MAX_CONNECTIONS") {
            if let Ok(n) = max.parse() {
                self.max_connections = n;
            }
        }
        if let Ok(version) = std::env::var("RTRD_PROTOCOL_VERSION") {
            if let Ok(v) = version.parse() {
                self.base_protocol_version = v;
            }
        }
        if let Ok(enforce) = std::env::var("RTRD_ENFORCE_VERSION") {
            self.enforce_version = enforce == "1" || enforce.to_lowercase() == "true";
        }
        if let Ok(keep) = std::env::var("RTRD_KEEP_DIFFERENCE") {
            if let Ok(n) = keep.parse() {
                self.keep_difference = n;
            }
        }
        if let Ok(session) = std::env::var("RTRD_SESSION_ID") {
            if let Ok(id) = session.parse() {
                self.session_id = Some(id);
            }
        }
        if let Ok(refresh) = std::env::var("RTRD_REFRESH_INTERVAL") {
            if let Ok(secs) = refresh.parse() {
                self.refresh_interval = secs;
            }
        }
        if let Ok(retry) = std::env::var("RTRD_RETRY_INTERVAL") {
            if let Ok(secs) = retry.parse() {
                self.retry_interval = secs;
            }
        }
        if let Ok(expire) = std::env::var("RTRD_EXPIRE_INTERVAL") {
            if let Ok(secs) = expire.parse() {
                self.expire_interval = secs;
            }
        }
        if let Ok(disable) = std::env::var("RTRD_DISABLE_BGPSEC") {
            self.disable_bgpsec = disable == "1" || disable.to_lowercase() == "true";
        }
        if let Ok(disable) = std::env::var("RTRD_DISABLE_ASPA") {
            self.disable_aspa = disable == "1" || disable.to_lowercase() == "true";
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_protocol_version > 2 {
            return Err(ConfigError::Validation(format!(
                "unsupported protocol version {}",
                self.base_protocol_version
            )));
        }
        Ok(())
    }

    /// The runtime settings handed to the server.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            max_connections: self.max_connections,
            base_version: self.base_protocol_version,
            enforce_version: self.enforce_version,
            refresh_interval: fallback(self.refresh_interval, 3600),
            retry_interval: fallback(self.retry_interval, 600),
            expire_interval: fallback(self.expire_interval, 7200),
            disable_bgpsec: self.disable_bgpsec,
            disable_aspa: self.disable_aspa,
        }
    }
}

fn fallback(value: u32, default: u32) -> u32 {
    if value == 0 {
        default
    } else {
        value
    }
}

/// TLS listener configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// host:port for the TLS listener; unset disables it.
    pub bind_addr: Option<String>,
    /// Path to the PEM-encoded server certificate chain.
    pub cert_path: Option<PathBuf>,
    /// Path to the PEM-encoded private key.
    pub key_path: Option<PathBuf>,
}

impl TlsConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("RTRD_TLS_BIND") {
            self.bind_addr = if addr.is_empty() { None } else { Some(addr) };
        }
        if let Ok(path) = std::env::var("RTRD_TLS_CERT") {
            self.cert_path = Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("RTRD_TLS_KEY") {
            self.key_path = Some(PathBuf::from(path));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_addr.is_none() {
            return Ok(());
        }
        if self.cert_path.is_none() {
            return Err(ConfigError::Validation(
                "TLS listener enabled but cert_path not set".to_string(),
            ));
        }
        if self.key_path.is_none() {
            return Err(ConfigError::Validation(
                "TLS listener enabled but key_path not set".to_string(),
            ));
        }
        Ok(())
    }
}

/// SSH listener configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// host:port for the SSH listener; unset disables it.
    pub bind_addr: Option<String>,
    /// Path to the OpenSSH-format host key.
    pub host_key_path: Option<PathBuf>,
}

impl SshConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("RTRD_SSH_BIND") {
            self.bind_addr = if addr.is_empty() { None } else { Some(addr) };
        }
        if let Ok(path) = std::env::var("RTRD_SSH_HOST_KEY") {
            self.host_key_path = Some(PathBuf::from(path));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_addr.is_some() && self.host_key_path.is_none() {
            return Err(ConfigError::Validation(
                "SSH listener enabled but host_key_path not set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, String),
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::Parse(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::Validation(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.rtr.bind_addr.as_deref(), Some("127.0.0.1:8282"));
        assert_eq!(config.rtr.base_protocol_version, 1);
        assert_eq!(config.rtr.max_connections, 0);
        assert!(config.tls.bind_addr.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_interval_fallbacks() {
        let mut rtr = RtrConfig::default();
        rtr.refresh_interval = 0;
        rtr.retry_interval = 0;
        rtr.expire_interval = 0;
        let server = rtr.server_config();
        assert_eq!(server.refresh_interval, 3600);
        assert_eq!(server.retry_interval, 600);
        assert_eq!(server.expire_interval, 7200);

        rtr.refresh_interval = 60;
        assert_eq!(rtr.server_config().refresh_interval, 60);
    }

    #[test]
    fn test_validation_rejects_bad_version() {
        let mut config = Config::default();
        config.rtr.base_protocol_version = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_requires_tls_material() {
        let mut config = Config::default();
        config.tls.bind_addr = Some("127.0.0.1:8283".to_string());
        assert!(config.validate().is_err());
        config.tls.cert_path = Some("/tmp/cert.pem".into());
        assert!(config.validate().is_err());
        config.tls.key_path = Some("/tmp/key.pem".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.rtr.bind_addr, config.rtr.bind_addr);
        assert_eq!(parsed.rtr.keep_difference, config.rtr.keep_difference);
    }
}
