// Configuration of the playbridge daemon
//
// Read from a JSON file with serde defaults for every field, then refined by
// environment variables.

use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use log::{debug, info, warn};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "playbridge.json";

pub const ENV_REMOTE_EXECUTABLE: &str = "SPOTIFY_EXE_PATH";
pub const ENV_GUILD_ID: &str = "DISCORD_GUILD_ID";
pub const ENV_PORT: &str = "PLAYBRIDGE_PORT";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("missing required configuration: {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSection {
    pub port: u16,
    pub bind_address: IpAddr,
    pub handshake_timeout_secs: u64,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            port: crate::bridge::DEFAULT_PORT,
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            handshake_timeout_secs: crate::bridge::DEFAULT_HANDSHAKE_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSection {
    pub tick_interval_ms: u64,
}

impl Default for PlaybackSection {
    fn default() -> Self {
        Self { tick_interval_ms: 1000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishSection {
    pub cooldown_ms: u64,
    /// Directory holding the per-guild message records
    pub state_dir: PathBuf,
    pub guild_id: Option<String>,
}

impl Default for PublishSection {
    fn default() -> Self {
        Self {
            cooldown_ms: 100,
            state_dir: PathBuf::from("."),
            guild_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSection {
    /// Check for the host application before waiting for the client
    pub manage: bool,
    pub executable: Option<PathBuf>,
    pub process_name: String,
    /// Start the host application if it is not running
    pub launch: bool,
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            manage: true,
            executable: None,
            process_name: "spotify".to_string(),
            launch: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSection {
    /// JSON file served by the in-memory catalog
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub bridge: BridgeSection,
    pub playback: PlaybackSection,
    pub publish: PublishSection,
    pub remote: RemoteSection,
    pub catalog: CatalogSection,
    pub logging: LoggingConfig,
}

impl BridgeConfig {
    /// Load `path`; a missing file gives the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("Configuration file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Apply the environment overrides of the process
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides looked up through `lookup`; empty values are ignored
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(executable) = lookup(ENV_REMOTE_EXECUTABLE) {
            self.remote.executable = Some(PathBuf::from(executable));
        }
        if let Some(guild_id) = lookup(ENV_GUILD_ID) {
            self.publish.guild_id = Some(guild_id);
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.bridge.port = port.parse().map_err(|_| ConfigError::Invalid { name: ENV_PORT, value: port })?;
        }
        Ok(())
    }

    /// Check the settings the daemon cannot start without
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.publish.guild_id.as_deref().map_or(true, |g| g.trim().is_empty()) {
            return Err(ConfigError::Missing("publish.guild_id"));
        }
        let has_executable = self.remote.executable.as_ref().is_some_and(|p| !p.as_os_str().is_empty());
        if self.remote.manage && self.remote.launch && !has_executable {
            return Err(ConfigError::Missing("remote.executable"));
        }
        if self.playback.tick_interval_ms == 0 {
            warn!("playback.tick_interval_ms is 0, using 1000");
        }
        Ok(())
    }

    pub fn guild_id(&self) -> Result<&str, ConfigError> {
        self.publish.guild_id.as_deref().ok_or(ConfigError::Missing("publish.guild_id"))
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bridge.bind_address, self.bridge.port)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.bridge.handshake_timeout_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        match self.playback.tick_interval_ms {
            0 => Duration::from_secs(1),
            ms => Duration::from_millis(ms),
        }
    }

    pub fn publish_cooldown(&self) -> Duration {
        Duration::from_millis(self.publish.cooldown_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::from_json("{}").unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.handshake_timeout(), Duration::from_secs(30));
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.publish_cooldown(), Duration::from_millis(100));
        assert_eq!(config.remote.process_name, "spotify");
        assert!(config.remote.launch);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_sections() {
        let config = BridgeConfig::from_json(r#"{
            "bridge": {"port": 9000},
            "publish": {"guild_id": "g1", "state_dir": "/tmp/pb"},
            "remote": {"launch": false}
        }"#).unwrap();
        assert_eq!(config.bridge.port, 9000);
        assert_eq!(config.bridge.handshake_timeout_secs, 30);
        assert_eq!(config.guild_id().unwrap(), "g1");
        assert_eq!(config.publish.cooldown_ms, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_REMOTE_EXECUTABLE, "/opt/remote/bin"),
            (ENV_GUILD_ID, "guild-7"),
            (ENV_PORT, "8181"),
        ].into_iter().collect();

        let mut config = BridgeConfig::default();
        config.apply_overrides(|name| env.get(name).map(|v| v.to_string())).unwrap();
        assert_eq!(config.remote.executable, Some(PathBuf::from("/opt/remote/bin")));
        assert_eq!(config.guild_id().unwrap(), "guild-7");
        assert_eq!(config.bridge.port, 8181);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_port_override() {
        let mut config = BridgeConfig::default();
        let result = config.apply_overrides(|name| (name == ENV_PORT).then(|| "eighty".to_string()));
        assert!(matches!(result, Err(ConfigError::Invalid { name: ENV_PORT, .. })));
    }

    #[test]
    fn test_missing_required_settings() {
        let mut config = BridgeConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::Missing("publish.guild_id"))));

        config.publish.guild_id = Some("g".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::Missing("remote.executable"))));

        config.remote.launch = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = BridgeConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.bridge.port, 8080);

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(BridgeConfig::load(&broken), Err(ConfigError::Parse { .. })));
    }
}
