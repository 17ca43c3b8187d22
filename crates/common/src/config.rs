use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Capability slug constants
pub mod slug {
    /// Number of base32 characters in a capability slug (80 bits)
    pub const LENGTH: usize = 16;

    /// Random bytes drawn before encoding; enough for at least `LENGTH` characters
    pub const RANDOM_BYTES: usize = LENGTH * 5 / 8 + 1;
}

/// Transport provider constants
pub mod transport {
    /// Virtual port the published service is reachable on
    pub const SERVICE_PORT: u16 = 80;

    /// Control endpoint used when none is configured
    pub const DEFAULT_CONTROL_ENDPOINT: &str = "tcp://127.0.0.1:9051";
}

/// Default timeouts for the blocking setup steps
pub mod timeouts {
    /// Connecting to the control endpoint
    pub const CONNECT_SECS: u64 = 30;

    /// Authenticating on the control channel
    pub const AUTHENTICATE_SECS: u64 = 30;

    /// Creating the listener, including waiting for the service to propagate
    pub const PUBLISH_SECS: u64 = 180;
}

/// Timeouts applied to the setup phase. A value of `0` disables the timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub connect_secs: u64,
    pub authenticate_secs: u64,
    pub publish_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: timeouts::CONNECT_SECS,
            authenticate_secs: timeouts::AUTHENTICATE_SECS,
            publish_secs: timeouts::PUBLISH_SECS,
        }
    }
}

impl TimeoutConfig {
    /// Timeouts that never fire
    pub fn disabled() -> Self {
        Self {
            connect_secs: 0,
            authenticate_secs: 0,
            publish_secs: 0,
        }
    }

    pub fn connect(&self) -> Option<Duration> {
        secs(self.connect_secs)
    }

    pub fn authenticate(&self) -> Option<Duration> {
        secs(self.authenticate_secs)
    }

    pub fn publish(&self) -> Option<Duration> {
        secs(self.publish_secs)
    }
}

fn secs(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}

/// Everything a single publication needs. Built once per invocation and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublicationConfig {
    /// File, directory or archive to publish
    pub path: PathBuf,

    /// Treat `path` as a zip archive and publish its entries
    pub archive: bool,

    /// Gate the service behind a capability slug
    pub slug: bool,

    /// Control endpoint of the transport provider
    pub control_endpoint: String,

    /// Credential for the control endpoint (empty for none)
    pub control_password: String,

    /// Passphrase for a stable service identity
    pub passphrase: Option<String>,

    /// Verbose logging, including per-request logs
    pub debug: bool,

    pub timeouts: TimeoutConfig,
}

impl Default for PublicationConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("."),
            archive: false,
            slug: true,
            control_endpoint: transport::DEFAULT_CONTROL_ENDPOINT.to_string(),
            control_password: String::new(),
            passphrase: None,
            debug: false,
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl PublicationConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_archive(mut self, archive: bool) -> Self {
        self.archive = archive;
        self
    }

    pub fn with_slug(mut self, slug: bool) -> Self {
        self.slug = slug;
        self
    }

    pub fn with_control(mut self, endpoint: impl Into<String>, password: impl Into<String>) -> Self {
        self.control_endpoint = endpoint.into();
        self.control_password = password.into();
        self
    }

    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// The passphrase, if one was given and is non-empty
    pub fn passphrase(&self) -> Option<&str> {
        self.passphrase.as_deref().filter(|p| !p.is_empty())
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::WriteError(e.to_string()))?;

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Failed to serialize config: {0}")]
    SerializeError(String),

    #[error("Failed to write config file: {0}")]
    WriteError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PublicationConfig::default();
        assert!(config.slug);
        assert!(!config.archive);
        assert_eq!(config.control_endpoint, transport::DEFAULT_CONTROL_ENDPOINT);
        assert_eq!(config.timeouts.connect(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_config_builder() {
        let config = PublicationConfig::new("/srv/share")
            .with_archive(true)
            .with_slug(false)
            .with_control("unix:///run/tor/control", "hunter2")
            .with_passphrase("correct horse");

        assert_eq!(config.path, PathBuf::from("/srv/share"));
        assert!(config.archive);
        assert!(!config.slug);
        assert_eq!(config.control_password, "hunter2");
        assert_eq!(config.passphrase(), Some("correct horse"));
    }

    #[test]
    fn test_empty_passphrase_is_none() {
        let config = PublicationConfig::new("x").with_passphrase("");
        assert_eq!(config.passphrase(), None);
    }

    #[test]
    fn test_zero_timeout_disables() {
        let timeouts = TimeoutConfig {
            connect_secs: 0,
            ..TimeoutConfig::default()
        };
        assert_eq!(timeouts.connect(), None);
        assert!(TimeoutConfig::disabled().publish().is_none());
    }

    #[test]
    fn test_slug_random_bytes_cover_length() {
        assert!(slug::RANDOM_BYTES * 8 >= slug::LENGTH * 5);
    }

    #[test]
    fn test_file_roundtrip_with_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anonshare.toml");

        std::fs::write(&path, "path = \"/srv\"\nslug = false\n").unwrap();
        let loaded = PublicationConfig::from_file(&path).unwrap();
        assert_eq!(loaded.path, PathBuf::from("/srv"));
        assert!(!loaded.slug);
        assert_eq!(loaded.timeouts, TimeoutConfig::default());

        loaded.to_file(&path).unwrap();
        assert_eq!(PublicationConfig::from_file(&path).unwrap(), loaded);
    }
}
