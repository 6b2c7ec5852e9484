//! Configuration for the converse core
//!
//! All fields have defaults, so an empty TOML file (or none at all) yields a
//! working configuration. Individual settings can be adjusted with the
//! builder-style `with_*` methods:
//!
//! ```rust
//! use converse_core::config::{ConverseConfig, CredentialPersistence};
//! use std::time::Duration;
//!
//! let config = ConverseConfig::new()
//!     .with_dial_domain("pbx.example.net")
//!     .with_enablement_timeout(Duration::from_secs(20))
//!     .with_credential_persistence(CredentialPersistence::Always);
//!
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::errors::ConfigError;
use crate::types::{MediaEncryption, PhoneAccountHandle, TransportKind};

/// When login credentials are written to the credential store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialPersistence {
    /// After the registrar first accepts the account
    #[default]
    OnSuccess,
    /// As soon as login is requested
    Always,
}

/// Phone account registered with the telephony subsystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhoneAccountConfig {
    pub component: String,
    pub id: String,
    pub label: String,
}

impl Default for PhoneAccountConfig {
    fn default() -> Self {
        Self {
            component: "converse".to_string(),
            id: "Converse".to_string(),
            label: "Converse".to_string(),
        }
    }
}

impl PhoneAccountConfig {
    pub fn handle(&self) -> PhoneAccountHandle {
        PhoneAccountHandle::new(self.component.clone(), self.id.clone())
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
    pub file_info: bool,
    /// Log span enter/exit
    pub spans: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_info: false,
            spans: false,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverseConfig {
    /// Domain appended to bare numbers when dialing
    pub dial_domain: String,
    pub default_transport: TransportKind,
    pub media_encryption: MediaEncryption,
    pub phone_account: PhoneAccountConfig,
    /// How long an incoming call may wait for the phone account to be enabled
    pub enablement_timeout_secs: u64,
    pub enablement_poll_interval_ms: u64,
    /// How long a terminated call waits for the engine to release it
    pub release_timeout_secs: u64,
    pub credential_persistence: CredentialPersistence,
    /// Where the file credential store lives, if one is used
    pub credentials_path: Option<PathBuf>,
    pub logging: LoggingSettings,
}

impl Default for ConverseConfig {
    fn default() -> Self {
        Self {
            dial_domain: "pbx.hrzn.network".to_string(),
            default_transport: TransportKind::Tcp,
            media_encryption: MediaEncryption::None,
            phone_account: PhoneAccountConfig::default(),
            enablement_timeout_secs: 30,
            enablement_poll_interval_ms: 500,
            release_timeout_secs: 5,
            credential_persistence: CredentialPersistence::OnSuccess,
            credentials_path: None,
            logging: LoggingSettings::default(),
        }
    }
}

impl ConverseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: ConverseConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file; a missing file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                info!("Loading configuration from {}", path.display());
                Self::from_toml_str(&contents)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No configuration at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dial_domain.trim().is_empty() {
            return Err(ConfigError::invalid("dial_domain must not be empty"));
        }
        if self.enablement_timeout_secs == 0 {
            return Err(ConfigError::invalid("enablement_timeout_secs must be positive"));
        }
        if self.enablement_poll_interval_ms == 0 {
            return Err(ConfigError::invalid("enablement_poll_interval_ms must be positive"));
        }
        if self.release_timeout_secs == 0 {
            return Err(ConfigError::invalid("release_timeout_secs must be positive"));
        }
        if self.phone_account.id.is_empty() {
            return Err(ConfigError::invalid("phone_account.id must not be empty"));
        }
        Ok(())
    }

    pub fn enablement_timeout(&self) -> Duration {
        Duration::from_secs(self.enablement_timeout_secs)
    }

    pub fn enablement_poll_interval(&self) -> Duration {
        Duration::from_millis(self.enablement_poll_interval_ms)
    }

    pub fn release_timeout(&self) -> Duration {
        Duration::from_secs(self.release_timeout_secs)
    }

    pub fn with_dial_domain(mut self, domain: impl Into<String>) -> Self {
        self.dial_domain = domain.into();
        self
    }

    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.default_transport = transport;
        self
    }

    pub fn with_media_encryption(mut self, encryption: MediaEncryption) -> Self {
        self.media_encryption = encryption;
        self
    }

    pub fn with_phone_account(mut self, account: PhoneAccountConfig) -> Self {
        self.phone_account = account;
        self
    }

    /// Sub-second remainders round up to the next whole second
    pub fn with_enablement_timeout(mut self, timeout: Duration) -> Self {
        self.enablement_timeout_secs = ceil_secs(timeout);
        self
    }

    pub fn with_enablement_poll_interval(mut self, interval: Duration) -> Self {
        self.enablement_poll_interval_ms = ceil_millis(interval);
        self
    }

    /// Sub-second remainders round up to the next whole second
    pub fn with_release_timeout(mut self, timeout: Duration) -> Self {
        self.release_timeout_secs = ceil_secs(timeout);
        self
    }

    pub fn with_credential_persistence(mut self, policy: CredentialPersistence) -> Self {
        self.credential_persistence = policy;
        self
    }

    pub fn with_credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = Some(path.into());
        self
    }

    pub fn with_logging(mut self, logging: LoggingSettings) -> Self {
        self.logging = logging;
        self
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    duration
        .as_secs()
        .saturating_add(u64::from(duration.subsec_nanos() > 0))
}

fn ceil_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_document_gives_defaults() {
        let config = ConverseConfig::from_toml_str("").unwrap();
        assert_eq!(config, ConverseConfig::default());
        assert_eq!(config.default_transport, TransportKind::Tcp);
        assert_eq!(config.media_encryption, MediaEncryption::None);
        assert_eq!(config.phone_account.id, "Converse");
    }

    #[test]
    fn parses_partial_document() {
        let config = ConverseConfig::from_toml_str(
            r#"
            dial_domain = "pbx.example.net"
            default_transport = "tls"
            enablement_timeout_secs = 10
            credential_persistence = "always"

            [logging]
            level = "debug"
            json = true
            "#,
        )
        .unwrap();

        assert_eq!(config.dial_domain, "pbx.example.net");
        assert_eq!(config.default_transport, TransportKind::Tls);
        assert_eq!(config.enablement_timeout(), Duration::from_secs(10));
        assert_eq!(config.credential_persistence, CredentialPersistence::Always);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        assert_eq!(config.release_timeout_secs, 5);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(ConverseConfig::from_toml_str("dial_domain = \"\"").is_err());
        assert!(ConverseConfig::from_toml_str("enablement_timeout_secs = 0").is_err());
        assert!(ConverseConfig::from_toml_str("default_transport = \"carrier-pigeon\"").is_err());
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConverseConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ConverseConfig::default());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("converse.toml");
        std::fs::write(&path, "release_timeout_secs = 9\n").unwrap();
        let config = ConverseConfig::load(&path).unwrap();
        assert_eq!(config.release_timeout(), Duration::from_secs(9));
    }

    #[test]
    fn builder_durations_round_up() {
        let config = ConverseConfig::new()
            .with_release_timeout(Duration::from_millis(500))
            .with_enablement_timeout(Duration::from_millis(30_001))
            .with_enablement_poll_interval(Duration::from_micros(1_500));

        assert_eq!(config.release_timeout(), Duration::from_secs(1));
        assert_eq!(config.enablement_timeout(), Duration::from_secs(31));
        assert_eq!(config.enablement_poll_interval(), Duration::from_millis(2));
        assert!(config.validate().is_ok());

        let huge = ConverseConfig::new().with_enablement_poll_interval(Duration::MAX);
        assert_eq!(huge.enablement_poll_interval_ms, u64::MAX);

        let zero = ConverseConfig::new().with_release_timeout(Duration::ZERO);
        assert!(zero.validate().is_err());
    }
}
