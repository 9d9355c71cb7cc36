//! Configuration file handling

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use super::paths::config_path;
use super::Result;
use crate::client::{CredentialKind, Credentials};

/// Environment variables that override file settings
pub const ENV_BASE_URL: &str = "PETFRIENDS_BASE_URL";
pub const ENV_VALID_EMAIL: &str = "PETFRIENDS_VALID_EMAIL";
pub const ENV_VALID_PASSWORD: &str = "PETFRIENDS_VALID_PASSWORD";
pub const ENV_INVALID_EMAIL: &str = "PETFRIENDS_INVALID_EMAIL";
pub const ENV_INVALID_PASSWORD: &str = "PETFRIENDS_INVALID_PASSWORD";

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Pet service endpoint
    #[serde(default)]
    pub service: ServiceConfig,

    /// Credential fixtures
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Retry settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Report settings
    #[serde(default)]
    pub report: ReportConfig,
}

/// Pet service settings
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    /// Endpoint root, e.g. `https://petfriends.skillfactory.ru`
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

fn default_base_url() -> String {
    "https://petfriends.skillfactory.ru".to_string()
}

/// Known-good and guaranteed-rejected accounts
#[derive(Debug, Deserialize, Clone)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub valid_email: String,
    #[serde(default)]
    pub valid_password: String,
    #[serde(default = "default_invalid_email")]
    pub invalid_email: String,
    #[serde(default = "default_invalid_password")]
    pub invalid_password: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            valid_email: String::new(),
            valid_password: String::new(),
            invalid_email: default_invalid_email(),
            invalid_password: default_invalid_password(),
        }
    }
}

fn default_invalid_email() -> String {
    "nobody@invalid.example".to_string()
}
fn default_invalid_password() -> String {
    "not-a-password".to_string()
}

/// Timeout settings in seconds
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Bound on every single HTTP call
    #[serde(default = "default_request")]
    pub request_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request_secs: default_request(),
        }
    }
}

fn default_request() -> u64 {
    10
}

/// Retry settings
#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    /// Attempts per call when the transport fails
    #[serde(default = "default_transport_attempts")]
    pub transport_attempts: u32,

    /// Reads of a listing while waiting for a change to become visible
    #[serde(default = "default_read_attempts")]
    pub read_attempts: u32,

    /// Pause between those reads
    #[serde(default = "default_read_delay")]
    pub read_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            transport_attempts: default_transport_attempts(),
            read_attempts: default_read_attempts(),
            read_delay_ms: default_read_delay(),
        }
    }
}

fn default_transport_attempts() -> u32 {
    3
}
fn default_read_attempts() -> u32 {
    5
}
fn default_read_delay() -> u64 {
    500
}

impl RetryConfig {
    pub fn read_delay(&self) -> Duration {
        Duration::from_millis(self.read_delay_ms)
    }
}

/// Report settings
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ReportConfig {
    /// Treat PRECONDITION_MISSING as a failed run
    #[serde(default)]
    pub fail_on_precondition_missing: bool,
}

impl Config {
    /// Load configuration from an explicit file or the default location
    ///
    /// Returns default configuration if no file exists. Environment
    /// overrides are applied on top in both cases.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }

    /// Apply environment overrides through a lookup function
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let targets: [(&str, &mut String); 5] = [
            (ENV_BASE_URL, &mut self.service.base_url),
            (ENV_VALID_EMAIL, &mut self.credentials.valid_email),
            (ENV_VALID_PASSWORD, &mut self.credentials.valid_password),
            (ENV_INVALID_EMAIL, &mut self.credentials.invalid_email),
            (ENV_INVALID_PASSWORD, &mut self.credentials.invalid_password),
        ];
        for (name, slot) in targets {
            if let Some(value) = lookup(name).filter(|v| !v.is_empty()) {
                *slot = value;
            }
        }
    }

    /// Check the settings a run depends on
    pub fn validate(&self) -> Result<()> {
        reqwest::Url::parse(&self.service.base_url).map_err(|e| {
            super::Error::Config(format!(
                "Invalid base_url '{}': {}",
                self.service.base_url, e
            ))
        })?;

        if self.credentials.valid_email.is_empty() || self.credentials.valid_password.is_empty() {
            return Err(super::Error::Config(format!(
                "Valid credentials are not configured. Set them in the config file or via {} and {}",
                ENV_VALID_EMAIL, ENV_VALID_PASSWORD
            )));
        }

        if self.retry.transport_attempts == 0 || self.retry.read_attempts == 0 {
            return Err(super::Error::Config(
                "retry attempts must be at least 1".to_string(),
            ));
        }

        if self.timeouts.request_secs == 0 {
            return Err(super::Error::Config(
                "timeouts.request_secs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Credential fixture by kind
    pub fn credentials(&self, kind: CredentialKind) -> Credentials {
        match kind {
            CredentialKind::Valid => Credentials::new(
                &self.credentials.valid_email,
                &self.credentials.valid_password,
            ),
            CredentialKind::Invalid => Credentials::new(
                &self.credentials.invalid_email,
                &self.credentials.invalid_password,
            ),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.request_secs)
    }
}
