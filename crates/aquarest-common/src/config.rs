//! Client configuration and environment-sourced defaults.
//!
//! A [`ClientConfig`] is built once, usually at client construction, and may be
//! adjusted afterwards through explicit setters. The instance URL is optional
//! at construction time but must be present before any request is issued.
//!
//! ## Environment
//!
//! | Variable            | Field             |
//! |---------------------|-------------------|
//! | `AQUA_INSTANCE`     | `instance`        |
//! | `AQUA_PORT`         | `port`            |
//! | `AQUA_PER_PAGE_MAX` | `per_page_max`    |
//! | `AQUA_DEBUG`        | `debug`           |
//! | `AQUA_VERIFY_TLS`   | `verify_tls`      |
//! | `AQUA_TIMEOUT`      | `timeout_seconds` |

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Default ceiling for the number of items requested per page.
pub const DEFAULT_PER_PAGE_MAX: u32 = 1000;

/// Environment variable holding the instance base URL.
pub const ENV_INSTANCE: &str = "AQUA_INSTANCE";
/// Environment variable holding the port override.
pub const ENV_PORT: &str = "AQUA_PORT";
/// Environment variable holding the page-size ceiling.
pub const ENV_PER_PAGE_MAX: &str = "AQUA_PER_PAGE_MAX";
/// Environment variable toggling debug tracing of target URLs.
pub const ENV_DEBUG: &str = "AQUA_DEBUG";
/// Environment variable toggling TLS certificate verification.
pub const ENV_VERIFY_TLS: &str = "AQUA_VERIFY_TLS";
/// Environment variable holding the request timeout in seconds.
pub const ENV_TIMEOUT: &str = "AQUA_TIMEOUT";

/// Errors raised while building or validating a [`ClientConfig`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// The instance URL is missing, unparseable, or not an absolute URL with a host.
    #[error("Invalid instance: {0}")]
    InvalidInstance(String),

    /// The page-size ceiling must be a positive integer.
    #[error("Page-size ceiling must be positive, got {0}")]
    InvalidPageSize(u32),

    /// An environment value could not be interpreted.
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue {
        /// The variable that carried the value.
        key: String,
        /// The raw value as found.
        value: String,
    },
}

/// Configuration for an Aqua REST client.
///
/// Holds no secrets, so it is safe to log and serialize.
///
/// # Examples
///
/// ```
/// use aquarest_common::ClientConfig;
///
/// let config = ClientConfig::new()
///     .with_instance("https://aqua.example.com")
///     .unwrap()
///     .with_port(8443)
///     .with_debug(true);
///
/// assert_eq!(config.per_page_max, 1000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base instance URL. Required before any request is made.
    pub instance: Option<Url>,
    /// Optional port that replaces whatever port the instance URL carries.
    pub port: Option<u16>,
    /// Maximum items per page the client will ever request.
    #[serde(default = "default_per_page_max")]
    pub per_page_max: u32,
    /// Trace outgoing target URLs at debug level.
    #[serde(default)]
    pub debug: bool,
    /// Verify TLS certificates. Off by default so self-signed test endpoints work.
    #[serde(default)]
    pub verify_tls: bool,
    /// Request timeout in seconds. `None` leaves the transport default in place.
    pub timeout_seconds: Option<u64>,
}

const fn default_per_page_max() -> u32 {
    DEFAULT_PER_PAGE_MAX
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            instance: None,
            port: None,
            per_page_max: DEFAULT_PER_PAGE_MAX,
            debug: false,
            verify_tls: false,
            timeout_seconds: None,
        }
    }
}

impl ClientConfig {
    /// Creates a configuration with no instance and default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration entirely from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates a configuration from an arbitrary key lookup.
    ///
    /// Missing keys leave the corresponding default untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if any present value cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.fill_from_lookup(&lookup)?;

        if let Some(value) = lookup(ENV_PER_PAGE_MAX) {
            let per_page_max = parse_number(ENV_PER_PAGE_MAX, &value)?;
            config.set_per_page_max(per_page_max)?;
        }
        if let Some(value) = lookup(ENV_DEBUG) {
            config.debug = parse_flag(ENV_DEBUG, &value)?;
        }
        if let Some(value) = lookup(ENV_VERIFY_TLS) {
            config.verify_tls = parse_flag(ENV_VERIFY_TLS, &value)?;
        }

        Ok(config)
    }

    /// Populates unset connection fields (instance, port, timeout) from the environment.
    ///
    /// Explicitly configured values always win over the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable consulted is present but invalid.
    pub fn fill_from_env(&mut self) -> Result<(), ConfigError> {
        self.fill_from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`fill_from_env`](Self::fill_from_env) with a custom lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable consulted is present but invalid.
    pub fn fill_from_lookup<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.instance.is_none()
            && let Some(value) = lookup(ENV_INSTANCE)
        {
            self.set_instance(&value)?;
            debug!("instance taken from {ENV_INSTANCE}");
        }
        if self.port.is_none()
            && let Some(value) = lookup(ENV_PORT)
        {
            self.port = Some(parse_number(ENV_PORT, &value)?);
        }
        if self.timeout_seconds.is_none()
            && let Some(value) = lookup(ENV_TIMEOUT)
        {
            self.timeout_seconds = Some(parse_number(ENV_TIMEOUT, &value)?);
        }
        Ok(())
    }

    /// Sets the instance URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidInstance`] unless `instance` is an absolute URL with a host.
    pub fn with_instance(mut self, instance: &str) -> Result<Self, ConfigError> {
        self.set_instance(instance)?;
        Ok(self)
    }

    /// Replaces the instance URL in place.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidInstance`] unless `instance` is an absolute URL with a host.
    pub fn set_instance(&mut self, instance: &str) -> Result<(), ConfigError> {
        self.instance = Some(parse_instance(instance)?);
        Ok(())
    }

    /// Sets the port override.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the page-size ceiling.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPageSize`] for zero.
    pub fn with_per_page_max(mut self, per_page_max: u32) -> Result<Self, ConfigError> {
        self.set_per_page_max(per_page_max)?;
        Ok(self)
    }

    /// Replaces the page-size ceiling in place.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPageSize`] for zero.
    pub const fn set_per_page_max(&mut self, per_page_max: u32) -> Result<(), ConfigError> {
        if per_page_max == 0 {
            return Err(ConfigError::InvalidPageSize(per_page_max));
        }
        self.per_page_max = per_page_max;
        Ok(())
    }

    /// Enables or disables debug tracing of outgoing target URLs.
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Enables or disables TLS certificate verification.
    #[must_use]
    pub const fn with_verify_tls(mut self, verify_tls: bool) -> Self {
        self.verify_tls = verify_tls;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    /// Checks invariants that public field access could have broken.
    ///
    /// # Errors
    ///
    /// Returns an error if the page-size ceiling is zero or the instance URL has no host.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.per_page_max == 0 {
            return Err(ConfigError::InvalidPageSize(self.per_page_max));
        }
        if let Some(instance) = &self.instance {
            ensure_absolute(instance)?;
        }
        Ok(())
    }
}

/// Parses and validates an instance URL.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidInstance`] unless `instance` is an absolute URL with a host.
pub fn parse_instance(instance: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(instance.trim())
        .map_err(|e| ConfigError::InvalidInstance(format!("'{instance}': {e}")))?;
    ensure_absolute(&url)?;
    Ok(url)
}

fn ensure_absolute(url: &Url) -> Result<(), ConfigError> {
    if url.cannot_be_a_base() || url.host_str().is_none_or(str::is_empty) {
        return Err(ConfigError::InvalidInstance(format!(
            "'{url}' is not an absolute URL with a host"
        )));
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
