//! Sign-in configuration.
//!
//! Configuration is plain data deserialized from TOML and environment
//! variables. [`AuthConfig::validate`] is called by
//! [`OpenIdService::new`](crate::service::OpenIdService::new) so that a bad
//! configuration refuses to start instead of failing on the first request.
//!
//! # Example (TOML)
//!
//! ```toml
//! canonical_web_url = "https://review.example.com/"
//!
//! [openid]
//! discovery_cache_ttl = "5m"
//! allow_google_account_upgrade = true
//!
//! [logging]
//! level = "debug"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::user::GroupId;

/// Root configuration for the sign-in subsystem.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Public base URL of the review server.
    ///
    /// Used as the OpenID realm, as the base of the provider return URL and
    /// as the target of the final browser redirect.
    pub canonical_web_url: Option<String>,

    /// OpenID relying party settings.
    pub openid: OpenIdConfig,

    /// System group identifiers.
    pub groups: GroupConfig,

    /// Logging settings.
    pub logging: LoggingConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            canonical_web_url: None,
            openid: OpenIdConfig::default(),
            groups: GroupConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// OpenID relying party configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OpenIdConfig {
    /// How long discovery results (including negative ones) are kept.
    ///
    /// This also bounds how long a user may spend at the provider: the
    /// callback re-resolves the identifier from this cache.
    #[serde(with = "humantime_serde")]
    pub discovery_cache_ttl: Duration,

    /// Attach Google OpenID identities to accounts created under the
    /// legacy `Google Account <email>` scheme.
    pub allow_google_account_upgrade: bool,

    /// Lifetime of the cookie remembering the last identifier used.
    #[serde(with = "humantime_serde")]
    pub last_id_cookie_max_age: Duration,

    /// Mark cookies as `Secure`.
    pub secure_cookies: bool,
}

impl Default for OpenIdConfig {
    fn default() -> Self {
        Self {
            discovery_cache_ttl: Duration::from_secs(5 * 60),
            allow_google_account_upgrade: false,
            last_id_cookie_max_age: Duration::from_secs(365 * 24 * 3600),
            secure_cookies: true,
        }
    }
}

/// Well-known groups every user is placed into.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GroupConfig {
    /// Group containing every user, signed in or not.
    pub anonymous: GroupId,

    /// Group containing every signed-in user.
    pub registered: GroupId,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            anonymous: GroupId(1),
            registered: GroupId(2),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Creates a configuration for the given canonical URL with defaults
    /// everywhere else.
    #[must_use]
    pub fn with_canonical_web_url(url: impl Into<String>) -> Self {
        Self {
            canonical_web_url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if `canonical_web_url` is unset, and
    /// `ConfigError::InvalidValue` if:
    /// - `canonical_web_url` is not an absolute http(s) URL
    /// - `openid.discovery_cache_ttl` is zero
    /// - `logging.level` is not a known level
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.context_url()?;

        if self.openid.discovery_cache_ttl.is_zero() {
            return Err(ConfigError::InvalidValue(
                "openid.discovery_cache_ttl must be > 0".to_string(),
            ));
        }

        let level = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&level.as_str()) {
            return Err(ConfigError::InvalidValue(format!(
                "logging.level must be one of {valid_levels:?}"
            )));
        }

        Ok(())
    }

    /// Returns the canonical web URL, normalized to end with `/`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is missing, unparsable or not http(s).
    pub fn context_url(&self) -> Result<String, ConfigError> {
        let raw = self
            .canonical_web_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::Missing("canonical_web_url".to_string()))?;

        let url = Url::parse(raw).map_err(|e| {
            ConfigError::InvalidValue(format!("canonical_web_url '{raw}' is not a URL: {e}"))
        })?;

        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "canonical_web_url scheme must be http or https, got '{other}'"
                )));
            }
        }

        let mut normalized = url.to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        Ok(normalized)
    }
}

pub mod loader {
    //! Layered configuration loading.

    use std::path::PathBuf;

    use config::{Config, Environment, File};

    use super::{AuthConfig, ConfigError};

    /// Default configuration file looked up in the working directory.
    pub const DEFAULT_CONFIG_FILE: &str = "reviewd.toml";

    /// Loads and validates the configuration.
    ///
    /// Sources, lowest precedence first: the TOML file at `path` (or
    /// `reviewd.toml` when `None`; a missing file is skipped), then
    /// environment variables such as `REVIEWD__OPENID__ALLOW_GOOGLE_ACCOUNT_UPGRADE=true`.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be read or deserialized, or if
    /// validation fails.
    pub fn load_config(path: Option<&str>) -> Result<AuthConfig, ConfigError> {
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));

        let mut builder = Config::builder();
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        builder = builder.add_source(
            Environment::with_prefix("REVIEWD")
                .try_parsing(true)
                .separator("__"),
        );

        let cfg = builder
            .build()
            .map_err(|e| ConfigError::InvalidValue(format!("config build error: {e}")))?;
        let merged: AuthConfig = cfg
            .try_deserialize()
            .map_err(|e| ConfigError::InvalidValue(format!("config deserialize error: {e}")))?;

        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = AuthConfig::default();
        assert!(config.canonical_web_url.is_none());
        assert_eq!(config.openid.discovery_cache_ttl, Duration::from_secs(300));
        assert!(!config.openid.allow_google_account_upgrade);
        assert_eq!(
            config.openid.last_id_cookie_max_age,
            Duration::from_secs(365 * 24 * 3600)
        );
        assert_eq!(config.groups.registered, GroupId(2));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validate_requires_canonical_url() {
        let err = AuthConfig::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));

        let config = AuthConfig::with_canonical_web_url("   ");
        assert!(matches!(config.validate(), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = AuthConfig::with_canonical_web_url("not a url");
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

        let config = AuthConfig::with_canonical_web_url("ftp://review.example.com/");
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

        let mut config = AuthConfig::with_canonical_web_url("https://review.example.com/");
        config.openid.discovery_cache_ttl = Duration::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

        let mut config = AuthConfig::with_canonical_web_url("https://review.example.com/");
        config.logging.level = "loud".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_context_url_adds_trailing_slash() {
        let config = AuthConfig::with_canonical_web_url("https://review.example.com/r");
        assert_eq!(
            config.context_url().unwrap(),
            "https://review.example.com/r/"
        );

        let config = AuthConfig::with_canonical_web_url("https://review.example.com/");
        assert_eq!(config.context_url().unwrap(), "https://review.example.com/");
    }

    #[test]
    fn test_deserialize_humantime() {
        let config: AuthConfig = serde_json::from_value(serde_json::json!({
            "canonical_web_url": "https://review.example.com/",
            "openid": {
                "discovery_cache_ttl": "30s",
                "allow_google_account_upgrade": true
            }
        }))
        .unwrap();

        assert_eq!(config.openid.discovery_cache_ttl, Duration::from_secs(30));
        assert!(config.openid.allow_google_account_upgrade);
        assert!(config.openid.secure_cookies);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reviewd.toml");
        std::fs::write(
            &path,
            r#"
canonical_web_url = "https://review.example.com/"

[openid]
discovery_cache_ttl = "10m"
allow_google_account_upgrade = true
"#,
        )
        .unwrap();

        let config = loader::load_config(path.to_str()).unwrap();
        assert_eq!(config.openid.discovery_cache_ttl, Duration::from_secs(600));
        assert!(config.openid.allow_google_account_upgrade);
    }

    #[test]
    fn test_load_config_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reviewd.toml");
        std::fs::write(&path, "[openid]\nallow_google_account_upgrade = true\n").unwrap();

        let err = loader::load_config(path.to_str()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }
}
