//! Configuration for the market-data transport.
//!
//! This module provides the [`Config`] struct holding the WebSocket endpoint
//! and the access token. The reconciliation core never reads it; only the
//! concrete transport in [`crate::client`] does.

use std::time::Duration;

use url::Url;

use crate::error::Error;

/// Environment variable holding an explicit WebSocket URL
pub const WS_URL_VAR: &str = "DEPTH_LADDER_WS_URL";

/// Environment variable holding the API token
pub const API_TOKEN_VAR: &str = "DEPTH_LADDER_API_TOKEN";

/// Feed environment (production or testnet)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Production feed
    #[default]
    Production,
    /// Testnet feed
    Testnet,
}

impl Environment {
    /// Get the WebSocket URL
    pub fn websocket_url(&self) -> &'static str {
        match self {
            Environment::Production => "wss://api.prod.rabbitx.io/ws",
            Environment::Testnet => "wss://api.testnet.rabbitx.io/ws",
        }
    }
}

/// Configuration for the WebSocket transport
///
/// # Example
///
/// ```rust
/// use depth_ladder::Config;
/// use depth_ladder::config::Environment;
///
/// let config = Config::new("my-token")
///     .with_environment(Environment::Testnet)
///     .with_timeout(std::time::Duration::from_secs(5));
///
/// assert!(config.websocket_url().contains("testnet"));
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Access token sent with the connect command
    token: String,

    /// Feed environment
    environment: Environment,

    /// Explicit endpoint overriding the environment default
    url: Option<String>,

    /// Connect/handshake timeout
    timeout: Duration,
}

impl Config {
    /// Create a new configuration with an access token
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            environment: Environment::default(),
            url: None,
            timeout: Duration::from_secs(10),
        }
    }

    /// Build a configuration from `DEPTH_LADDER_API_TOKEN` and the optional
    /// `DEPTH_LADDER_WS_URL`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the token is missing or the resulting
    /// configuration does not validate.
    pub fn from_env() -> Result<Self, Error> {
        let token = std::env::var(API_TOKEN_VAR)
            .map_err(|_| Error::Config(format!("{} is not set", API_TOKEN_VAR)))?;
        let mut config = Config::new(token);
        if let Ok(url) = std::env::var(WS_URL_VAR) {
            if !url.is_empty() {
                config = config.with_url(url);
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Set the feed environment
    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Override the WebSocket endpoint
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the connect timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check that the token is present and the endpoint is a `ws`/`wss` URL
    pub fn validate(&self) -> Result<(), Error> {
        if self.token.trim().is_empty() {
            return Err(Error::Config("access token is empty".to_string()));
        }
        let url = Url::parse(self.websocket_url())?;
        match url.scheme() {
            "ws" | "wss" => Ok(()),
            other => Err(Error::Config(format!(
                "unsupported URL scheme {:?}, expected ws or wss",
                other
            ))),
        }
    }

    /// Get the access token
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Get the environment
    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Get the WebSocket URL (explicit override or environment default)
    pub fn websocket_url(&self) -> &str {
        self.url
            .as_deref()
            .unwrap_or_else(|| self.environment.websocket_url())
    }

    /// Get the timeout duration
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::new("token");
        assert_eq!(config.token(), "token");
        assert_eq!(config.environment(), Environment::Production);
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.websocket_url(), "wss://api.prod.rabbitx.io/ws");
    }

    #[test]
    fn test_url_override() {
        let config = Config::new("token")
            .with_environment(Environment::Testnet)
            .with_url("ws://localhost:8000/connection/websocket");
        assert_eq!(
            config.websocket_url(),
            "ws://localhost:8000/connection/websocket"
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_token() {
        let err = Config::new("  ").validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate_rejects_http_scheme() {
        let err = Config::new("token")
            .with_url("https://example.com/ws")
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("https"));
    }
}
