//! Client configuration and backend endpoint derivation.

use std::{fmt, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Path the backend serves the terminal socket on.
pub const TERMINAL_PATH: &str = "/terminal";

/// Default delay before reconnecting after `stop()`.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(500);

/// Environment variable holding a full `ws://` or `wss://` endpoint.
pub const ENV_ENDPOINT: &str = "COMPILE_CLOUD_ENDPOINT";
/// Environment variable holding an `http(s)` page origin.
pub const ENV_ORIGIN: &str = "COMPILE_CLOUD_ORIGIN";
/// Environment variable holding the reconnect delay in milliseconds.
pub const ENV_RECONNECT_DELAY_MS: &str = "COMPILE_CLOUD_RECONNECT_DELAY_MS";

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid URL `{input}`: {source}")]
    InvalidUrl {
        input: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Unsupported scheme `{0}` (expected ws or wss)")]
    UnsupportedScheme(String),
    #[error("Unsupported origin scheme `{0}` (expected http or https)")]
    UnsupportedOrigin(String),
    #[error("URL has no host: {0}")]
    MissingHost(String),
    #[error("Missing configuration: set COMPILE_CLOUD_ENDPOINT or COMPILE_CLOUD_ORIGIN")]
    MissingEndpoint,
    #[error("Invalid reconnect delay `{0}`")]
    InvalidDelay(String),
}

fn parse_url(input: &str) -> Result<Url, ConfigError> {
    Url::parse(input).map_err(|source| ConfigError::InvalidUrl {
        input: input.to_string(),
        source,
    })
}

/// Address of the backend's duplex endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(Url);

impl Endpoint {
    /// Parse a `ws://` or `wss://` URL.
    ///
    /// # Errors
    /// Returns error if the URL is malformed or has another scheme.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let url = parse_url(input)?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        }
        if url.host_str().is_none() {
            return Err(ConfigError::MissingHost(input.to_string()));
        }
        Ok(Self(url))
    }

    /// Derive the endpoint from the origin of the page hosting the client.
    ///
    /// Same host and port, `ws` for `http` and `wss` for `https`, at
    /// [`TERMINAL_PATH`].
    ///
    /// # Errors
    /// Returns error if the origin is not an `http(s)` URL with a host.
    pub fn from_page_origin(origin: &str) -> Result<Self, ConfigError> {
        let page = parse_url(origin)?;
        let scheme = match page.scheme() {
            "http" => "ws",
            "https" => "wss",
            other => return Err(ConfigError::UnsupportedOrigin(other.to_string())),
        };
        let host = page
            .host_str()
            .ok_or_else(|| ConfigError::MissingHost(origin.to_string()))?;
        let address = match page.port() {
            Some(port) => format!("{scheme}://{host}:{port}{TERMINAL_PATH}"),
            None => format!("{scheme}://{host}{TERMINAL_PATH}"),
        };
        Self::parse(&address)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.0
    }

    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.0.scheme() == "wss"
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Endpoint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Endpoint {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl<'de> Deserialize<'de> for Endpoint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

const fn default_reconnect_delay_ms() -> u64 {
    500
}

/// Client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Backend endpoint.
    pub endpoint: Endpoint,

    /// Delay before the automatic reconnect that follows `stop()`.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

impl ClientConfig {
    /// Create a config with the default reconnect delay.
    #[must_use]
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }

    /// Override the reconnect delay.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub const fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Load from the process environment.
    ///
    /// # Errors
    /// Returns error if no endpoint is configured or a value is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. [`ENV_ENDPOINT`] wins over
    /// [`ENV_ORIGIN`].
    ///
    /// # Errors
    /// Returns error if no endpoint is configured or a value is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = if let Some(raw) = lookup(ENV_ENDPOINT) {
            Endpoint::parse(&raw)?
        } else if let Some(origin) = lookup(ENV_ORIGIN) {
            Endpoint::from_page_origin(&origin)?
        } else {
            return Err(ConfigError::MissingEndpoint);
        };

        let mut config = Self::new(endpoint);
        if let Some(raw) = lookup(ENV_RECONNECT_DELAY_MS) {
            config.reconnect_delay_ms = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidDelay(raw.clone()))?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tokio_test::{assert_err, assert_ok};

    use super::*;

    #[test]
    fn test_origin_derivation() {
        let ep = Endpoint::from_page_origin("http://54.197.69.203").unwrap();
        assert_eq!(ep.as_str(), "ws://54.197.69.203/terminal");

        let ep = Endpoint::from_page_origin("https://example.com:8443/editor/index.html").unwrap();
        assert_eq!(ep.as_str(), "wss://example.com:8443/terminal");
        assert!(ep.is_secure());

        let ep = Endpoint::from_page_origin("http://localhost:8080").unwrap();
        assert_eq!(ep.as_str(), "ws://localhost:8080/terminal");
    }

    #[test]
    fn test_origin_rejects_other_schemes() {
        assert!(matches!(
            Endpoint::from_page_origin("ftp://example.com"),
            Err(ConfigError::UnsupportedOrigin(_))
        ));
    }

    #[test]
    fn test_endpoint_parse() {
        assert_ok!(Endpoint::parse("ws://127.0.0.1:9000/terminal"));
        assert!(matches!(
            Endpoint::parse("http://127.0.0.1/terminal"),
            Err(ConfigError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            Endpoint::parse("not a url"),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_config_from_lookup() {
        let vars: HashMap<&str, &str> = [
            (ENV_ORIGIN, "https://cloud.example"),
            (ENV_RECONNECT_DELAY_MS, "250"),
        ]
        .into_iter()
        .collect();
        let config =
            ClientConfig::from_lookup(|k| vars.get(k).map(|v| (*v).to_string())).unwrap();
        assert_eq!(config.endpoint.as_str(), "wss://cloud.example/terminal");
        assert_eq!(config.reconnect_delay(), Duration::from_millis(250));
    }

    #[test]
    fn test_config_endpoint_wins_over_origin() {
        let config = ClientConfig::from_lookup(|k| match k {
            ENV_ENDPOINT => Some("ws://backend:7000/terminal".to_string()),
            ENV_ORIGIN => Some("https://ignored".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.endpoint.as_str(), "ws://backend:7000/terminal");
        assert_eq!(config.reconnect_delay(), DEFAULT_RECONNECT_DELAY);
    }

    #[test]
    fn test_config_missing_endpoint() {
        assert!(matches!(
            ClientConfig::from_lookup(|_| None),
            Err(ConfigError::MissingEndpoint)
        ));
    }

    #[test]
    fn test_config_deserialize() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"endpoint":"ws://localhost:8080/terminal"}"#).unwrap();
        assert_eq!(config.reconnect_delay(), DEFAULT_RECONNECT_DELAY);

        assert_err!(serde_json::from_str::<ClientConfig>(r#"{"endpoint":"http://x"}"#));
    }
}
