//! Client Configuration Settings
//!
//! Configuration types for the streaming client, loaded from environment
//! variables.

use std::str::FromStr;
use std::time::Duration;

/// Production API host.
pub const PRODUCTION_ENDPOINT: &str = "invest-public-api.tinkoff.ru:443";

/// Sandbox API host.
pub const SANDBOX_ENDPOINT: &str = "sandbox-invest-public-api.tinkoff.ru:443";

/// Default `x-app-name` metadata value.
const DEFAULT_APP_NAME: &str = "invest-stream";

/// API environment (production vs sandbox).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Real accounts.
    #[default]
    Production,
    /// Sandbox accounts with simulated execution.
    Sandbox,
}

impl Environment {
    /// Interpret the `TINKOFF_DEMO` flag: `true` selects the sandbox.
    #[must_use]
    pub fn from_demo_flag(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("true") {
            Self::Sandbox
        } else {
            Self::Production
        }
    }

    /// Check if this is the sandbox.
    #[must_use]
    pub const fn is_sandbox(&self) -> bool {
        matches!(self, Self::Sandbox)
    }

    /// Default `host:port` for this environment.
    #[must_use]
    pub const fn endpoint(&self) -> &'static str {
        match self {
            Self::Production => PRODUCTION_ENDPOINT,
            Self::Sandbox => SANDBOX_ENDPOINT,
        }
    }

    /// Get the environment name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Sandbox => "sandbox",
        }
    }
}

/// API token.
#[derive(Clone)]
pub struct Credentials {
    token: String,
}

impl Credentials {
    /// Wrap a token.
    #[must_use]
    pub const fn new(token: String) -> Self {
        Self { token }
    }

    /// Get the token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Stream session settings.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Reconnect attempts per outage before the session closes.
    pub max_reconnect_attempts: u32,
    /// Reconnect when nothing arrives for this long (`None` = never).
    pub idle_timeout: Option<Duration>,
    /// Deliver only closed candles.
    pub candles_waiting_close: bool,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 10,
            idle_timeout: Some(Duration::from_secs(180)),
            candles_waiting_close: false,
        }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API environment.
    pub environment: Environment,
    /// API token.
    pub credentials: Credentials,
    /// Server `host:port`.
    pub endpoint: String,
    /// Value of the `x-app-name` header.
    pub app_name: String,
    /// Stream session settings.
    pub stream: StreamSettings,
}

impl ClientConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `TINKOFF_TOKEN` is missing or empty, or if an
    /// optional variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`ClientConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let token = lookup("TINKOFF_TOKEN")
            .ok_or_else(|| ConfigError::MissingEnvVar("TINKOFF_TOKEN".to_string()))?;
        if token.trim().is_empty() {
            return Err(ConfigError::EmptyValue("TINKOFF_TOKEN".to_string()));
        }

        let environment = lookup("TINKOFF_DEMO")
            .map(|v| Environment::from_demo_flag(&v))
            .unwrap_or_default();

        let endpoint = lookup("INVEST_ENDPOINT")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| environment.endpoint().to_string());

        let app_name = lookup("INVEST_APP_NAME")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_APP_NAME.to_string());

        let defaults = StreamSettings::default();
        let idle_secs: u64 = parse_or(
            &lookup,
            "INVEST_STREAM_IDLE_TIMEOUT_SECS",
            defaults.idle_timeout.map_or(0, |d| d.as_secs()),
        )?;

        let stream = StreamSettings {
            reconnect_delay_initial: Duration::from_millis(parse_or(
                &lookup,
                "INVEST_STREAM_RECONNECT_DELAY_INITIAL_MS",
                millis(defaults.reconnect_delay_initial),
            )?),
            reconnect_delay_max: Duration::from_secs(parse_or(
                &lookup,
                "INVEST_STREAM_RECONNECT_DELAY_MAX_SECS",
                defaults.reconnect_delay_max.as_secs(),
            )?),
            reconnect_delay_multiplier: parse_or(
                &lookup,
                "INVEST_STREAM_RECONNECT_DELAY_MULTIPLIER",
                defaults.reconnect_delay_multiplier,
            )?,
            max_reconnect_attempts: parse_or(
                &lookup,
                "INVEST_STREAM_MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            )?,
            idle_timeout: (idle_secs > 0).then(|| Duration::from_secs(idle_secs)),
            candles_waiting_close: parse_or(
                &lookup,
                "INVEST_STREAM_CANDLES_WAITING_CLOSE",
                defaults.candles_waiting_close,
            )?,
        };

        Ok(Self {
            environment,
            credentials: Credentials::new(token),
            endpoint,
            app_name,
            stream,
        })
    }

    /// Endpoint as an `https` URL.
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        format!("https://{}", self.endpoint)
    }

    /// Host part of the endpoint, used as the TLS server name.
    #[must_use]
    pub fn host(&self) -> &str {
        self.endpoint
            .rsplit_once(':')
            .map_or(self.endpoint.as_str(), |(host, _)| host)
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be parsed.
    #[error("environment variable {key} has invalid value {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw,
        }),
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
