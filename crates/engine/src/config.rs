//! Configuration for the gqlrun engine
//!
//! Supports environment-based configuration, TOML files, and builder-style
//! overrides. The engine consumes these values as opaque inputs: the CA
//! bundle and proxy address are not validated here (see [`crate::transport`]).

use crate::error::EngineResult;
use gqlrun_core::{Diagnostic, ErrorCode, RetryConfig};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default grant type for the token handshake
pub const DEFAULT_GRANT_TYPE: &str = "client_credentials";

/// Default `User-Agent` sent with every request
pub const DEFAULT_USER_AGENT: &str = concat!("gqlrun/", env!("CARGO_PKG_VERSION"));

/// Long-lived credentials exchanged for a session token
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    /// OAuth grant type, usually `client_credentials`
    pub grant_type: String,
    /// Client identifier
    pub client_id: String,
    /// Client secret
    pub client_secret: String,
    /// Token audience
    pub audience: String,
    /// Token endpoint URL
    pub auth_url: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            grant_type: DEFAULT_GRANT_TYPE.to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            audience: String::new(),
            auth_url: String::new(),
        }
    }
}

impl Credentials {
    /// Create client-credentials for a token endpoint
    pub fn new(
        auth_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            grant_type: DEFAULT_GRANT_TYPE.to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            audience: audience.into(),
            auth_url: auth_url.into(),
        }
    }

    /// Builder-style method to set the grant type
    #[must_use]
    pub fn with_grant_type(mut self, grant_type: impl Into<String>) -> Self {
        self.grant_type = grant_type.into();
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("grant_type", &self.grant_type)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("audience", &self.audience)
            .field("auth_url", &self.auth_url)
            .finish()
    }
}

/// HTTP transport configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// PEM bundle of additional trusted CAs
    pub ca_bundle: Option<String>,
    /// Route requests through `proxy_url`
    pub proxy_enabled: bool,
    /// Proxy address
    pub proxy_url: Option<String>,
    /// Maximum idle connections kept per host
    pub max_connections_per_host: usize,
    /// Transport-level retry policy
    pub retry: RetryConfig,
    /// Per-attempt request timeout
    #[serde(with = "secs")]
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ca_bundle: None,
            proxy_enabled: false,
            proxy_url: None,
            max_connections_per_host: 10,
            retry: RetryConfig::default(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl TransportConfig {
    /// Builder-style method to set the CA bundle
    #[must_use]
    pub fn with_ca_bundle(mut self, pem: impl Into<String>) -> Self {
        self.ca_bundle = Some(pem.into());
        self
    }

    /// Builder-style method to enable a proxy
    #[must_use]
    pub fn with_proxy(mut self, url: impl Into<String>) -> Self {
        self.proxy_enabled = true;
        self.proxy_url = Some(url.into());
        self
    }

    /// Builder-style method to set the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Builder-style method to set the per-attempt timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builder-style method to set the per-host connection limit
    #[must_use]
    pub fn with_max_connections_per_host(mut self, max: usize) -> Self {
        self.max_connections_per_host = max;
        self
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// GraphQL endpoint URL
    pub api_url: String,
    /// `User-Agent` header value
    pub user_agent: String,
    /// Token handshake credentials
    pub credentials: Credentials,
    /// Transport settings
    pub transport: TransportConfig,
    /// Attach raw request/response dumps to diagnostics
    pub debug_dumps: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            credentials: Credentials::default(),
            transport: TransportConfig::default(),
            debug_dumps: false,
        }
    }
}

impl EngineConfig {
    /// Create a configuration for an API endpoint and credentials
    pub fn new(api_url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            api_url: api_url.into(),
            credentials,
            ..Self::default()
        }
    }

    /// Create configuration from environment variables
    ///
    /// Reads the following environment variables:
    /// - `GQLRUN_API_URL`: GraphQL endpoint
    /// - `GQLRUN_AUTH_URL`: token endpoint
    /// - `GQLRUN_GRANT_TYPE`: grant type (defaults to `client_credentials`)
    /// - `GQLRUN_CLIENT_ID` / `GQLRUN_CLIENT_SECRET` / `GQLRUN_AUDIENCE`
    /// - `GQLRUN_USER_AGENT`: overrides the default user agent
    /// - `GQLRUN_PROXY_ENABLED` / `GQLRUN_PROXY_URL`
    /// - `GQLRUN_CA_BUNDLE`: path to a PEM file of trusted CAs
    /// - `GQLRUN_MAX_CONNS_PER_HOST`
    /// - `GQLRUN_RETRY_MAX`, `GQLRUN_RETRY_WAIT_MIN_MS`, `GQLRUN_RETRY_WAIT_MAX_MS`
    /// - `GQLRUN_TIMEOUT_SECS`: per-attempt timeout
    /// - `GQLRUN_DEBUG_DUMPS`: attach raw dumps to diagnostics
    pub fn from_env() -> EngineResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> EngineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_url = lookup("GQLRUN_API_URL")
            .ok_or_else(|| missing_var("GQLRUN_API_URL"))?;
        let auth_url = lookup("GQLRUN_AUTH_URL")
            .ok_or_else(|| missing_var("GQLRUN_AUTH_URL"))?;

        let credentials = Credentials {
            grant_type: lookup("GQLRUN_GRANT_TYPE")
                .unwrap_or_else(|| DEFAULT_GRANT_TYPE.to_string()),
            client_id: lookup("GQLRUN_CLIENT_ID").unwrap_or_default(),
            client_secret: lookup("GQLRUN_CLIENT_SECRET").unwrap_or_default(),
            audience: lookup("GQLRUN_AUDIENCE").unwrap_or_default(),
            auth_url,
        };

        let ca_bundle = match lookup("GQLRUN_CA_BUNDLE") {
            Some(path) => Some(read_ca_bundle(Path::new(&path))?),
            None => None,
        };

        let retry_defaults = defaults.transport.retry.clone();
        let retry = RetryConfig {
            max_attempts: parse_var(&lookup, "GQLRUN_RETRY_MAX")?
                .unwrap_or(retry_defaults.max_attempts),
            min_wait: parse_var(&lookup, "GQLRUN_RETRY_WAIT_MIN_MS")?
                .map_or(retry_defaults.min_wait, Duration::from_millis),
            max_wait: parse_var(&lookup, "GQLRUN_RETRY_WAIT_MAX_MS")?
                .map_or(retry_defaults.max_wait, Duration::from_millis),
            ..retry_defaults
        };

        let transport = TransportConfig {
            ca_bundle,
            proxy_enabled: parse_flag(lookup("GQLRUN_PROXY_ENABLED").as_deref()),
            proxy_url: lookup("GQLRUN_PROXY_URL"),
            max_connections_per_host: parse_var(&lookup, "GQLRUN_MAX_CONNS_PER_HOST")?
                .unwrap_or(defaults.transport.max_connections_per_host),
            retry,
            timeout: parse_var(&lookup, "GQLRUN_TIMEOUT_SECS")?
                .map_or(defaults.transport.timeout, Duration::from_secs),
        };

        Ok(Self {
            api_url,
            user_agent: lookup("GQLRUN_USER_AGENT").unwrap_or(defaults.user_agent),
            credentials,
            transport,
            debug_dumps: parse_flag(lookup("GQLRUN_DEBUG_DUMPS").as_deref()),
        })
    }

    /// Parse configuration from a TOML document
    pub fn from_toml_str(content: &str) -> EngineResult<Self> {
        toml::from_str(content).map_err(|e| {
            Diagnostic::new(ErrorCode::ConfigParseError, format!("TOML parse error: {e}"))
                .with_source(e)
                .into()
        })
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Diagnostic::config_not_found(path).into());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            Diagnostic::new(
                ErrorCode::ConfigError,
                format!("Failed to read config file {}: {e}", path.display()),
            )
            .with_source(e)
        })?;
        Self::from_toml_str(&content)
    }

    /// Builder-style method to set the API URL
    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Builder-style method to set credentials
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Builder-style method to set transport settings
    #[must_use]
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    /// Builder-style method to set the user agent
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Builder-style method to attach raw dumps to diagnostics
    #[must_use]
    pub fn with_debug_dumps(mut self, enabled: bool) -> Self {
        self.debug_dumps = enabled;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> EngineResult<()> {
        check_url("api_url", &self.api_url)?;
        check_url("credentials.auth_url", &self.credentials.auth_url)?;

        if self.credentials.client_id.is_empty() {
            return Err(Diagnostic::config("credentials.client_id cannot be empty").into());
        }

        if self.transport.timeout.is_zero() {
            return Err(Diagnostic::config("transport.timeout cannot be zero").into());
        }

        self.transport
            .retry
            .validate()
            .map_err(|msg| Diagnostic::config(msg).into())
    }
}

fn check_url(field: &str, url: &str) -> EngineResult<()> {
    if url.is_empty() {
        return Err(Diagnostic::config(format!("{field} cannot be empty")).into());
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(
            Diagnostic::config(format!("{field} must start with http:// or https://")).into(),
        );
    }
    Ok(())
}

fn missing_var(var: &str) -> gqlrun_core::Diagnostics {
    Diagnostic::new(
        ErrorCode::ConfigError,
        format!("Missing environment variable: {var}"),
    )
    .into()
}

fn parse_var<F, T>(lookup: &F, var: &str) -> EngineResult<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match lookup(var) {
        Some(raw) => raw.trim().parse().map(Some).map_err(|e| {
            Diagnostic::new(
                ErrorCode::ConfigParseError,
                format!("Invalid value for {var}: {e}"),
            )
            .into()
        }),
        None => Ok(None),
    }
}

fn parse_flag(raw: Option<&str>) -> bool {
    matches!(
        raw.map(str::to_lowercase).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

fn read_ca_bundle(path: &Path) -> EngineResult<String> {
    let path: PathBuf = shellexpand::tilde(&path.to_string_lossy())
        .into_owned()
        .into();
    std::fs::read_to_string(&path).map_err(|e| {
        Diagnostic::new(
            ErrorCode::ConfigError,
            format!("Failed to read CA bundle {}: {e}", path.display()),
        )
        .with_source(e)
        .into()
    })
}
