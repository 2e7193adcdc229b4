//! Client configuration
//!
//! Every recognised option lives here with its default. Durations are stored
//! as whole seconds or milliseconds so the struct maps one-to-one onto TOML
//! and environment variables; accessors hand out [`Duration`]s.

use std::path::PathBuf;
use std::time::Duration;

use myinvois_common::observability::LoggingSettings;
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CACHE_TTL_SECS, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_RETRY_BASE_MS,
    DEFAULT_RETRY_CAP_MS, DEFAULT_RETRY_TIMES, DEFAULT_SCOPE, DEFAULT_TIMEOUT_SECS,
    DEFAULT_TOKEN_REFRESH_BUFFER_SECS, PRODUCTION_BASE_URL, SANDBOX_BASE_URL,
};
use crate::errors::{MyInvoisError, Result};
use crate::impl_domain_status_conversions;
use crate::types::{AuthMode, Credentials};

/// Target environment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Sandbox,
    Production,
}

impl_domain_status_conversions!(Environment {
    Sandbox => "sandbox",
    Production => "production",
});

impl Environment {
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Sandbox => SANDBOX_BASE_URL,
            Self::Production => PRODUCTION_BASE_URL,
        }
    }
}

/// Token lifecycle settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Upper bound on how long a token stays in the cache; the server's
    /// `expires_in` is used when unset or shorter
    pub token_ttl_secs: Option<u64>,
    /// Margin before expiry at which a token is treated as stale
    pub token_refresh_buffer_secs: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self { token_ttl_secs: None, token_refresh_buffer_secs: DEFAULT_TOKEN_REFRESH_BUFFER_SECS }
    }
}

impl AuthSettings {
    pub fn token_ttl(&self) -> Option<Duration> {
        self.token_ttl_secs.map(Duration::from_secs)
    }

    pub fn refresh_buffer(&self) -> Duration {
        Duration::from_secs(self.token_refresh_buffer_secs)
    }
}

/// Delay between retry attempts
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RetrySleep {
    /// `min(base * 2^attempt, cap)` plus jitter
    Exponential { base_ms: u64, cap_ms: u64 },
    /// Same delay every time, no jitter
    Fixed { ms: u64 },
    /// Delay computed from the zero-based retry number, no jitter
    #[serde(skip)]
    Callable(fn(u32) -> Duration),
}

impl Default for RetrySleep {
    fn default() -> Self {
        Self::Exponential { base_ms: DEFAULT_RETRY_BASE_MS, cap_ms: DEFAULT_RETRY_CAP_MS }
    }
}

/// Retry budget for transient failures
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Retries after the first attempt
    pub times: u32,
    pub sleep: RetrySleep,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { times: DEFAULT_RETRY_TIMES, sleep: RetrySleep::default() }
    }
}

/// Outbound HTTP settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub retry: RetrySettings,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            retry: RetrySettings::default(),
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Token cache backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "driver", rename_all = "lowercase")]
pub enum CacheStore {
    #[default]
    Memory,
    File { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub store: CacheStore,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { enabled: true, ttl_secs: DEFAULT_CACHE_TTL_SECS, store: CacheStore::Memory }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Complete client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub environment: Environment,
    /// Overrides the environment's resource host
    #[serde(default)]
    pub base_url: Option<String>,
    /// Overrides the identity host (defaults to the resource host)
    #[serde(default)]
    pub identity_url: Option<String>,
    pub credentials: Credentials,
    #[serde(default)]
    pub mode: AuthMode,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

fn default_user_agent() -> String {
    concat!("myinvois-rs/", env!("CARGO_PKG_VERSION")).to_string()
}

impl ClientConfig {
    /// Sandbox configuration with every other option at its default
    pub fn new(credentials: Credentials) -> Self {
        Self {
            environment: Environment::Sandbox,
            base_url: None,
            identity_url: None,
            credentials,
            mode: AuthMode::Direct,
            scope: default_scope(),
            auth: AuthSettings::default(),
            http: HttpSettings::default(),
            cache: CacheSettings::default(),
            logging: LoggingSettings::default(),
            user_agent: default_user_agent(),
        }
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_mode(mut self, mode: AuthMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_retry(mut self, times: u32, sleep: RetrySleep) -> Self {
        self.http.retry = RetrySettings { times, sleep };
        self
    }

    /// Resource host, without a trailing slash
    pub fn resolved_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.default_base_url())
            .trim_end_matches('/')
    }

    /// Identity host, without a trailing slash
    pub fn resolved_identity_url(&self) -> &str {
        match self.identity_url.as_deref() {
            Some(url) => url.trim_end_matches('/'),
            None => self.resolved_base_url(),
        }
    }

    /// Checked once when a client is built
    pub fn validate(&self) -> Result<()> {
        if self.credentials.client_id.trim().is_empty() {
            return Err(MyInvoisError::config("client_id must not be empty"));
        }
        if self.credentials.client_secret.trim().is_empty() {
            return Err(MyInvoisError::config("client_secret must not be empty"));
        }
        if self.scope.trim().is_empty() {
            return Err(MyInvoisError::config("scope must not be empty"));
        }

        for (name, value) in [
            ("base_url", Some(self.resolved_base_url())),
            ("identity_url", self.identity_url.as_deref()),
        ] {
            if let Some(value) = value {
                let parsed = url::Url::parse(value)
                    .map_err(|e| MyInvoisError::config(format!("{name} is not a valid URL: {e}")))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(MyInvoisError::config(format!("{name} must use http or https")));
                }
            }
        }

        if self.http.timeout_secs == 0 {
            return Err(MyInvoisError::config("http.timeout must be greater than zero"));
        }
        if self.http.connect_timeout_secs == 0 {
            return Err(MyInvoisError::config("http.connect_timeout must be greater than zero"));
        }
        if self.http.connect_timeout_secs > self.http.timeout_secs {
            return Err(MyInvoisError::config("http.connect_timeout must not exceed http.timeout"));
        }
        if let RetrySleep::Exponential { base_ms, cap_ms } = self.http.retry.sleep {
            if base_ms == 0 || cap_ms < base_ms {
                return Err(MyInvoisError::config(
                    "http.retry.sleep requires 0 < base_ms <= cap_ms",
                ));
            }
        }

        if self.auth.token_ttl_secs == Some(0) {
            return Err(MyInvoisError::config("auth.token_ttl must be greater than zero"));
        }
        if self.cache.enabled && self.cache.ttl_secs == 0 {
            return Err(MyInvoisError::config("cache.ttl must be greater than zero"));
        }
        if let CacheStore::File { path } = &self.cache.store {
            if path.as_os_str().is_empty() {
                return Err(MyInvoisError::config("cache.store.path must not be empty"));
            }
        }
        if self.logging.channel.trim().is_empty() {
            return Err(MyInvoisError::config("logging.channel must not be empty"));
        }
        Ok(())
    }
}
