//! Configuration loader
//!
//! Loads [`ClientConfig`] from environment variables or files. Every loaded
//! configuration is validated before it is returned.
//!
//! ## Loading Strategy
//! 0. Reads `.env` from the working directory, if present; variables already
//!    set in the process environment win
//! 1. First, attempts to load from environment variables
//! 2. If the credentials are not in the environment, falls back to a file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! Required:
//! - `MYINVOIS_CLIENT_ID`, `MYINVOIS_CLIENT_SECRET`
//!
//! Optional:
//! - `MYINVOIS_ENVIRONMENT`: `sandbox` or `production`
//! - `MYINVOIS_BASE_URL`, `MYINVOIS_IDENTITY_URL`: host overrides
//! - `MYINVOIS_MODE`: `direct` or `intermediary`
//! - `MYINVOIS_SCOPE`
//! - `MYINVOIS_TOKEN_TTL`, `MYINVOIS_TOKEN_REFRESH_BUFFER`: seconds
//! - `MYINVOIS_HTTP_TIMEOUT`, `MYINVOIS_HTTP_CONNECT_TIMEOUT`: seconds
//! - `MYINVOIS_RETRY_TIMES`
//! - `MYINVOIS_RETRY_SLEEP_MS`: fixed delay between retries
//! - `MYINVOIS_CACHE_ENABLED`, `MYINVOIS_CACHE_TTL` (seconds)
//! - `MYINVOIS_CACHE_PATH`: use the file cache in this directory
//! - `MYINVOIS_LOGGING_ENABLED`, `MYINVOIS_LOG_CHANNEL`
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./myinvois.toml` or `./myinvois.json` (current working directory)
//! 2. `./config/myinvois.toml` or `./config/myinvois.json`
//! 3. The same names next to the executable

use std::path::{Path, PathBuf};
use std::str::FromStr;

use myinvois_domain::{
    AuthMode, CacheStore, ClientConfig, Credentials, Environment, MyInvoisError, Result,
    RetrySleep,
};

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `MyInvoisError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
/// - The loaded configuration fails validation
pub fn load() -> Result<ClientConfig> {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env file"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "Failed to read .env file"),
    }

    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from `MYINVOIS_*` environment variables
///
/// # Errors
/// Returns `MyInvoisError::Config` if the credentials are missing or a
/// variable has an invalid value.
pub fn load_from_env() -> Result<ClientConfig> {
    let credentials =
        Credentials::new(env_var("MYINVOIS_CLIENT_ID")?, env_var("MYINVOIS_CLIENT_SECRET")?);
    let mut config = ClientConfig::new(credentials);

    if let Some(environment) = env_parsed::<Environment>("MYINVOIS_ENVIRONMENT")? {
        config.environment = environment;
    }
    config.base_url = env_opt("MYINVOIS_BASE_URL");
    config.identity_url = env_opt("MYINVOIS_IDENTITY_URL");
    if let Some(mode) = env_parsed::<AuthMode>("MYINVOIS_MODE")? {
        config.mode = mode;
    }
    if let Some(scope) = env_opt("MYINVOIS_SCOPE") {
        config.scope = scope;
    }

    config.auth.token_ttl_secs = env_parsed("MYINVOIS_TOKEN_TTL")?;
    if let Some(buffer) = env_parsed("MYINVOIS_TOKEN_REFRESH_BUFFER")? {
        config.auth.token_refresh_buffer_secs = buffer;
    }

    if let Some(timeout) = env_parsed("MYINVOIS_HTTP_TIMEOUT")? {
        config.http.timeout_secs = timeout;
    }
    if let Some(timeout) = env_parsed("MYINVOIS_HTTP_CONNECT_TIMEOUT")? {
        config.http.connect_timeout_secs = timeout;
    }
    if let Some(times) = env_parsed("MYINVOIS_RETRY_TIMES")? {
        config.http.retry.times = times;
    }
    if let Some(ms) = env_parsed("MYINVOIS_RETRY_SLEEP_MS")? {
        config.http.retry.sleep = RetrySleep::Fixed { ms };
    }

    config.cache.enabled = env_bool("MYINVOIS_CACHE_ENABLED", config.cache.enabled);
    if let Some(ttl) = env_parsed("MYINVOIS_CACHE_TTL")? {
        config.cache.ttl_secs = ttl;
    }
    if let Some(path) = env_opt("MYINVOIS_CACHE_PATH") {
        config.cache.store = CacheStore::File { path: PathBuf::from(path) };
    }

    config.logging.enabled = env_bool("MYINVOIS_LOGGING_ENABLED", config.logging.enabled);
    if let Some(channel) = env_opt("MYINVOIS_LOG_CHANNEL") {
        config.logging.channel = channel;
    }

    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations. Format is detected by
/// file extension.
///
/// # Errors
/// Returns `MyInvoisError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - The configuration fails validation
pub fn load_from_file(path: Option<PathBuf>) -> Result<ClientConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(MyInvoisError::config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            MyInvoisError::config("No config file found in any of the standard locations")
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| MyInvoisError::config(format!("Failed to read config file: {e}")))?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

fn parse_config(contents: &str, path: &Path) -> Result<ClientConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| MyInvoisError::config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| MyInvoisError::config(format!("Invalid JSON format: {e}"))),
        _ => Err(MyInvoisError::config(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing config file in the standard locations
pub fn probe_config_paths() -> Option<PathBuf> {
    const NAMES: [&str; 4] =
        ["myinvois.toml", "myinvois.json", "config/myinvois.toml", "config/myinvois.json"];

    let mut roots = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd);
    }
    if let Some(exe_dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf)) {
        roots.push(exe_dir);
    }

    roots
        .iter()
        .flat_map(|root| NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.exists())
}

fn env_var(key: &str) -> Result<String> {
    env_opt(key)
        .ok_or_else(|| MyInvoisError::config(format!("Missing required environment variable: {key}")))
}

/// Set and non-blank
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parsed<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| MyInvoisError::config(format!("Invalid value for {key}: {e}")))
        })
        .transpose()
}

/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
