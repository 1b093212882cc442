//! Client configuration for the backend base URL, request timeout and credential
//! persistence. Values come from CLI flags or environment variables; empty values
//! fall back to defaults. Configuration values are public; do not store secrets here.

use crate::APP_USER_AGENT;
use anyhow::{anyhow, Result};
use std::{path::PathBuf, time::Duration};
use url::Url;

/// Local development backend.
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000/api";
/// Default request timeout (seconds) applied to every backend call.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
/// Credential file name inside the per-user config directory.
pub const CREDENTIALS_FILE: &str = "credentials.json";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api_base_url: String,
    pub request_timeout: Duration,
    /// `None` keeps credentials in memory for the lifetime of the process.
    pub credentials_path: Option<PathBuf>,
    pub user_agent: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            credentials_path: None,
            user_agent: APP_USER_AGENT.to_string(),
        }
    }
}

impl AppConfig {
    /// Builds a config for `api_base_url`, keeping defaults for everything else.
    /// # Errors
    /// Returns an error if the URL does not parse or is not http(s).
    pub fn new(api_base_url: &str) -> Result<Self> {
        let mut config = Self::default();
        config.apply_overrides(Overrides {
            api_base_url: normalize_value(api_base_url),
            ..Overrides::default()
        })?;
        Ok(config)
    }

    /// Applies non-empty overrides and validates the resulting base URL.
    /// # Errors
    /// Returns an error if the overridden base URL is invalid.
    pub fn apply_overrides(&mut self, overrides: Overrides) -> Result<()> {
        if let Some(value) = overrides.api_base_url {
            self.api_base_url = value;
        }
        if let Some(secs) = overrides.timeout_secs {
            if secs > 0 {
                self.request_timeout = Duration::from_secs(secs);
            }
        }
        if let Some(path) = overrides.credentials_path {
            self.credentials_path = Some(PathBuf::from(path));
        }

        validate_base_url(&self.api_base_url)
    }
}

/// Optional values layered over the defaults, typically from CLI flags.
#[derive(Default, Debug)]
pub struct Overrides {
    pub api_base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub credentials_path: Option<String>,
}

/// Per-user credential file: `$XDG_CONFIG_HOME/codenest/credentials.json`, or
/// `$HOME/.config/codenest/credentials.json`. `None` when neither is set.
#[must_use]
pub fn default_credentials_path() -> Option<PathBuf> {
    let config_dir = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var_os("HOME")
                .filter(|home| !home.is_empty())
                .map(|home| PathBuf::from(home).join(".config"))
        })?;

    Some(config_dir.join(env!("CARGO_PKG_NAME")).join(CREDENTIALS_FILE))
}

/// Trims a configuration value and treats blank input as absent.
#[must_use]
pub fn normalize_value(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn validate_base_url(raw: &str) -> Result<()> {
    let url = Url::parse(raw).map_err(|err| anyhow!("invalid API base URL {raw}: {err}"))?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(anyhow!("invalid API base URL: unsupported scheme {scheme}")),
    }

    if url.host().is_none() {
        return Err(anyhow!("invalid API base URL: no host specified"));
    }

    Ok(())
}
