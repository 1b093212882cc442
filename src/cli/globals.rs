use crate::{
    auth::{CredentialStore, FileCredentials, SessionManager, TracingNavigator},
    config::{self, AppConfig, Overrides},
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct GlobalArgs {
    pub api_url: String,
    pub credentials: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(api_url: String) -> Self {
        Self {
            api_url,
            ..Self::default()
        }
    }

    /// Builds the config. Without `--credentials` the session is persisted in
    /// the per-user credential file so it survives between invocations.
    /// # Errors
    /// Returns an error if the base URL is invalid.
    pub fn config(&self) -> Result<AppConfig> {
        let mut app_config = AppConfig::default();
        app_config.apply_overrides(Overrides {
            api_base_url: config::normalize_value(&self.api_url),
            timeout_secs: self.timeout_secs,
            credentials_path: self
                .credentials
                .as_deref()
                .and_then(config::normalize_value),
        })?;
        if app_config.credentials_path.is_none() {
            app_config.credentials_path = config::default_credentials_path();
        }
        Ok(app_config)
    }

    /// Opens the configured credential store and wires a session manager to it.
    /// # Errors
    /// Returns an error if the config is invalid or the credential file cannot be read.
    pub fn connect(&self) -> Result<SessionManager> {
        let config = self.config()?;

        let store = match &config.credentials_path {
            Some(path) => {
                debug!(path = %path.display(), "using credential file");
                CredentialStore::open(Arc::new(FileCredentials::new(path.clone())))
                    .with_context(|| format!("failed to open {}", path.display()))?
            }
            None => {
                debug!("no credential file location, keeping credentials in memory");
                CredentialStore::in_memory()
            }
        };

        Ok(SessionManager::connect(
            &config,
            store,
            Arc::new(TracingNavigator),
        )?)
    }
}
