//! Session manager: login, registration, logout and profile operations.
//!
//! Each operation raises the session's loading flag for its duration and clears
//! the previous error on entry. Failures are normalized into [`AuthFailure`] so
//! callers render one shape regardless of how the backend phrased the error.
//! Logout never fails: the local session is cleared even if the backend call
//! errors or the logout future is dropped midway.

use crate::{
    api::{ApiClient, ApiError, ErrorBody, FieldErrors},
    auth::{
        client,
        navigation::Navigator,
        state::{Session, SessionState},
        store::CredentialStore,
        types::{LoginRequest, RegisterRequest, User, UserUpdate},
    },
    config::AppConfig,
};
use secrecy::ExposeSecret;
use std::{fmt, sync::Arc};
use tracing::{error, info, instrument, warn};

const FIELD_ERRORS_MESSAGE: &str = "Please correct the errors below";

/// Failed manager operation: a general message plus optional per-field messages.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthFailure {
    pub error: String,
    pub field_errors: FieldErrors,
}

impl AuthFailure {
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            field_errors: FieldErrors::new(),
        }
    }

    /// Normalizes an API error, using `fallback` when the backend gave no message.
    #[must_use]
    pub fn from_api(err: &ApiError, fallback: &str) -> Self {
        match err {
            ApiError::Http {
                body: ErrorBody::General(message),
                ..
            } => Self::new(message.clone()),
            ApiError::Http {
                body: ErrorBody::Fields(fields),
                ..
            } => Self {
                error: FIELD_ERRORS_MESSAGE.to_string(),
                field_errors: fields.clone(),
            },
            ApiError::Network(_) | ApiError::Timeout(_) => Self::new(err.to_string()),
            _ => Self::new(fallback),
        }
    }

    #[must_use]
    pub fn has_field_errors(&self) -> bool {
        !self.field_errors.is_empty()
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.error)?;
        for (field, message) in &self.field_errors {
            write!(formatter, "\n  {field}: {message}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AuthFailure {}

/// Successful registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    pub user: User,
    /// Notice about the verification email, when the backend sent one.
    pub email_message: Option<String>,
}

#[derive(Clone)]
pub struct SessionManager {
    api: ApiClient,
    state: SessionState,
}

impl SessionManager {
    #[must_use]
    pub fn new(api: ApiClient, state: SessionState) -> Self {
        Self { api, state }
    }

    /// Hydrates the session from `store` and wires the client, refresh
    /// coordinator and manager around it.
    /// # Errors
    /// Returns `ApiError::Config` if the HTTP client cannot be built.
    pub fn connect(
        config: &AppConfig,
        store: CredentialStore,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ApiError> {
        let state = SessionState::hydrate(&store);
        let api = ApiClient::new(config, store, state.clone(), navigator)?;
        Ok(Self::new(api, state))
    }

    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub fn session(&self) -> Session {
        self.state.snapshot()
    }

    /// Logs in and then replaces the login snapshot with the full profile. A
    /// failed profile fetch is logged and does not fail the login.
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<User, AuthFailure> {
        let _loading = self.state.begin();

        let request = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };

        let response = match client::login(&self.api, &request).await {
            Ok(response) => response,
            Err(err) => return Err(self.fail(&err, "Login failed")),
        };

        if let Err(err) = self.api.store().save_login(&response.user, &response.tokens) {
            error!("Failed to store credentials: {err}");
            return Err(self.fail_with(AuthFailure::new(format!(
                "Could not store credentials: {err}"
            ))));
        }
        self.state.set_user(Some(response.user.clone()));
        info!(role = %response.user.role, "login succeeded");

        match client::fetch_profile(&self.api).await {
            Ok(profile) => {
                self.store_user(profile);
            }
            Err(err) => warn!("Could not fetch fresh profile data: {err}"),
        }

        Ok(self.state.snapshot().user.unwrap_or(response.user))
    }

    /// Registers and signs the new user in.
    #[instrument(skip_all, fields(username = %fields.username, role = %fields.role))]
    pub async fn register(&self, fields: RegisterRequest) -> Result<Registration, AuthFailure> {
        let _loading = self.state.begin();

        let response = match client::register(&self.api, &fields).await {
            Ok(response) => response,
            Err(err) => {
                warn!(status = ?err.status(), "registration failed");
                return Err(self.fail(&err, "Registration failed. Please try again."));
            }
        };

        if let Err(err) = self.api.store().save_login(&response.user, &response.tokens) {
            error!("Failed to store credentials: {err}");
            return Err(self.fail_with(AuthFailure::new(format!(
                "Could not store credentials: {err}"
            ))));
        }
        self.state.set_user(Some(response.user.clone()));
        info!("registration succeeded");

        Ok(Registration {
            user: response.user,
            email_message: response.email_message,
        })
    }

    /// Ends the session. The backend is asked to invalidate the refresh token on
    /// a best-effort basis; local state is cleared unconditionally.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        let _loading = self.state.begin();
        let _clear = ClearOnDrop {
            store: self.api.store(),
            state: &self.state,
        };

        let refresh_token = self
            .api
            .store()
            .refresh_token()
            .map(|token| token.expose_secret().to_string());

        if let Err(err) = client::logout(&self.api, refresh_token).await {
            warn!("Logout error: {err}");
        }
    }

    /// Merges `update` into the current user and persists the snapshot. Tokens
    /// are untouched. Returns `None` when nobody is signed in.
    pub fn update_user(&self, update: UserUpdate) -> Option<User> {
        let mut user = self.state.snapshot().user?;
        user.merge(update);
        self.store_user(user)
    }

    /// Reloads the profile from the backend.
    #[instrument(skip(self))]
    pub async fn refresh_profile(&self) -> Result<User, AuthFailure> {
        let _loading = self.state.begin();

        match client::fetch_profile(&self.api).await {
            Ok(profile) => self
                .store_user(profile)
                .ok_or_else(|| self.fail_with(AuthFailure::new("Not signed in"))),
            Err(err) => Err(self.fail(&err, "Could not load profile")),
        }
    }

    /// Saves profile edits on the backend and adopts the returned user.
    #[instrument(skip_all)]
    pub async fn update_profile(&self, update: &UserUpdate) -> Result<User, AuthFailure> {
        let _loading = self.state.begin();

        match client::update_profile(&self.api, update).await {
            Ok(profile) => self
                .store_user(profile)
                .ok_or_else(|| self.fail_with(AuthFailure::new("Not signed in"))),
            Err(err) => Err(self.fail(&err, "Profile update failed")),
        }
    }

    /// Asks the backend to send the verification email again.
    #[instrument(skip(self))]
    pub async fn resend_verification(&self) -> Result<String, AuthFailure> {
        client::resend_verification(&self.api)
            .await
            .map_err(|err| AuthFailure::from_api(&err, "Failed to send verification email"))
    }

    /// Persists `user` and publishes it, unless the session ended meanwhile.
    fn store_user(&self, user: User) -> Option<User> {
        match self.api.store().update_user(&user) {
            Ok(true) => {
                self.state.set_user(Some(user.clone()));
                Some(user)
            }
            Ok(false) => None,
            Err(err) => {
                error!("Failed to store user snapshot: {err}");
                None
            }
        }
    }

    fn fail(&self, err: &ApiError, fallback: &str) -> AuthFailure {
        self.fail_with(AuthFailure::from_api(err, fallback))
    }

    fn fail_with(&self, failure: AuthFailure) -> AuthFailure {
        self.state.set_error(failure.error.clone());
        failure
    }
}

/// Clears credentials and session when dropped, including on cancellation.
struct ClearOnDrop<'a> {
    store: &'a CredentialStore,
    state: &'a SessionState,
}

impl Drop for ClearOnDrop<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.store.clear() {
            error!("Failed to clear stored credentials: {err}");
        }
        self.state.clear();
    }
}
