//! Forgot-password flow: request a code, verify it, set a new password.
//!
//! The flow only advances on backend confirmation. `Reset` is reachable only
//! from a successful verification for the same username, and every failure
//! leaves the step unchanged. `back` returns to `Idle` from anywhere.

use crate::{
    api::{ApiClient, ApiError},
    auth::{
        client,
        navigation::{Navigator, Route},
        types::{ForgotPasswordRequest, ResetPasswordRequest, VerifyResetCodeRequest},
    },
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

pub const MIN_PASSWORD_LEN: usize = 6;
pub const RESET_NOTICE: &str =
    "Password reset successfully! Please login with your new password.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecoveryStep {
    Idle,
    Request,
    Verify { username: String },
    Reset { username: String, code: String },
}

impl RecoveryStep {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Request => "request",
            Self::Verify { .. } => "verify",
            Self::Reset { .. } => "reset",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RecoveryError {
    #[error("cannot {action} while at step {step}")]
    OutOfOrder {
        action: &'static str,
        step: &'static str,
    },
    #[error("{0}")]
    Invalid(String),
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    Transport(String),
}

impl RecoveryError {
    fn from_api(err: &ApiError, fallback: &str) -> Self {
        if matches!(err, ApiError::Network(_) | ApiError::Timeout(_)) {
            return Self::Transport(err.to_string());
        }
        Self::Rejected(
            err.backend_message()
                .map_or_else(|| fallback.to_string(), str::to_string),
        )
    }
}

pub struct PasswordRecovery {
    api: ApiClient,
    navigator: Arc<dyn Navigator>,
    step: RecoveryStep,
    error: Option<String>,
}

impl PasswordRecovery {
    #[must_use]
    pub fn new(api: ApiClient, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            api,
            navigator,
            step: RecoveryStep::Idle,
            error: None,
        }
    }

    #[must_use]
    pub fn step(&self) -> &RecoveryStep {
        &self.step
    }

    /// Message of the last failed submission at the current step.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Opens the flow at the request step.
    pub fn begin(&mut self) {
        self.error = None;
        self.step = RecoveryStep::Request;
    }

    pub fn back(&mut self) {
        self.error = None;
        self.step = RecoveryStep::Idle;
    }

    /// Asks the backend to email a reset code. Returns the backend notice.
    /// # Errors
    /// `OutOfOrder` outside the request step, otherwise the backend rejection.
    #[instrument(skip(self, email))]
    pub async fn submit_request(
        &mut self,
        username: &str,
        email: &str,
    ) -> Result<String, RecoveryError> {
        if self.step != RecoveryStep::Request {
            return Err(self.out_of_order("request a code"));
        }
        self.error = None;

        let username = username.trim().to_string();
        let request = ForgotPasswordRequest {
            username: username.clone(),
            email: email.trim().to_string(),
        };

        match client::forgot_password(&self.api, &request).await {
            Ok(message) => {
                info!("reset code requested");
                self.step = RecoveryStep::Verify { username };
                Ok(message)
            }
            Err(err) => Err(self.fail(&err, "Failed to send reset code")),
        }
    }

    /// Submits the emailed code. The code is trimmed and uppercased.
    /// # Errors
    /// `OutOfOrder` outside the verify step, `Invalid` for an empty code,
    /// otherwise the backend rejection.
    #[instrument(skip_all)]
    pub async fn submit_code(&mut self, code: &str) -> Result<(), RecoveryError> {
        let RecoveryStep::Verify { username } = &self.step else {
            return Err(self.out_of_order("verify a code"));
        };
        let username = username.clone();

        let code = code.trim().to_uppercase();
        if code.is_empty() {
            return Err(self.invalid("Please enter the reset code"));
        }
        self.error = None;

        let request = VerifyResetCodeRequest {
            username: username.clone(),
            code: code.clone(),
        };

        match client::verify_reset_code(&self.api, &request).await {
            Ok(()) => {
                self.step = RecoveryStep::Reset { username, code };
                Ok(())
            }
            Err(err) => Err(self.fail(&err, "Invalid reset code")),
        }
    }

    /// Sets the new password and, on success, sends the user to login with a
    /// notice.
    /// # Errors
    /// `OutOfOrder` outside the reset step, `Invalid` when the passwords are too
    /// short or differ, otherwise the backend rejection.
    #[instrument(skip_all)]
    pub async fn submit_new_password(
        &mut self,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<String, RecoveryError> {
        let RecoveryStep::Reset { username, code } = &self.step else {
            return Err(self.out_of_order("reset the password"));
        };
        let request = ResetPasswordRequest {
            username: username.clone(),
            code: code.clone(),
            new_password: new_password.to_string(),
            confirm_password: confirm_password.to_string(),
        };

        if new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(self.invalid(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters long"
            )));
        }
        if new_password != confirm_password {
            return Err(self.invalid("Passwords do not match"));
        }
        self.error = None;

        match client::reset_password(&self.api, &request).await {
            Ok(message) => {
                info!("password reset");
                self.step = RecoveryStep::Idle;
                self.navigator.navigate(Route::Login {
                    notice: Some(RESET_NOTICE.to_string()),
                });
                Ok(message)
            }
            Err(err) => Err(self.fail(&err, "Failed to reset password")),
        }
    }

    fn out_of_order(&self, action: &'static str) -> RecoveryError {
        RecoveryError::OutOfOrder {
            action,
            step: self.step.name(),
        }
    }

    fn invalid(&mut self, message: impl Into<String>) -> RecoveryError {
        let message = message.into();
        self.error = Some(message.clone());
        RecoveryError::Invalid(message)
    }

    fn fail(&mut self, err: &ApiError, fallback: &str) -> RecoveryError {
        warn!(step = self.step.name(), status = ?err.status(), "recovery step failed");
        let failure = RecoveryError::from_api(err, fallback);
        self.error = Some(failure.to_string());
        failure
    }
}
