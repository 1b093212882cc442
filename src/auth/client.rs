//! Client wrappers for the auth endpoints. These keep paths and payload shapes in
//! one place so the manager and the recovery flow never build requests by hand.
//! Payloads carry passwords and tokens and must never be logged.

use crate::{
    api::{ApiClient, ApiError},
    auth::types::{
        ForgotPasswordRequest, LoginRequest, LoginResponse, LogoutRequest, MessageResponse,
        ProfileResponse, RegisterRequest, RegisterResponse, ResetPasswordRequest, User,
        UserUpdate, VerifyResetCodeRequest,
    },
};

pub const REGISTER_PATH: &str = "/auth/register/";
pub const LOGIN_PATH: &str = "/auth/login/";
pub const LOGOUT_PATH: &str = "/auth/logout/";
pub const PROFILE_PATH: &str = "/auth/profile/";
pub const RESEND_VERIFICATION_PATH: &str = "/auth/resend-verification/";
pub const FORGOT_PASSWORD_PATH: &str = "/auth/forgot-password/";
pub const VERIFY_RESET_CODE_PATH: &str = "/auth/verify-reset-code/";
pub const RESET_PASSWORD_PATH: &str = "/auth/reset-password/";

/// Exchanges username and password for a user snapshot and token pair.
pub async fn login(api: &ApiClient, request: &LoginRequest) -> Result<LoginResponse, ApiError> {
    api.post_json(LOGIN_PATH, request).await
}

/// Creates an account; the answer has the same shape as a login plus an
/// optional verification-email notice.
pub async fn register(
    api: &ApiClient,
    request: &RegisterRequest,
) -> Result<RegisterResponse, ApiError> {
    api.post_json(REGISTER_PATH, request).await
}

/// Asks the backend to invalidate `refresh_token`.
pub async fn logout(api: &ApiClient, refresh_token: Option<String>) -> Result<(), ApiError> {
    api.post_json_empty(LOGOUT_PATH, &LogoutRequest { refresh_token })
        .await
}

pub async fn fetch_profile(api: &ApiClient) -> Result<User, ApiError> {
    let response: ProfileResponse = api.get_json(PROFILE_PATH).await?;
    Ok(response.user)
}

pub async fn update_profile(api: &ApiClient, update: &UserUpdate) -> Result<User, ApiError> {
    let response: ProfileResponse = api.put_json(PROFILE_PATH, update).await?;
    Ok(response.user)
}

pub async fn resend_verification(api: &ApiClient) -> Result<String, ApiError> {
    let response: MessageResponse = api.post_empty(RESEND_VERIFICATION_PATH).await?;
    Ok(response.message)
}

/// Requests a reset code by email. Returns the backend notice.
pub async fn forgot_password(
    api: &ApiClient,
    request: &ForgotPasswordRequest,
) -> Result<String, ApiError> {
    let response: MessageResponse = api.post_json(FORGOT_PASSWORD_PATH, request).await?;
    Ok(response.message)
}

/// Succeeds only if the backend accepts the code for the username.
pub async fn verify_reset_code(
    api: &ApiClient,
    request: &VerifyResetCodeRequest,
) -> Result<(), ApiError> {
    api.post_json_empty(VERIFY_RESET_CODE_PATH, request).await
}

pub async fn reset_password(
    api: &ApiClient,
    request: &ResetPasswordRequest,
) -> Result<String, ApiError> {
    let response: MessageResponse = api.post_json(RESET_PASSWORD_PATH, request).await?;
    Ok(response.message)
}
