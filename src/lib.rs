//! # CodeNest (Session & Credential Lifecycle Client)
//!
//! `codenest` owns the client side of a CodeNest login: who the user is, the
//! access/refresh token pair that authorizes backend calls, transparent token
//! renewal when the access token expires, role-based route gating, and the
//! three-step password recovery flow.
//!
//! ## Layers
//!
//! - [`auth::store`]: durable credential store holding `user`, `accessToken` and
//!   `refreshToken`. The three keys are written and cleared together.
//! - [`api`]: JSON HTTP client. Every request reads the access token at send time
//!   and attaches it as `Authorization: Bearer`. A `401` triggers exactly one
//!   refresh-and-retry cycle through the [`api::refresh::RefreshCoordinator`].
//! - [`auth::state`]: observable [`auth::state::Session`] snapshot (user, loading
//!   flag, last error). Only the session manager and the refresh coordinator
//!   publish to it.
//! - [`auth::manager`]: login, register, logout and profile operations.
//! - [`auth::guards`]: route guard deciding between pending, redirect and allow.
//! - [`auth::recovery`]: forgot-password state machine (`request` -> `verify` ->
//!   `reset`).
//!
//! ## Token Refresh
//!
//! Refresh is single-flight: concurrent requests that fail with the same stale
//! access token share one call to `/token/refresh/`. A rejected refresh token is
//! fatal to the session: credentials are cleared, the session becomes anonymous
//! and the user is sent to the login view.
//!
//! Token material is held in [`secrecy::SecretString`] and must never be logged.

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
