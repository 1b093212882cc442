//! Single-flight access token refresh.
//!
//! Requests that fail with `401` hand the access token they were sent with to
//! [`RefreshCoordinator::refresh`]. Episodes are serialized behind an async lock,
//! and a caller that acquires it after another caller already replaced that token
//! reuses the stored token instead of calling the backend again. At most one
//! `/token/refresh/` call is in flight at any time.
//!
//! A refresh token the backend rejects (4xx) ends the session: credentials are
//! cleared, the session becomes anonymous and the user is sent to the login view.
//! Transport failures and 5xx answers leave the session untouched. Results are
//! only applied while the refresh token that was sent is still stored, so a
//! logout or a new login during the call is never overwritten or cleared.

use super::{
    client::{ApiRequest, Transport},
    errors::ApiError,
};
use crate::auth::{
    navigation::{Navigator, Route},
    state::SessionState,
    store::CredentialStore,
    types::{RefreshRequest, RefreshResponse},
};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, instrument, warn};

pub const REFRESH_PATH: &str = "/token/refresh/";

#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<RefreshInner>,
}

struct RefreshInner {
    transport: Transport,
    store: CredentialStore,
    state: SessionState,
    navigator: Arc<dyn Navigator>,
    episode: Mutex<()>,
}

impl RefreshCoordinator {
    pub(crate) fn new(
        transport: Transport,
        store: CredentialStore,
        state: SessionState,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            inner: Arc::new(RefreshInner {
                transport,
                store,
                state,
                navigator,
                episode: Mutex::new(()),
            }),
        }
    }

    /// Returns an access token newer than `stale`, calling the backend only if no
    /// other caller has already replaced it.
    /// # Errors
    /// - `NoRefreshToken` when nothing is stored to refresh with.
    /// - `SessionExpired` when the backend rejected the refresh token, or the
    ///   session ended while this caller waited.
    /// - transport and 5xx errors from the refresh call, with the session kept.
    #[instrument(skip_all)]
    pub async fn refresh(&self, stale: Option<&SecretString>) -> Result<SecretString, ApiError> {
        let _episode = self.inner.episode.lock().await;

        match (self.inner.store.access_token(), stale) {
            (Some(current), Some(stale)) if current.expose_secret() != stale.expose_secret() => {
                debug!("access token already refreshed by a concurrent request");
                return Ok(current);
            }
            (Some(current), None) => return Ok(current),
            (None, Some(_)) => return Err(ApiError::SessionExpired),
            _ => {}
        }

        let Some(refresh_token) = self.inner.store.refresh_token() else {
            if self.inner.state.is_authenticated() {
                self.end_session("no refresh token stored");
            }
            return Err(ApiError::NoRefreshToken);
        };

        let request = ApiRequest::post(REFRESH_PATH).json(&RefreshRequest {
            refresh: refresh_token.expose_secret(),
        })?;
        let response = self.inner.transport.dispatch(&request, None).await?;

        match response.status {
            200..=299 => {
                let refreshed: RefreshResponse = response.json()?;
                let written = self.inner.store.update_tokens(
                    &refresh_token,
                    &refreshed.access,
                    refreshed.refresh.as_ref(),
                )?;
                if !written {
                    debug!("session changed while refreshing, dropping new token");
                    return Err(ApiError::SessionExpired);
                }
                debug!("access token refreshed");
                Ok(refreshed.access)
            }
            400..=499 => {
                if self.inner.store.clear_if_refresh(&refresh_token)? {
                    self.forget_session("refresh token rejected");
                } else {
                    debug!("refresh token rejected after the session changed, keeping store");
                }
                Err(ApiError::SessionExpired)
            }
            status => Err(ApiError::from_response(status, &response.body)),
        }
    }

    fn end_session(&self, reason: &str) {
        if let Err(err) = self.inner.store.clear() {
            error!("Failed to clear stored credentials: {err}");
        }
        self.forget_session(reason);
    }

    /// Drops the published user and sends the user to login. The store must
    /// already be cleared.
    fn forget_session(&self, reason: &str) {
        warn!("{reason}, ending session");
        self.inner.state.clear();
        self.inner.navigator.navigate(Route::login());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::types::{Role, TokenPair, User},
        config::AppConfig,
    };
    use anyhow::{anyhow, Result};
    use serde_json::json;
    use std::{net::TcpListener, sync::Mutex as StdMutex, time::Duration};
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    #[derive(Default)]
    struct Recorder(StdMutex<Vec<Route>>);

    impl Recorder {
        fn routes(&self) -> Vec<Route> {
            self.0.lock().map(|routes| routes.clone()).unwrap_or_default()
        }
    }

    impl Navigator for Recorder {
        fn navigate(&self, route: Route) {
            if let Ok(mut routes) = self.0.lock() {
                routes.push(route);
            }
        }
    }

    fn user() -> User {
        User {
            id: 1,
            username: "alice".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            role: Role::Student,
            email_verified: false,
        }
    }

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    struct Fixture {
        coordinator: RefreshCoordinator,
        store: CredentialStore,
        state: SessionState,
        navigator: Arc<Recorder>,
    }

    fn fixture(server: &MockServer, signed_in: bool) -> Result<Fixture> {
        let store = CredentialStore::in_memory();
        if signed_in {
            store.save_login(
                &user(),
                &TokenPair {
                    access: secret("A1"),
                    refresh: secret("R1"),
                },
            )?;
        }
        let state = SessionState::hydrate(&store);
        let navigator = Arc::new(Recorder::default());
        let transport = Transport::new(&AppConfig::new(&server.uri())?)?;
        let coordinator =
            RefreshCoordinator::new(transport, store.clone(), state.clone(), navigator.clone());
        Ok(Fixture {
            coordinator,
            store,
            state,
            navigator,
        })
    }

    #[tokio::test]
    async fn refresh_stores_new_access_token() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .and(body_json(json!({"refresh": "R1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "A2"})))
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture(&server, true)?;
        let token = fx.coordinator.refresh(Some(&secret("A1"))).await?;

        assert_eq!(token.expose_secret(), "A2");
        assert_eq!(
            fx.store.access_token().map(|t| t.expose_secret().to_string()),
            Some("A2".to_string())
        );
        assert_eq!(
            fx.store.refresh_token().map(|t| t.expose_secret().to_string()),
            Some("R1".to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access": "A2"}))
                    .set_delay(Duration::from_millis(100)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture(&server, true)?;
        let stale = secret("A1");
        let (first, second, third) = tokio::join!(
            fx.coordinator.refresh(Some(&stale)),
            fx.coordinator.refresh(Some(&stale)),
            fx.coordinator.refresh(Some(&stale)),
        );

        for token in [first?, second?, third?] {
            assert_eq!(token.expose_secret(), "A2");
        }
        Ok(())
    }

    #[tokio::test]
    async fn rejected_refresh_ends_session() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"detail": "Token is blacklisted"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture(&server, true)?;
        let err = fx
            .coordinator
            .refresh(Some(&secret("A1")))
            .await
            .err()
            .ok_or_else(|| anyhow!("expected error"))?;

        assert!(matches!(err, ApiError::SessionExpired));
        assert!(fx.store.is_empty());
        assert!(!fx.state.is_authenticated());
        assert_eq!(fx.navigator.routes(), vec![Route::login()]);

        // A waiter from the same episode must not call the backend again.
        let again = fx.coordinator.refresh(Some(&secret("A1"))).await;
        assert!(matches!(again, Err(ApiError::SessionExpired)));
        Ok(())
    }

    #[tokio::test]
    async fn server_errors_keep_session() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fx = fixture(&server, true)?;
        let err = fx
            .coordinator
            .refresh(Some(&secret("A1")))
            .await
            .err()
            .ok_or_else(|| anyhow!("expected error"))?;

        assert!(err.is_transient());
        assert!(!fx.store.is_empty());
        assert!(fx.state.is_authenticated());
        assert!(fx.navigator.routes().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn missing_refresh_token_fails_immediately() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "A2"})))
            .expect(0)
            .mount(&server)
            .await;

        let fx = fixture(&server, false)?;
        let result = fx.coordinator.refresh(None).await;
        assert!(matches!(result, Err(ApiError::NoRefreshToken)));
        Ok(())
    }

    #[tokio::test]
    async fn rotated_refresh_token_is_stored_with_access_token() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"access": "A2", "refresh": "R2"})),
            )
            .mount(&server)
            .await;

        let fx = fixture(&server, true)?;
        fx.coordinator.refresh(Some(&secret("A1"))).await?;

        assert_eq!(
            fx.store.refresh_token().map(|t| t.expose_secret().to_string()),
            Some("R2".to_string())
        );
        assert!(fx.store.is_consistent());
        Ok(())
    }

    fn bob() -> User {
        User {
            id: 2,
            username: "bob".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            role: Role::Faculty,
            email_verified: false,
        }
    }

    /// Replaces alice's session with bob's while the refresh call is pending.
    async fn relogin_as_bob(store: &CredentialStore, state: &SessionState) -> Result<()> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        store.clear()?;
        state.clear();
        store.save_login(
            &bob(),
            &TokenPair {
                access: secret("B1"),
                refresh: secret("RB"),
            },
        )?;
        state.set_user(Some(bob()));
        Ok(())
    }

    #[tokio::test]
    async fn late_refresh_does_not_overwrite_new_login() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .and(body_json(json!({"refresh": "R1"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access": "A2"}))
                    .set_delay(Duration::from_millis(300)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture(&server, true)?;
        let stale = secret("A1");
        let (refreshed, relogin) = tokio::join!(
            fx.coordinator.refresh(Some(&stale)),
            relogin_as_bob(&fx.store, &fx.state),
        );
        relogin?;

        assert!(matches!(refreshed, Err(ApiError::SessionExpired)));
        assert_eq!(fx.store.user().map(|user| user.username), Some("bob".to_string()));
        assert_eq!(
            fx.store.access_token().map(|t| t.expose_secret().to_string()),
            Some("B1".to_string())
        );
        assert_eq!(
            fx.store.refresh_token().map(|t| t.expose_secret().to_string()),
            Some("RB".to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn late_rejection_keeps_new_login() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(300)))
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture(&server, true)?;
        let stale = secret("A1");
        let (refreshed, relogin) = tokio::join!(
            fx.coordinator.refresh(Some(&stale)),
            relogin_as_bob(&fx.store, &fx.state),
        );
        relogin?;

        assert!(matches!(refreshed, Err(ApiError::SessionExpired)));
        assert!(!fx.store.is_empty());
        assert_eq!(fx.store.user().map(|user| user.username), Some("bob".to_string()));
        assert!(fx.state.is_authenticated());
        assert!(fx.navigator.routes().is_empty());
        Ok(())
    }
}
