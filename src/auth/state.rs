//! Observable session state. The state is hydrated once from the credential store
//! and then only changed by the session manager and the refresh coordinator;
//! everything else reads snapshots or subscribes to changes. Only non-sensitive
//! metadata lives here; tokens stay in the credential store.

use crate::auth::{
    store::CredentialStore,
    types::{Role, User},
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::sync::watch;

/// The client's current belief about who is logged in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Session {
    pub user: Option<User>,
    /// True while at least one login/register/logout/profile request is outstanding.
    pub is_loading: bool,
    /// Message of the last failed manager operation, cleared when the next one starts.
    pub error: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthPhase {
    Anonymous,
    Authenticating,
    Authenticated,
}

impl Session {
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn authenticated(user: User) -> Self {
        Self {
            user: Some(user),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn loading(mut self, is_loading: bool) -> Self {
        self.is_loading = is_loading;
        self
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.user.as_ref().map(|user| user.role)
    }

    #[must_use]
    pub fn is_faculty(&self) -> bool {
        self.role() == Some(Role::Faculty)
    }

    #[must_use]
    pub fn is_student(&self) -> bool {
        self.role() == Some(Role::Student)
    }

    #[must_use]
    pub fn phase(&self) -> AuthPhase {
        match (&self.user, self.is_loading) {
            (Some(_), _) => AuthPhase::Authenticated,
            (None, true) => AuthPhase::Authenticating,
            (None, false) => AuthPhase::Anonymous,
        }
    }
}

/// Shared session handle. Cloning is cheap; all clones publish to the same
/// subscribers.
#[derive(Clone)]
pub struct SessionState {
    inner: Arc<StateInner>,
}

struct StateInner {
    sender: watch::Sender<Session>,
    pending: AtomicUsize,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(Session::anonymous())
    }
}

impl SessionState {
    #[must_use]
    pub fn new(initial: Session) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            inner: Arc::new(StateInner {
                sender,
                pending: AtomicUsize::new(0),
            }),
        }
    }

    /// Builds the initial state from the persisted user snapshot. Token validity
    /// is not checked here; an expired access token is handled by the refresh flow.
    #[must_use]
    pub fn hydrate(store: &CredentialStore) -> Self {
        match store.user() {
            Some(user) if store.access_token().is_some() => Self::new(Session::authenticated(user)),
            _ => Self::default(),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.inner.sender.borrow().clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.sender.borrow().is_authenticated()
    }

    /// Receiver that observes every published change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.sender.subscribe()
    }

    /// Clears the previous error and marks an operation as outstanding until the
    /// returned guard drops.
    pub(crate) fn begin(&self) -> LoadingGuard {
        self.inner.sender.send_modify(|session| {
            let pending = self.inner.pending.fetch_add(1, Ordering::SeqCst) + 1;
            session.is_loading = pending > 0;
            session.error = None;
        });
        LoadingGuard {
            state: self.clone(),
        }
    }

    pub(crate) fn set_user(&self, user: Option<User>) {
        self.inner.sender.send_modify(|session| session.user = user);
    }

    pub(crate) fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.inner
            .sender
            .send_modify(|session| session.error = Some(message));
    }

    /// Drops the user; loading bookkeeping is left to outstanding guards.
    pub(crate) fn clear(&self) {
        self.set_user(None);
    }

    fn finish(&self) {
        self.inner.sender.send_modify(|session| {
            let pending = self
                .inner
                .pending
                .fetch_sub(1, Ordering::SeqCst)
                .saturating_sub(1);
            session.is_loading = pending > 0;
        });
    }
}

/// Keeps `is_loading` raised while alive. Dropping it, including when the owning
/// future is cancelled, lowers the flag once no other operation is pending.
pub struct LoadingGuard {
    state: SessionState,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.state.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::types::TokenPair;
    use anyhow::Result;
    use secrecy::SecretString;

    fn user(role: Role) -> User {
        User {
            id: 1,
            username: "alice".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            role,
            email_verified: false,
        }
    }

    #[test]
    fn phase_follows_user_and_loading() {
        assert_eq!(Session::anonymous().phase(), AuthPhase::Anonymous);
        assert_eq!(
            Session::anonymous().loading(true).phase(),
            AuthPhase::Authenticating
        );
        assert_eq!(
            Session::authenticated(user(Role::Student)).loading(true).phase(),
            AuthPhase::Authenticated
        );
    }

    #[test]
    fn role_helpers() {
        let session = Session::authenticated(user(Role::Faculty));
        assert!(session.is_faculty());
        assert!(!session.is_student());
        assert!(!Session::anonymous().is_faculty());
    }

    #[test]
    fn loading_guards_nest() {
        let state = SessionState::default();
        let first = state.begin();
        let second = state.begin();
        drop(first);
        assert!(state.snapshot().is_loading);
        drop(second);
        assert!(!state.snapshot().is_loading);
    }

    #[test]
    fn begin_clears_previous_error() {
        let state = SessionState::default();
        state.set_error("Login failed");
        assert_eq!(state.snapshot().error.as_deref(), Some("Login failed"));
        let _guard = state.begin();
        assert!(state.snapshot().error.is_none());
    }

    #[test]
    fn hydrate_uses_stored_user() -> Result<()> {
        let store = CredentialStore::in_memory();
        assert!(!SessionState::hydrate(&store).is_authenticated());

        store.save_login(
            &user(Role::Student),
            &TokenPair {
                access: SecretString::from("A1".to_string()),
                refresh: SecretString::from("R1".to_string()),
            },
        )?;
        let state = SessionState::hydrate(&store);
        assert!(state.is_authenticated());
        assert!(state.snapshot().is_student());
        Ok(())
    }

    #[tokio::test]
    async fn subscribers_see_updates_and_publishing_without_them_is_fine() -> Result<()> {
        let state = SessionState::default();
        let mut receiver = state.subscribe();
        state.set_user(Some(user(Role::Student)));
        receiver.changed().await?;
        assert!(receiver.borrow().is_authenticated());

        drop(receiver);
        state.clear();
        assert!(!state.is_authenticated());
        Ok(())
    }
}
