//! Route gating on top of the observable session.
//!
//! The loading check runs before the authentication check: while a session
//! operation is outstanding nothing is rendered and nobody is redirected.

use crate::auth::{
    navigation::Route,
    state::{Session, SessionState},
    types::Role,
};

/// Outcome of evaluating a guard against a session snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardDecision {
    /// Session is resolving; render nothing and do not redirect.
    Pending,
    Redirect(Route),
    Allow,
}

/// Access rule of a route.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    /// Open to everyone.
    Public,
    /// Landing, login and registration views; signed-in users are sent home.
    GuestOnly,
    Authenticated,
    Role(Role),
    /// Path outside the route table: home when signed in, login otherwise.
    Unknown,
}

impl Access {
    fn required_role(self) -> Option<Role> {
        match self {
            Self::Role(role) => Some(role),
            Self::Public | Self::GuestOnly | Self::Authenticated | Self::Unknown => None,
        }
    }
}

const PUBLIC_PATHS: [&str; 6] = [
    "/pricing",
    "/blog",
    "/features",
    "/contact",
    "/faculty-dashboard",
    "/student-dashboard",
];

const GUEST_PATHS: [&str; 3] = ["", "/login", "/register"];

#[must_use]
pub fn evaluate(session: &Session, required: Option<Role>) -> GuardDecision {
    if session.is_loading {
        return GuardDecision::Pending;
    }

    let Some(user) = session.user.as_ref() else {
        return GuardDecision::Redirect(Route::login());
    };

    match required {
        Some(role) if user.role != role => GuardDecision::Redirect(Route::Home(user.role)),
        _ => GuardDecision::Allow,
    }
}

/// Access rule for an application path.
#[must_use]
pub fn route_access(path: &str) -> Access {
    let path = path.trim_end_matches('/');
    if under(path, Role::Faculty.home_path()) {
        Access::Role(Role::Faculty)
    } else if under(path, Role::Student.home_path()) {
        Access::Role(Role::Student)
    } else if path == "/profile" {
        Access::Authenticated
    } else if GUEST_PATHS.contains(&path) {
        Access::GuestOnly
    } else if PUBLIC_PATHS.contains(&path) {
        Access::Public
    } else {
        Access::Unknown
    }
}

fn under(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

#[derive(Clone)]
pub struct RouteGuard {
    state: SessionState,
}

impl RouteGuard {
    #[must_use]
    pub fn new(state: SessionState) -> Self {
        Self { state }
    }

    #[must_use]
    pub fn check(&self, required: Option<Role>) -> GuardDecision {
        evaluate(&self.state.snapshot(), required)
    }

    /// Evaluates the rule `route_access` assigns to `path`. Public paths are
    /// always allowed, even while loading. Guest-only and unknown paths wait
    /// for the session to resolve before deciding.
    #[must_use]
    pub fn check_path(&self, path: &str) -> GuardDecision {
        let session = self.state.snapshot();
        match route_access(path) {
            Access::Public => GuardDecision::Allow,
            Access::GuestOnly | Access::Unknown if session.is_loading => GuardDecision::Pending,
            Access::GuestOnly => match session.user {
                Some(user) => GuardDecision::Redirect(Route::Home(user.role)),
                None => GuardDecision::Allow,
            },
            Access::Unknown => match session.user {
                Some(user) => GuardDecision::Redirect(Route::Home(user.role)),
                None => GuardDecision::Redirect(Route::login()),
            },
            access => evaluate(&session, access.required_role()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::types::User;

    fn user(role: Role) -> User {
        User {
            id: 7,
            username: "carol".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            role,
            email_verified: true,
        }
    }

    #[test]
    fn loading_wins_over_everything() {
        let anonymous = Session::anonymous().loading(true);
        assert_eq!(evaluate(&anonymous, None), GuardDecision::Pending);
        assert_eq!(
            evaluate(&anonymous, Some(Role::Faculty)),
            GuardDecision::Pending
        );

        let student = Session::authenticated(user(Role::Student)).loading(true);
        assert_eq!(
            evaluate(&student, Some(Role::Faculty)),
            GuardDecision::Pending
        );
    }

    #[test]
    fn anonymous_goes_to_login() {
        assert_eq!(
            evaluate(&Session::anonymous(), None),
            GuardDecision::Redirect(Route::login())
        );
    }

    #[test]
    fn wrong_role_goes_home() {
        let session = Session::authenticated(user(Role::Student));
        assert_eq!(
            evaluate(&session, Some(Role::Faculty)),
            GuardDecision::Redirect(Route::Home(Role::Student))
        );
        assert_eq!(evaluate(&session, Some(Role::Student)), GuardDecision::Allow);
        assert_eq!(evaluate(&session, None), GuardDecision::Allow);
    }

    #[test]
    fn route_table() {
        assert_eq!(route_access("/faculty"), Access::Role(Role::Faculty));
        assert_eq!(
            route_access("/faculty/courses/3/"),
            Access::Role(Role::Faculty)
        );
        assert_eq!(route_access("/student"), Access::Role(Role::Student));
        assert_eq!(route_access("/profile/"), Access::Authenticated);
        assert_eq!(route_access("/faculty-dashboard"), Access::Public);
        assert_eq!(route_access("/pricing/"), Access::Public);
        assert_eq!(route_access("/"), Access::GuestOnly);
        assert_eq!(route_access("/login"), Access::GuestOnly);
        assert_eq!(route_access("/register/"), Access::GuestOnly);
        assert_eq!(route_access("/facultyish"), Access::Unknown);
        assert_eq!(route_access("/nowhere"), Access::Unknown);
    }

    #[test]
    fn check_path_uses_session() {
        let state = SessionState::new(Session::authenticated(user(Role::Faculty)));
        let guard = RouteGuard::new(state);

        assert_eq!(guard.check_path("/faculty/courses"), GuardDecision::Allow);
        assert_eq!(
            guard.check_path("/student"),
            GuardDecision::Redirect(Route::Home(Role::Faculty))
        );
        assert_eq!(guard.check_path("/profile"), GuardDecision::Allow);

        let anonymous = RouteGuard::new(SessionState::default());
        assert_eq!(
            anonymous.check_path("/profile"),
            GuardDecision::Redirect(Route::login())
        );
        assert_eq!(anonymous.check_path("/register"), GuardDecision::Allow);
        assert_eq!(anonymous.check_path("/contact"), GuardDecision::Allow);
    }

    #[test]
    fn signed_in_users_leave_guest_pages() {
        let guard = RouteGuard::new(SessionState::new(Session::authenticated(user(
            Role::Student,
        ))));

        for path in ["/", "/login", "/register"] {
            assert_eq!(
                guard.check_path(path),
                GuardDecision::Redirect(Route::Home(Role::Student))
            );
        }
        assert_eq!(guard.check_path("/blog"), GuardDecision::Allow);

        let anonymous = RouteGuard::new(SessionState::default());
        for path in ["/", "/login", "/register"] {
            assert_eq!(anonymous.check_path(path), GuardDecision::Allow);
        }
    }

    #[test]
    fn unknown_paths_fall_back() {
        let faculty = RouteGuard::new(SessionState::new(Session::authenticated(user(
            Role::Faculty,
        ))));
        assert_eq!(
            faculty.check_path("/does-not-exist"),
            GuardDecision::Redirect(Route::Home(Role::Faculty))
        );

        let anonymous = RouteGuard::new(SessionState::default());
        assert_eq!(
            anonymous.check_path("/does-not-exist"),
            GuardDecision::Redirect(Route::login())
        );
    }

    #[test]
    fn guest_and_unknown_paths_wait_while_loading() {
        let state = SessionState::new(Session::anonymous().loading(true));
        let guard = RouteGuard::new(state);

        assert_eq!(guard.check_path("/login"), GuardDecision::Pending);
        assert_eq!(guard.check_path("/nowhere"), GuardDecision::Pending);
        assert_eq!(guard.check_path("/pricing"), GuardDecision::Allow);
    }
}
