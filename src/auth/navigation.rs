//! Navigation seam between the session core and whatever renders views. The core
//! only decides where the user must go; the embedding application performs it.

use crate::auth::types::Role;
use std::fmt;
use tracing::info;

pub const LOGIN_PATH: &str = "/login";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    /// Login view, optionally with a notice to display (e.g. after a password reset).
    Login { notice: Option<String> },
    /// Landing view for a role.
    Home(Role),
}

impl Route {
    #[must_use]
    pub fn login() -> Self {
        Self::Login { notice: None }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Login { .. } => LOGIN_PATH,
            Self::Home(role) => role.home_path(),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.path())
    }
}

/// Performs a navigation requested by the session core. Implementations must not
/// block; navigation may be requested from inside a refresh episode.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

/// Navigator that only records the navigation in the trace log, used by the CLI.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNavigator;

impl Navigator for TracingNavigator {
    fn navigate(&self, route: Route) {
        match &route {
            Route::Login {
                notice: Some(notice),
            } => info!(route = %route, "navigate: {notice}"),
            _ => info!(route = %route, "navigate"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_paths() {
        assert_eq!(Route::login().path(), "/login");
        assert_eq!(Route::Home(Role::Faculty).path(), "/faculty");
        assert_eq!(Route::Home(Role::Student).to_string(), "/student");
    }
}
