pub mod recover;
pub mod route;
pub mod session;

use crate::auth::{RegisterRequest, UserUpdate};
use secrecy::SecretString;

/// Parsed subcommand. Not `Debug`: login and register carry passwords.
pub enum Action {
    Login {
        username: String,
        password: SecretString,
    },
    Register {
        fields: RegisterRequest,
    },
    Logout,
    Whoami {
        refresh: bool,
    },
    UpdateProfile {
        update: UserUpdate,
    },
    ResendVerification,
    Recover {
        username: String,
        email: String,
    },
    CheckRoute {
        path: String,
    },
}
