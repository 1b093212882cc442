//! Session and credential lifecycle.
//!
//! - [`store`] persists the user snapshot and token pair as one unit.
//! - [`state`] is the observable session the rest of the application reads.
//! - [`manager`] runs login, registration, logout and profile operations.
//! - [`guards`] decide whether a route may render for the current session.
//! - [`recovery`] drives the forgot-password flow.

pub mod client;
pub mod guards;
pub mod manager;
pub mod navigation;
pub mod recovery;
pub mod state;
pub mod store;
pub mod types;

pub use guards::{route_access, Access, GuardDecision, RouteGuard};
pub use manager::{AuthFailure, Registration, SessionManager};
pub use navigation::{Navigator, Route, TracingNavigator};
pub use recovery::{PasswordRecovery, RecoveryError, RecoveryStep};
pub use state::{AuthPhase, Session, SessionState};
pub use store::{CredentialBackend, CredentialStore, FileCredentials, MemoryCredentials};
pub use types::{RegisterRequest, Role, User, UserUpdate};
