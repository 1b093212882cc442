//! Backend access: request helpers with bearer-token interception, the
//! single-flight refresh coordinator, and the error taxonomy shared by both.
//!
//! ## Endpoints
//!
//! | Method | Path | Auth |
//! |--------|------|------|
//! | `POST` | `/auth/register/` | none |
//! | `POST` | `/auth/login/` | none |
//! | `POST` | `/auth/logout/` | bearer |
//! | `GET`/`PUT` | `/auth/profile/` | bearer |
//! | `POST` | `/auth/resend-verification/` | bearer |
//! | `POST` | `/token/refresh/` | refresh token in body |
//! | `POST` | `/auth/forgot-password/` | none |
//! | `POST` | `/auth/verify-reset-code/` | none |
//! | `POST` | `/auth/reset-password/` | none |
//!
//! "none" means the request carries a bearer header only if one happens to be
//! stored; the backend ignores it.

pub mod client;
pub mod errors;
pub mod refresh;

pub use client::{ApiClient, ApiRequest, RawResponse};
pub use errors::{ApiError, ErrorBody, FieldErrors};
pub use refresh::RefreshCoordinator;
