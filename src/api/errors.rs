use crate::auth::store::StoreError;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Maximum number of error body characters surfaced to callers.
const MAX_ERROR_CHARS: usize = 200;

/// Field name to first validation message.
pub type FieldErrors = BTreeMap<String, String>;

#[derive(Clone, Debug, Error)]
pub enum ApiError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Timeout: {0}")]
    Timeout(String),
    #[error("Request failed ({status}): {message}")]
    Http {
        status: u16,
        message: String,
        body: ErrorBody,
    },
    #[error("Response error: {0}")]
    Parse(String),
    #[error("Request error: {0}")]
    Serialization(String),
    #[error("No refresh token stored")]
    NoRefreshToken,
    #[error("Session expired, please log in again")]
    SessionExpired,
    #[error("Credential store error: {0}")]
    Store(String),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Failures that say nothing about the credentials: transport problems and 5xx.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Backend-supplied message (`{"error": ...}` or `{"detail": ...}`), if any.
    #[must_use]
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            Self::Http {
                body: ErrorBody::General(message),
                ..
            } => Some(message.as_str()),
            _ => None,
        }
    }

    /// Per-field validation messages, if the backend sent a field map.
    #[must_use]
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Self::Http {
                body: ErrorBody::Fields(fields),
                ..
            } => Some(fields),
            _ => None,
        }
    }

    pub(crate) fn from_response(status: u16, raw: &str) -> Self {
        Self::Http {
            status,
            message: sanitize_body(raw),
            body: ErrorBody::parse(raw),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Store(err.to_string())
    }
}

/// Maps transport errors into `ApiError` variants with timeout detection.
pub(crate) fn map_request_error(err: &reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout("Request timed out. Please try again.".to_string())
    } else {
        ApiError::Network(format!("Unable to reach the server: {err}"))
    }
}

/// Normalized shape of a backend failure payload.
///
/// The backend answers validation failures either with `{"error": "..."}`, with
/// `{"field": ["message", ...]}`, or with `{"error": "...", "details": {...}}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorBody {
    Empty,
    General(String),
    Fields(FieldErrors),
    Text(String),
}

impl ErrorBody {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }

        let Ok(value) = serde_json::from_str::<Value>(trimmed) else {
            return Self::Text(sanitize_body(trimmed));
        };

        let Value::Object(map) = value else {
            return Self::Text(sanitize_body(trimmed));
        };

        if let Some(Value::Object(details)) = map.get("details") {
            let fields = flatten_fields(details);
            if !fields.is_empty() {
                return Self::Fields(fields);
            }
        }

        for key in ["error", "detail"] {
            if let Some(Value::String(message)) = map.get(key) {
                return Self::General(message.clone());
            }
        }

        let fields = flatten_fields(&map);
        if fields.is_empty() {
            Self::Empty
        } else {
            Self::Fields(fields)
        }
    }
}

fn flatten_fields(map: &serde_json::Map<String, Value>) -> FieldErrors {
    map.iter()
        .filter_map(|(field, value)| field_message(value).map(|message| (field.clone(), message)))
        .collect()
}

fn field_message(value: &Value) -> Option<String> {
    match value {
        Value::String(message) => Some(message.clone()),
        Value::Array(messages) => messages.first().and_then(field_message),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Trims and truncates HTTP error bodies before they reach callers.
fn sanitize_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "Request failed.".to_string()
    } else {
        trimmed.chars().take(MAX_ERROR_CHARS).collect()
    }
}
