//! JSON HTTP client for the CodeNest backend with bearer-token interception.
//!
//! Every dispatch reads the access token from the credential store at send time,
//! so a request issued after a refresh always carries the new token. A `401` on a
//! first attempt hands the failed token to the [`RefreshCoordinator`] and, if it
//! produces a token, re-sends the request once as a retry. Retries never refresh
//! again.

use super::{
    errors::{map_request_error, ApiError},
    refresh::RefreshCoordinator,
};
use crate::{
    auth::{navigation::Navigator, state::SessionState, store::CredentialStore},
    config::AppConfig,
};
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info_span, Instrument};

/// An outgoing request plus the number of times it has already been sent.
#[derive(Clone, Debug)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    attempt: u8,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            attempt: 0,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// Attaches a JSON body.
    /// # Errors
    /// Returns `ApiError::Serialization` if the body cannot be encoded.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|err| ApiError::Serialization(format!("Failed to encode request: {err}")))?;
        self.body = Some(value);
        Ok(self)
    }

    #[must_use]
    pub fn attempt(&self) -> u8 {
        self.attempt
    }

    #[must_use]
    pub fn is_retry(&self) -> bool {
        self.attempt > 0
    }

    #[must_use]
    pub fn retried(mut self) -> Self {
        self.attempt = self.attempt.saturating_add(1);
        self
    }
}

/// Status and raw body of a backend answer.
#[derive(Clone, Debug)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decodes the body as JSON.
    /// # Errors
    /// Returns `ApiError::Parse` if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body)
            .map_err(|err| ApiError::Parse(format!("Failed to decode response: {err}")))
    }

    fn into_result(self) -> Result<Self, ApiError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ApiError::from_response(self.status, &self.body))
        }
    }
}

/// Uninstrumented sender shared by the client and the refresh coordinator.
#[derive(Clone)]
pub(crate) struct Transport {
    http: reqwest::Client,
    base_url: String,
}

impl Transport {
    pub(crate) fn new(config: &AppConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| ApiError::Config(format!("Failed to build HTTP client: {err}")))?;

        Ok(Self {
            http,
            base_url: config.api_base_url.clone(),
        })
    }

    pub(crate) fn url(&self, path: &str) -> String {
        build_url_with_base(&self.base_url, path)
    }

    pub(crate) async fn dispatch(
        &self,
        request: &ApiRequest,
        bearer: Option<&SecretString>,
    ) -> Result<RawResponse, ApiError> {
        let url = self.url(&request.path);

        let mut builder = self.http.request(request.method.clone(), &url);
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token.expose_secret());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let span = info_span!(
            "api.request",
            http.method = %request.method,
            url = %url,
            attempt = request.attempt
        );
        let response = builder
            .send()
            .instrument(span)
            .await
            .map_err(|err| map_request_error(&err))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| map_request_error(&err))?;

        Ok(RawResponse { status, body })
    }
}

/// Builds a URL from an explicit base URL and the provided path.
fn build_url_with_base(base_url: &str, path: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    let path = path.trim();

    if base.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", base, path.trim_start_matches('/'))
    }
}

/// Backend client. Cloning is cheap and clones share the refresh coordinator.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: Transport,
    store: CredentialStore,
    refresher: RefreshCoordinator,
}

impl ApiClient {
    /// # Errors
    /// Returns `ApiError::Config` if the HTTP client cannot be built.
    pub fn new(
        config: &AppConfig,
        store: CredentialStore,
        state: SessionState,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ApiError> {
        let transport = Transport::new(config)?;
        let refresher =
            RefreshCoordinator::new(transport.clone(), store.clone(), state, navigator);

        Ok(Self {
            inner: Arc::new(ClientInner {
                transport,
                store,
                refresher,
            }),
        })
    }

    #[must_use]
    pub fn store(&self) -> &CredentialStore {
        &self.inner.store
    }

    #[must_use]
    pub fn refresher(&self) -> &RefreshCoordinator {
        &self.inner.refresher
    }

    /// Sends `request`, recovering from one `401` through a token refresh.
    ///
    /// When the refresh cannot produce a token the original `401` is returned,
    /// unless the refresh failed for a transient reason (network, timeout, 5xx),
    /// which is returned instead.
    /// # Errors
    /// Returns `ApiError::Http` for non-2xx answers and transport errors otherwise.
    pub async fn send(&self, request: ApiRequest) -> Result<RawResponse, ApiError> {
        let mut request = request;

        loop {
            let token = self.inner.store.access_token();
            let response = self.inner.transport.dispatch(&request, token.as_ref()).await?;

            if response.status != 401 || request.is_retry() {
                return response.into_result();
            }

            debug!(path = %request.path, "access token rejected, refreshing");

            match self.inner.refresher.refresh(token.as_ref()).await {
                Ok(_) => request = request.retried(),
                Err(err) if err.is_transient() => return Err(err),
                Err(err) => {
                    debug!(path = %request.path, "refresh did not recover the request: {err}");
                    return response.into_result();
                }
            }
        }
    }

    /// Sends `request` and decodes the JSON answer.
    /// # Errors
    /// See [`ApiClient::send`]; also returns `ApiError::Parse` on undecodable bodies.
    pub async fn execute<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        self.send(request).await?.json()
    }

    /// # Errors
    /// See [`ApiClient::execute`].
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute(ApiRequest::get(path)).await
    }

    /// # Errors
    /// See [`ApiClient::execute`].
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.execute(ApiRequest::post(path).json(body)?).await
    }

    /// Posts JSON and ignores the answer body.
    /// # Errors
    /// See [`ApiClient::send`].
    pub async fn post_json_empty<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), ApiError> {
        self.send(ApiRequest::post(path).json(body)?).await.map(|_| ())
    }

    /// Posts without a body and decodes the JSON answer.
    /// # Errors
    /// See [`ApiClient::execute`].
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute(ApiRequest::post(path)).await
    }

    /// # Errors
    /// See [`ApiClient::execute`].
    pub async fn put_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.execute(ApiRequest::put(path).json(body)?).await
    }
}
