//! Authenticated request dispatcher for the Galon REST API.
//!
//! `ApiClient` attaches the bearer credential to every request and, when the
//! backend answers 401, runs one coordinated token refresh before retrying
//! the request once.

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, info, warn};

use crate::auth::SessionStore;
use crate::navigation::{Navigator, NoopNavigator, ENTRY_ROUTE};

use super::error::{ApiError, AuthFailure};
use super::refresh::{Participation, RefreshCoordinator};
use super::upload::FormData;
use super::transport::{ApiRequest, ApiResponse, Transport, JSON_CONTENT_TYPE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    First,
    Retry,
}

/// API client for the Galon backend.
/// Clone is cheap - clones share the transport, session and refresh state.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    session: Arc<dyn SessionStore>,
    navigator: Arc<dyn Navigator>,
    refresh: Arc<RefreshCoordinator>,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, session: Arc<dyn SessionStore>) -> Self {
        Self {
            transport,
            session,
            navigator: Arc::new(NoopNavigator),
            refresh: Arc::new(RefreshCoordinator::new()),
        }
    }

    /// Where to send the user after a refresh failure logged them out.
    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    /// Whether a token refresh episode is open right now.
    pub fn is_refreshing(&self) -> bool {
        self.refresh.is_refreshing()
    }

    pub fn refresh_coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.refresh
    }

    /// Send `request` with the session's credential.
    ///
    /// A 401 on the first attempt triggers credential recovery (see
    /// [`RefreshCoordinator`]) followed by exactly one retry. Any other
    /// non-success status, including a 401 on the retry, fails with
    /// [`ApiError::Http`].
    pub async fn dispatch(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let (response, sent_with) = self.attempt(&request, Attempt::First).await?;
        if response.status != StatusCode::UNAUTHORIZED {
            return Self::check_response(&request, response);
        }

        self.recover(&request, sent_with).await?;

        let (response, _) = self.attempt(&request, Attempt::Retry).await?;
        Self::check_response(&request, response)
    }

    async fn attempt(
        &self,
        request: &ApiRequest,
        attempt: Attempt,
    ) -> Result<(ApiResponse, Option<String>), ApiError> {
        let credential = self.session.credential();
        let outgoing = Self::build(request, credential.as_deref());

        debug!(
            method = %request.method,
            path = %request.path,
            ?attempt,
            authenticated = credential.is_some(),
            "Dispatching request"
        );

        match self.transport.send(outgoing).await {
            Ok(response) => Ok((response, credential)),
            Err(e) => {
                error!(method = %request.method, path = %request.path, error = %e, "API call failed");
                Err(ApiError::Network(e))
            }
        }
    }

    /// Default headers, then caller headers, then the bearer credential.
    fn build(request: &ApiRequest, credential: Option<&str>) -> ApiRequest {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        headers.extend(request.headers.clone());

        if let Some(token) = credential {
            match HeaderValue::from_str(&format!("Bearer {}", token)) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => warn!("Stored credential is not a valid header value, sending without it"),
            }
        }

        ApiRequest {
            headers,
            ..request.clone()
        }
    }

    /// Get the session back into a state where a retry can succeed.
    async fn recover(&self, request: &ApiRequest, sent_with: Option<String>) -> Result<(), ApiError> {
        let current = self.session.credential();
        match (&sent_with, &current) {
            // Another episode already replaced the credential this request used
            (_, Some(now)) if sent_with.as_deref() != Some(now.as_str()) => {
                debug!(path = %request.path, "Credential rotated while request was in flight");
                return Ok(());
            }
            // Logged out in the meantime
            (Some(_), None) => {
                debug!(path = %request.path, "Session ended while request was in flight");
                return Err(ApiError::Auth(AuthFailure::SessionEnded));
            }
            _ => {}
        }

        match self.refresh.participate() {
            Participation::Waiter(outcome) => {
                debug!(path = %request.path, "Waiting for token refresh");
                match outcome.await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(failure)) => Err(ApiError::Auth(failure)),
                    Err(_) => Err(ApiError::Auth(AuthFailure::RefreshAbandoned)),
                }
            }
            Participation::Leader(mut episode) => {
                info!(path = %request.path, "Access token rejected, refreshing");
                if self.session.refresh().await {
                    episode.release(Ok(()));
                    Ok(())
                } else {
                    warn!("Token refresh failed, logging out");
                    episode.release(Err(AuthFailure::RefreshRejected));
                    self.session.logout().await;
                    self.navigator.navigate(ENTRY_ROUTE);
                    Err(ApiError::Auth(AuthFailure::RefreshRejected))
                }
            }
        }
    }

    fn check_response(request: &ApiRequest, response: ApiResponse) -> Result<ApiResponse, ApiError> {
        if response.is_success() {
            Ok(response)
        } else {
            warn!(
                method = %request.method,
                path = %request.path,
                status = response.status.as_u16(),
                body = %ApiError::truncate_body(&response.text()),
                "Request failed"
            );
            Err(ApiError::from_status(response.status, &response.body))
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let response = self.dispatch(request).await?;
        if response.body.is_empty() {
            return Ok(serde_json::from_slice(b"null")?);
        }
        Ok(response.json()?)
    }

    // ===== JSON helpers =====

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(ApiRequest::get(path)).await
    }

    /// GET with query parameters appended to the URL.
    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let request = ApiRequest::get(path).query(params.iter().copied());
        self.send_json(request).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_json(ApiRequest::post(path).json(body)?).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_json(ApiRequest::put(path).json(body)?).await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_json(ApiRequest::patch(path).json(body)?).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(ApiRequest::delete(path)).await
    }

    /// POST a multipart form. The form's boundary content type replaces the
    /// JSON default.
    pub async fn upload<T: DeserializeOwned>(&self, path: &str, form: &FormData) -> Result<T, ApiError> {
        let content_type = form
            .content_type()
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        let body = form.encode();
        debug!(path, bytes = body.len(), "Uploading form");
        self.send_json(ApiRequest::post(path).bytes(content_type, body)).await
    }
}
