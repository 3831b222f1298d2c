//! The session store: who is logged in, with which token.
//!
//! `AuthStore` calls the auth endpoints through the transport directly. It
//! must never go through the dispatcher, whose 401 handling calls back into
//! this store.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::session::{Session, SessionData};
use super::token::{Claims, User};
use crate::api::transport::{ApiRequest, Transport, TransportError};

const LOGIN_PATH: &str = "/auth/login";
const REFRESH_PATH: &str = "/auth/refresh-token";
const LOGOUT_PATH: &str = "/auth/logout";

/// What the dispatcher needs from session state.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The current bearer credential, if logged in.
    fn credential(&self) -> Option<String>;

    /// Obtain a new credential. Returns `true` once it is stored.
    async fn refresh(&self) -> bool;

    /// Drop the credential locally and on the backend.
    async fn logout(&self);
}

/// Reactive snapshot of the authentication state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    pub user: Option<User>,
    pub access_token: Option<String>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub error: Option<String>,
}

#[derive(Error, Debug)]
pub enum LoginError {
    #[error("{0}")]
    Rejected(String),

    #[error("Access token missing from login response")]
    MissingToken,

    #[error("Access token could not be decoded")]
    InvalidToken,

    #[error("Network error: {0}")]
    Network(#[from] TransportError),
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    data: Option<LoginData>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    #[serde(rename = "accessToken")]
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    data: RefreshData,
}

#[derive(Debug, Deserialize)]
struct RefreshData {
    #[serde(rename = "newAccessToken")]
    new_access_token: String,
}

pub struct AuthStore {
    transport: Arc<dyn Transport>,
    session: Mutex<Session>,
    state: watch::Sender<AuthState>,
}

impl AuthStore {
    pub fn new(transport: Arc<dyn Transport>, session: Session) -> Self {
        let (state, _) = watch::channel(AuthState::default());
        Self {
            transport,
            session: Mutex::new(session),
            state,
        }
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state snapshot.
    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Receive every subsequent state change.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated
    }

    /// Adopt the persisted session if its token is still good.
    pub fn restore(&self) -> bool {
        let restored = {
            let mut session = self.session();
            match session.load() {
                Ok(true) => session.data.clone(),
                Ok(false) => None,
                Err(e) => {
                    warn!(error = %e, "Failed to load persisted session");
                    if let Err(e) = session.clear() {
                        warn!(error = %e, "Failed to clear persisted session");
                    }
                    None
                }
            }
        };

        match restored {
            Some(data) => {
                self.state.send_modify(|state| {
                    state.access_token = Some(data.access_token);
                    state.user = Some(data.user);
                    state.is_authenticated = true;
                });
                true
            }
            None => false,
        }
    }

    /// Log in with username and password.
    pub async fn login(&self, username: &str, password: &str) -> Result<User, LoginError> {
        self.state.send_modify(|state| {
            state.is_loading = true;
            state.error = None;
        });

        match self.request_login(username, password).await {
            Ok((token, user)) => {
                self.adopt(token, user.clone());
                self.state.send_modify(|state| state.is_loading = false);
                info!(user = %user.username, "Logged in");
                Ok(user)
            }
            Err(e) => {
                warn!(error = %e, "Login failed");
                self.state.send_replace(AuthState {
                    error: Some(e.to_string()),
                    ..AuthState::default()
                });
                Err(e)
            }
        }
    }

    async fn request_login(&self, username: &str, password: &str) -> Result<(String, User), LoginError> {
        let request = ApiRequest::post(LOGIN_PATH)
            .json(&json!({ "username": username, "password": password }))
            .map_err(|e| LoginError::Rejected(e.to_string()))?;
        let response = self.transport.send(request).await?;

        let parsed: Option<LoginResponse> = response.json().ok();
        if !response.is_success() {
            let message = parsed
                .and_then(|body| body.message)
                .unwrap_or_else(|| "Login failed".to_string());
            return Err(LoginError::Rejected(message));
        }

        let token = parsed
            .and_then(|body| body.data)
            .and_then(|data| data.access_token)
            .ok_or(LoginError::MissingToken)?;
        let claims = Claims::decode(&token).ok_or(LoginError::InvalidToken)?;
        Ok((token, claims.user()))
    }

    /// Store a new token everywhere it is mirrored.
    fn adopt(&self, token: String, user: User) {
        {
            let mut session = self.session();
            session.update(SessionData::new(token.clone(), user.clone()));
            if let Err(e) = session.save() {
                warn!(error = %e, "Failed to persist session");
            }
        }
        self.state.send_modify(|state| {
            state.access_token = Some(token);
            state.user = Some(user);
            state.is_authenticated = true;
            state.error = None;
        });
    }

    async fn request_refresh(&self) -> anyhow::Result<(String, User)> {
        let response = self.transport.send(ApiRequest::post(REFRESH_PATH)).await?;
        if !response.is_success() {
            anyhow::bail!("refresh endpoint answered {}", response.status);
        }
        let body: RefreshResponse = response.json()?;
        let token = body.data.new_access_token;
        let claims = Claims::decode(&token)
            .ok_or_else(|| anyhow::anyhow!("refreshed token could not be decoded"))?;
        Ok((token, claims.user()))
    }

    /// Forget the session without telling the backend.
    fn reset(&self) {
        if let Err(e) = self.session().clear() {
            warn!(error = %e, "Failed to clear persisted session");
        }
        self.state.send_replace(AuthState::default());
    }

    /// Make sure a usable token is present, refreshing when needed.
    ///
    /// A token that is missing, undecodable, expired, or expiring within
    /// [`EXPIRY_BUFFER_MINUTES`](super::token::EXPIRY_BUFFER_MINUTES) is
    /// refreshed. When that refresh fails the local session is cleared.
    pub async fn check_auth(&self) -> bool {
        let token = self.session().token().map(str::to_string);
        let Some(token) = token else {
            return self.refresh().await;
        };

        match Claims::decode(&token) {
            Some(claims) if !claims.is_expiring_soon() => {
                let user = claims.user();
                self.state.send_modify(|state| {
                    state.access_token = Some(token);
                    state.user = Some(user);
                    state.is_authenticated = true;
                });
                true
            }
            _ => {
                debug!("Access token expired or expiring soon");
                if self.refresh().await {
                    true
                } else {
                    self.reset();
                    false
                }
            }
        }
    }
}

#[async_trait]
impl SessionStore for AuthStore {
    fn credential(&self) -> Option<String> {
        self.state.borrow().access_token.clone()
    }

    async fn refresh(&self) -> bool {
        match self.request_refresh().await {
            Ok((token, user)) => {
                info!(user = %user.username, "Access token refreshed");
                self.adopt(token, user);
                true
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                false
            }
        }
    }

    async fn logout(&self) {
        match self.transport.send(ApiRequest::post(LOGOUT_PATH)).await {
            Ok(response) if !response.is_success() => {
                warn!(status = response.status.as_u16(), "Logout endpoint rejected the request");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Logout request failed"),
        }
        self.reset();
        info!("Logged out");
    }
}
