#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use galon_core::api::{ApiRequest, ApiResponse, Transport, TransportError};
use galon_core::auth::SessionStore;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde_json::{json, Value};

/// A signed-looking JWT for `username` that expires `minutes` from now.
pub fn jwt(id: i64, username: &str, minutes: i64) -> String {
    let payload = json!({
        "id": id,
        "username": username,
        "role": "admin",
        "exp": (Utc::now() + Duration::minutes(minutes)).timestamp(),
    });
    format!(
        "{}.{}.c2lnbmF0dXJl",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(payload.to_string())
    )
}

/// What the scripted backend received.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
}

type Hook = Box<dyn Fn() + Send + Sync>;

/// In-memory backend.
///
/// Requests carrying `Bearer <accepted>` get 200 with `ok_body`; anything
/// else gets 401. Paths in `fixed` always answer with their scripted status.
pub struct ScriptedTransport {
    accepted: Mutex<String>,
    ok_body: Value,
    fixed: Mutex<HashMap<String, (StatusCode, Vec<u8>)>>,
    offline: bool,
    unauthorized: AtomicUsize,
    on_unauthorized: Mutex<Option<Hook>>,
    log: Mutex<Vec<Recorded>>,
}

impl ScriptedTransport {
    pub fn accepting(token: &str) -> Self {
        Self {
            accepted: Mutex::new(token.to_string()),
            ok_body: json!([{ "id": 1, "customer_name": "Joko" }]),
            fixed: Mutex::new(HashMap::new()),
            offline: false,
            unauthorized: AtomicUsize::new(0),
            on_unauthorized: Mutex::new(None),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::accepting("")
        }
    }

    pub fn respond(self, path: &str, status: StatusCode, body: &[u8]) -> Self {
        self.fixed
            .lock()
            .unwrap()
            .insert(path.to_string(), (status, body.to_vec()));
        self
    }

    pub fn on_unauthorized(self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        *self.on_unauthorized.lock().unwrap() = Some(Box::new(hook));
        self
    }

    pub fn unauthorized_count(&self) -> usize {
        self.unauthorized.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.log.lock().unwrap().clone()
    }

    pub fn requests_with(&self, authorization: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.authorization.as_deref() == Some(authorization))
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let header = |name: reqwest::header::HeaderName| {
            request
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let authorization = header(AUTHORIZATION);
        self.log.lock().unwrap().push(Recorded {
            method: request.method.to_string(),
            path: request.path.clone(),
            authorization: authorization.clone(),
            content_type: header(reqwest::header::CONTENT_TYPE),
        });

        if self.offline {
            return Err(TransportError::new("connection refused"));
        }

        if let Some((status, body)) = self.fixed.lock().unwrap().get(&request.path).cloned() {
            return Ok(ApiResponse::new(status, body));
        }

        let expected = format!("Bearer {}", self.accepted.lock().unwrap());
        if authorization.as_deref() == Some(expected.as_str()) {
            Ok(ApiResponse::new(StatusCode::OK, self.ok_body.to_string()))
        } else {
            self.unauthorized.fetch_add(1, Ordering::SeqCst);
            if let Some(hook) = self.on_unauthorized.lock().unwrap().as_ref() {
                hook();
            }
            Ok(ApiResponse::new(
                StatusCode::UNAUTHORIZED,
                r#"{"message":"jwt expired"}"#,
            ))
        }
    }
}

/// Session store double with counters.
pub struct FakeSession {
    credential: Mutex<Option<String>>,
    refreshed_token: Option<String>,
    hold_until_unauthorized: Option<(Arc<ScriptedTransport>, usize)>,
    hang: bool,
    refreshes: AtomicUsize,
    logouts: AtomicUsize,
}

impl FakeSession {
    pub fn with_token(token: Option<&str>) -> Self {
        Self {
            credential: Mutex::new(token.map(str::to_string)),
            refreshed_token: None,
            hold_until_unauthorized: None,
            hang: false,
            refreshes: AtomicUsize::new(0),
            logouts: AtomicUsize::new(0),
        }
    }

    /// Refresh succeeds and installs `token`.
    pub fn refreshes_to(mut self, token: &str) -> Self {
        self.refreshed_token = Some(token.to_string());
        self
    }

    /// Keep the refresh pending until the backend has rejected `count` requests.
    pub fn hold_until(mut self, transport: Arc<ScriptedTransport>, count: usize) -> Self {
        self.hold_until_unauthorized = Some((transport, count));
        self
    }

    /// Refresh never completes.
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn set_credential(&self, token: &str) {
        *self.credential.lock().unwrap() = Some(token.to_string());
    }

    pub fn refresh_calls(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionStore for FakeSession {
    fn credential(&self) -> Option<String> {
        self.credential.lock().unwrap().clone()
    }

    async fn refresh(&self) -> bool {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        if let Some((transport, count)) = &self.hold_until_unauthorized {
            while transport.unauthorized_count() < *count {
                tokio::task::yield_now().await;
            }
        }
        match &self.refreshed_token {
            Some(token) => {
                *self.credential.lock().unwrap() = Some(token.clone());
                true
            }
            None => false,
        }
    }

    async fn logout(&self) {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        *self.credential.lock().unwrap() = None;
    }
}
