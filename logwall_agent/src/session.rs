//! Shared-password gate and the server-side session store.
//!
//! Sessions are keyed by an opaque random token carried in the
//! `logwall_session` cookie. They carry no TTL: a session lives until logout
//! or until the process exits ([`ExpiryPolicy::Never`]).

use std::collections::HashMap;

use axum::http::{header, HeaderMap};
use chrono::{DateTime, Utc};
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub const SESSION_COOKIE: &str = "logwall_session";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryPolicy {
    /// Valid until logout or process exit.
    Never,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub authenticated: bool,
    pub created_at: DateTime<Utc>,
}

/// What a request presented: a session cookie, a bearer-style `token` query
/// parameter holding the shared password, or both.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub session: Option<String>,
    pub token: Option<String>,
}

impl Credentials {
    pub fn from_request(headers: &HeaderMap, token: Option<String>) -> Self {
        Self {
            session: session_cookie(headers),
            token,
        }
    }
}

pub struct SessionGate {
    password: String,
    sessions: RwLock<HashMap<String, Session>>,
    pub expiry: ExpiryPolicy,
}

impl SessionGate {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            sessions: RwLock::new(HashMap::new()),
            expiry: ExpiryPolicy::Never,
        }
    }

    /// Constant-time comparison against the shared password.
    pub fn verify(&self, candidate: &str) -> bool {
        bool::from(candidate.as_bytes().ct_eq(self.password.as_bytes()))
    }

    /// Check the password and open a session. Returns the session token.
    pub async fn login(&self, candidate: &str) -> Option<String> {
        if !self.verify(candidate) {
            debug!("login rejected");
            return None;
        }
        let token = uuid::Uuid::new_v4().simple().to_string();
        let mut sessions = self.sessions.write().await;
        sessions.insert(
            token.clone(),
            Session {
                authenticated: true,
                created_at: Utc::now(),
            },
        );
        info!(active = sessions.len(), "session opened");
        Some(token)
    }

    pub async fn logout(&self, token: &str) -> bool {
        let removed = self.sessions.write().await.remove(token).is_some();
        if removed {
            info!("session closed");
        }
        removed
    }

    pub async fn is_authenticated(&self, token: &str) -> bool {
        self.sessions
            .read()
            .await
            .get(token)
            .is_some_and(|s| s.authenticated)
    }

    /// A live session or the shared password, either one suffices.
    pub async fn authorize(&self, creds: &Credentials) -> bool {
        if let Some(t) = creds.session.as_deref() {
            if self.is_authenticated(t).await {
                return true;
            }
        }
        creds.token.as_deref().is_some_and(|t| self.verify(t))
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Session token from the request's `Cookie` headers.
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == SESSION_COOKIE)
        .map(|(_, v)| v.to_string())
        .filter(|v| !v.is_empty())
}

pub fn set_cookie(token: &str) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax")
}

pub fn clear_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}
