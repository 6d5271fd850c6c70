//! Identity: GoTrue password auth and the shared session provider.
//!
//! [`SessionProvider`] is the one place that knows who is signed in. It is
//! handed to every component that needs it; components either read the
//! current session, `require()` one before a mutating call, or `subscribe()`
//! to sign-in/sign-out changes. Dropping the receiver unsubscribes.

use crate::error::{AppError, Result};
use crate::http::HttpClient;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: SessionUser,
}

impl Session {
    pub fn owner_id(&self) -> &str {
        &self.user.id
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Single source of truth for the signed-in identity.
#[derive(Clone)]
pub struct SessionProvider {
    tx: watch::Sender<Option<Session>>,
}

impl Default for SessionProvider {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SessionProvider {
    pub fn new(initial: Option<Session>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn current(&self) -> Option<Session> {
        self.tx.borrow().clone()
    }

    /// The active session, or `Unauthenticated` without touching the network.
    pub fn require(&self) -> Result<Session> {
        self.current().ok_or(AppError::Unauthenticated)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }

    pub fn set(&self, session: Option<Session>) {
        match &session {
            Some(s) => debug!(user = %s.user.id, "session updated"),
            None => debug!("session cleared"),
        }
        self.tx.send_replace(session);
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: SessionUser,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .unwrap_or_else(|| now + ChronoDuration::seconds(self.expires_in.unwrap_or(3600)));
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

/// Sign-up returns a full session, or just the user while e-mail
/// confirmation is pending.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    Pending(SessionUser),
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

#[derive(Clone)]
pub struct AuthClient {
    http: HttpClient,
    base_url: String,
    anon_key: String,
}

impl AuthClient {
    pub fn new(http: HttpClient, backend_url: &str, anon_key: &str) -> Self {
        Self {
            http,
            base_url: format!("{}/auth/v1", backend_url.trim_end_matches('/')),
            anon_key: anon_key.to_string(),
        }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(Method::POST, &format!("{}{}", self.base_url, path))
            .header("apikey", &self.anon_key)
    }

    #[instrument(skip(self, password))]
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        let request = self
            .post("/token?grant_type=password")
            .json(&PasswordGrant { email, password });

        let token: TokenResponse = self.http.send_json(request).await.map_err(auth_failure)?;
        info!(user = %token.user.id, "Signed in");
        Ok(token.into_session(Utc::now()))
    }

    /// Returns `None` when the account needs e-mail confirmation first.
    #[instrument(skip(self, password))]
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>> {
        let request = self.post("/signup").json(&PasswordGrant { email, password });

        match self.http.send_json(request).await.map_err(auth_failure)? {
            SignUpResponse::Session(token) => Ok(Some(token.into_session(Utc::now()))),
            SignUpResponse::Pending(user) => {
                info!(user = %user.id, "Sign-up pending e-mail confirmation");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, session), fields(user = %session.user.id))]
    pub async fn refresh(&self, session: &Session) -> Result<Session> {
        let request = self.post("/token?grant_type=refresh_token").json(&RefreshGrant {
            refresh_token: &session.refresh_token,
        });

        let token: TokenResponse = self.http.send_json(request).await.map_err(auth_failure)?;
        Ok(token.into_session(Utc::now()))
    }

    #[instrument(skip(self, session), fields(user = %session.user.id))]
    pub async fn sign_out(&self, session: &Session) -> Result<()> {
        let request = self.post("/logout").bearer_auth(&session.access_token);
        self.http.send(request).await?;
        Ok(())
    }
}

/// Credential rejections carry GoTrue's message; transport errors pass through.
fn auth_failure(err: AppError) -> AppError {
    match err {
        AppError::Remote { status, message } if (400..500).contains(&status) => {
            AppError::Auth(message)
        }
        AppError::AccessDenied => AppError::Auth("Invalid login credentials".to_string()),
        other => other,
    }
}

/// Seconds before expiry at which the session is refreshed.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Keep the provider's session fresh for as long as the task runs.
///
/// A failed refresh clears the session so subscribers see the expiry.
/// While signed out the task waits for the next sign-in.
pub fn spawn_refresher(provider: SessionProvider, auth: AuthClient) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut rx = provider.subscribe();
        loop {
            let Some(session) = rx.borrow_and_update().clone() else {
                debug!("No session, refresher waiting for sign-in");
                if rx.changed().await.is_err() {
                    return;
                }
                continue;
            };

            let margin = ChronoDuration::seconds(REFRESH_MARGIN_SECS);
            let now = Utc::now();
            let wait = if session.is_expired(now + margin) {
                Duration::ZERO
            } else {
                (session.expires_at - margin - now)
                    .to_std()
                    .unwrap_or(Duration::ZERO)
            };

            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                _ = tokio::time::sleep(wait) => {
                    match auth.refresh(&session).await {
                        Ok(fresh) => provider.set(Some(fresh)),
                        Err(e) => {
                            warn!("Session refresh failed: {}", e);
                            provider.set(None);
                        }
                    }
                }
            }
        }
    })
}


#[cfg(test)]
mod tests {
    use super::fixtures::session;
    use super::*;

    #[test]
    fn require_fails_when_signed_out() {
        let provider = SessionProvider::default();
        assert!(matches!(provider.require(), Err(AppError::Unauthenticated)));

        provider.set(Some(session("u1")));
        assert_eq!(provider.require().unwrap().owner_id(), "u1");
    }

    #[tokio::test]
    async fn subscribers_observe_sign_out() {
        let provider = SessionProvider::new(Some(session("u1")));
        let mut rx = provider.subscribe();

        provider.set(None);
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
    }

    #[test]
    fn token_response_prefers_absolute_expiry() {
        let json = r#"{
            "access_token": "a", "refresh_token": "r",
            "expires_in": 3600, "expires_at": 1700000000,
            "user": {"id": "u1", "email": "u1@example.com"}
        }"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        let session = token.into_session(Utc::now());
        assert_eq!(session.expires_at.timestamp(), 1_700_000_000);
        assert_eq!(session.user.email.as_deref(), Some("u1@example.com"));
    }

    #[test]
    fn token_response_falls_back_to_relative_expiry() {
        let json = r#"{"access_token":"a","refresh_token":"r","expires_in":60,"user":{"id":"u1"}}"#;
        let now = Utc::now();
        let session = serde_json::from_str::<TokenResponse>(json).unwrap().into_session(now);
        assert_eq!(session.expires_at, now + ChronoDuration::seconds(60));
        assert!(!session.is_expired(now));
    }

    #[test]
    fn sign_up_without_session_is_pending() {
        let json = r#"{"id":"u9","email":"new@example.com"}"#;
        let parsed: SignUpResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(parsed, SignUpResponse::Pending(u) if u.id == "u9"));
    }

    #[test]
    fn rejected_credentials_become_auth_errors() {
        let err = auth_failure(AppError::Remote { status: 400, message: "Invalid login credentials".into() });
        assert_eq!(err.notice(), "Invalid login credentials");
        assert!(matches!(auth_failure(AppError::NotFound), AppError::NotFound));
    }

    #[tokio::test]
    async fn refresher_outlives_sign_out() {
        let provider = SessionProvider::default();
        let auth = AuthClient::new(HttpClient::new().unwrap(), "http://127.0.0.1:9", "anon");
        let refresher = spawn_refresher(provider.clone(), auth);

        tokio::task::yield_now().await;
        assert!(!refresher.is_finished());

        provider.set(Some(session("u1")));
        tokio::task::yield_now().await;
        provider.set(None);
        tokio::task::yield_now().await;
        assert!(!refresher.is_finished());

        refresher.abort();
    }
}
