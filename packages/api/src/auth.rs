//! # HTTP auth client
//!
//! [`RestAuth`] implements [`AuthBackend`] against the hosted backend's
//! auth endpoints:
//!
//! - `POST /auth/v1/signup` — create an identity; some deployments mint a
//!   session in the same response, others return only the user.
//! - `POST /auth/v1/token?grant_type=password` — password sign-in.
//! - `POST /auth/v1/logout` — revoke the current token.
//!
//! The live session sits behind a shared lock also consulted by the REST
//! and change-feed clients for their bearer token, and every session
//! change is fanned out on a broadcast channel as an [`AuthEvent`]. Auth
//! failures come back as structured [`AuthError`] values, never panics or
//! opaque transport errors.

use std::sync::{Arc, RwLock};

use chrono::{Duration, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::broadcast;

use store::backend::{AuthBackend, AuthEvent, SignUpMetadata, SignUpOutcome};
use store::error::AuthError;
use store::models::{AuthSession, AuthUser, UserMetadata};

use crate::config::ApiConfig;

/// Session slot shared between the auth, REST, and change-feed clients.
pub(crate) type SharedSession = Arc<RwLock<Option<AuthSession>>>;

/// Bearer token for a request: the session token when signed in, the
/// public API key otherwise.
pub(crate) fn bearer_token(session: &SharedSession, api_key: &str) -> String {
    session
        .read()
        .expect("session lock poisoned")
        .as_ref()
        .map(|s| s.access_token.clone())
        .unwrap_or_else(|| api_key.to_string())
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Option<UserMetadata>,
}

impl WireUser {
    fn into_user(self) -> AuthUser {
        AuthUser {
            id: self.id,
            email: self.email.unwrap_or_default(),
            user_metadata: self.user_metadata.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireSession {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    user: WireUser,
}

impl WireSession {
    fn into_session(self) -> AuthSession {
        AuthSession {
            user: self.user.into_user(),
            access_token: self.access_token,
            expires_at: self.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
        }
    }
}

/// [`AuthBackend`] over the hosted auth endpoints.
pub struct RestAuth {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    session: SharedSession,
    events: broadcast::Sender<AuthEvent>,
}

impl RestAuth {
    pub(crate) fn new(http: reqwest::Client, config: &ApiConfig, session: SharedSession) -> Self {
        Self {
            http,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            session,
            events: broadcast::channel(64).0,
        }
    }

    fn install(&self, session: Option<AuthSession>) {
        *self.session.write().expect("session lock poisoned") = session.clone();
        let _ = self.events.send(AuthEvent { session });
    }

    fn transport(e: reqwest::Error) -> AuthError {
        AuthError::Backend(e.to_string())
    }
}

impl AuthBackend for RestAuth {
    async fn current_session(&self) -> Result<Option<AuthSession>, AuthError> {
        Ok(self.session.read().expect("session lock poisoned").clone())
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: SignUpMetadata,
    ) -> Result<SignUpOutcome, AuthError> {
        let resp = self
            .http
            .post(format!("{}/auth/v1/signup", self.base_url))
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({
                "email": email,
                "password": password,
                "data": {
                    "full_name": metadata.full_name,
                    "role": metadata.role.as_str(),
                },
            }))
            .send()
            .await
            .map_err(Self::transport)?;

        match resp.status() {
            StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                return Err(AuthError::EmailTaken);
            }
            status if !status.is_success() => {
                return Err(AuthError::Backend(format!("sign-up failed: {status}")));
            }
            _ => {}
        }

        let body: serde_json::Value = resp.json().await.map_err(Self::transport)?;
        if body.get("access_token").is_some() {
            // identity and session minted in one step
            let wire: WireSession =
                serde_json::from_value(body).map_err(|e| AuthError::Backend(e.to_string()))?;
            let session = wire.into_session();
            self.install(Some(session.clone()));
            Ok(SignUpOutcome {
                user: session.user.clone(),
                session: Some(session),
            })
        } else {
            // user only; the caller signs in as a second step
            let user_value = body.get("user").cloned().unwrap_or(body);
            let wire: WireUser = serde_json::from_value(user_value)
                .map_err(|e| AuthError::Backend(e.to_string()))?;
            Ok(SignUpOutcome {
                user: wire.into_user(),
                session: None,
            })
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let resp = self
            .http
            .post(format!("{}/auth/v1/token", self.base_url))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({"email": email, "password": password}))
            .send()
            .await
            .map_err(Self::transport)?;

        match resp.status() {
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(AuthError::InvalidCredentials);
            }
            status if !status.is_success() => {
                return Err(AuthError::Backend(format!("sign-in failed: {status}")));
            }
            _ => {}
        }

        let wire: WireSession = resp.json().await.map_err(Self::transport)?;
        let session = wire.into_session();
        self.install(Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let token = bearer_token(&self.session, &self.api_key);
        let result = self
            .http
            .post(format!("{}/auth/v1/logout", self.base_url))
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .send()
            .await;
        if let Err(e) = result {
            // local clear still happens; the token just expires server-side
            tracing::warn!("logout request failed: {e}");
        }
        self.install(None);
        Ok(())
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
