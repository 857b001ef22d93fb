//! # api crate — remote clients for the ClientHub backend
//!
//! Concrete implementations of the `store` crate's backend contracts,
//! speaking to the hosted service named by `CLIENTHUB_BACKEND_URL` /
//! `CLIENTHUB_API_KEY`:
//!
//! | Client | Contract | Transport |
//! |--------|----------|-----------|
//! | [`RestAuth`] | `AuthBackend` | `POST /auth/v1/*` |
//! | [`RestBackend`] | `DataBackend` | `/rest/v1/{collection}` with query operators |
//! | [`SseFeed`] | `ChangeFeed` | `/realtime/v1/changes` event stream |
//!
//! [`ApiClient`] wires the three together around one HTTP client and one
//! shared session slot, so a sign-in immediately authenticates the REST
//! and change-feed requests that follow. `from_env` fails fast when either
//! environment value is missing — there is no partial operation.

use std::sync::Arc;

use store::gateway::Gateway;
use store::realtime::Realtime;
use store::session::{Session, SessionOptions};

mod auth;
mod config;
mod rest;
mod sse;

pub use auth::RestAuth;
pub use config::{ApiConfig, ConfigError};
pub use rest::RestBackend;
pub use sse::SseFeed;

use auth::SharedSession;

/// The connected backend clients, constructed once at process start.
pub struct ApiClient {
    auth: Arc<RestAuth>,
    data: Arc<RestBackend>,
    feed: Arc<SseFeed>,
}

impl ApiClient {
    /// Construct from the environment. Missing configuration is a fatal
    /// startup error.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new(ApiConfig::from_env()?))
    }

    pub fn new(config: ApiConfig) -> Self {
        let http = reqwest::Client::new();
        let session = SharedSession::default();
        Self {
            auth: Arc::new(RestAuth::new(http.clone(), &config, session.clone())),
            data: Arc::new(RestBackend::new(http.clone(), &config, session.clone())),
            feed: Arc::new(SseFeed::new(http, &config, session)),
        }
    }

    pub fn auth(&self) -> Arc<RestAuth> {
        self.auth.clone()
    }

    /// Typed data access over the REST client.
    pub fn gateway(&self) -> Gateway<RestBackend> {
        Gateway::from_arc(self.data.clone())
    }

    /// Canned realtime subscriptions over the event-stream client.
    pub fn realtime(&self) -> Realtime<SseFeed> {
        Realtime::new(self.feed.clone())
    }

    /// Start the process-wide session machine against the remote backend.
    pub fn start_session(&self, options: SessionOptions) -> Arc<Session<RestAuth, RestBackend>> {
        Session::start(self.auth.clone(), self.gateway(), options)
    }
}
