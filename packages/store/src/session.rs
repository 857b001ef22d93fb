//! # Session/Profile state machine
//!
//! [`Session`] owns the authenticated identity, the derived [`Profile`],
//! and the loading lifecycle. It is constructed once at process start and
//! injected into consumers; state is observed through a `watch` channel
//! rather than ambient globals.
//!
//! ## Lifecycle
//!
//! `initializing → (authenticated-with-profile | unauthenticated) → closed`
//!
//! On start, two probes run concurrently from time zero: the persisted
//! session fetch and the auth-event listener. Whichever answers first sets
//! the initial state. A liveness flag gates every asynchronous
//! continuation, so late completions after [`close`](Session::close) are
//! ignored instead of mutating torn-down state.
//!
//! ## The one contract worth stating twice
//!
//! Whenever `user` is non-null, a profile value — the persisted record or
//! a locally synthesized fallback — is available within a bounded window.
//! Every failure mode of the profile fetch (backend error, missing row,
//! timeout) degrades to the fallback rather than leaving `profile` null,
//! and a safety timer forces `loading = false` even if the backend never
//! answers. The UI may briefly render fabricated profile data; it never
//! blocks on profile availability.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::backend::{AuthBackend, AuthEvent, DataBackend, SignUpMetadata};
use crate::error::{AuthError, StoreError};
use crate::gateway::Gateway;
use crate::models::{AuthSession, AuthUser, Availability, Profile};

/// Timing bounds for the loading lifecycle.
#[derive(Clone, Copy, Debug)]
pub struct SessionOptions {
    /// Upper bound on the whole loading state; the safety timer forces
    /// `loading = false` when it elapses.
    pub load_timeout: Duration,
    /// Per-attempt bound on the profile fetch before falling back.
    pub profile_fetch_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            load_timeout: Duration::from_secs(5),
            profile_fetch_timeout: Duration::from_secs(3),
        }
    }
}

/// Observable session state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionState {
    pub user: Option<AuthUser>,
    pub session: Option<AuthSession>,
    pub profile: Option<Profile>,
    pub loading: bool,
}

/// Build the locally-synthesized fallback profile from auth metadata.
fn synthesize_profile(user: &AuthUser) -> Profile {
    Profile {
        id: user.id.clone(),
        full_name: user
            .user_metadata
            .full_name
            .clone()
            .unwrap_or_else(|| "User".to_string()),
        role: user.user_metadata.role.unwrap_or_default(),
        availability_status: Availability::Offline,
        ..Profile::default()
    }
}

fn profile_from_signup(user: &AuthUser, metadata: &SignUpMetadata) -> Profile {
    Profile {
        id: user.id.clone(),
        full_name: metadata.full_name.clone(),
        role: metadata.role,
        availability_status: Availability::Offline,
        ..Profile::default()
    }
}

/// Process-wide session context. Construct with [`Session::start`], share
/// as `Arc`, tear down with [`Session::close`].
pub struct Session<A, B> {
    auth: Arc<A>,
    gateway: Gateway<B>,
    state: Arc<watch::Sender<SessionState>>,
    alive: CancellationToken,
    options: SessionOptions,
}

impl<A, B> Drop for Session<A, B> {
    fn drop(&mut self) {
        self.alive.cancel();
    }
}

impl<A, B> Session<A, B>
where
    A: AuthBackend + 'static,
    B: DataBackend + 'static,
{
    /// Spawn the machine: the session probe, the auth listener, and the
    /// loading guard all start immediately. Must be called within a tokio
    /// runtime.
    pub fn start(auth: Arc<A>, gateway: Gateway<B>, options: SessionOptions) -> Arc<Self> {
        let (tx, _) = watch::channel(SessionState {
            loading: true,
            ..SessionState::default()
        });
        let session = Arc::new(Self {
            auth,
            gateway,
            state: Arc::new(tx),
            alive: CancellationToken::new(),
            options,
        });

        // Subscribe before spawning so no event can slip between start and
        // the listener becoming active.
        let events = session.auth.auth_events();
        let me = session.clone();
        tokio::spawn(async move { me.listen(events).await });
        let me = session.clone();
        tokio::spawn(async move { me.bootstrap().await });
        let me = session.clone();
        tokio::spawn(async move { me.guard_loading().await });

        session
    }

    /// Watch the session state; the current value is readable immediately.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Tear down: cancels the liveness flag consulted by every pending
    /// continuation and stops the timers and the auth listener.
    pub fn close(&self) {
        self.alive.cancel();
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let session = self.auth.sign_in(email, password).await?;
        if self.alive.is_cancelled() {
            return Ok(());
        }
        self.apply_auth_change(Some(session)).await;
        Ok(())
    }

    /// Create an identity and bring it to an authenticated state. When the
    /// backend does not mint a session at sign-up, an immediate sign-in
    /// covers the second step. Profile creation failure is logged, not
    /// surfaced — it never fails the sign-up.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: SignUpMetadata,
    ) -> Result<(), AuthError> {
        let outcome = self.auth.sign_up(email, password, metadata.clone()).await?;

        let mut session = outcome.session;
        if session.is_none() {
            match self.auth.sign_in(email, password).await {
                Ok(s) => session = Some(s),
                Err(e) => tracing::warn!("auto sign-in after sign-up failed: {e}"),
            }
        }

        let profile = profile_from_signup(&outcome.user, &metadata);
        if let Err(e) = self.gateway.upsert_profile(&profile).await {
            tracing::error!("profile upsert during sign-up failed: {e}");
        }

        if self.alive.is_cancelled() {
            return Ok(());
        }
        if let Some(session) = session {
            self.apply_auth_change(Some(session)).await;
        }
        Ok(())
    }

    /// Clear user, profile, and session unconditionally.
    pub async fn sign_out(&self) {
        if let Err(e) = self.auth.sign_out().await {
            tracing::warn!("sign-out call failed: {e}");
        }
        self.state.send_modify(|s| {
            *s = SessionState {
                loading: false,
                ..SessionState::default()
            };
        });
    }

    /// Partial profile update. On success the full record is re-fetched —
    /// never merged locally — so server-side defaults and triggers win.
    pub async fn update_profile(&self, patch: Value) -> Result<(), StoreError> {
        let user = self.state.borrow().user.clone();
        let Some(user) = user else {
            return Err(StoreError::Rejected("not signed in".into()));
        };
        self.gateway.update_profile(&user.id, patch).await?;
        if self.alive.is_cancelled() {
            return Ok(());
        }
        self.load_profile(&user).await;
        Ok(())
    }

    async fn bootstrap(&self) {
        let result = self.auth.current_session().await;
        if self.alive.is_cancelled() {
            return;
        }
        match result {
            Ok(Some(session)) => self.apply_auth_change(Some(session)).await,
            Ok(None) => self.state.send_modify(|s| s.loading = false),
            Err(e) => {
                tracing::error!("session bootstrap failed: {e}");
                self.state.send_modify(|s| s.loading = false);
            }
        }
    }

    async fn listen(&self, mut events: broadcast::Receiver<AuthEvent>) {
        loop {
            tokio::select! {
                _ = self.alive.cancelled() => break,
                event = events.recv() => match event {
                    Ok(AuthEvent { session }) => self.apply_auth_change(session).await,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }

    /// Safety timer: whatever the backends do, loading ends within the
    /// configured bound. Exits early on normal completion or teardown.
    async fn guard_loading(&self) {
        let mut state = self.state.subscribe();
        let settled = async {
            loop {
                if !state.borrow_and_update().loading {
                    break;
                }
                if state.changed().await.is_err() {
                    break;
                }
            }
        };
        tokio::select! {
            _ = self.alive.cancelled() => {}
            _ = settled => {}
            _ = tokio::time::sleep(self.options.load_timeout) => {
                tracing::warn!(
                    "loading did not settle within {:?}, forcing ready",
                    self.options.load_timeout
                );
                self.state.send_modify(|s| s.loading = false);
            }
        }
    }

    async fn apply_auth_change(&self, session: Option<AuthSession>) {
        match session {
            Some(session) => {
                let user = session.user.clone();
                // Fallback profile goes in before any round-trip, so there
                // is no window where user is set and profile is null.
                self.state.send_modify(|s| {
                    s.session = Some(session);
                    s.user = Some(user.clone());
                    s.profile = Some(synthesize_profile(&user));
                });
                self.load_profile(&user).await;
            }
            None => {
                self.state.send_modify(|s| {
                    *s = SessionState {
                        loading: false,
                        ..SessionState::default()
                    };
                });
            }
        }
    }

    /// Resolve the persisted profile. Exactly one of: record found (use
    /// it), record absent (synthesize, best-effort insert, keep it), fetch
    /// failed or timed out (keep the fallback).
    async fn load_profile(&self, user: &AuthUser) {
        let fetched = tokio::time::timeout(
            self.options.profile_fetch_timeout,
            self.gateway.try_profile(&user.id),
        )
        .await;
        if self.alive.is_cancelled() {
            return;
        }

        let profile = match fetched {
            Ok(Ok(Some(profile))) => profile,
            Ok(Ok(None)) => {
                let synthesized = synthesize_profile(user);
                if let Err(e) = self.gateway.create_profile(&synthesized).await {
                    tracing::error!("profile creation failed, keeping synthesized record: {e}");
                }
                if self.alive.is_cancelled() {
                    return;
                }
                synthesized
            }
            Ok(Err(e)) => {
                tracing::error!("profile fetch failed, using fallback: {e}");
                self.current_or_synthesized(user)
            }
            Err(_) => {
                tracing::warn!("profile fetch timed out, using fallback");
                self.current_or_synthesized(user)
            }
        };

        self.state.send_modify(|s| {
            s.profile = Some(profile);
            s.loading = false;
        });
    }

    fn current_or_synthesized(&self, user: &AuthUser) -> Profile {
        self.state
            .borrow()
            .profile
            .clone()
            .unwrap_or_else(|| synthesize_profile(user))
    }
}
