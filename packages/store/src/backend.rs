//! # Backend contracts — collections, filters, change feeds, auth
//!
//! The store never talks to a concrete service directly. Everything goes
//! through three trait seams, so the same gateway and session logic runs
//! against the hosted backend (see the `api` crate) or the in-memory
//! backend ([`crate::MemoryBackend`]) used by tests and demos.
//!
//! ## [`DataBackend`]
//!
//! A generic collection API: `select` with filter/order/limit, `insert`,
//! `update` by id, `upsert`, and `delete` by filter. Rows cross this
//! boundary as `serde_json::Value`; typed decoding happens in the gateway.
//! Backends report failures as [`StoreError`] — the fail-soft policy for
//! reads is applied above this trait, not inside it.
//!
//! ## [`ChangeFeed`]
//!
//! `changes(collection, server_filter)` opens a [`Subscription`] delivering
//! [`ChangeEvent`]s. When a `server_filter` is given the backend narrows
//! delivery itself (single-column equality in practice); broad feeds are
//! narrowed client-side by the consumer's interest predicate. Only
//! per-connection delivery order is guaranteed.
//!
//! ## [`AuthBackend`]
//!
//! The auth subsystem contract: session probe, credential sign-up/sign-in,
//! sign-out, and a broadcast stream of [`AuthEvent`]s fired whenever the
//! session changes. Failures are structured [`AuthError`] values.
//!
//! ## [`Filter`]
//!
//! A small predicate tree (`Eq`, `ILike`, `And`, `Or`) with a single
//! evaluation routine, [`Filter::matches`]. The in-memory backend and the
//! client-side subscription narrowing both evaluate filters through it, so
//! a query and the realtime interest check can never disagree.

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::{AuthError, StoreError};
use crate::models::{AuthSession, AuthUser, Role};
use crate::realtime::Subscription;

/// A predicate over JSON rows.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    /// Column equals a JSON value.
    Eq(String, Value),
    /// Case-insensitive substring match on a string column.
    ILike(String, String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(column.into(), value.into())
    }

    pub fn ilike(column: impl Into<String>, needle: impl Into<String>) -> Self {
        Filter::ILike(column.into(), needle.into())
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And(filters)
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or(filters)
    }

    /// `column` equals any of the given ids. Matches nothing when `ids` is
    /// empty.
    pub fn any_of(column: &str, ids: &[String]) -> Self {
        Filter::Or(ids.iter().map(|id| Filter::eq(column, id.as_str())).collect())
    }

    /// Evaluate the predicate against a JSON row.
    pub fn matches(&self, row: &Value) -> bool {
        match self {
            Filter::Eq(column, expected) => row.get(column) == Some(expected),
            Filter::ILike(column, needle) => row
                .get(column)
                .and_then(Value::as_str)
                .map(|s| s.to_lowercase().contains(&needle.to_lowercase()))
                .unwrap_or(false),
            Filter::And(filters) => filters.iter().all(|f| f.matches(row)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(row)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Ordering applied to a `select`.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}

/// Shaping for a list read: filter, order, row cap.
///
/// There is no cursor pagination; rows beyond the cap are invisible.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    pub filter: Option<Filter>,
    pub order: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn order_asc(mut self, column: impl Into<String>) -> Self {
        self.order = Some(OrderBy {
            column: column.into(),
            direction: Direction::Ascending,
        });
        self
    }

    pub fn order_desc(mut self, column: impl Into<String>) -> Self {
        self.order = Some(OrderBy {
            column: column.into(),
            direction: Direction::Descending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// What happened to a row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A single change-feed event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "event_type")]
    pub kind: ChangeKind,
    pub collection: String,
    /// Row state before the change (updates and deletes).
    #[serde(default)]
    pub old: Option<Value>,
    /// Row state after the change (inserts and updates).
    #[serde(default)]
    pub new: Option<Value>,
}

impl ChangeEvent {
    /// The row to inspect for filtering: `new` when present, else `old`.
    pub fn payload(&self) -> Option<&Value> {
        self.new.as_ref().or(self.old.as_ref())
    }

    /// The id of the affected record, when the payload carries one.
    pub fn record_id(&self) -> Option<&str> {
        self.payload().and_then(|v| v.get("id")).and_then(Value::as_str)
    }
}

/// Generic collection API over the hosted backend.
pub trait DataBackend: Send + Sync {
    fn select(
        &self,
        collection: &str,
        query: Query,
    ) -> impl Future<Output = Result<Vec<Value>, StoreError>> + Send;

    fn insert(
        &self,
        collection: &str,
        row: Value,
    ) -> impl Future<Output = Result<Value, StoreError>> + Send;

    fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
    ) -> impl Future<Output = Result<Value, StoreError>> + Send;

    fn upsert(
        &self,
        collection: &str,
        row: Value,
    ) -> impl Future<Output = Result<Value, StoreError>> + Send;

    fn delete(
        &self,
        collection: &str,
        filter: Filter,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Change-feed side of a backend.
pub trait ChangeFeed: Send + Sync {
    /// Open a subscription on a collection. A `server_filter` narrows
    /// delivery at the source; without one the feed is whole-collection and
    /// the consumer narrows client-side.
    fn changes(&self, collection: &str, server_filter: Option<Filter>) -> Subscription;
}

/// Fired whenever the auth session changes; `None` means signed out.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthEvent {
    pub session: Option<AuthSession>,
}

/// Metadata supplied at sign-up and stored on the identity.
#[derive(Clone, Debug, PartialEq)]
pub struct SignUpMetadata {
    pub full_name: String,
    pub role: Role,
}

/// Result of a sign-up: the identity always, a session only when the
/// backend minted one in the same step.
#[derive(Clone, Debug, PartialEq)]
pub struct SignUpOutcome {
    pub user: AuthUser,
    pub session: Option<AuthSession>,
}

/// The auth subsystem contract.
pub trait AuthBackend: Send + Sync {
    /// The currently persisted session, if any.
    fn current_session(
        &self,
    ) -> impl Future<Output = Result<Option<AuthSession>, AuthError>> + Send;

    fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: SignUpMetadata,
    ) -> impl Future<Output = Result<SignUpOutcome, AuthError>> + Send;

    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<AuthSession, AuthError>> + Send;

    fn sign_out(&self) -> impl Future<Output = Result<(), AuthError>> + Send;

    /// Subscribe to future session changes (login, logout, token refresh).
    fn auth_events(&self) -> broadcast::Receiver<AuthEvent>;
}
