//! In-memory backend for tests, demos, and offline fallback.
//!
//! Implements all three backend contracts faithfully enough to run the
//! gateway, the realtime layer, and the session machine end-to-end with no
//! network: per-collection row vectors behind a mutex, broadcast change
//! fan-out, and a toy credential table for the auth calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::backend::{
    AuthBackend, AuthEvent, ChangeEvent, ChangeFeed, ChangeKind, DataBackend, Direction, Filter,
    Query, SignUpMetadata, SignUpOutcome,
};
use crate::error::{AuthError, StoreError};
use crate::models::{AuthSession, AuthUser, UserMetadata};
use crate::realtime::Subscription;

const FEED_CAPACITY: usize = 256;

#[derive(Clone, Debug)]
struct Account {
    password: String,
    user: AuthUser,
}

/// In-memory implementation of [`DataBackend`], [`ChangeFeed`], and
/// [`AuthBackend`].
#[derive(Clone)]
pub struct MemoryBackend {
    collections: Arc<Mutex<HashMap<String, Vec<Value>>>>,
    feeds: Arc<Mutex<HashMap<String, broadcast::Sender<ChangeEvent>>>>,
    accounts: Arc<Mutex<HashMap<String, Account>>>,
    session: Arc<Mutex<Option<AuthSession>>>,
    auth_tx: broadcast::Sender<AuthEvent>,
    /// When false, sign-up creates the identity without minting a session,
    /// mimicking backends that require a follow-up sign-in.
    auto_session: bool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        let (auth_tx, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            collections: Arc::default(),
            feeds: Arc::default(),
            accounts: Arc::default(),
            session: Arc::default(),
            auth_tx,
            auto_session: true,
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sign-up will create the identity but not a session; callers must
    /// sign in as a second step.
    pub fn with_deferred_sessions(mut self) -> Self {
        self.auto_session = false;
        self
    }

    fn emit(&self, collection: &str, event: ChangeEvent) {
        let feeds = self.feeds.lock().unwrap();
        if let Some(tx) = feeds.get(collection) {
            let _ = tx.send(event);
        }
    }

    fn mint_session(&self, user: AuthUser) -> AuthSession {
        let session = AuthSession {
            user,
            access_token: Uuid::new_v4().to_string(),
            expires_at: None,
        };
        *self.session.lock().unwrap() = Some(session.clone());
        let _ = self.auth_tx.send(AuthEvent {
            session: Some(session.clone()),
        });
        session
    }
}

fn cmp_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering::*;
    match (a, b) {
        (Value::Null, Value::Null) => Equal,
        (Value::Null, _) => Less,
        (_, Value::Null) => Greater,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            x.as_f64().partial_cmp(&y.as_f64()).unwrap_or(Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => Equal,
    }
}

fn now_stamp() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
}

impl DataBackend for MemoryBackend {
    async fn select(&self, collection: &str, query: Query) -> Result<Vec<Value>, StoreError> {
        let mut rows: Vec<Value> = {
            let collections = self.collections.lock().unwrap();
            let rows = collections.get(collection).cloned().unwrap_or_default();
            match &query.filter {
                Some(filter) => rows.into_iter().filter(|r| filter.matches(r)).collect(),
                None => rows,
            }
        };

        if let Some(order) = &query.order {
            let column = order.column.clone();
            rows.sort_by(|a, b| {
                let av = a.get(&column).unwrap_or(&Value::Null);
                let bv = b.get(&column).unwrap_or(&Value::Null);
                match order.direction {
                    Direction::Ascending => cmp_values(av, bv),
                    Direction::Descending => cmp_values(bv, av),
                }
            });
        }

        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(&self, collection: &str, row: Value) -> Result<Value, StoreError> {
        let mut row = row;
        let obj = row
            .as_object_mut()
            .ok_or_else(|| StoreError::Rejected("row must be a JSON object".into()))?;
        if !obj.contains_key("id") {
            obj.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
        }
        if !obj.contains_key("created_at") {
            obj.insert("created_at".into(), now_stamp());
        }

        self.collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .push(row.clone());

        self.emit(
            collection,
            ChangeEvent {
                kind: ChangeKind::Insert,
                collection: collection.to_string(),
                old: None,
                new: Some(row.clone()),
            },
        );
        Ok(row)
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<Value, StoreError> {
        let patch = patch
            .as_object()
            .cloned()
            .ok_or_else(|| StoreError::Rejected("patch must be a JSON object".into()))?;

        let (old, new) = {
            let mut collections = self.collections.lock().unwrap();
            let rows = collections
                .get_mut(collection)
                .ok_or_else(|| StoreError::Rejected(format!("no record {id} in {collection}")))?;
            let row = rows
                .iter_mut()
                .find(|r| r.get("id").and_then(Value::as_str) == Some(id))
                .ok_or_else(|| StoreError::Rejected(format!("no record {id} in {collection}")))?;
            let old = row.clone();
            if let Some(obj) = row.as_object_mut() {
                for (k, v) in patch {
                    obj.insert(k, v);
                }
            }
            (old, row.clone())
        };

        self.emit(
            collection,
            ChangeEvent {
                kind: ChangeKind::Update,
                collection: collection.to_string(),
                old: Some(old),
                new: Some(new.clone()),
            },
        );
        Ok(new)
    }

    async fn upsert(&self, collection: &str, row: Value) -> Result<Value, StoreError> {
        let id = row.get("id").and_then(Value::as_str).map(str::to_string);
        if let Some(id) = id {
            let exists = {
                let collections = self.collections.lock().unwrap();
                collections
                    .get(collection)
                    .map(|rows| {
                        rows.iter()
                            .any(|r| r.get("id").and_then(Value::as_str) == Some(id.as_str()))
                    })
                    .unwrap_or(false)
            };
            if exists {
                return self.update(collection, &id, row).await;
            }
        }
        self.insert(collection, row).await
    }

    async fn delete(&self, collection: &str, filter: Filter) -> Result<(), StoreError> {
        let removed: Vec<Value> = {
            let mut collections = self.collections.lock().unwrap();
            let Some(rows) = collections.get_mut(collection) else {
                return Ok(());
            };
            let (gone, kept): (Vec<Value>, Vec<Value>) =
                rows.drain(..).partition(|r| filter.matches(r));
            *rows = kept;
            gone
        };

        for old in removed {
            self.emit(
                collection,
                ChangeEvent {
                    kind: ChangeKind::Delete,
                    collection: collection.to_string(),
                    old: Some(old),
                    new: None,
                },
            );
        }
        Ok(())
    }
}

impl ChangeFeed for MemoryBackend {
    fn changes(&self, collection: &str, server_filter: Option<Filter>) -> Subscription {
        let rx = {
            let mut feeds = self.feeds.lock().unwrap();
            feeds
                .entry(collection.to_string())
                .or_insert_with(|| broadcast::channel(FEED_CAPACITY).0)
                .subscribe()
        };
        let sub = Subscription::from_receiver(rx);
        match server_filter {
            // Applied at the feed edge; this stands in for the backend's
            // own channel filter, not for consumer narrowing.
            Some(filter) => {
                sub.narrowed(move |ev| ev.payload().map(|v| filter.matches(v)).unwrap_or(false))
            }
            None => sub,
        }
    }
}

impl AuthBackend for MemoryBackend {
    async fn current_session(&self) -> Result<Option<AuthSession>, AuthError> {
        Ok(self.session.lock().unwrap().clone())
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: SignUpMetadata,
    ) -> Result<SignUpOutcome, AuthError> {
        let user = {
            let mut accounts = self.accounts.lock().unwrap();
            if accounts.contains_key(email) {
                return Err(AuthError::EmailTaken);
            }
            let user = AuthUser {
                id: Uuid::new_v4().to_string(),
                email: email.to_string(),
                user_metadata: UserMetadata {
                    full_name: Some(metadata.full_name.clone()),
                    role: Some(metadata.role),
                },
            };
            accounts.insert(
                email.to_string(),
                Account {
                    password: password.to_string(),
                    user: user.clone(),
                },
            );
            user
        };

        let session = if self.auto_session {
            Some(self.mint_session(user.clone()))
        } else {
            None
        };
        Ok(SignUpOutcome { user, session })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let user = {
            let accounts = self.accounts.lock().unwrap();
            let account = accounts.get(email).ok_or(AuthError::InvalidCredentials)?;
            if account.password != password {
                return Err(AuthError::InvalidCredentials);
            }
            account.user.clone()
        };
        Ok(self.mint_session(user))
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        *self.session.lock().unwrap() = None;
        let _ = self.auth_tx.send(AuthEvent { session: None });
        Ok(())
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.auth_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use serde_json::json;

    #[tokio::test]
    async fn insert_assigns_id_and_created_at() {
        let backend = MemoryBackend::new();
        let row = backend
            .insert("projects", json!({"title": "Logo", "client_id": "c1"}))
            .await
            .unwrap();

        assert!(row.get("id").and_then(Value::as_str).is_some());
        assert!(row.get("created_at").and_then(Value::as_str).is_some());
    }

    #[tokio::test]
    async fn select_applies_filter_order_and_limit() {
        let backend = MemoryBackend::new();
        for (title, status) in [("a", "open"), ("b", "draft"), ("c", "open"), ("d", "open")] {
            backend
                .insert("projects", json!({"title": title, "status": status}))
                .await
                .unwrap();
        }

        let rows = backend
            .select(
                "projects",
                Query::new()
                    .filter(Filter::eq("status", "open"))
                    .order_desc("title")
                    .limit(2),
            )
            .await
            .unwrap();

        let titles: Vec<&str> = rows.iter().map(|r| r["title"].as_str().unwrap()).collect();
        assert_eq!(titles, vec!["d", "c"]);
    }

    #[tokio::test]
    async fn update_merges_patch_and_keeps_other_fields() {
        let backend = MemoryBackend::new();
        let row = backend
            .insert("projects", json!({"title": "Logo", "status": "draft"}))
            .await
            .unwrap();
        let id = row["id"].as_str().unwrap();

        let updated = backend
            .update("projects", id, json!({"status": "completed"}))
            .await
            .unwrap();
        assert_eq!(updated["status"], "completed");
        assert_eq!(updated["title"], "Logo");
    }

    #[tokio::test]
    async fn update_unknown_id_is_rejected() {
        let backend = MemoryBackend::new();
        backend
            .insert("projects", json!({"title": "x"}))
            .await
            .unwrap();
        let err = backend
            .update("projects", "missing", json!({"status": "open"}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
    }

    #[tokio::test]
    async fn upsert_inserts_then_updates() {
        let backend = MemoryBackend::new();
        let first = backend
            .upsert("profiles", json!({"id": "u1", "full_name": "Ada"}))
            .await
            .unwrap();
        assert_eq!(first["full_name"], "Ada");

        backend
            .upsert("profiles", json!({"id": "u1", "full_name": "Ada L."}))
            .await
            .unwrap();
        let rows = backend.select("profiles", Query::new()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["full_name"], "Ada L.");
    }

    #[tokio::test]
    async fn change_feed_delivers_writes_with_server_filter() {
        let backend = MemoryBackend::new();
        let mut sub = backend.changes("proposals", Some(Filter::eq("project_id", "p1")));

        backend
            .insert("proposals", json!({"project_id": "p2", "budget": 10}))
            .await
            .unwrap();
        backend
            .insert("proposals", json!({"project_id": "p1", "budget": 20}))
            .await
            .unwrap();

        let ev = sub.recv().await.unwrap();
        assert_eq!(ev.kind, ChangeKind::Insert);
        assert_eq!(ev.payload().unwrap()["project_id"], "p1");
    }

    #[tokio::test]
    async fn delete_emits_one_event_per_removed_row() {
        let backend = MemoryBackend::new();
        backend
            .insert("notifications", json!({"user_id": "u1"}))
            .await
            .unwrap();
        backend
            .insert("notifications", json!({"user_id": "u1"}))
            .await
            .unwrap();
        backend
            .insert("notifications", json!({"user_id": "u2"}))
            .await
            .unwrap();

        let mut sub = backend.changes("notifications", None);
        backend
            .delete("notifications", Filter::eq("user_id", "u1"))
            .await
            .unwrap();

        for _ in 0..2 {
            let ev = sub.recv().await.unwrap();
            assert_eq!(ev.kind, ChangeKind::Delete);
            assert_eq!(ev.payload().unwrap()["user_id"], "u1");
        }

        let rows = backend.select("notifications", Query::new()).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn auth_round_trip_emits_events() {
        let backend = MemoryBackend::new();
        let mut events = backend.auth_events();

        assert!(backend.current_session().await.unwrap().is_none());

        let outcome = backend
            .sign_up(
                "ada@example.com",
                "hunter2",
                SignUpMetadata {
                    full_name: "Ada".into(),
                    role: Role::Client,
                },
            )
            .await
            .unwrap();
        assert!(outcome.session.is_some());
        assert!(events.recv().await.unwrap().session.is_some());

        let dup = backend
            .sign_up(
                "ada@example.com",
                "other",
                SignUpMetadata {
                    full_name: "Ada".into(),
                    role: Role::Client,
                },
            )
            .await;
        assert!(matches!(dup, Err(AuthError::EmailTaken)));

        backend.sign_out().await.unwrap();
        assert!(events.recv().await.unwrap().session.is_none());
        assert!(backend.current_session().await.unwrap().is_none());

        let err = backend.sign_in("ada@example.com", "wrong").await;
        assert!(matches!(err, Err(AuthError::InvalidCredentials)));

        let session = backend.sign_in("ada@example.com", "hunter2").await.unwrap();
        assert_eq!(session.user.email, "ada@example.com");
        assert_eq!(session.user.user_metadata.role, Some(Role::Client));
    }

    #[tokio::test]
    async fn deferred_sessions_require_second_step() {
        let backend = MemoryBackend::new().with_deferred_sessions();
        let outcome = backend
            .sign_up(
                "bob@example.com",
                "pw",
                SignUpMetadata {
                    full_name: "Bob".into(),
                    role: Role::Freelancer,
                },
            )
            .await
            .unwrap();
        assert!(outcome.session.is_none());
        assert!(backend.current_session().await.unwrap().is_none());

        backend.sign_in("bob@example.com", "pw").await.unwrap();
        assert!(backend.current_session().await.unwrap().is_some());
    }
}
