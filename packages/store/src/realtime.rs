//! # Realtime subscriptions
//!
//! [`Subscription`] wraps one change-feed channel: a consumer pulls events
//! with [`Subscription::recv`] and tears down with [`Subscription::close`].
//! Closing is idempotent and swallows backend errors — unmounting a view
//! mid-operation is normal, not a fault. A dropped feed simply stops
//! delivering; there is no reconnect.
//!
//! Delivery is two-stage: the backend feed is coarse (whole collection
//! unless a server-side equality filter was attached) and the consumer's
//! interest predicate narrows it after receipt. [`Realtime`] provides the
//! canned per-feature subscriptions, encoding which feeds carry a server
//! filter and which rely on client-side narrowing.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;

use crate::backend::{ChangeEvent, ChangeFeed, Filter};
use crate::error::StoreError;

type Narrow = Box<dyn Fn(&ChangeEvent) -> bool + Send + Sync>;
type Closer = Box<dyn FnOnce() -> Result<(), StoreError> + Send>;

/// A live change-feed handle: `subscribed` until [`close`](Self::close) or
/// channel shutdown, after which [`recv`](Self::recv) yields `None` forever.
pub struct Subscription {
    rx: Option<broadcast::Receiver<ChangeEvent>>,
    narrow: Option<Narrow>,
    closer: Option<Closer>,
}

impl Subscription {
    /// Wrap a raw broadcast receiver.
    pub fn from_receiver(rx: broadcast::Receiver<ChangeEvent>) -> Self {
        Self {
            rx: Some(rx),
            narrow: None,
            closer: None,
        }
    }

    /// Attach a backend-specific unsubscribe action, run once on close.
    pub fn with_closer(
        mut self,
        closer: impl FnOnce() -> Result<(), StoreError> + Send + 'static,
    ) -> Self {
        self.closer = Some(Box::new(closer));
        self
    }

    /// Add a client-side interest predicate. Composes with any predicate
    /// already attached; events must satisfy all of them.
    pub fn narrowed(
        mut self,
        predicate: impl Fn(&ChangeEvent) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.narrow = Some(match self.narrow.take() {
            Some(prev) => Box::new(move |ev| prev(ev) && predicate(ev)),
            None => Box::new(predicate),
        });
        self
    }

    /// Next event of interest, or `None` once the subscription is closed or
    /// the feed has shut down. Events that fail the interest predicate are
    /// skipped; lagged events are dropped silently.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(ev) => {
                    if self.narrow.as_ref().map_or(true, |p| p(&ev)) {
                        return Some(ev);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("change feed lagged, dropped {skipped} events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Tear down the subscription. Safe to call any number of times;
    /// unsubscribe errors are logged and swallowed.
    pub fn close(&mut self) {
        self.rx = None;
        if let Some(closer) = self.closer.take() {
            if let Err(e) = closer() {
                tracing::debug!("unsubscribe error ignored: {e}");
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.rx.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

fn field_is(ev: &ChangeEvent, field: &str, id: &str) -> bool {
    ev.payload()
        .and_then(|v| v.get(field))
        .and_then(Value::as_str)
        == Some(id)
}

/// Canned per-feature subscriptions over any [`ChangeFeed`].
pub struct Realtime<F> {
    feed: Arc<F>,
}

impl<F> Clone for Realtime<F> {
    fn clone(&self) -> Self {
        Self {
            feed: self.feed.clone(),
        }
    }
}

impl<F: ChangeFeed> Realtime<F> {
    pub fn new(feed: Arc<F>) -> Self {
        Self { feed }
    }

    /// All project changes (broad; consumers see every project).
    pub fn projects(&self) -> Subscription {
        self.feed.changes(crate::models::collections::PROJECTS, None)
    }

    /// Message changes involving the user. The feed is whole-collection;
    /// relevance is decided here, after receipt.
    pub fn messages_for_user(&self, user_id: &str) -> Subscription {
        let me = user_id.to_string();
        self.feed
            .changes(crate::models::collections::MESSAGES, None)
            .narrowed(move |ev| {
                field_is(ev, "sender_id", &me) || field_is(ev, "receiver_id", &me)
            })
    }

    /// Proposal changes for one project (server-side equality filter).
    pub fn proposals_for_project(&self, project_id: &str) -> Subscription {
        self.feed.changes(
            crate::models::collections::PROPOSALS,
            Some(Filter::eq("project_id", project_id)),
        )
    }

    /// Proposal changes for one freelancer (server-side equality filter).
    pub fn proposals_for_freelancer(&self, freelancer_id: &str) -> Subscription {
        self.feed.changes(
            crate::models::collections::PROPOSALS,
            Some(Filter::eq("freelancer_id", freelancer_id)),
        )
    }

    /// Invoice changes where the user is either party (client-side narrowed).
    pub fn invoices_for_user(&self, user_id: &str) -> Subscription {
        let me = user_id.to_string();
        self.feed
            .changes(crate::models::collections::INVOICES, None)
            .narrowed(move |ev| {
                field_is(ev, "client_id", &me) || field_is(ev, "freelancer_id", &me)
            })
    }

    /// Review changes where the user is reviewer or reviewee (client-side
    /// narrowed).
    pub fn reviews_for_user(&self, user_id: &str) -> Subscription {
        let me = user_id.to_string();
        self.feed
            .changes(crate::models::collections::REVIEWS, None)
            .narrowed(move |ev| {
                field_is(ev, "reviewer_id", &me) || field_is(ev, "reviewee_id", &me)
            })
    }

    /// Notification changes for the user (server-side equality filter).
    pub fn notifications_for_user(&self, user_id: &str) -> Subscription {
        self.feed.changes(
            crate::models::collections::NOTIFICATIONS,
            Some(Filter::eq("user_id", user_id)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ChangeKind;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn message_event(sender: &str, receiver: &str) -> ChangeEvent {
        ChangeEvent {
            kind: ChangeKind::Insert,
            collection: "messages".into(),
            old: None,
            new: Some(json!({"id": "m1", "sender_id": sender, "receiver_id": receiver})),
        }
    }

    #[tokio::test]
    async fn recv_skips_events_outside_the_interest_predicate() {
        let (tx, rx) = broadcast::channel(16);
        let mut sub = Subscription::from_receiver(rx)
            .narrowed(|ev| field_is(ev, "sender_id", "me") || field_is(ev, "receiver_id", "me"));

        tx.send(message_event("a", "b")).unwrap();
        tx.send(message_event("a", "me")).unwrap();
        drop(tx);

        let ev = sub.recv().await.unwrap();
        assert_eq!(ev.payload().unwrap()["receiver_id"], "me");
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_swallows_closer_errors() {
        let (_tx, rx) = broadcast::channel::<ChangeEvent>(4);
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();
        let mut sub = Subscription::from_receiver(rx).with_closer(move || {
            ran2.store(true, Ordering::SeqCst);
            Err(StoreError::Unavailable("channel already gone".into()))
        });

        sub.close();
        assert!(ran.load(Ordering::SeqCst));
        assert!(!sub.is_active());

        // second and third close are no-ops
        sub.close();
        sub.close();
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn recv_after_feed_shutdown_returns_none() {
        let (tx, rx) = broadcast::channel(4);
        let mut sub = Subscription::from_receiver(rx);
        tx.send(message_event("a", "b")).unwrap();
        drop(tx);

        assert!(sub.recv().await.is_some());
        assert!(sub.recv().await.is_none());
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn narrowing_composes() {
        let (tx, rx) = broadcast::channel(8);
        let mut sub = Subscription::from_receiver(rx)
            .narrowed(|ev| field_is(ev, "sender_id", "a"))
            .narrowed(|ev| field_is(ev, "receiver_id", "b"));

        tx.send(message_event("a", "x")).unwrap();
        tx.send(message_event("y", "b")).unwrap();
        tx.send(message_event("a", "b")).unwrap();
        drop(tx);

        let ev = sub.recv().await.unwrap();
        assert_eq!(ev.payload().unwrap()["sender_id"], "a");
        assert_eq!(ev.payload().unwrap()["receiver_id"], "b");
        assert!(sub.recv().await.is_none());
    }
}
