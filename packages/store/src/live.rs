//! # Live view-model helpers
//!
//! The per-feature screens all follow one shape: fetch an initial list,
//! open a realtime subscription, refetch the whole list on any event, and
//! bound the loading state with a safety timeout. [`LiveList`] packages
//! that contract headlessly; views observe it through a `watch` channel.
//!
//! There is no incremental patching — a change notification triggers a
//! full refetch, which is acceptable for the small bounded lists this
//! system reads. Optimistic local appends are reconciled against the
//! realtime echo by stable record id ([`merge_by_id`]), never by array
//! position.
//!
//! [`conversations`] is the messaging view's client-side fold: it groups a
//! user's messages into conversations keyed by project id (when present)
//! or counterpart user id. The grouping is a UI aggregation only; nothing
//! persists it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::models::{Keyed, Message};
use crate::realtime::Subscription;

/// Replace-or-append by stable key. Two delivery paths for the same record
/// id collapse to a single entry.
pub fn merge_by_id<T: Keyed>(items: &mut Vec<T>, incoming: T) {
    match items.iter_mut().find(|i| i.key() == incoming.key()) {
        Some(slot) => *slot = incoming,
        None => items.push(incoming),
    }
}

/// Observable list state.
#[derive(Clone, Debug)]
pub struct ListState<T> {
    pub items: Vec<T>,
    pub loading: bool,
}

impl<T> Default for ListState<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            loading: true,
        }
    }
}

/// A self-refreshing list: initial fetch, refetch on every subscription
/// event, bounded loading. Tear down with [`close`](LiveList::close); the
/// subscription is closed and the timers stop.
pub struct LiveList<T> {
    state: Arc<watch::Sender<ListState<T>>>,
    alive: CancellationToken,
}

impl<T> Drop for LiveList<T> {
    fn drop(&mut self) {
        self.alive.cancel();
    }
}

impl<T: Keyed + Clone + Send + Sync + 'static> LiveList<T> {
    /// Spawn the driver. Must be called within a tokio runtime.
    pub fn start<F, Fut>(fetch: F, mut subscription: Subscription, load_timeout: Duration) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Vec<T>> + Send + 'static,
    {
        let (tx, _) = watch::channel(ListState::default());
        let state = Arc::new(tx);
        let alive = CancellationToken::new();

        let driver_state = state.clone();
        let driver_alive = alive.clone();
        tokio::spawn(async move {
            let items = fetch().await;
            if driver_alive.is_cancelled() {
                subscription.close();
                return;
            }
            driver_state.send_modify(|s| {
                s.items = items;
                s.loading = false;
            });

            loop {
                tokio::select! {
                    _ = driver_alive.cancelled() => break,
                    event = subscription.recv() => match event {
                        Some(_) => {
                            let items = fetch().await;
                            if driver_alive.is_cancelled() {
                                break;
                            }
                            driver_state.send_modify(|s| {
                                s.items = items;
                                s.loading = false;
                            });
                        }
                        None => break,
                    },
                }
            }
            subscription.close();
        });

        let guard_state = state.clone();
        let guard_alive = alive.clone();
        tokio::spawn(async move {
            let mut rx = guard_state.subscribe();
            let settled = async {
                loop {
                    if !rx.borrow_and_update().loading {
                        break;
                    }
                    if rx.changed().await.is_err() {
                        break;
                    }
                }
            };
            tokio::select! {
                _ = guard_alive.cancelled() => {}
                _ = settled => {}
                _ = tokio::time::sleep(load_timeout) => {
                    tracing::warn!("list fetch did not settle within {load_timeout:?}, showing what we have");
                    guard_state.send_modify(|s| s.loading = false);
                }
            }
        });

        Self { state, alive }
    }

    pub fn subscribe(&self) -> watch::Receiver<ListState<T>> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ListState<T> {
        self.state.borrow().clone()
    }

    /// Optimistic local merge, keyed by record id. The realtime echo of the
    /// same record later collapses into this entry instead of duplicating
    /// it.
    pub fn apply_local(&self, item: T) {
        self.state.send_modify(|s| merge_by_id(&mut s.items, item));
    }

    pub fn close(&self) {
        self.alive.cancel();
    }
}

/// One sidebar entry in the messaging view.
#[derive(Clone, Debug, PartialEq)]
pub struct Conversation {
    /// Project id when the thread is project-scoped, else the counterpart
    /// user id.
    pub id: String,
    pub last_message: String,
    pub last_message_time: Option<DateTime<Utc>>,
    pub unread_count: usize,
}

/// Fold a user's messages (newest first, as
/// [`Gateway::messages_for_user`](crate::Gateway::messages_for_user)
/// returns them) into deduplicated conversations, most recent first.
pub fn conversations(messages: &[Message], me: &str) -> Vec<Conversation> {
    let mut order: Vec<String> = Vec::new();
    let mut map: HashMap<String, Conversation> = HashMap::new();

    for message in messages {
        let conversation_id = match &message.project_id {
            Some(project_id) => project_id.clone(),
            None if message.sender_id == me => match &message.receiver_id {
                Some(receiver) => receiver.clone(),
                None => continue,
            },
            None => message.sender_id.clone(),
        };

        let unread = !message.is_read && message.sender_id != me;
        match map.get_mut(&conversation_id) {
            Some(conversation) => {
                if unread {
                    conversation.unread_count += 1;
                }
            }
            None => {
                order.push(conversation_id.clone());
                map.insert(
                    conversation_id.clone(),
                    Conversation {
                        id: conversation_id,
                        last_message: message.content.clone(),
                        last_message_time: message.created_at,
                        unread_count: usize::from(unread),
                    },
                );
            }
        }
    }

    order.into_iter().filter_map(|id| map.remove(&id)).collect()
}
