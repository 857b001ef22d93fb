//! # Server-sent change feed
//!
//! [`SseFeed`] implements [`ChangeFeed`] by holding one event-stream
//! request per subscription against `/realtime/v1/changes`. Each `data:`
//! line decodes into a [`ChangeEvent`] and is forwarded into the standard
//! [`Subscription`] machinery; anything else on the stream (keepalives,
//! comments, partial noise) is ignored.
//!
//! A dropped connection is not retried: the reader task simply exits and
//! the subscription stops delivering until its owner remounts. Closing the
//! subscription aborts the reader.

use futures::StreamExt;
use tokio::sync::broadcast;

use store::backend::{ChangeEvent, ChangeFeed, Filter};
use store::realtime::Subscription;

use crate::auth::{bearer_token, SharedSession};
use crate::config::ApiConfig;
use crate::rest::filter_params;

const FEED_CAPACITY: usize = 256;

/// Decode one stream line; `None` for anything that is not a change event.
pub(crate) fn parse_event_line(line: &str) -> Option<ChangeEvent> {
    let data = line.strip_prefix("data:")?.trim();
    if data.is_empty() {
        return None;
    }
    match serde_json::from_str(data) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::debug!("ignoring undecodable change event: {e}");
            None
        }
    }
}

/// [`ChangeFeed`] over the hosted event-stream endpoint.
pub struct SseFeed {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    session: SharedSession,
}

impl SseFeed {
    pub(crate) fn new(http: reqwest::Client, config: &ApiConfig, session: SharedSession) -> Self {
        Self {
            http,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            session,
        }
    }
}

impl ChangeFeed for SseFeed {
    fn changes(&self, collection: &str, server_filter: Option<Filter>) -> Subscription {
        let mut params: Vec<(String, String)> =
            vec![("collection".into(), collection.to_string())];
        if let Some(filter) = &server_filter {
            params.extend(filter_params(filter));
        }

        let request = self
            .http
            .get(format!("{}/realtime/v1/changes", self.base_url))
            .query(&params)
            .header("apikey", &self.api_key)
            .header("Accept", "text/event-stream")
            .bearer_auth(bearer_token(&self.session, &self.api_key));

        let (tx, rx) = broadcast::channel(FEED_CAPACITY);
        let collection = collection.to_string();
        let reader = tokio::spawn(async move {
            let resp = match request.send().await {
                Ok(resp) if resp.status().is_success() => resp,
                Ok(resp) => {
                    tracing::error!("{collection} change feed refused: {}", resp.status());
                    return;
                }
                Err(e) => {
                    tracing::error!("{collection} change feed failed to open: {e}");
                    return;
                }
            };

            let mut stream = resp.bytes_stream();
            let mut buffer = String::new();
            while let Some(chunk) = stream.next().await {
                let Ok(bytes) = chunk else {
                    // dropped connection: stop delivering, no reconnect
                    tracing::warn!("{collection} change feed dropped");
                    return;
                };
                buffer.push_str(&String::from_utf8_lossy(&bytes));
                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim_end_matches('\r').to_string();
                    buffer.drain(..=pos);
                    if let Some(event) = parse_event_line(&line) {
                        if tx.send(event).is_err() {
                            // every subscriber is gone
                            return;
                        }
                    }
                }
            }
        });

        Subscription::from_receiver(rx).with_closer(move || {
            reader.abort();
            Ok(())
        })
    }
}
