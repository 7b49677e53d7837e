//! Per-user agent stream lifecycle.
//!
//! An open stream is a registered hub entry, a receiver the SSE body drains,
//! and a heartbeat task feeding the same queue. Everything tears down from
//! the guard's `Drop`, so an abandoned SSE body cleans up on its own.

use chrono::{SecondsFormat, Utc};
use log::debug;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::Stream;
use uuid::Uuid;

use crate::auth::Identity;
use crate::protocol::Envelope;

use super::hub::{ChatHub, ConnectionId};

/// Stream key for a caller without credentials.
pub fn anonymous_key() -> String {
    format!("anon:{}", Uuid::new_v4())
}

/// Tears the stream down when the consumer goes away. Aborting the
/// heartbeat first means nothing can enqueue after unregistration.
struct StreamGuard {
    hub: Arc<ChatHub>,
    key: String,
    stream_id: ConnectionId,
    heartbeat: JoinHandle<()>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.heartbeat.abort();
        self.hub.unregister_user_stream(&self.key, self.stream_id);
        debug!("agent stream guard dropped for {}", self.key);
    }
}

/// The envelope sequence for one agent stream consumer.
pub struct EnvelopeStream {
    rx: mpsc::Receiver<Envelope>,
    _guard: StreamGuard,
}

impl Stream for EnvelopeStream {
    type Item = Envelope;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

fn rfc3339_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Open an agent stream for `key`.
///
/// The first envelope on the queue is always `connection`; after that a
/// heartbeat fires every `heartbeat_interval`. Both go through the stream's
/// single FIFO queue, so consumers observe connection, then heartbeats,
/// interleaved in order with any pushed messages.
pub fn open_envelope_stream(
    hub: Arc<ChatHub>,
    key: String,
    identity: Option<&Identity>,
    heartbeat_interval: Duration,
) -> EnvelopeStream {
    let (stream_id, rx) = hub.register_user_stream(&key);
    let authenticated = identity.is_some();

    let tx = hub.user_stream_sender(&key, stream_id);
    if let Some(tx) = &tx {
        let connected = Envelope::connected(
            authenticated,
            identity.map(|i| i.display_name.clone()),
        );
        // freshly registered queue, cannot be full
        let _ = tx.try_send(connected);
    }

    let heartbeat = tokio::spawn(async move {
        let Some(tx) = tx else { return };
        let mut ticker = tokio::time::interval(heartbeat_interval);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let envelope = Envelope::heartbeat(rfc3339_now(), authenticated);
            if tx.send(envelope).await.is_err() {
                break;
            }
        }
    });

    EnvelopeStream {
        rx,
        _guard: StreamGuard {
            hub,
            key,
            stream_id,
            heartbeat,
        },
    }
}
