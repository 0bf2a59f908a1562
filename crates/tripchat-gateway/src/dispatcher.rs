use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};
use tracing::debug;

use tripchat_types::events::ChatEvent;

use crate::publisher::{EventPublisher, PublishError};

pub const DEFAULT_BUFFER: usize = 1024;

/// Per-trip broadcast channels for chat events.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// trip_id -> sender. Entries are dropped once the last receiver is gone.
    trips: RwLock<HashMap<String, broadcast::Sender<ChatEvent>>>,
    buffer: usize,
    closed: AtomicBool,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_BUFFER)
    }

    /// `buffer` is the per-trip backlog a slow receiver may fall behind by
    /// before it starts missing events.
    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                trips: RwLock::new(HashMap::new()),
                buffer: buffer.max(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Subscribe to one trip's events.
    pub async fn subscribe(&self, trip_id: &str) -> broadcast::Receiver<ChatEvent> {
        let mut trips = self.inner.trips.write().await;
        trips
            .entry(trip_id.to_string())
            .or_insert_with(|| broadcast::channel(self.inner.buffer).0)
            .subscribe()
    }

    /// Send to a trip's subscribers. Returns how many receivers got it.
    pub async fn broadcast(&self, trip_id: &str, event: ChatEvent) -> Result<usize, PublishError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(PublishError::Closed);
        }

        let sent = {
            let trips = self.inner.trips.read().await;
            match trips.get(trip_id) {
                Some(tx) => tx.send(event).ok(),
                None => return Ok(0),
            }
        };

        match sent {
            Some(receivers) => Ok(receivers),
            None => {
                self.prune_trip(trip_id).await;
                Ok(0)
            }
        }
    }

    async fn prune_trip(&self, trip_id: &str) {
        let mut trips = self.inner.trips.write().await;
        if trips.get(trip_id).is_some_and(|tx| tx.receiver_count() == 0) {
            trips.remove(trip_id);
            debug!(trip_id, "pruned trip channel with no subscribers");
        }
    }

    /// Drop every trip channel that has no receivers left.
    pub async fn prune(&self) -> usize {
        let mut trips = self.inner.trips.write().await;
        let before = trips.len();
        trips.retain(|_, tx| tx.receiver_count() > 0);
        before - trips.len()
    }

    pub async fn subscriber_count(&self, trip_id: &str) -> usize {
        self.inner
            .trips
            .read()
            .await
            .get(trip_id)
            .map_or(0, |tx| tx.receiver_count())
    }

    pub async fn trip_count(&self) -> usize {
        self.inner.trips.read().await.len()
    }

    /// Refuse further publishes and disconnect all receivers.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.trips.write().await.clear();
    }
}

#[async_trait]
impl EventPublisher for Dispatcher {
    async fn publish(&self, trip_id: &str, event: &ChatEvent) -> Result<(), PublishError> {
        let receivers = self.broadcast(trip_id, event.clone()).await?;
        debug!(
            trip_id,
            event_type = event.event_type.as_str(),
            receivers,
            "chat event published"
        );
        Ok(())
    }
}
