use async_trait::async_trait;
use thiserror::Error;

use tripchat_types::events::ChatEvent;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("event bus is closed")]
    Closed,
    #[error("publish timed out")]
    Timeout,
}

/// Delivers an event to every current subscriber of `trip_id`.
///
/// Delivery is at-least-once from the caller's point of view; subscribers
/// deduplicate on `event.id`.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, trip_id: &str, event: &ChatEvent) -> Result<(), PublishError>;
}
