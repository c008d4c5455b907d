use async_trait::async_trait;
use serde::Serialize;

use crate::CoreResult;

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> CoreResult<()>;
}

/// Fire-and-forget publish. State changes are already committed when events go
/// out, so a broker outage is logged and never fails the request.
pub async fn emit<T: Serialize>(publisher: &dyn EventPublisher, topic: &str, key: &str, event: &T) {
    let payload = match serde_json::to_string(event) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!("Failed to serialize {} event: {}", topic, e);
            return;
        }
    };
    if let Err(e) = publisher.publish(topic, key, &payload).await {
        tracing::warn!("Event {} for {} not published: {}", topic, key, e);
    }
}

pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, topic: &str, key: &str, _payload: &str) -> CoreResult<()> {
        tracing::debug!("Dropping event {} for {}", topic, key);
        Ok(())
    }
}
