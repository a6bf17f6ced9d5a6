//! In-process broadcast bus.
//!
//! One `tokio::sync::broadcast` channel per bus channel name. Payloads travel
//! in wire form so subscribers decode exactly what a Redis subscriber would.
//! Fan-out covers only the current process.

use agora_core::bus::{BroadcastBus, EventStream};
use agora_types::chat::ChatEvent;
use agora_types::error::BusError;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

/// Buffer size for each channel. A subscriber further behind than this
/// loses the oldest payloads.
const BROADCAST_BUFFER: usize = 1024;

/// Single-process [`BroadcastBus`] backed by tokio broadcast channels.
pub struct InMemoryBus {
    channel_senders: DashMap<String, broadcast::Sender<String>>,
    capacity: usize,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::with_capacity(BROADCAST_BUFFER)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channel_senders: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        self.channel_senders
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Publish an already-encoded payload. Returns the number of subscribers
    /// it reached.
    pub fn publish_raw(&self, channel: &str, payload: impl Into<String>) -> usize {
        // No subscribers is not an error.
        self.sender(channel).send(payload.into()).unwrap_or(0)
    }

    /// Number of live subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channel_senders
            .get(channel)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBus")
            .field("channels", &self.channel_senders.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl BroadcastBus for InMemoryBus {
    async fn publish(&self, channel: &str, event: &ChatEvent) -> Result<(), BusError> {
        let payload = event.to_wire()?;
        let reached = self.publish_raw(channel, payload);
        debug!(channel, event_id = %event.id(), reached, "published chat event");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<EventStream, BusError> {
        let mut rx = self.sender(channel).subscribe();
        let channel = channel.to_string();

        let stream = async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(payload) => {
                        yield ChatEvent::from_wire(&payload).map_err(BusError::from);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(channel = %channel, skipped, "subscriber lagged, payloads dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
