//! Redis pub/sub bus.
//!
//! Publishes go through a `ConnectionManager`, which reconnects on its own
//! after a dropped connection. Each subscription opens a dedicated pub/sub
//! connection; when that connection is lost the stream ends and the bus
//! listener resubscribes.

use agora_core::bus::{BroadcastBus, EventStream};
use agora_types::chat::ChatEvent;
use agora_types::error::{BusError, CodecError};
use futures_util::StreamExt;
use redis::AsyncCommands;
use redis::Client;
use redis::aio::ConnectionManager;
use tracing::{debug, info};

/// [`BroadcastBus`] shared by every process connected to the same Redis.
#[derive(Clone)]
pub struct RedisBus {
    client: Client,
    publisher: ConnectionManager,
}

impl RedisBus {
    /// Connect to the Redis server at `redis_url`.
    ///
    /// Fails if the server cannot be reached now; later outages are handled
    /// by reconnecting.
    pub async fn connect(redis_url: &str) -> Result<Self, BusError> {
        let client = Client::open(redis_url)
            .map_err(|e| BusError::Connection(format!("invalid Redis URL: {e}")))?;
        let publisher = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| BusError::Connection(format!("Redis connection failed: {e}")))?;

        info!(url = %redact(redis_url), "connected to Redis broadcast bus");
        Ok(Self { client, publisher })
    }
}

impl std::fmt::Debug for RedisBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBus").finish_non_exhaustive()
    }
}

impl BroadcastBus for RedisBus {
    async fn publish(&self, channel: &str, event: &ChatEvent) -> Result<(), BusError> {
        let payload = event.to_wire()?;
        let mut conn = self.publisher.clone();

        let receivers: i64 = conn
            .publish(channel, payload)
            .await
            .map_err(|e| BusError::Publish {
                channel: channel.to_string(),
                reason: e.to_string(),
            })?;

        debug!(channel, event_id = %event.id(), receivers, "published chat event");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<EventStream, BusError> {
        let subscribe_err = |e: redis::RedisError| BusError::Subscribe {
            channel: channel.to_string(),
            reason: e.to_string(),
        };

        let mut pubsub = self.client.get_async_pubsub().await.map_err(subscribe_err)?;
        pubsub.subscribe(channel).await.map_err(subscribe_err)?;

        let stream = pubsub
            .into_on_message()
            .map(|msg| -> Result<ChatEvent, BusError> {
                let payload: String = msg
                    .get_payload()
                    .map_err(|e| CodecError::Decode(format!("payload is not text: {e}")))?;
                Ok(ChatEvent::from_wire(&payload)?)
            });

        Ok(Box::pin(stream))
    }
}

/// Strip credentials from a Redis URL before logging it.
fn redact(redis_url: &str) -> String {
    match redis_url.split_once("://") {
        Some((scheme, rest)) => match rest.rsplit_once('@') {
            Some((_, host)) => format!("{scheme}://***@{host}"),
            None => redis_url.to_string(),
        },
        None => redis_url.to_string(),
    }
}
