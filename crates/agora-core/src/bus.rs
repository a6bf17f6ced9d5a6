//! Broadcast bus port.
//!
//! A distributed publish/subscribe channel that keeps every server process's
//! clients in sync. Implementations live in agora-infra (in-process tokio
//! broadcast, Redis pub/sub).

use std::pin::Pin;

use agora_types::chat::ChatEvent;
use agora_types::error::BusError;
use futures_util::Stream;

/// Lazy, unbounded sequence of events from one subscription.
///
/// A `BusError` for which [`BusError::is_malformed`] holds marks one bad
/// payload; the subscription itself is still healthy. Any other error, or the
/// end of the stream, means the subscription was lost.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<ChatEvent, BusError>> + Send + 'static>>;

/// Distributed pub/sub for chat events.
pub trait BroadcastBus: Send + Sync {
    /// Publish an event to every subscriber of `channel`, in every process.
    fn publish(
        &self,
        channel: &str,
        event: &ChatEvent,
    ) -> impl std::future::Future<Output = Result<(), BusError>> + Send;

    /// Open a subscription to `channel`. Dropping the stream unsubscribes.
    fn subscribe(
        &self,
        channel: &str,
    ) -> impl std::future::Future<Output = Result<EventStream, BusError>> + Send;
}
