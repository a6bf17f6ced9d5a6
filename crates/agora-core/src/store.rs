//! Message store port.
//!
//! Durable append-only persistence for chat events. The infrastructure layer
//! (agora-infra) implements this trait with SQLite.

use agora_types::chat::ChatEvent;
use agora_types::error::StoreError;

/// Durable storage for chat events.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait MessageStore: Send + Sync {
    /// Append an event. Must be durable before returning `Ok`.
    fn append(
        &self,
        event: &ChatEvent,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// The most recent `limit` events, oldest first.
    fn recent(
        &self,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<ChatEvent>, StoreError>> + Send;
}
