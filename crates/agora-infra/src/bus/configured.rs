//! Bus selected at startup from `[bus]` in `agora.toml`.

use agora_core::bus::{BroadcastBus, EventStream};
use agora_types::chat::ChatEvent;
use agora_types::config::{BusBackend, BusConfig};
use agora_types::error::BusError;
use tracing::info;

use super::memory::InMemoryBus;
use super::redis::RedisBus;

/// Either bus adapter behind one concrete type, so the app state does not
/// need to be generic over the backend.
#[derive(Debug)]
pub enum ConfiguredBus {
    Memory(InMemoryBus),
    Redis(RedisBus),
}

impl ConfiguredBus {
    /// Build the bus named by `config.backend`.
    pub async fn from_config(config: &BusConfig) -> Result<Self, BusError> {
        let bus = match config.backend {
            BusBackend::Memory => ConfiguredBus::Memory(InMemoryBus::new()),
            BusBackend::Redis => ConfiguredBus::Redis(RedisBus::connect(&config.redis_url).await?),
        };
        info!(backend = %bus.backend(), channel = %config.channel, "broadcast bus ready");
        Ok(bus)
    }

    pub fn backend(&self) -> BusBackend {
        match self {
            ConfiguredBus::Memory(_) => BusBackend::Memory,
            ConfiguredBus::Redis(_) => BusBackend::Redis,
        }
    }
}

impl BroadcastBus for ConfiguredBus {
    async fn publish(&self, channel: &str, event: &ChatEvent) -> Result<(), BusError> {
        match self {
            ConfiguredBus::Memory(bus) => bus.publish(channel, event).await,
            ConfiguredBus::Redis(bus) => bus.publish(channel, event).await,
        }
    }

    async fn subscribe(&self, channel: &str) -> Result<EventStream, BusError> {
        match self {
            ConfiguredBus::Memory(bus) => bus.subscribe(channel).await,
            ConfiguredBus::Redis(bus) => bus.subscribe(channel).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use agora_types::identity::Identity;
    use futures_util::StreamExt;

    use super::*;

    #[tokio::test]
    async fn default_config_selects_memory_bus() {
        let bus = ConfiguredBus::from_config(&BusConfig::default()).await.unwrap();
        assert_eq!(bus.backend(), BusBackend::Memory);
    }

    #[tokio::test]
    async fn delegates_to_memory_bus() {
        let bus = ConfiguredBus::from_config(&BusConfig::default()).await.unwrap();
        let mut stream = bus.subscribe("chat").await.unwrap();
        let event = ChatEvent::new(Identity::parse("alice").unwrap(), "hello");

        bus.publish("chat", &event).await.unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap(), event);
    }

    #[tokio::test]
    async fn redis_backend_with_bad_url_fails() {
        let config = BusConfig {
            backend: BusBackend::Redis,
            redis_url: "not a url".to_string(),
            ..BusConfig::default()
        };
        let err = ConfiguredBus::from_config(&config).await.unwrap_err();
        assert!(matches!(err, BusError::Connection(_)));
    }
}
