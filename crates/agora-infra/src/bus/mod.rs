//! Broadcast bus adapters.
//!
//! - [`memory::InMemoryBus`]: per-channel tokio broadcast, single process.
//! - [`redis::RedisBus`]: Redis PUBLISH/SUBSCRIBE shared by every process.
//! - [`configured::ConfiguredBus`]: whichever of the two `agora.toml` selects.

pub mod configured;
pub mod memory;
pub mod redis;

pub use configured::ConfiguredBus;
pub use memory::InMemoryBus;
pub use self::redis::RedisBus;
