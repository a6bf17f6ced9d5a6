//! Configuration types for Agora.
//!
//! `AgoraConfig` represents the top-level `agora.toml`. Every section and
//! field has a default, so an empty file (or no file) is a valid config.

use serde::{Deserialize, Serialize};

use crate::chat::CHAT_CHANNEL;

/// Top-level configuration for an Agora server process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgoraConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub listener: ListenerConfig,
}

/// Listening address for the WebSocket endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Message store location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite URL. When unset, `{data_dir}/agora.db` is used.
    #[serde(default)]
    pub url: Option<String>,
}

/// Which broadcast bus implementation to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    /// In-process bus. Fan-out reaches only this process's clients.
    #[default]
    Memory,
    /// Redis PUBLISH/SUBSCRIBE shared by every server process.
    Redis,
}

impl std::str::FromStr for BusBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(BusBackend::Memory),
            "redis" => Ok(BusBackend::Redis),
            other => Err(format!("unknown bus backend '{other}' (expected memory or redis)")),
        }
    }
}

impl std::fmt::Display for BusBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusBackend::Memory => f.write_str("memory"),
            BusBackend::Redis => f.write_str("redis"),
        }
    }
}

/// Broadcast bus settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default)]
    pub backend: BusBackend,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_channel")]
    pub channel: String,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_channel() -> String {
    CHAT_CHANNEL.to_string()
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            backend: BusBackend::default(),
            redis_url: default_redis_url(),
            channel: default_channel(),
        }
    }
}

/// Per-connection limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Largest accepted inbound frame, in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Outbound frames queued per client before broadcast starts dropping.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

fn default_max_body_bytes() -> usize {
    4096
}

fn default_outbound_buffer() -> usize {
    256
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: default_max_body_bytes(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

/// Resubscribe backoff for the bus listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerConfig {
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_initial_backoff_ms() -> u64 {
    250
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}
