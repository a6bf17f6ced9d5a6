//! Application state wiring the chat core to its adapters.
//!
//! The core components are generic over the store and bus ports; AppState
//! pins them to the SQLite store and the configured bus. It owns the single
//! session registry, the single bus listener, and the tracker of live
//! connection tasks.

use std::path::Path;
use std::sync::Arc;

use agora_core::backoff::BackoffPolicy;
use agora_core::handler::ChatSessionHandler;
use agora_core::listener::BusListener;
use agora_core::registry::SessionRegistry;
use agora_infra::bus::ConfiguredBus;
use agora_infra::config::{apply_env_overrides, database_url, load_config};
use agora_infra::sqlite::chat::SqliteMessageStore;
use agora_infra::sqlite::pool::DatabasePool;
use agora_types::config::AgoraConfig;
use tokio_util::task::TaskTracker;

/// Concrete type aliases for the core generics pinned to infra implementations.
pub type ConcreteChatHandler = ChatSessionHandler<SqliteMessageStore, ConfiguredBus>;

pub type ConcreteListener = BusListener<ConfiguredBus>;

/// Shared state for the server and CLI commands.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AgoraConfig>,
    pub db_pool: DatabasePool,
    pub bus: Arc<ConfiguredBus>,
    pub registry: Arc<SessionRegistry>,
    pub chat_handler: Arc<ConcreteChatHandler>,
    pub listener: Arc<ConcreteListener>,
    /// One task per upgraded WebSocket connection, awaited at shutdown.
    pub connections: TaskTracker,
}

impl AppState {
    /// Connect to the DB and bus and wire every component.
    pub async fn from_config(config: AgoraConfig, data_dir: &Path) -> anyhow::Result<Self> {
        let db_pool = open_database(&config, data_dir).await?;
        let store = Arc::new(SqliteMessageStore::new(db_pool.clone()));
        let bus = Arc::new(ConfiguredBus::from_config(&config.bus).await?);
        let registry = Arc::new(SessionRegistry::new());

        let chat_handler = ChatSessionHandler::new(
            store,
            Arc::clone(&bus),
            Arc::clone(&registry),
            config.bus.channel.clone(),
        )
        .with_max_body_bytes(config.session.max_body_bytes);

        let listener = BusListener::new(
            Arc::clone(&bus),
            Arc::clone(&registry),
            config.bus.channel.clone(),
        )
        .with_backoff(BackoffPolicy::from_config(&config.listener));

        Ok(Self {
            config: Arc::new(config),
            db_pool,
            bus,
            registry,
            chat_handler: Arc::new(chat_handler),
            listener: Arc::new(listener),
            connections: TaskTracker::new(),
        })
    }
}

/// Config file plus `AGORA_*` environment overrides.
pub async fn load_effective_config(
    config_path: Option<&Path>,
    data_dir: &Path,
) -> anyhow::Result<AgoraConfig> {
    let mut config = load_config(config_path, data_dir).await?;
    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Open the message database, creating the data directory if needed.
pub async fn open_database(config: &AgoraConfig, data_dir: &Path) -> anyhow::Result<DatabasePool> {
    tokio::fs::create_dir_all(data_dir).await?;
    let db_url = database_url(config, data_dir);
    Ok(DatabasePool::new(&db_url).await?)
}
