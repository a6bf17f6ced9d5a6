//! Configuration loader for Agora.
//!
//! Reads `agora.toml` and layers environment overrides on top. The default
//! file lives in the data directory (`~/.agora/` in production); an explicit
//! `--config` path may be given instead.

use std::path::{Path, PathBuf};

use agora_types::config::{AgoraConfig, BusBackend};
use agora_types::error::ConfigError;

use crate::sqlite::pool::database_url_for;

pub const CONFIG_FILE_NAME: &str = "agora.toml";

pub const ENV_DATA_DIR: &str = "AGORA_DATA_DIR";
pub const ENV_REDIS_URL: &str = "AGORA_REDIS_URL";
pub const ENV_BUS_BACKEND: &str = "AGORA_BUS_BACKEND";
pub const ENV_DATABASE_URL: &str = "AGORA_DATABASE_URL";

/// Resolve the data directory.
///
/// Uses `AGORA_DATA_DIR` when set, otherwise `~/.agora`, otherwise `.agora`
/// in the current directory.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".agora");
    }

    PathBuf::from(".agora")
}

/// Load configuration.
///
/// With an explicit path the file must exist and parse. Without one,
/// `{data_dir}/agora.toml` is optional: a missing file yields defaults and a
/// malformed one logs a warning and yields defaults.
pub async fn load_config(
    explicit: Option<&Path>,
    data_dir: &Path,
) -> Result<AgoraConfig, ConfigError> {
    let config = match explicit {
        Some(path) => {
            let content = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| ConfigError::Read {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
            toml::from_str::<AgoraConfig>(&content).map_err(|e| ConfigError::Parse {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?
        }
        None => load_default_config(data_dir).await,
    };

    validate(&config)?;
    Ok(config)
}

async fn load_default_config(data_dir: &Path) -> AgoraConfig {
    let config_path = data_dir.join(CONFIG_FILE_NAME);

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No agora.toml found at {}, using defaults", config_path.display());
            return AgoraConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return AgoraConfig::default();
        }
    };

    match toml::from_str::<AgoraConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            AgoraConfig::default()
        }
    }
}

/// Apply `AGORA_*` environment overrides from the process environment.
pub fn apply_env_overrides(config: &mut AgoraConfig) -> Result<(), ConfigError> {
    apply_overrides(config, |key| std::env::var(key).ok())
}

/// Apply overrides read through `lookup`. Empty values are ignored.
pub fn apply_overrides(
    config: &mut AgoraConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(backend) = get(ENV_BUS_BACKEND) {
        config.bus.backend = backend
            .parse::<BusBackend>()
            .map_err(|e| ConfigError::Invalid(format!("{ENV_BUS_BACKEND}: {e}")))?;
    }
    if let Some(url) = get(ENV_REDIS_URL) {
        config.bus.redis_url = url;
    }
    if let Some(url) = get(ENV_DATABASE_URL) {
        config.database.url = Some(url);
    }
    Ok(())
}

/// SQLite URL to open: the configured one, or `{data_dir}/agora.db`.
pub fn database_url(config: &AgoraConfig, data_dir: &Path) -> String {
    config
        .database
        .url
        .clone()
        .unwrap_or_else(|| database_url_for(data_dir))
}

/// Reject values the server cannot run with.
pub fn validate(config: &AgoraConfig) -> Result<(), ConfigError> {
    if config.session.max_body_bytes == 0 {
        return Err(ConfigError::Invalid(
            "session.max_body_bytes must be greater than zero".to_string(),
        ));
    }
    if config.session.outbound_buffer == 0 {
        return Err(ConfigError::Invalid(
            "session.outbound_buffer must be greater than zero".to_string(),
        ));
    }
    if config.bus.channel.trim().is_empty() {
        return Err(ConfigError::Invalid("bus.channel must not be empty".to_string()));
    }
    if config.listener.initial_backoff_ms > config.listener.max_backoff_ms {
        return Err(ConfigError::Invalid(format!(
            "listener.initial_backoff_ms ({}) exceeds listener.max_backoff_ms ({})",
            config.listener.initial_backoff_ms, config.listener.max_backoff_ms
        )));
    }
    Ok(())
}
