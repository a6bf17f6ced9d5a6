//! `agora history`: read recent messages straight from the store.

use std::path::Path;

use agora_core::store::MessageStore;
use agora_infra::sqlite::chat::SqliteMessageStore;
use agora_types::chat::ChatEvent;
use agora_types::config::AgoraConfig;
use console::style;

use crate::state::open_database;

/// Print the newest `limit` messages, oldest first.
pub async fn show_history(
    config: &AgoraConfig,
    data_dir: &Path,
    limit: u32,
    json: bool,
) -> anyhow::Result<()> {
    let pool = open_database(config, data_dir).await?;
    let store = SqliteMessageStore::new(pool.clone());
    let events = store.recent(limit).await?;
    pool.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&events)?);
        return Ok(());
    }

    if events.is_empty() {
        println!();
        println!("  {}", style("No messages yet.").dim());
        println!();
        return Ok(());
    }

    println!();
    for event in &events {
        println!("  {}", format_line(event));
    }
    println!();
    Ok(())
}

fn format_line(event: &ChatEvent) -> String {
    format!(
        "{} {}: {}",
        style(event.timestamp().format("%Y-%m-%d %H:%M:%S")).dim(),
        style(event.sender()).cyan().bold(),
        event.body()
    )
}
