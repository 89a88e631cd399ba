//! casa-cc - Chat collector
//!
//! Long-running service: keeps a session with the chat bridge open, stores
//! new group messages, and reconnects whenever the session drops. Stops
//! gracefully on Ctrl+C / SIGTERM.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use casa_cc::provider::BridgeProvider;
use casa_cc::{ChatCollector, SessionStore};
use casa_common::config::{chat_session_path, database_path, TomlConfig};

/// Command-line arguments for casa-cc
#[derive(Parser, Debug)]
#[command(name = "casa-cc")]
#[command(about = "Chat collector for Casa: stores group messages from a chat bridge")]
#[command(version)]
struct Args {
    /// Configuration file (default: <config dir>/casa/config.toml)
    #[arg(short, long, env = "CASA_CONFIG")]
    config: Option<PathBuf>,

    /// Folder holding the shared database and the saved chat session
    #[arg(short, long, env = "CASA_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Chat bridge address, overrides chat.bridge_addr
    #[arg(long, env = "CASA_BRIDGE_ADDR")]
    bridge_addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    casa_common::logging::init_tracing(&config.logging.level)?;

    if let Some(addr) = args.bridge_addr {
        config.chat.bridge_addr = addr;
    }
    config.validate_chat()?;

    info!("Starting casa-cc (Chat Collector) {}", env!("CARGO_PKG_VERSION"));

    let root_folder = config.resolve_root_folder(args.root_folder.as_deref());
    let db_path = database_path(&root_folder);
    info!("Database: {}", db_path.display());
    info!("Chat bridge: {}", config.chat.bridge_addr);

    let pool = casa_common::db::open_store(&db_path, &config.store)
        .await
        .context("Dedup store unreachable")?;

    let collector = ChatCollector::start(
        BridgeProvider::new(config.chat.bridge_addr.clone()),
        pool.clone(),
        &config.chat,
        SessionStore::new(chat_session_path(&root_folder)),
    );

    let request = casa_common::shutdown::wait_for_stop_request().await;
    info!(%request, "Stopping chat collector: closing session and draining queued messages");

    let stats = collector.stop().await;
    println!("Chat collector stopped: {}", stats);

    pool.close().await;
    Ok(())
}
