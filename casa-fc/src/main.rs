//! casa-fc - Forum collector
//!
//! Polls the configured forum channels once and stores new posts. Meant to be
//! invoked periodically by external scheduling (cron, systemd timer); overlapping
//! invocations are safe.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use casa_common::config::{database_path, TomlConfig};
use casa_common::ChannelFilter;
use casa_fc::{ForumClient, PolitenessGate, PullOrchestrator};

/// Command-line arguments for casa-fc
#[derive(Parser, Debug)]
#[command(name = "casa-fc")]
#[command(about = "Forum collector for Casa: one polling run over the configured channels")]
#[command(version)]
struct Args {
    /// Configuration file (default: <config dir>/casa/config.toml)
    #[arg(short, long, env = "CASA_CONFIG")]
    config: Option<PathBuf>,

    /// Folder holding the shared database
    #[arg(short, long, env = "CASA_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Poll these channels instead of the configured list (repeatable)
    #[arg(long = "channel")]
    channels: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    casa_common::logging::init_tracing(&config.logging.level)?;

    if !args.channels.is_empty() {
        config.forum.channels = args.channels;
    }
    config.validate_forum()?;

    info!("Starting casa-fc (Forum Collector) {}", env!("CARGO_PKG_VERSION"));

    let root_folder = config.resolve_root_folder(args.root_folder.as_deref());
    let db_path = database_path(&root_folder);
    info!("Database: {}", db_path.display());

    let pool = casa_common::db::open_store(&db_path, &config.store)
        .await
        .context("Dedup store unreachable")?;

    let client = ForumClient::new(&config.forum).context("Failed to build forum client")?;

    let orchestrator = PullOrchestrator::new(
        client,
        pool.clone(),
        config.forum.channels.clone(),
        config.forum.effective_batch_size(),
        ChannelFilter::new(&config.forum.allow_list),
        PolitenessGate::new(config.forum.channel_delay()),
    );

    // Finish the current channel on shutdown, skip the rest
    let cancel = CancellationToken::new();
    let stop_watcher = tokio::spawn(casa_common::shutdown::cancel_on_stop_request(cancel.clone()));

    let summary = orchestrator.run(&cancel).await;
    cancel.cancel();
    let _ = stop_watcher.await;
    println!("{}", summary);

    pool.close().await;
    Ok(())
}
