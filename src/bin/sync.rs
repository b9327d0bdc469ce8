//! CLI entry point: one sync pass over every registered pair, or pair
//! management subcommands.
//!
//! Grounded on a tracing-subscriber/EnvFilter setup adapted to a `clap`
//! derive CLI rather than an axum server bootstrap: this binary runs one
//! pass and exits rather than serving requests.

use clap::{Parser, Subcommand};
use nextcloud_dav_sync::config::AppConfig;
use nextcloud_dav_sync::registry::Registry;
use nextcloud_dav_sync::state::StateStore;
use nextcloud_dav_sync::webdav::{DavClient, WebDAVConfig};
use nextcloud_dav_sync::orchestrator;

use anyhow::Result;

#[derive(Parser)]
#[command(name = "nextcloud-dav-sync", about = "Bidirectional Nextcloud WebDAV sync")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Runs one sync pass over every registered pair (default).
    Sync,
    /// Registers a new sync pair.
    AddPair {
        remote_root: String,
        local_root: String,
        #[arg(long, value_delimiter = ',', default_value = ".*")]
        extensions: Vec<String>,
    },
    /// Lists registered pairs.
    ListPairs,
    /// Removes a pair and its tracked state.
    RemovePair { id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let store = StateStore::open(&config.state_db_path).await?;
    let registry = Registry::new(store.pool().clone());

    match cli.command.unwrap_or(Command::Sync) {
        Command::Sync => run_sync(&config, &store, &registry).await?,
        Command::AddPair {
            remote_root,
            local_root,
            extensions,
        } => {
            let id = registry.add(&remote_root, &local_root, extensions).await?;
            println!("registered pair {id}: {remote_root} <-> {local_root}");
        }
        Command::ListPairs => {
            for pair in registry.list().await? {
                println!(
                    "{}: {} <-> {} [{}]",
                    pair.id,
                    pair.remote_root,
                    pair.local_root,
                    pair.allowed_extensions.join(",")
                );
            }
        }
        Command::RemovePair { id } => {
            registry.delete(id).await?;
            println!("removed pair {id}");
        }
    }

    Ok(())
}

async fn run_sync(config: &AppConfig, store: &StateStore, registry: &Registry) -> Result<()> {
    let client = DavClient::new(
        WebDAVConfig::new(
            config.server_url.clone(),
            config.username.clone(),
            config.password.clone(),
        )
        .with_timeout_seconds(config.http_timeout_seconds),
    )?;

    let summary = orchestrator::sync(
        &client,
        store,
        registry,
        &config.server_url,
        &config.username,
        config.max_concurrency,
    )
    .await?;

    tracing::info!(
        pairs = summary.pairs_synced,
        downloaded = summary.downloaded,
        uploaded = summary.uploaded,
        deleted_remote = summary.deleted_remote,
        deleted_local = summary.deleted_local,
        conflicts = summary.conflicts,
        failed = summary.failed_actions,
        "sync pass complete"
    );

    Ok(())
}
