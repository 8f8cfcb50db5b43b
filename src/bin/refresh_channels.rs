#![forbid(unsafe_code)]

//! Helper binary that re-curates every registered channel in one pass.
//! Acts like a nightly cron job, so the first viewer of the day rarely
//! pays for a stale-cache refresh.

use anyhow::{Context, Result, anyhow};
use channelhub::cache::CacheCoordinator;
use channelhub::config::{RuntimeOverrides, resolve_runtime_config};
use channelhub::security::ensure_not_root;
use channelhub::store::{ChannelCacheStore, ChannelStore};
use channelhub::youtube::YouTubeClient;
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const CHANNELS_DB_FILE: &str = "channels.db";

#[derive(Debug, Clone)]
struct RefreshArgs {
    data_root: PathBuf,
    api_key: String,
}

impl RefreshArgs {
    fn parse() -> Result<Self> {
        Self::from_iter(env::args().skip(1))
    }

    #[cfg(test)]
    fn from_slice(values: &[&str]) -> Result<Self> {
        Self::from_iter(values.iter().map(|value| value.to_string()))
    }

    fn from_iter<I>(iter: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut data_root_override: Option<PathBuf> = None;
        let mut args = iter.into_iter();

        while let Some(arg) = args.next() {
            if let Some(value) = arg.strip_prefix("--data-root=") {
                data_root_override = Some(PathBuf::from(value));
                continue;
            }

            match arg.as_str() {
                "--data-root" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--data-root requires a value"))?;
                    data_root_override = Some(PathBuf::from(value));
                }
                _ => return Err(anyhow!("unknown argument: {arg}")),
            }
        }

        let config = resolve_runtime_config(RuntimeOverrides {
            data_root: data_root_override,
            ..RuntimeOverrides::default()
        })?;

        Ok(Self {
            data_root: config.data_root,
            api_key: config.api_key,
        })
    }
}

/// Loads every registered channel and runs the broad-discovery refresh on
/// each, one at a time. A failure on one channel only skips that channel.
#[tokio::main]
async fn main() -> Result<()> {
    ensure_not_root("refresh_channels")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let RefreshArgs { data_root, api_key } = RefreshArgs::parse()?;

    let store = ChannelStore::open(&data_root.join(CHANNELS_DB_FILE))
        .await
        .context("initializing channel store")?;

    let channels = store.list_all().await.context("listing channels")?;
    if channels.is_empty() {
        println!("No registered channels to refresh.");
        return Ok(());
    }

    println!("Library root: {}", data_root.display());
    println!("Found {} channel(s) to refresh.", channels.len());
    println!("Channels queued for refresh:");
    for channel in &channels {
        println!("  - {}", channel.handle);
    }

    let coordinator = CacheCoordinator::new(YouTubeClient::new(api_key), store);

    for (index, channel) in channels.iter().enumerate() {
        let current = index + 1;
        println!();
        println!(
            "[{}/{}] Refreshing channel: {}",
            current,
            channels.len(),
            channel.handle
        );

        match coordinator.refresh(channel).await {
            Ok(videos) => {
                println!(
                    "  Cached {} long-form video(s) for {}",
                    videos.len(),
                    channel.handle
                );
            }
            Err(err) => {
                eprintln!(
                    "  Warning: failed to refresh {}: {}",
                    channel.handle, err
                );
            }
        }
    }

    println!();
    println!("All channel refreshes complete.");

    Ok(())
}
