#![forbid(unsafe_code)]

//! Axum backend exposing the creator-channel cache API.
//!
//! Four operations: list registered channels, register a channel, delete a
//! channel by storage id, and read a channel's curated videos by handle.
//! Reads are served from the SQLite cache; only a stale read or a
//! registration ever talks to the video platform.

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result, anyhow};
use axum::{
    Json, Router,
    extract::{Path as AxumPath, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get},
};
use channelhub::cache::{CacheCoordinator, ChannelVideos};
use channelhub::config::{RuntimeOverrides, resolve_runtime_config};
use channelhub::error::ChannelError;
use channelhub::security::ensure_not_root;
use channelhub::store::{ChannelRecord, ChannelStore};
use channelhub::youtube::YouTubeClient;
use serde::Deserialize;
use tokio::signal;
use tracing_subscriber::EnvFilter;

// SQLite database file relative to the data root.
const CHANNELS_DB_FILE: &str = "channels.db";

#[derive(Debug, Clone)]
struct BackendArgs {
    data_root: PathBuf,
    api_key: String,
    port: u16,
    listen_host: IpAddr,
    cache_ttl_secs: i64,
}

impl BackendArgs {
    fn parse() -> Result<Self> {
        Self::from_iter(std::env::args().skip(1))
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
        let mut port_override: Option<u16> = None;
        let mut host_override: Option<IpAddr> = None;
        let mut ttl_override: Option<i64> = None;
        let mut args = iter.into_iter();
        while let Some(arg) = args.next() {
            if let Some(value) = arg.strip_prefix("--data-root=") {
                data_root_override = Some(PathBuf::from(value));
                continue;
            }
            if let Some(value) = arg.strip_prefix("--port=") {
                port_override = Some(parse_port_arg(value)?);
                continue;
            }
            if let Some(value) = arg.strip_prefix("--host=") {
                host_override = Some(parse_host_arg(value)?);
                continue;
            }
            if let Some(value) = arg.strip_prefix("--cache-ttl=") {
                ttl_override = Some(parse_ttl_arg(value)?);
                continue;
            }

            match arg.as_str() {
                "--data-root" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--data-root requires a value"))?;
                    data_root_override = Some(PathBuf::from(value));
                }
                "--port" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--port requires a value"))?;
                    port_override = Some(parse_port_arg(&value)?);
                }
                "--host" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--host requires a value"))?;
                    host_override = Some(parse_host_arg(&value)?);
                }
                "--cache-ttl" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--cache-ttl requires a value"))?;
                    ttl_override = Some(parse_ttl_arg(&value)?);
                }
                _ => return Err(anyhow!("unknown argument: {arg}")),
            }
        }

        let config = resolve_runtime_config(RuntimeOverrides {
            data_root: data_root_override,
            port: port_override,
            host: None,
            cache_ttl_secs: ttl_override,
            ..RuntimeOverrides::default()
        })?;
        let config_host = parse_host_arg(&config.host)?;

        Ok(Self {
            data_root: config.data_root,
            api_key: config.api_key,
            port: config.port,
            listen_host: host_override.unwrap_or(config_host),
            cache_ttl_secs: config.cache_ttl_secs,
        })
    }
}

fn parse_port_arg(value: &str) -> Result<u16> {
    value
        .parse::<u16>()
        .context("expected a numeric port between 0 and 65535")
}

fn parse_host_arg(value: &str) -> Result<IpAddr> {
    value
        .parse::<IpAddr>()
        .context("expected a valid IPv4 or IPv6 address for --host/CHANNELHUB_HOST")
}

fn parse_ttl_arg(value: &str) -> Result<i64> {
    value
        .parse::<i64>()
        .ok()
        .filter(|ttl| *ttl >= 0)
        .context("expected a non-negative number of seconds for --cache-ttl")
}

/// Shared state injected into every Axum handler.
#[derive(Clone)]
struct AppState {
    coordinator: Arc<CacheCoordinator<YouTubeClient, ChannelStore>>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: message.into(),
        }
    }

    fn bad_gateway(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<ChannelError> for ApiError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::NotFound => Self::not_found("channel not found"),
            ChannelError::AlreadyRegistered(_) => Self::conflict(err.to_string()),
            ChannelError::PlatformUnavailable(_) => Self::bad_gateway(err.to_string()),
            ChannelError::Persistence(_) => Self::internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        let body = serde_json::json!({
            "error": self.message,
        });
        (self.status, headers, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[tokio::main]
async fn main() -> Result<()> {
    let BackendArgs {
        data_root,
        api_key,
        port,
        listen_host,
        cache_ttl_secs,
    } = BackendArgs::parse()?;

    ensure_not_root("backend")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let store = ChannelStore::open(&data_root.join(CHANNELS_DB_FILE))
        .await
        .context("initializing channel store")?;
    let coordinator =
        CacheCoordinator::with_ttl(YouTubeClient::new(api_key), store, cache_ttl_secs);

    let state = AppState {
        coordinator: Arc::new(coordinator),
    };

    let app = Router::new()
        .route("/api/channels", get(list_channels).post(register_channel))
        .route("/api/channels/{id}", delete(delete_channel))
        .route("/api/channel/{handle}/videos", get(channel_videos))
        .with_state(state);

    let addr = SocketAddr::new(listen_host, port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    tracing::info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    Ok(())
}

async fn shutdown_signal() {
    // We do not propagate this error up because it only affects graceful
    // shutdown; the process still terminates when Ctrl+C fires.
    if let Err(err) = signal::ctrl_c().await {
        eprintln!("Failed to install Ctrl+C handler: {}", err);
    }
}

async fn list_channels(State(state): State<AppState>) -> ApiResult<Json<Vec<ChannelRecord>>> {
    Ok(Json(state.coordinator.list_channels().await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterChannelRequest {
    handle: String,
    display_name: String,
}

async fn register_channel(
    State(state): State<AppState>,
    Json(payload): Json<RegisterChannelRequest>,
) -> ApiResult<(StatusCode, Json<ChannelRecord>)> {
    let handle = payload.handle.trim();
    let display_name = payload.display_name.trim();
    if handle.is_empty() || display_name.is_empty() {
        return Err(ApiError::bad_request("handle and displayName are required"));
    }

    let record = state
        .coordinator
        .register_channel(handle, display_name)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn delete_channel(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    state.coordinator.delete_channel(id).await?;
    Ok(Json(serde_json::json!({ "message": "channel removed" })))
}

async fn channel_videos(
    State(state): State<AppState>,
    AxumPath(handle): AxumPath<String>,
) -> ApiResult<Json<ChannelVideos>> {
    Ok(Json(state.coordinator.channel_videos(&handle).await?))
}
