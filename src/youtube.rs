//! YouTube Data API v3 client for channel resolution and video discovery.
//!
//! The cache core only needs three operations, captured by the
//! [`VideoPlatform`] trait: resolve a creator handle to the platform's
//! channel id, list a channel's recent uploads, and batch-fetch video
//! details. [`YouTubeClient`] is the real implementation; tests substitute
//! canned stubs through the trait.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::error::ChannelError;
use crate::store::ThumbnailSet;

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Upper bound on any single platform call. A request that exceeds it is
/// indistinguishable from the platform being down.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Coarse platform-side length classes used to broaden discovery when a
/// narrower search comes back empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationTier {
    /// Roughly "longer than 20 minutes".
    Long,
    /// Roughly "4 to 20 minutes".
    Medium,
}

impl DurationTier {
    fn query_value(self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Medium => "medium",
        }
    }
}

/// Parameters for one recent-videos search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    pub max_results: u32,
    /// `None` asks the platform for uploads of any length.
    pub duration_tier: Option<DurationTier>,
}

/// One search hit, in the platform's own most-recent-first order.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredVideo {
    pub video_id: String,
    pub published_at: DateTime<Utc>,
}

/// Detail payload for a single video from the batched lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoDetails {
    /// Compact duration token, absent when the platform omitted it.
    pub duration: Option<String>,
    pub title: String,
    pub description: String,
    pub thumbnails: ThumbnailSet,
    pub published_at: DateTime<Utc>,
}

/// The slice of the video platform the cache core depends on.
///
/// The platform is untrusted: rate-limited, occasionally empty-returning,
/// and allowed to silently drop ids from the batched detail lookup. Only
/// transport-level trouble surfaces as an error.
pub trait VideoPlatform: Send + Sync {
    /// Exact-match resolution of a creator handle. `Ok(None)` means the
    /// platform does not know the handle; an ambiguous answer is a hard
    /// failure, never a guess.
    async fn resolve_channel_id(&self, handle: &str) -> Result<Option<String>, ChannelError>;

    /// Lists recent uploads for a channel, most recent first. An empty
    /// result is normal (quota or indexing limitations), not an error.
    async fn search_recent_videos(
        &self,
        channel_id: &str,
        options: SearchOptions,
    ) -> Result<Vec<DiscoveredVideo>, ChannelError>;

    /// Batched detail lookup. Ids absent from the returned map are
    /// unavailable and must be dropped by the caller.
    async fn fetch_video_details(
        &self,
        video_ids: &[String],
    ) -> Result<HashMap<String, VideoDetails>, ChannelError>;
}

/// Client for the public YouTube Data API using a static API key.
///
/// ureq blocks, so the async trait methods hop onto the blocking pool for
/// the actual request. The agent enforces [`REQUEST_TIMEOUT`] on every call.
#[derive(Clone)]
pub struct YouTubeClient {
    agent: ureq::Agent,
    api_key: String,
}

impl YouTubeClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self {
            agent,
            api_key: api_key.into(),
        }
    }

    fn resolve_blocking(&self, handle: &str) -> Result<Option<String>, ChannelError> {
        let response: ChannelListResponse = self
            .agent
            .get(&format!("{API_BASE}/channels"))
            .query("part", "id")
            .query("forHandle", handle.trim_start_matches('@'))
            .query("key", &self.api_key)
            .call()
            .map_err(platform_unavailable)?
            .into_json()
            .map_err(|err| ChannelError::PlatformUnavailable(err.to_string()))?;

        match response.items.as_slice() {
            [] => Ok(None),
            [item] => Ok(Some(item.id.clone())),
            items => Err(ChannelError::PlatformUnavailable(format!(
                "handle {handle} resolved to {} channels",
                items.len()
            ))),
        }
    }

    fn search_blocking(
        &self,
        channel_id: &str,
        options: SearchOptions,
    ) -> Result<Vec<DiscoveredVideo>, ChannelError> {
        let mut request = self
            .agent
            .get(&format!("{API_BASE}/search"))
            .query("part", "snippet")
            .query("channelId", channel_id)
            .query("maxResults", &options.max_results.to_string())
            .query("order", "date")
            .query("type", "video")
            .query("key", &self.api_key);
        if let Some(tier) = options.duration_tier {
            request = request.query("videoDuration", tier.query_value());
        }

        let response: SearchListResponse = request
            .call()
            .map_err(platform_unavailable)?
            .into_json()
            .map_err(|err| ChannelError::PlatformUnavailable(err.to_string()))?;

        debug!(
            channel_id,
            returned_items = response.items.len(),
            "searched recent videos"
        );

        Ok(response
            .items
            .into_iter()
            .filter_map(|item| {
                // type=video should guarantee a videoId, but the API reserves
                // the right to omit it.
                let video_id = item.id.video_id?;
                Some(DiscoveredVideo {
                    video_id,
                    published_at: item.snippet.published_at,
                })
            })
            .collect())
    }

    fn details_blocking(
        &self,
        video_ids: &[String],
    ) -> Result<HashMap<String, VideoDetails>, ChannelError> {
        if video_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let response: VideoListResponse = self
            .agent
            .get(&format!("{API_BASE}/videos"))
            .query("part", "contentDetails,snippet")
            .query("id", &video_ids.join(","))
            .query("key", &self.api_key)
            .call()
            .map_err(platform_unavailable)?
            .into_json()
            .map_err(|err| ChannelError::PlatformUnavailable(err.to_string()))?;

        Ok(response
            .items
            .into_iter()
            .map(|item| {
                let details = VideoDetails {
                    duration: item.content_details.and_then(|details| details.duration),
                    title: item.snippet.title,
                    description: item.snippet.description,
                    thumbnails: item.snippet.thumbnails,
                    published_at: item.snippet.published_at,
                };
                (item.id, details)
            })
            .collect())
    }
}

impl VideoPlatform for YouTubeClient {
    async fn resolve_channel_id(&self, handle: &str) -> Result<Option<String>, ChannelError> {
        let client = self.clone();
        let handle = handle.to_owned();
        run_blocking(move || client.resolve_blocking(&handle)).await
    }

    async fn search_recent_videos(
        &self,
        channel_id: &str,
        options: SearchOptions,
    ) -> Result<Vec<DiscoveredVideo>, ChannelError> {
        let client = self.clone();
        let channel_id = channel_id.to_owned();
        run_blocking(move || client.search_blocking(&channel_id, options)).await
    }

    async fn fetch_video_details(
        &self,
        video_ids: &[String],
    ) -> Result<HashMap<String, VideoDetails>, ChannelError> {
        let client = self.clone();
        let video_ids = video_ids.to_vec();
        run_blocking(move || client.details_blocking(&video_ids)).await
    }
}

async fn run_blocking<T, F>(task: F) -> Result<T, ChannelError>
where
    F: FnOnce() -> Result<T, ChannelError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| ChannelError::PlatformUnavailable(format!("request task failed: {err}")))?
}

fn platform_unavailable(err: ureq::Error) -> ChannelError {
    // Timeouts arrive here as transport errors and are treated the same.
    ChannelError::PlatformUnavailable(err.to_string())
}

#[derive(Debug, Deserialize)]
struct ChannelListResponse {
    #[serde(default)]
    items: Vec<ChannelItem>,
}

#[derive(Debug, Deserialize)]
struct ChannelItem {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SearchListResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: SearchSnippet,
}

#[derive(Debug, Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchSnippet {
    #[serde(rename = "publishedAt")]
    published_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    id: String,
    snippet: VideoSnippet,
    #[serde(rename = "contentDetails")]
    content_details: Option<ContentDetails>,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoSnippet {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    thumbnails: ThumbnailSet,
    #[serde(rename = "publishedAt")]
    published_at: DateTime<Utc>,
}
