//! Discovery and filtering of a channel's recent long-form uploads.
//!
//! Curation is stateless: it reads from the platform and returns a value.
//! Caching and persistence are the coordinator's job.

use tracing::debug;

use crate::duration::{is_long_form, parse_duration};
use crate::error::ChannelError;
use crate::store::VideoSummary;
use crate::youtube::{DurationTier, SearchOptions, VideoPlatform};

/// Upper bound on the curated list embedded in a channel record.
pub const CURATED_VIDEO_LIMIT: usize = 3;

/// Registration search plan: narrow first, widen when the platform returns
/// nothing. An ordered attempt list instead of duplicated request code, so
/// tiers can be added or reordered in one place.
const TIERED_DISCOVERY: &[SearchOptions] = &[
    SearchOptions {
        max_results: 50,
        duration_tier: Some(DurationTier::Long),
    },
    SearchOptions {
        max_results: 50,
        duration_tier: Some(DurationTier::Medium),
    },
];

/// Refresh search plan: the channel already proved it has qualifying
/// content, so a single broader untiered search is enough.
const BROAD_DISCOVERY: &[SearchOptions] = &[SearchOptions {
    max_results: 25,
    duration_tier: None,
}];

/// How a curation run discovers candidate videos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMode {
    /// Registration path.
    Tiered,
    /// Routine refresh path.
    Broad,
}

impl DiscoveryMode {
    fn attempts(self) -> &'static [SearchOptions] {
        match self {
            Self::Tiered => TIERED_DISCOVERY,
            Self::Broad => BROAD_DISCOVERY,
        }
    }
}

/// Produces the filtered, size-bounded video list for one channel.
///
/// The first search attempt with results wins; one batched detail lookup
/// follows. Candidates are dropped when the platform omitted them from the
/// batch, when they carry no duration, or when they fall under the
/// short-form threshold. The survivors keep the platform's most-recent-first
/// order and are truncated to [`CURATED_VIDEO_LIMIT`].
///
/// An empty result is not an error: a channel may genuinely have no
/// qualifying uploads. Transport failures propagate so the caller can decide
/// between serving stale data and surfacing the outage.
pub async fn curate<P: VideoPlatform>(
    platform: &P,
    channel_id: &str,
    mode: DiscoveryMode,
) -> Result<Vec<VideoSummary>, ChannelError> {
    let mut discovered = Vec::new();
    for options in mode.attempts() {
        discovered = platform.search_recent_videos(channel_id, *options).await?;
        if !discovered.is_empty() {
            break;
        }
        debug!(channel_id, ?options, "search returned nothing, widening");
    }

    if discovered.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<String> = discovered
        .iter()
        .map(|video| video.video_id.clone())
        .collect();
    let mut details = platform.fetch_video_details(&ids).await?;

    // Walk in upstream order: the platform already sorts by publish date and
    // we must not re-rank.
    let mut curated = Vec::new();
    for candidate in &discovered {
        let Some(detail) = details.remove(&candidate.video_id) else {
            // Absent from the batch lookup means unavailable.
            continue;
        };
        let Some(token) = detail.duration.as_deref() else {
            // No reported duration: assume short-form.
            continue;
        };
        if !is_long_form(parse_duration(token)) {
            continue;
        }

        curated.push(VideoSummary {
            video_id: candidate.video_id.clone(),
            title: detail.title,
            description: detail.description,
            thumbnails: detail.thumbnails,
            published_at: detail.published_at,
        });
        if curated.len() == CURATED_VIDEO_LIMIT {
            break;
        }
    }

    Ok(curated)
}
