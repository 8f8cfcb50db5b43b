//! TTL-driven cache coordination between the HTTP surface, the curation
//! pipeline, and the channel store.

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::curation::{self, DiscoveryMode};
use crate::error::ChannelError;
use crate::store::{ChannelCacheStore, ChannelRecord, VideoSummary};
use crate::youtube::VideoPlatform;

/// Maximum age a cached video list may reach before the next read triggers
/// a refresh.
pub const DEFAULT_CACHE_TTL_SECS: i64 = 3600;

/// What a read returns: the resolved platform channel id plus the curated
/// long-form videos.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelVideos {
    pub channel_id: String,
    pub videos: Vec<VideoSummary>,
}

/// Owns the staleness policy. Every channel operation goes through here.
///
/// Both collaborators are injected so tests run against canned platform
/// responses and an in-memory store. Concurrent reads of the same stale
/// handle may each refresh independently; refresh is idempotent, so the
/// last writer simply wins.
pub struct CacheCoordinator<P, S> {
    platform: P,
    store: S,
    ttl: Duration,
}

impl<P: VideoPlatform, S: ChannelCacheStore> CacheCoordinator<P, S> {
    pub fn new(platform: P, store: S) -> Self {
        Self::with_ttl(platform, store, DEFAULT_CACHE_TTL_SECS)
    }

    /// A non-positive `ttl_secs` makes every read refresh.
    pub fn with_ttl(platform: P, store: S, ttl_secs: i64) -> Self {
        Self {
            platform,
            store,
            ttl: Duration::seconds(ttl_secs.max(0)),
        }
    }

    /// Cached read of a channel's current videos.
    ///
    /// Never registers a channel implicitly: an unknown handle is
    /// [`ChannelError::NotFound`]. A fresh record is served without any
    /// platform call; a stale one is re-curated first. When the platform is
    /// down the outage propagates instead of silently serving stale data;
    /// callers that prefer availability over freshness catch the error and
    /// retry with a relaxed TTL themselves.
    pub async fn channel_videos(&self, handle: &str) -> Result<ChannelVideos, ChannelError> {
        let record = self
            .store
            .get_by_handle(handle)
            .await
            .map_err(ChannelError::Persistence)?
            .ok_or(ChannelError::NotFound)?;

        if Utc::now() - record.last_updated < self.ttl {
            return Ok(ChannelVideos {
                channel_id: record.channel_id,
                videos: record.videos,
            });
        }

        info!(handle, "cached videos stale, refreshing");
        let videos = self.refresh(&record).await?;
        Ok(ChannelVideos {
            channel_id: record.channel_id,
            videos,
        })
    }

    /// Re-curates `record`'s videos and persists the result.
    ///
    /// The write is best-effort: the freshly curated list is returned even
    /// when the store rejects the update, so a transient write failure
    /// cannot degrade the read path. The channel id is never re-resolved
    /// here; the mapping from handle to channel id is fixed at registration.
    pub async fn refresh(&self, record: &ChannelRecord) -> Result<Vec<VideoSummary>, ChannelError> {
        let videos =
            curation::curate(&self.platform, &record.channel_id, DiscoveryMode::Broad).await?;

        let updated = ChannelRecord {
            videos: videos.clone(),
            last_updated: Utc::now(),
            ..record.clone()
        };
        if let Err(err) = self.store.upsert(&updated).await {
            warn!(
                handle = record.handle.as_str(),
                "failed to persist refreshed videos: {err:#}"
            );
        }

        Ok(videos)
    }

    /// Registers a creator channel: resolve the handle once, curate with
    /// tiered discovery, persist.
    ///
    /// Registration is create-only; re-registering an existing handle is a
    /// conflict and leaves the original record untouched. Zero curated
    /// videos still make a valid registration, but unlike the read path the
    /// write must succeed for the registration to count.
    pub async fn register_channel(
        &self,
        handle: &str,
        display_name: &str,
    ) -> Result<ChannelRecord, ChannelError> {
        if self
            .store
            .get_by_handle(handle)
            .await
            .map_err(ChannelError::Persistence)?
            .is_some()
        {
            return Err(ChannelError::AlreadyRegistered(handle.to_owned()));
        }

        let channel_id = self
            .platform
            .resolve_channel_id(handle)
            .await?
            .ok_or(ChannelError::NotFound)?;

        let videos = curation::curate(&self.platform, &channel_id, DiscoveryMode::Tiered).await?;
        if videos.is_empty() {
            info!(handle, "registered channel has no qualifying uploads yet");
        }

        let record = ChannelRecord {
            id: 0, // assigned by the store
            handle: handle.to_owned(),
            channel_id,
            display_name: display_name.to_owned(),
            videos,
            last_updated: Utc::now(),
        };
        self.store
            .upsert(&record)
            .await
            .map_err(ChannelError::Persistence)
    }

    /// Unconditional delete by storage id; no soft-delete.
    pub async fn delete_channel(&self, id: i64) -> Result<(), ChannelError> {
        let deleted = self
            .store
            .delete_by_id(id)
            .await
            .map_err(ChannelError::Persistence)?;
        if deleted { Ok(()) } else { Err(ChannelError::NotFound) }
    }

    /// All registered channels, for administrative display.
    pub async fn list_channels(&self) -> Result<Vec<ChannelRecord>, ChannelError> {
        self.store.list_all().await.map_err(ChannelError::Persistence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

    use chrono::{DateTime, TimeZone};

    use crate::store::ThumbnailSet;
    use crate::youtube::{DiscoveredVideo, DurationTier, SearchOptions, VideoDetails};

    /// In-memory store keyed by handle, mirroring the SQLite upsert
    /// semantics (stable ids, wholesale replacement). `fail_upserts` lets
    /// tests simulate a broken disk.
    struct StubStore {
        records: Mutex<HashMap<String, ChannelRecord>>,
        next_id: AtomicI64,
        fail_upserts: AtomicBool,
    }

    impl StubStore {
        fn new() -> Self {
            Self {
                records: Mutex::new(HashMap::new()),
                next_id: AtomicI64::new(1),
                fail_upserts: AtomicBool::new(false),
            }
        }

        fn stored(&self, handle: &str) -> Option<ChannelRecord> {
            self.records.lock().unwrap().get(handle).cloned()
        }

        fn seed(&self, record: ChannelRecord) {
            self.records
                .lock()
                .unwrap()
                .insert(record.handle.clone(), record);
        }
    }

    impl ChannelCacheStore for &StubStore {
        async fn get_by_handle(&self, handle: &str) -> anyhow::Result<Option<ChannelRecord>> {
            Ok(self.stored(handle))
        }

        async fn upsert(&self, record: &ChannelRecord) -> anyhow::Result<ChannelRecord> {
            if self.fail_upserts.load(Ordering::SeqCst) {
                anyhow::bail!("disk full");
            }
            let mut records = self.records.lock().unwrap();
            let mut stored = record.clone();
            if let Some(existing) = records.get(&record.handle) {
                stored.id = existing.id;
            } else {
                stored.id = self.next_id.fetch_add(1, Ordering::SeqCst);
            }
            records.insert(stored.handle.clone(), stored.clone());
            Ok(stored)
        }

        async fn list_all(&self) -> anyhow::Result<Vec<ChannelRecord>> {
            let mut records: Vec<ChannelRecord> =
                self.records.lock().unwrap().values().cloned().collect();
            records.sort_by(|a, b| a.handle.cmp(&b.handle));
            Ok(records)
        }

        async fn delete_by_id(&self, id: i64) -> anyhow::Result<bool> {
            let mut records = self.records.lock().unwrap();
            let before = records.len();
            records.retain(|_, record| record.id != id);
            Ok(records.len() < before)
        }
    }

    /// Canned platform with a search counter so freshness tests can assert
    /// that a fresh read makes zero network calls.
    struct StubPlatform {
        resolved: Option<String>,
        long: Vec<DiscoveredVideo>,
        medium: Vec<DiscoveredVideo>,
        broad: Vec<DiscoveredVideo>,
        details: HashMap<String, VideoDetails>,
        search_calls: AtomicUsize,
        searches: Mutex<Vec<SearchOptions>>,
        search_error: AtomicBool,
    }

    impl StubPlatform {
        fn new() -> Self {
            Self {
                resolved: Some("UC-stub".into()),
                long: Vec::new(),
                medium: Vec::new(),
                broad: Vec::new(),
                details: HashMap::new(),
                search_calls: AtomicUsize::new(0),
                searches: Mutex::new(Vec::new()),
                search_error: AtomicBool::new(false),
            }
        }

        fn with_long_form(mut self, ids: &[&str]) -> Self {
            for (index, id) in ids.iter().enumerate() {
                let minute = (ids.len() - index) as u32;
                let hit = DiscoveredVideo {
                    video_id: (*id).to_owned(),
                    published_at: published(minute),
                };
                self.broad.push(hit.clone());
                self.medium.push(hit);
                self.details.insert(
                    (*id).to_owned(),
                    VideoDetails {
                        duration: Some("PT12M".into()),
                        title: format!("Video {id}"),
                        description: String::new(),
                        thumbnails: ThumbnailSet::default(),
                        published_at: published(minute),
                    },
                );
            }
            self
        }
    }

    impl VideoPlatform for &StubPlatform {
        async fn resolve_channel_id(&self, _handle: &str) -> Result<Option<String>, ChannelError> {
            Ok(self.resolved.clone())
        }

        async fn search_recent_videos(
            &self,
            _channel_id: &str,
            options: SearchOptions,
        ) -> Result<Vec<DiscoveredVideo>, ChannelError> {
            if self.search_error.load(Ordering::SeqCst) {
                return Err(ChannelError::PlatformUnavailable("stubbed outage".into()));
            }
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            self.searches.lock().unwrap().push(options);
            let results = match options.duration_tier {
                Some(DurationTier::Long) => &self.long,
                Some(DurationTier::Medium) => &self.medium,
                None => &self.broad,
            };
            Ok(results.clone())
        }

        async fn fetch_video_details(
            &self,
            video_ids: &[String],
        ) -> Result<HashMap<String, VideoDetails>, ChannelError> {
            Ok(video_ids
                .iter()
                .filter_map(|id| self.details.get(id).map(|d| (id.clone(), d.clone())))
                .collect())
        }
    }

    fn published(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 20, 8, minute, 0).unwrap()
    }

    fn cached_record(handle: &str, age_secs: i64) -> ChannelRecord {
        ChannelRecord {
            id: 1,
            handle: handle.to_owned(),
            channel_id: "UC-stub".into(),
            display_name: "Creator".into(),
            videos: vec![VideoSummary {
                video_id: "cached".into(),
                title: "Cached video".into(),
                description: String::new(),
                thumbnails: ThumbnailSet::default(),
                published_at: published(0),
            }],
            last_updated: Utc::now() - Duration::seconds(age_secs),
        }
    }

    fn coordinator<'a>(
        platform: &'a StubPlatform,
        store: &'a StubStore,
    ) -> CacheCoordinator<&'a StubPlatform, &'a StubStore> {
        CacheCoordinator::new(platform, store)
    }

    #[tokio::test]
    async fn read_of_unregistered_handle_is_not_found() {
        let platform = StubPlatform::new();
        let store = StubStore::new();

        let err = coordinator(&platform, &store)
            .channel_videos("@ghost")
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::NotFound));
        assert_eq!(platform.search_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fresh_record_is_served_without_platform_calls() {
        let platform = StubPlatform::new().with_long_form(&["new"]);
        let store = StubStore::new();
        store.seed(cached_record("@creator", 3599));

        let result = coordinator(&platform, &store)
            .channel_videos("@creator")
            .await
            .unwrap();
        assert_eq!(result.channel_id, "UC-stub");
        assert_eq!(result.videos.len(), 1);
        assert_eq!(result.videos[0].video_id, "cached");
        assert_eq!(platform.search_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stale_record_triggers_exactly_one_refresh_cycle() {
        let platform = StubPlatform::new().with_long_form(&["new"]);
        let store = StubStore::new();
        store.seed(cached_record("@creator", 3601));
        let before = store.stored("@creator").unwrap().last_updated;

        let result = coordinator(&platform, &store)
            .channel_videos("@creator")
            .await
            .unwrap();
        assert_eq!(result.videos.len(), 1);
        assert_eq!(result.videos[0].video_id, "new");
        assert_eq!(platform.search_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            platform.searches.lock().unwrap()[0],
            SearchOptions {
                max_results: 25,
                duration_tier: None
            }
        );

        let stored = store.stored("@creator").unwrap();
        assert_eq!(stored.videos[0].video_id, "new");
        assert!(stored.last_updated > before);
    }

    /// Re-running a refresh against unchanged upstream data must produce an
    /// identical video list.
    #[tokio::test]
    async fn refresh_is_idempotent() {
        let platform = StubPlatform::new().with_long_form(&["a", "b"]);
        let store = StubStore::new();
        let record = cached_record("@creator", 3601);
        store.seed(record.clone());
        let coordinator = coordinator(&platform, &store);

        let first = coordinator.refresh(&record).await.unwrap();
        let second = coordinator.refresh(&record).await.unwrap();
        assert_eq!(first, second);
    }

    /// A broken store must not degrade the read path: the freshly curated
    /// list still comes back, not the stale one and not an error.
    #[tokio::test]
    async fn refresh_survives_persistence_failure() {
        let platform = StubPlatform::new().with_long_form(&["new"]);
        let store = StubStore::new();
        store.seed(cached_record("@creator", 3601));
        store.fail_upserts.store(true, Ordering::SeqCst);

        let result = coordinator(&platform, &store)
            .channel_videos("@creator")
            .await
            .unwrap();
        assert_eq!(result.videos.len(), 1);
        assert_eq!(result.videos[0].video_id, "new");

        // The stale row is still in place.
        let stored = store.stored("@creator").unwrap();
        assert_eq!(stored.videos[0].video_id, "cached");
    }

    #[tokio::test]
    async fn platform_outage_during_refresh_propagates() {
        let platform = StubPlatform::new();
        platform.search_error.store(true, Ordering::SeqCst);
        let store = StubStore::new();
        store.seed(cached_record("@creator", 3601));

        let err = coordinator(&platform, &store)
            .channel_videos("@creator")
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::PlatformUnavailable(_)));
    }

    #[tokio::test]
    async fn registration_uses_tier_fallback() {
        let platform = StubPlatform::new().with_long_form(&["a", "b", "c"]);
        let store = StubStore::new();

        let record = coordinator(&platform, &store)
            .register_channel("@creator", "Creator")
            .await
            .unwrap();
        assert!(record.id > 0);
        assert_eq!(record.channel_id, "UC-stub");
        assert_eq!(record.videos.len(), 3);

        // Long tier was empty, so exactly two searches went out.
        let searches = platform.searches.lock().unwrap().clone();
        assert_eq!(searches.len(), 2);
        assert_eq!(searches[0].duration_tier, Some(DurationTier::Long));
        assert_eq!(searches[1].duration_tier, Some(DurationTier::Medium));

        assert_eq!(store.stored("@creator").unwrap(), record);
    }

    #[tokio::test]
    async fn duplicate_registration_is_a_conflict() {
        let platform = StubPlatform::new().with_long_form(&["a"]);
        let store = StubStore::new();
        let coordinator = coordinator(&platform, &store);

        let original = coordinator
            .register_channel("@creator", "Creator")
            .await
            .unwrap();

        let err = coordinator
            .register_channel("@creator", "Impostor")
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::AlreadyRegistered(_)));
        assert_eq!(store.stored("@creator").unwrap(), original);
    }

    #[tokio::test]
    async fn registering_an_unknown_handle_is_not_found() {
        let mut platform = StubPlatform::new();
        platform.resolved = None;
        let store = StubStore::new();

        let err = coordinator(&platform, &store)
            .register_channel("@nobody", "Nobody")
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::NotFound));
        assert!(store.stored("@nobody").is_none());
    }

    /// A channel with no qualifying uploads yet is still validly
    /// registered, with an empty curated list.
    #[tokio::test]
    async fn registration_with_no_qualifying_videos_persists() {
        let platform = StubPlatform::new();
        let store = StubStore::new();

        let record = coordinator(&platform, &store)
            .register_channel("@quiet", "Quiet Creator")
            .await
            .unwrap();
        assert!(record.videos.is_empty());
        assert!(store.stored("@quiet").is_some());
    }

    /// Registration must not silently appear to succeed when the store
    /// rejects the write.
    #[tokio::test]
    async fn registration_persistence_failure_propagates() {
        let platform = StubPlatform::new().with_long_form(&["a"]);
        let store = StubStore::new();
        store.fail_upserts.store(true, Ordering::SeqCst);

        let err = coordinator(&platform, &store)
            .register_channel("@creator", "Creator")
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Persistence(_)));
    }

    #[tokio::test]
    async fn delete_removes_and_reports_missing() {
        let platform = StubPlatform::new().with_long_form(&["a"]);
        let store = StubStore::new();
        let coordinator = coordinator(&platform, &store);

        let record = coordinator
            .register_channel("@creator", "Creator")
            .await
            .unwrap();
        coordinator.delete_channel(record.id).await.unwrap();
        assert!(store.stored("@creator").is_none());

        let err = coordinator.delete_channel(record.id).await.unwrap_err();
        assert!(matches!(err, ChannelError::NotFound));
    }

    #[tokio::test]
    async fn list_channels_returns_every_record() {
        let platform = StubPlatform::new().with_long_form(&["a"]);
        let store = StubStore::new();
        let coordinator = coordinator(&platform, &store);

        coordinator
            .register_channel("@zulu", "Zulu")
            .await
            .unwrap();
        coordinator
            .register_channel("@alpha", "Alpha")
            .await
            .unwrap();

        let listed = coordinator.list_channels().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].handle, "@alpha");
        assert_eq!(listed[1].handle, "@zulu");
    }
}
