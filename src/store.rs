//! Channel cache persistence layer.
//!
//! All structs in this module mirror how channel records are serialized to
//! disk and exposed to the API. One row per registered creator channel,
//! keyed uniquely by handle; the curated video list is embedded as JSON.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use libsql::{Builder, Connection, Row, params};
use serde::{Deserialize, Serialize};

/// One preview image variant supplied by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// The small fixed set of preview variants the platform attaches to a video.
///
/// Opaque to the cache core; stored and served verbatim. Variants the
/// platform omits stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThumbnailSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Thumbnail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medium: Option<Thumbnail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<Thumbnail>,
}

/// One curated long-form video embedded in a channel record.
///
/// `published_at` comes straight from the platform and is kept only for
/// display and as the platform's own ordering signal; the cache never
/// re-sorts by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSummary {
    pub video_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub thumbnails: ThumbnailSet,
    pub published_at: DateTime<Utc>,
}

/// Row stored in the `channels` table.
///
/// `handle` and `channel_id` are immutable once registered; refresh only
/// ever replaces `videos` wholesale and advances `last_updated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRecord {
    /// Storage identifier, assigned by the database on first insert.
    pub id: i64,
    pub handle: String,
    pub channel_id: String,
    pub display_name: String,
    #[serde(default)]
    pub videos: Vec<VideoSummary>,
    pub last_updated: DateTime<Utc>,
}

/// Persistence operations the cache coordinator needs.
///
/// Kept as a trait so tests can swap in an in-memory store with injectable
/// failures instead of touching process-wide state.
pub trait ChannelCacheStore: Send + Sync {
    async fn get_by_handle(&self, handle: &str) -> Result<Option<ChannelRecord>>;

    /// Creates or fully replaces the record for `record.handle` and returns
    /// the row as stored, with its database id filled in.
    async fn upsert(&self, record: &ChannelRecord) -> Result<ChannelRecord>;

    async fn list_all(&self) -> Result<Vec<ChannelRecord>>;

    /// Removes the row with this storage id. Returns false when no such row
    /// exists.
    async fn delete_by_id(&self, id: i64) -> Result<bool>;
}

async fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        PRAGMA foreign_keys=ON;
        "#,
    )
    .await?;
    Ok(())
}

async fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS channels (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            handle TEXT NOT NULL UNIQUE,
            channel_id TEXT NOT NULL,
            display_name TEXT NOT NULL DEFAULT '',
            videos_json TEXT NOT NULL DEFAULT '[]',
            last_updated TEXT NOT NULL
        );
        "#,
    )
    .await?;
    Ok(())
}

/// SQLite-backed implementation of [`ChannelCacheStore`].
///
/// Every operation touches exactly one row, so single-statement atomicity is
/// all the consistency the coordinator relies on.
#[derive(Clone)]
pub struct ChannelStore {
    conn: Connection,
}

impl ChannelStore {
    /// Opens (and if necessary creates) the SQLite DB and ensures the
    /// expected schema exists.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating channel store directory {}", parent.display()))?;
        }

        let db = Builder::new_local(path)
            .build()
            .await
            .with_context(|| format!("opening channel store {}", path.display()))?;

        let conn = db.connect()?;
        configure_connection(&conn).await?;
        ensure_schema(&conn).await?;
        Ok(Self { conn })
    }
}

impl ChannelCacheStore for ChannelStore {
    async fn get_by_handle(&self, handle: &str) -> Result<Option<ChannelRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT id, handle, channel_id, display_name, videos_json, last_updated
                FROM channels
                WHERE handle = ?1
                "#,
            )
            .await?;

        let mut rows = stmt.query([handle]).await?;
        if let Some(row) = rows.next().await? {
            Ok(Some(row_to_channel(&row)?))
        } else {
            Ok(None)
        }
    }

    async fn upsert(&self, record: &ChannelRecord) -> Result<ChannelRecord> {
        let videos_json =
            serde_json::to_string(&record.videos).context("serializing curated videos")?;

        self.conn
            .execute(
                r#"
                INSERT INTO channels (
                    handle, channel_id, display_name, videos_json, last_updated
                ) VALUES (
                    :handle, :channel_id, :display_name, :videos_json, :last_updated
                )
                ON CONFLICT(handle) DO UPDATE SET
                    channel_id = excluded.channel_id,
                    display_name = excluded.display_name,
                    videos_json = excluded.videos_json,
                    last_updated = excluded.last_updated
                "#,
                params![
                    record.handle.as_str(),
                    record.channel_id.as_str(),
                    record.display_name.as_str(),
                    videos_json,
                    record.last_updated.to_rfc3339(),
                ],
            )
            .await?;

        self.get_by_handle(&record.handle)
            .await?
            .context("re-reading channel row after upsert")
    }

    async fn list_all(&self) -> Result<Vec<ChannelRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT id, handle, channel_id, display_name, videos_json, last_updated
                FROM channels
                ORDER BY handle ASC
                "#,
            )
            .await?;

        let mut rows = stmt.query(params![]).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(row_to_channel(&row)?);
        }
        Ok(records)
    }

    async fn delete_by_id(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM channels WHERE id = ?1", params![id])
            .await?;
        Ok(affected > 0)
    }
}

/// Converts a SQL row into a `ChannelRecord`, deserializing the embedded
/// video list and re-parsing the RFC 3339 refresh timestamp.
fn row_to_channel(row: &Row) -> Result<ChannelRecord> {
    // Column order must match the SELECT statements above.
    let videos_json: String = row.get(4)?;
    let videos: Vec<VideoSummary> =
        serde_json::from_str(&videos_json).context("parsing stored videos JSON")?;

    let last_updated_raw: String = row.get(5)?;
    let last_updated = DateTime::parse_from_rfc3339(&last_updated_raw)
        .context("parsing stored last_updated timestamp")?
        .with_timezone(&Utc);

    Ok(ChannelRecord {
        id: row.get(0)?,
        handle: row.get(1)?,
        channel_id: row.get(2)?,
        display_name: row.get(3)?,
        videos,
        last_updated,
    })
}
