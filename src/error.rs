//! Failure taxonomy shared by the cache coordinator and the HTTP surface.

use thiserror::Error;

/// Failures surfaced by channel operations.
///
/// Malformed upstream video data is deliberately absent from this list: a
/// bad duration token or a missing detail record is filtered out during
/// curation, never reported as an error.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Read or delete against a handle or id nobody registered.
    #[error("channel not found")]
    NotFound,

    /// Registration conflict: the handle already has a record.
    #[error("channel {0} is already registered")]
    AlreadyRegistered(String),

    /// Transport failure or timeout talking to the video platform. Callers
    /// may retry with backoff; this crate does not retry internally.
    #[error("video platform unavailable: {0}")]
    PlatformUnavailable(String),

    /// Failure reading from or writing to the channel store.
    #[error("channel store failure: {0:#}")]
    Persistence(anyhow::Error),
}
