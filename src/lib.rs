#![forbid(unsafe_code)]

//! Creator-channel video metadata cache.
//!
//! Resolves creator handles against the video platform, curates each
//! channel's recent long-form uploads, and serves them from a SQLite-backed
//! cache with a one-hour staleness policy. Two binaries sit on top of this
//! library: `backend` exposes the HTTP API and `refresh_channels` re-curates
//! every registered channel in one pass.

pub mod cache;
pub mod config;
pub mod curation;
pub mod duration;
pub mod error;
pub mod security;
pub mod store;
pub mod youtube;
