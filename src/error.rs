//! Error types shared across the wall engine.
//!
//! Thumbnail errors are `Clone` because a single failed load is observed by
//! every caller that requested the same identity.

use thiserror::Error;

/// Failure reported by a [`ThumbnailFetcher`](crate::thumbnails::ThumbnailFetcher).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("source file not found: {0}")]
    NotFound(String),
    #[error("failed to decode thumbnail: {0}")]
    Decode(String),
    #[error("i/o error: {0}")]
    Io(String),
}

/// Terminal failure of a thumbnail load.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ThumbnailError {
    #[error("thumbnail fetch failed for {file_id}: {source}")]
    Fetch {
        file_id: String,
        #[source]
        source: FetchError,
    },
    #[error("thumbnail fetch for {file_id} timed out after {timeout_ms} ms")]
    TimedOut { file_id: String, timeout_ms: u64 },
    #[error("thumbnail load for {file_id} was abandoned before completing")]
    Abandoned { file_id: String },
}

/// Errors surfaced by [`ViewSession`](crate::session::ViewSession) navigation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no album at path {0}")]
    AlbumNotFound(String),
    #[error("{0} is an image, not an album")]
    NotAnAlbum(String),
}
