//! Thumbnail pipeline for the photo wall.
//!
//! This module provides:
//! - `ThumbnailCache` - One instance per identity, bounded concurrent loading
//! - `ThumbnailFetcher` - Provider seam for dimensions + renderable handles
//! - `FsThumbnailFetcher` - Local-disk provider over a scanned tree

pub mod cache;
pub mod fetcher;

pub use cache::{
    CacheStats, LoadedThumbnail, Thumbnail, ThumbnailCache, ThumbnailCacheBuilder,
    ThumbnailHandle, ThumbnailKey, ThumbnailState, DEFAULT_CONCURRENCY_LIMIT,
};
pub use fetcher::{FetchFuture, FsThumbnailFetcher, ThumbnailFetcher};
