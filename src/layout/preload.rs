//! Lookahead thumbnail warming.
//!
//! Runs inside the row loop on every node pull. When the fill position gets
//! within `buffer` children of the album's preload cursor, the next `lookahead`
//! children are requested from the cache and the preload cursor moves past them.
//! Requests are fire-and-forget; the row never waits on them.

use tracing::trace;

use crate::models::Album;
use crate::session::GenerationGuard;
use crate::thumbnails::ThumbnailCache;

/// Distance from the preload cursor at which the next batch is requested.
pub const DEFAULT_PRELOAD_BUFFER: usize = 5;

/// Number of children requested per batch.
pub const DEFAULT_PRELOAD_LOOKAHEAD: usize = 10;

/// Square thumbnails composing one album tile.
pub const DEFAULT_ALBUM_COMPOSITE: usize = 4;

#[derive(Debug, Clone)]
pub struct PreloadAdvisor {
    cache: ThumbnailCache,
    buffer: usize,
    lookahead: usize,
    composite: usize,
}

impl PreloadAdvisor {
    pub fn new(cache: ThumbnailCache) -> Self {
        Self {
            cache,
            buffer: DEFAULT_PRELOAD_BUFFER,
            lookahead: DEFAULT_PRELOAD_LOOKAHEAD,
            composite: DEFAULT_ALBUM_COMPOSITE,
        }
    }

    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer;
        self
    }

    pub fn with_lookahead(mut self, lookahead: usize) -> Self {
        self.lookahead = lookahead;
        self
    }

    pub fn with_composite(mut self, composite: usize) -> Self {
        self.composite = composite;
        self
    }

    pub fn lookahead(&self) -> usize {
        self.lookahead
    }

    /// Warms the cache ahead of `fill_cursor` and returns how many children
    /// were requested. Does nothing once `guard` is stale.
    pub fn advise(
        &self,
        album: &Album,
        fill_cursor: usize,
        lookahead: usize,
        guard: &GenerationGuard,
    ) -> usize {
        if !guard.is_current() || lookahead == 0 {
            return 0;
        }
        let cursor = album.cursor();
        if fill_cursor + self.buffer < cursor.preload || cursor.preload >= album.len() {
            return 0;
        }

        let end = (cursor.preload + lookahead).min(album.len());
        let batch = &album.children()[cursor.preload..end];
        for node in batch {
            for key in node.thumbnail_identities(self.composite) {
                self.cache.enqueue(&key);
            }
        }
        if album.advance_preload_if(end, || guard.is_current()).is_none() {
            trace!(
                album = album.path(),
                generation = guard.token(),
                "Preload went stale"
            );
            return 0;
        }

        trace!(
            album = album.path(),
            from = cursor.preload,
            to = end,
            generation = guard.token(),
            "Preloaded thumbnails"
        );
        batch.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::gallery::fixtures::{album_with_images, image_info};
    use crate::models::{AlbumBuilder, GalleryTree};
    use crate::session::Generation;
    use crate::testing::{settle, FakeFetcher};
    use crate::thumbnails::{
        FetchFuture, LoadedThumbnail, ThumbnailFetcher, ThumbnailHandle, ThumbnailKey,
    };

    #[tokio::test]
    async fn test_advise_requests_next_batch() {
        let fetcher = FakeFetcher::gated();
        let cache = ThumbnailCache::new(fetcher.clone());
        let tree = GalleryTree::new(album_with_images("/a", 30));
        let album = tree.root().as_album().unwrap();
        let generation = Generation::new();
        let guard = generation.guard();
        let advisor = PreloadAdvisor::new(cache.clone());

        assert_eq!(advisor.advise(album, 0, 10, &guard), 10);
        assert_eq!(album.cursor().preload, 10);
        assert_eq!(cache.len(), 10);

        // Still far from the preload cursor.
        assert_eq!(advisor.advise(album, 4, 10, &guard), 0);
        assert_eq!(album.cursor().preload, 10);

        // Within the buffer: next batch.
        assert_eq!(advisor.advise(album, 5, 10, &guard), 10);
        assert_eq!(album.cursor().preload, 20);

        // Requests are bounded by the cache, not by the advisor.
        settle().await;
        assert_eq!(fetcher.total_calls(), 3);
    }

    #[tokio::test]
    async fn test_advise_clamps_to_album_end() {
        let cache = ThumbnailCache::new(FakeFetcher::new());
        let tree = GalleryTree::new(album_with_images("/a", 7));
        let album = tree.root().as_album().unwrap();
        let guard = Generation::new().guard();
        let advisor = PreloadAdvisor::new(cache);

        assert_eq!(advisor.advise(album, 0, 10, &guard), 7);
        assert_eq!(album.cursor().preload, 7);
        assert_eq!(advisor.advise(album, 6, 10, &guard), 0);
    }

    #[tokio::test]
    async fn test_album_children_warm_square_composites() {
        let cache = ThumbnailCache::new(FakeFetcher::new());
        let root = AlbumBuilder::new("", "root")
            .sub_album(album_with_images("/trip", 6))
            .image(image_info("/cover.jpg"))
            .build();
        let tree = GalleryTree::new(root);
        let album = tree.root().as_album().unwrap();
        let guard = Generation::new().guard();

        PreloadAdvisor::new(cache.clone()).advise(album, 0, 10, &guard);

        assert!(cache
            .peek(&ThumbnailKey::new("/trip/3.jpg", true))
            .is_some());
        assert!(cache
            .peek(&ThumbnailKey::new("/trip/4.jpg", true))
            .is_none());
        assert!(cache
            .peek(&ThumbnailKey::new("/cover.jpg", false))
            .is_some());
        assert_eq!(cache.len(), 5);
    }

    #[tokio::test]
    async fn test_stale_guard_does_not_advance() {
        let cache = ThumbnailCache::new(FakeFetcher::new());
        let tree = GalleryTree::new(album_with_images("/a", 20));
        let album = tree.root().as_album().unwrap();
        let generation = Generation::new();
        let guard = generation.guard();
        generation.bump();

        let advisor = PreloadAdvisor::new(cache.clone());
        assert_eq!(advisor.advise(album, 0, 10, &guard), 0);
        assert_eq!(album.cursor().preload, 0);
        assert!(cache.is_empty());
    }

    /// Bumps the generation as soon as a fetch starts, so the guard goes stale
    /// between the requests and the cursor move.
    struct NavigatingFetcher {
        generation: Generation,
    }

    impl ThumbnailFetcher for NavigatingFetcher {
        fn fetch(&self, key: &ThumbnailKey) -> FetchFuture {
            self.generation.bump();
            let handle = ThumbnailHandle::new(key.file_id());
            Box::pin(async move {
                Ok(LoadedThumbnail {
                    width: 100,
                    height: 100,
                    handle,
                })
            })
        }
    }

    #[tokio::test]
    async fn test_navigation_during_batch_keeps_cursor() {
        let generation = Generation::new();
        let cache = ThumbnailCache::new(Arc::new(NavigatingFetcher {
            generation: generation.clone(),
        }));
        let tree = GalleryTree::new(album_with_images("/a", 20));
        let album = tree.root().as_album().unwrap();
        let guard = generation.guard();

        let advisor = PreloadAdvisor::new(cache);
        assert_eq!(advisor.advise(album, 0, 10, &guard), 0);
        assert!(!guard.is_current());
        assert_eq!(album.cursor().preload, 0);
    }
}
