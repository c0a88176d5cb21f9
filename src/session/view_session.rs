//! Drives row building for the album currently on screen.
//!
//! A session owns one [`Generation`]. Entering an album, navigating away or
//! resetting the viewport bumps it; every fill loop captures a guard when it
//! starts and re-checks it under the state lock before committing a row. A row
//! that outlives its generation is dropped without touching the renderer or
//! the album's cursors.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::generation::Generation;
use super::renderer::Renderer;
use crate::config::WallConfig;
use crate::error::SessionError;
use crate::layout::{AlbumNodes, PreloadAdvisor, RowBuilder};
use crate::models::{GalleryNode, GalleryTree, RowState};
use crate::thumbnails::ThumbnailCache;

/// Visible area of the wall in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    pub scroll_top: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            scroll_top: 0.0,
        }
    }
}

/// Why a fill loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    /// No album is entered.
    NoAlbum,
    /// Another loop of the current generation is already running.
    AlreadyFilling,
    /// Loaded content reaches far enough below the viewport.
    Satisfied,
    /// Every child of the album has been placed.
    Exhausted,
    /// The generation changed while a row was being built.
    Cancelled,
}

/// Point-in-time view of the session state.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub generation: u64,
    pub album: Option<String>,
    pub viewport: Viewport,
    pub content_height: f32,
    pub rows: usize,
    pub exhausted: bool,
    pub filling: bool,
}

#[derive(Debug, Default)]
struct SessionState {
    album: Option<Arc<GalleryNode>>,
    viewport: Viewport,
    content_height: f32,
    rows: usize,
    exhausted: bool,
    /// Generation of the loop currently allowed to fill.
    filling: Option<u64>,
}

impl SessionState {
    fn wants_content(&self, fill_ahead_screens: f32) -> bool {
        self.content_height < self.viewport.scroll_top + fill_ahead_screens * self.viewport.height
    }

    fn clear_content(&mut self) {
        self.content_height = 0.0;
        self.rows = 0;
        self.exhausted = false;
    }

    fn release_fill(&mut self, token: u64) {
        if self.filling == Some(token) {
            self.filling = None;
        }
    }

    /// Decides whether the loop holding `token` stops after committing a row.
    /// Stopping releases the fill mark in the same critical section, so a
    /// scroll that arrives right after it starts a new loop.
    fn stop_after_commit(
        &mut self,
        token: u64,
        album_done: bool,
        fill_ahead_screens: f32,
    ) -> Option<FillOutcome> {
        let outcome = if album_done {
            self.exhausted = true;
            FillOutcome::Exhausted
        } else if !self.wants_content(fill_ahead_screens) {
            FillOutcome::Satisfied
        } else {
            return None;
        };
        self.release_fill(token);
        Some(outcome)
    }
}

/// Clears the in-progress mark when a fill loop ends, including when its task
/// is dropped mid-row.
struct FillingMark<'a> {
    state: &'a Mutex<SessionState>,
    token: u64,
}

impl Drop for FillingMark<'_> {
    fn drop(&mut self) {
        self.state.lock().release_fill(self.token);
    }
}

struct SessionInner {
    tree: Arc<GalleryTree>,
    cache: ThumbnailCache,
    builder: RowBuilder,
    advisor: PreloadAdvisor,
    renderer: Arc<dyn Renderer>,
    generation: Generation,
    fill_ahead_screens: f32,
    state: Mutex<SessionState>,
}

#[derive(Clone)]
pub struct ViewSession {
    inner: Arc<SessionInner>,
}

impl ViewSession {
    pub fn new(
        tree: Arc<GalleryTree>,
        cache: ThumbnailCache,
        renderer: Arc<dyn Renderer>,
        config: &WallConfig,
        viewport: Viewport,
    ) -> Self {
        let builder = RowBuilder::new(config.layout(), cache.clone());
        let advisor = PreloadAdvisor::new(cache.clone())
            .with_buffer(config.preload_buffer)
            .with_lookahead(config.preload_lookahead)
            .with_composite(config.album_composite);

        Self {
            inner: Arc::new(SessionInner {
                tree,
                cache,
                builder,
                advisor,
                renderer,
                generation: Generation::new(),
                fill_ahead_screens: config.fill_ahead_screens,
                state: Mutex::new(SessionState {
                    viewport,
                    ..SessionState::default()
                }),
            }),
        }
    }

    pub fn tree(&self) -> &Arc<GalleryTree> {
        &self.inner.tree
    }

    pub fn cache(&self) -> &ThumbnailCache {
        &self.inner.cache
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation.current()
    }

    pub fn current_album(&self) -> Option<Arc<GalleryNode>> {
        self.inner.state.lock().album.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.state.lock();
        SessionSnapshot {
            generation: self.inner.generation.current(),
            album: state.album.as_ref().map(|a| a.path().to_string()),
            viewport: state.viewport,
            content_height: state.content_height,
            rows: state.rows,
            exhausted: state.exhausted,
            filling: state.filling.is_some(),
        }
    }

    /// Switches the wall to the album at `path` and starts filling it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn enter_album(&self, path: &str) -> Result<JoinHandle<FillOutcome>, SessionError> {
        let node = self
            .inner
            .tree
            .node(path)
            .cloned()
            .ok_or_else(|| SessionError::AlbumNotFound(path.to_string()))?;
        let Some(album) = node.as_album() else {
            return Err(SessionError::NotAnAlbum(path.to_string()));
        };

        {
            let mut state = self.inner.state.lock();
            let generation = self.inner.generation.bump();
            album.reset_cursors();
            state.album = Some(Arc::clone(&node));
            state.viewport.scroll_top = 0.0;
            state.clear_content();
            self.inner.renderer.begin_album(&node, generation);
            debug!(
                album = path,
                generation,
                children = album.len(),
                "Entered album"
            );
        }

        Ok(self.spawn_fill())
    }

    /// Starts over on the current album: new generation, cursors back at the
    /// start, renderer cleared. Returns `None` when no album is entered.
    pub fn reset_viewport(&self) -> Option<JoinHandle<FillOutcome>> {
        let path = self.current_album()?.path().to_string();
        self.enter_album(&path).ok()
    }

    /// Invalidates all in-flight work and leaves the album.
    pub fn on_navigate_away(&self) {
        let mut state = self.inner.state.lock();
        let generation = self.inner.generation.bump();
        state.album = None;
        state.clear_content();
        debug!(generation, "Navigated away");
    }

    pub fn on_scroll(&self, scroll_top: f32) -> JoinHandle<FillOutcome> {
        self.inner.state.lock().viewport.scroll_top = scroll_top.max(0.0);
        self.spawn_fill()
    }

    /// Rows already placed keep their layout; only new rows use the new width.
    pub fn on_resize(&self, width: f32, height: f32) -> JoinHandle<FillOutcome> {
        {
            let mut state = self.inner.state.lock();
            state.viewport.width = width;
            state.viewport.height = height;
        }
        self.spawn_fill()
    }

    /// Pauses new thumbnail loads while a full-screen viewer is open.
    pub fn set_viewer_active(&self, active: bool) {
        self.inner.cache.set_paused(active);
    }

    fn spawn_fill(&self) -> JoinHandle<FillOutcome> {
        let session = self.clone();
        tokio::spawn(async move { session.fill_loop().await })
    }

    /// Builds rows until the viewport is satisfied, the album runs out, or the
    /// generation changes.
    pub async fn fill_loop(&self) -> FillOutcome {
        let inner = &self.inner;
        let (guard, album_node) = {
            let mut state = inner.state.lock();
            let guard = inner.generation.guard();
            let Some(album) = state.album.clone() else {
                return FillOutcome::NoAlbum;
            };
            if state.filling == Some(guard.token()) {
                return FillOutcome::AlreadyFilling;
            }
            if state.exhausted {
                return FillOutcome::Exhausted;
            }
            if !state.wants_content(inner.fill_ahead_screens) {
                return FillOutcome::Satisfied;
            }
            state.filling = Some(guard.token());
            (guard, album)
        };
        let _mark = FillingMark {
            state: &inner.state,
            token: guard.token(),
        };
        let Some(album) = album_node.as_album() else {
            return FillOutcome::NoAlbum;
        };

        loop {
            let target_width = inner.state.lock().viewport.width;
            let mut nodes = AlbumNodes::new(album, &guard).with_preload(&inner.advisor);
            let row = inner.builder.fill_row(target_width, &mut nodes).await;

            let mut state = inner.state.lock();
            if !guard.is_current() {
                trace!(
                    album = album.path(),
                    generation = guard.token(),
                    items = row.len(),
                    "Discarding row of stale generation"
                );
                return FillOutcome::Cancelled;
            }

            let cursor = inner.tree.advance_view(album, row.consumed());
            if !row.is_empty() {
                state.content_height += row.display_height();
                state.rows += 1;
                inner.renderer.append_row(&row, guard.token());
            }
            trace!(
                album = album.path(),
                view = cursor.view,
                preload = cursor.preload,
                content_height = state.content_height,
                "Committed row"
            );

            let album_done = row.state() == RowState::Exhausted
                || inner.tree.next_unviewed(album, 1).is_empty();
            if let Some(outcome) =
                state.stop_after_commit(guard.token(), album_done, inner.fill_ahead_screens)
            {
                if outcome == FillOutcome::Exhausted {
                    debug!(album = album.path(), rows = state.rows, "Album exhausted");
                }
                return outcome;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::gallery::fixtures::{album_with_images, image_info};
    use crate::models::AlbumBuilder;
    use crate::testing::{settle, FakeFetcher, RecordingRenderer};
    use crate::thumbnails::{ThumbnailCacheBuilder, ThumbnailKey};

    fn two_album_tree() -> Arc<GalleryTree> {
        let root = AlbumBuilder::new("", "root")
            .sub_album(album_with_images("/A", 40))
            .sub_album(album_with_images("/B", 40))
            .build();
        Arc::new(GalleryTree::new(root))
    }

    fn session(
        tree: Arc<GalleryTree>,
        fetcher: &Arc<FakeFetcher>,
        viewport: Viewport,
    ) -> (ViewSession, Arc<RecordingRenderer>) {
        let renderer = RecordingRenderer::new();
        let cache = ThumbnailCacheBuilder::new()
            .concurrency_limit(3)
            .build(fetcher.clone());
        let session = ViewSession::new(
            tree,
            cache,
            renderer.clone(),
            &WallConfig::default(),
            viewport,
        );
        (session, renderer)
    }

    /// Releases gated fetches until the fill task finishes.
    async fn drive(fetcher: &FakeFetcher, task: JoinHandle<FillOutcome>) -> FillOutcome {
        for _ in 0..500 {
            if task.is_finished() {
                break;
            }
            fetcher.release_all();
            settle().await;
        }
        task.await.unwrap()
    }

    fn view_cursor(tree: &GalleryTree, path: &str) -> usize {
        tree.album(path).unwrap().cursor().view
    }

    #[tokio::test]
    async fn test_fills_two_screens_then_more_on_scroll() {
        let tree = two_album_tree();
        let fetcher = FakeFetcher::new();
        let (session, renderer) = session(tree.clone(), &fetcher, Viewport::new(1000.0, 300.0));

        // Five squares per row, each row 204 * 1000 / 1024 high.
        let outcome = session.enter_album("/A").unwrap().await.unwrap();
        assert_eq!(outcome, FillOutcome::Satisfied);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.rows, 4);
        assert!(snapshot.content_height >= 600.0);
        assert!(!snapshot.filling);
        assert_eq!(view_cursor(&tree, "/A"), 20);
        assert!(renderer.rows.lock().iter().all(|r| r.paths.len() == 5));

        let outcome = session.on_scroll(500.0).await.unwrap();
        assert_eq!(outcome, FillOutcome::Satisfied);
        assert_eq!(session.snapshot().rows, 6);
        assert_eq!(view_cursor(&tree, "/A"), 30);

        // Nothing more is needed at the same offset.
        assert_eq!(session.on_scroll(500.0).await.unwrap(), FillOutcome::Satisfied);
        assert_eq!(session.snapshot().rows, 6);
    }

    #[tokio::test]
    async fn test_rows_reach_renderer_in_order_and_fit_width() {
        let tree = two_album_tree();
        let fetcher = FakeFetcher::new();
        for i in (0..40).step_by(3) {
            fetcher.set_size(&format!("/A/{i}.jpg"), 1920, 1080);
        }
        let (session, renderer) = session(tree, &fetcher, Viewport::new(1200.0, 2000.0));

        let outcome = session.enter_album("/A").unwrap().await.unwrap();
        assert_eq!(outcome, FillOutcome::Exhausted);

        let expected: Vec<String> = (0..40).map(|i| format!("/A/{i}.jpg")).collect();
        assert_eq!(renderer.rendered_paths(), expected);

        let rows = renderer.rows.lock();
        for row in rows.iter().filter(|r| r.state == RowState::Full) {
            assert!((row.display_width - row.target_width).abs() <= 1.0);
        }
        assert!(session.snapshot().exhausted);
    }

    #[tokio::test]
    async fn test_navigating_discards_rows_of_previous_album() {
        let tree = two_album_tree();
        let fetcher = FakeFetcher::gated();
        let (session, renderer) = session(tree.clone(), &fetcher, Viewport::new(1000.0, 300.0));

        let fill_a = session.enter_album("/A").unwrap();
        settle().await;
        let a = tree.album("/A").unwrap();
        let a_preload = a.cursor().preload;
        assert_eq!(a_preload, 10);

        let fill_b = session.enter_album("/B").unwrap();
        assert_eq!(drive(&fetcher, fill_b).await, FillOutcome::Satisfied);
        assert_eq!(drive(&fetcher, fill_a).await, FillOutcome::Cancelled);

        assert_eq!(
            *renderer.albums.lock(),
            vec![("/A".to_string(), 1), ("/B".to_string(), 2)]
        );
        let rows = renderer.rows.lock();
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.generation == 2));
        assert!(rows
            .iter()
            .flat_map(|r| r.paths.iter())
            .all(|p| p.starts_with("/B/")));

        assert_eq!(a.cursor().view, 0);
        assert_eq!(a.cursor().preload, a_preload);
        assert_eq!(view_cursor(&tree, "/B"), 20);
    }

    #[tokio::test]
    async fn test_navigate_away_cancels_pending_row() {
        let tree = two_album_tree();
        let fetcher = FakeFetcher::gated();
        let (session, renderer) = session(tree.clone(), &fetcher, Viewport::new(1000.0, 300.0));

        let fill = session.enter_album("/A").unwrap();
        settle().await;
        session.on_navigate_away();

        assert_eq!(drive(&fetcher, fill).await, FillOutcome::Cancelled);
        assert!(renderer.rows.lock().is_empty());
        assert_eq!(view_cursor(&tree, "/A"), 0);
        assert_eq!(session.snapshot().album, None);
        assert_eq!(session.fill_loop().await, FillOutcome::NoAlbum);

        // Loads that were in flight still completed into the cache.
        assert!(session
            .cache()
            .peek(&ThumbnailKey::new("/A/0.jpg", false))
            .unwrap()
            .is_terminal());
    }

    #[tokio::test]
    async fn test_second_fill_of_same_generation_is_noop() {
        let tree = two_album_tree();
        let fetcher = FakeFetcher::gated();
        let (session, renderer) = session(tree, &fetcher, Viewport::new(1000.0, 300.0));

        let fill = session.enter_album("/A").unwrap();
        settle().await;
        assert!(session.snapshot().filling);
        assert_eq!(session.fill_loop().await, FillOutcome::AlreadyFilling);

        assert_eq!(drive(&fetcher, fill).await, FillOutcome::Satisfied);
        assert!(!session.snapshot().filling);
        assert_eq!(renderer.rows.lock().len(), 4);
    }

    #[tokio::test]
    async fn test_reentering_album_repeats_the_same_rows() {
        let tree = two_album_tree();
        let fetcher = FakeFetcher::new();
        for (i, size) in [(1, (1920, 1080)), (4, (1080, 1920)), (9, (2560, 1080))] {
            fetcher.set_size(&format!("/A/{i}.jpg"), size.0, size.1);
        }
        let (session, renderer) = session(tree.clone(), &fetcher, Viewport::new(1000.0, 300.0));

        session.enter_album("/A").unwrap().await.unwrap();
        let first = renderer.row_paths();
        let view = view_cursor(&tree, "/A");
        let fetches = fetcher.total_calls();

        session.enter_album("/B").unwrap().await.unwrap();
        let before = renderer.rows.lock().len();
        session.enter_album("/A").unwrap().await.unwrap();
        let second: Vec<Vec<String>> = renderer.row_paths().split_off(before);

        assert_eq!(first, second);
        assert_eq!(view_cursor(&tree, "/A"), view);
        // Every /A thumbnail came from the cache the second time.
        let fetched_for_b = fetcher.total_calls() - fetches;
        assert!(fetched_for_b > 0);
        assert_eq!(fetcher.calls_for("/A/0.jpg"), 1);
    }

    #[tokio::test]
    async fn test_failed_thumbnail_is_skipped_and_not_refetched() {
        let root = AlbumBuilder::new("", "root")
            .sub_album(album_with_images("/a", 5))
            .build();
        let tree = Arc::new(GalleryTree::new(root));
        let fetcher = FakeFetcher::new();
        fetcher.fail("/a/2.jpg");
        let (session, renderer) = session(tree.clone(), &fetcher, Viewport::new(5000.0, 300.0));

        let outcome = session.enter_album("/a").unwrap().await.unwrap();
        assert_eq!(outcome, FillOutcome::Exhausted);
        assert_eq!(
            renderer.row_paths(),
            vec![vec!["/a/0.jpg", "/a/1.jpg", "/a/3.jpg", "/a/4.jpg"]]
        );
        assert_eq!(view_cursor(&tree, "/a"), 5);

        session.reset_viewport().unwrap().await.unwrap();
        assert_eq!(renderer.row_paths().len(), 2);
        assert_eq!(renderer.row_paths()[1].len(), 4);
        assert_eq!(fetcher.calls_for("/a/2.jpg"), 1);
    }

    #[tokio::test]
    async fn test_sub_albums_render_as_square_tiles() {
        let root = AlbumBuilder::new("", "root")
            .sub_album(album_with_images("/x", 6))
            .sub_album(album_with_images("/y", 2))
            .image(image_info("/cover.jpg"))
            .build();
        let tree = Arc::new(GalleryTree::new(root));
        let fetcher = FakeFetcher::new();
        let (session, renderer) = session(tree, &fetcher, Viewport::new(1000.0, 300.0));

        let outcome = session.enter_album("").unwrap().await.unwrap();
        assert_eq!(outcome, FillOutcome::Exhausted);
        assert_eq!(renderer.row_paths(), vec![vec!["/x", "/y", "/cover.jpg"]]);
        // Composite tiles were warmed by the preloader.
        assert_eq!(fetcher.calls_for("/x/3.jpg"), 1);
        assert_eq!(fetcher.calls_for("/x/4.jpg"), 0);
    }

    #[tokio::test]
    async fn test_exhausted_album_ignores_scroll() {
        let root = AlbumBuilder::new("", "root")
            .sub_album(album_with_images("/small", 3))
            .build();
        let tree = Arc::new(GalleryTree::new(root));
        let fetcher = FakeFetcher::new();
        let (session, renderer) = session(tree, &fetcher, Viewport::new(1000.0, 300.0));

        assert_eq!(
            session.enter_album("/small").unwrap().await.unwrap(),
            FillOutcome::Exhausted
        );
        assert_eq!(session.on_scroll(4000.0).await.unwrap(), FillOutcome::Exhausted);
        assert_eq!(renderer.rows.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_resize_fills_with_new_width() {
        let tree = two_album_tree();
        let fetcher = FakeFetcher::new();
        let (session, renderer) = session(tree, &fetcher, Viewport::new(1000.0, 100.0));

        session.enter_album("/A").unwrap().await.unwrap();
        let rows = renderer.rows.lock().len();

        session.on_resize(2000.0, 600.0).await.unwrap();
        let all = renderer.rows.lock();
        assert!(all.len() > rows);
        assert!(all[rows..].iter().all(|r| r.target_width == 2000.0));
    }

    #[tokio::test]
    async fn test_enter_album_rejects_unknown_and_image_paths() {
        let root = AlbumBuilder::new("", "root")
            .image(image_info("/cover.jpg"))
            .build();
        let (session, renderer) = session(
            Arc::new(GalleryTree::new(root)),
            &FakeFetcher::new(),
            Viewport::new(1000.0, 300.0),
        );

        assert!(matches!(
            session.enter_album("/missing"),
            Err(SessionError::AlbumNotFound(_))
        ));
        assert!(matches!(
            session.enter_album("/cover.jpg"),
            Err(SessionError::NotAnAlbum(_))
        ));
        assert_eq!(session.generation(), 0);
        assert!(renderer.albums.lock().is_empty());
    }

    #[tokio::test]
    async fn test_viewer_pauses_thumbnail_loads() {
        let tree = two_album_tree();
        let fetcher = FakeFetcher::new();
        let (session, _renderer) = session(tree, &fetcher, Viewport::new(1000.0, 300.0));

        session.set_viewer_active(true);
        let fill = session.enter_album("/A").unwrap();
        settle().await;
        assert_eq!(fetcher.total_calls(), 0);
        assert!(session.cache().stats().paused);

        session.set_viewer_active(false);
        assert_eq!(fill.await.unwrap(), FillOutcome::Satisfied);
        assert!(fetcher.total_calls() > 0);
    }

    #[test]
    fn test_stopping_releases_fill_mark_with_the_decision() {
        let mut state = SessionState {
            viewport: Viewport::new(1000.0, 300.0),
            content_height: 700.0,
            filling: Some(4),
            ..SessionState::default()
        };

        assert_eq!(
            state.stop_after_commit(4, false, 2.0),
            Some(FillOutcome::Satisfied)
        );
        assert_eq!(state.filling, None);

        // A loop that still wants content keeps its mark.
        state.viewport.scroll_top = 500.0;
        state.filling = Some(5);
        assert_eq!(state.stop_after_commit(5, false, 2.0), None);
        assert_eq!(state.filling, Some(5));

        assert_eq!(
            state.stop_after_commit(5, true, 2.0),
            Some(FillOutcome::Exhausted)
        );
        assert!(state.exhausted);
        assert_eq!(state.filling, None);
    }

    #[test]
    fn test_stale_loop_does_not_release_newer_mark() {
        let mut state = SessionState {
            viewport: Viewport::new(1000.0, 300.0),
            content_height: 700.0,
            filling: Some(2),
            ..SessionState::default()
        };

        assert_eq!(
            state.stop_after_commit(1, false, 2.0),
            Some(FillOutcome::Satisfied)
        );
        assert_eq!(state.filling, Some(2));
    }
}
