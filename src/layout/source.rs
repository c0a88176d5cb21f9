use std::sync::Arc;

use super::preload::PreloadAdvisor;
use crate::models::{Album, GalleryNode};
use crate::session::GenerationGuard;

/// Sequence of nodes a row is filled from, pulled one at a time.
pub trait NodeSource {
    fn next_node(&mut self) -> Option<Arc<GalleryNode>>;
}

impl<I> NodeSource for I
where
    I: Iterator<Item = Arc<GalleryNode>>,
{
    fn next_node(&mut self) -> Option<Arc<GalleryNode>> {
        self.next()
    }
}

/// Un-viewed children of an album, starting at its committed view cursor.
///
/// Pulling does not move the view cursor; the caller commits
/// [`AlbumNodes::consumed`] once the row is accepted. The source dries up as
/// soon as `guard` goes stale. With a preload advisor attached, every pull
/// first gives the advisor a chance to warm the cache.
pub struct AlbumNodes<'a> {
    album: &'a Album,
    guard: &'a GenerationGuard,
    position: usize,
    consumed: usize,
    preload: Option<&'a PreloadAdvisor>,
}

impl<'a> AlbumNodes<'a> {
    pub fn new(album: &'a Album, guard: &'a GenerationGuard) -> Self {
        Self {
            album,
            guard,
            position: album.cursor().view,
            consumed: 0,
            preload: None,
        }
    }

    pub fn with_preload(mut self, advisor: &'a PreloadAdvisor) -> Self {
        self.preload = Some(advisor);
        self
    }

    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn is_exhausted(&self) -> bool {
        self.position >= self.album.len()
    }
}

impl Iterator for AlbumNodes<'_> {
    type Item = Arc<GalleryNode>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.guard.is_current() {
            return None;
        }
        if let Some(advisor) = self.preload {
            advisor.advise(self.album, self.position, advisor.lookahead(), self.guard);
        }
        let node = self.album.children().get(self.position).cloned()?;
        self.position += 1;
        self.consumed += 1;
        Some(node)
    }
}
