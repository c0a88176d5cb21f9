//! In-memory gallery hierarchy.
//!
//! The tree is built once per root by a tree provider and is read-only
//! afterwards, except for the per-album view/preload cursors.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::sort::SortConfig;
use crate::thumbnails::ThumbnailKey;

/// Metadata for a single image, as supplied by the tree provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub path: String,
    pub display_name: String,
    pub file_id: String,
    pub mime_type: String,
    pub size: u64,
    /// Modification time as unix seconds.
    pub modified: i64,
}

#[derive(Debug)]
pub struct Image {
    info: ImageInfo,
}

impl Image {
    pub fn info(&self) -> &ImageInfo {
        &self.info
    }

    pub fn file_id(&self) -> &str {
        &self.info.file_id
    }

    pub fn mime_type(&self) -> &str {
        &self.info.mime_type
    }

    pub fn size(&self) -> u64 {
        self.info.size
    }

    /// Identity of the aspect-preserving thumbnail used in rows.
    pub fn thumbnail_key(&self) -> ThumbnailKey {
        ThumbnailKey::new(&self.info.file_id, false)
    }

    /// Identity of the square crop used in album composites.
    pub fn square_thumbnail_key(&self) -> ThumbnailKey {
        ThumbnailKey::new(&self.info.file_id, true)
    }
}

/// Traversal state of one album.
///
/// `view` counts children already placed into rows, `preload` counts children
/// whose thumbnails were already requested. `view <= preload <= len` always.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlbumCursor {
    pub view: usize,
    pub preload: usize,
}

#[derive(Debug)]
pub struct Album {
    path: String,
    display_name: String,
    modified: i64,
    /// Sub-albums first, then images.
    children: Vec<Arc<GalleryNode>>,
    album_count: usize,
    cursor: Mutex<AlbumCursor>,
}

impl Album {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn children(&self) -> &[Arc<GalleryNode>] {
        &self.children
    }

    pub fn sub_albums(&self) -> &[Arc<GalleryNode>] {
        &self.children[..self.album_count]
    }

    pub fn images(&self) -> &[Arc<GalleryNode>] {
        &self.children[self.album_count..]
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn cursor(&self) -> AlbumCursor {
        *self.cursor.lock()
    }

    pub fn reset_cursors(&self) {
        *self.cursor.lock() = AlbumCursor::default();
    }

    /// Advances the view cursor by `consumed`, clamped to the child count.
    /// The preload cursor is raised so it never trails the view cursor.
    pub fn advance_view(&self, consumed: usize) -> AlbumCursor {
        let mut cursor = self.cursor.lock();
        cursor.view = (cursor.view + consumed).min(self.children.len());
        cursor.preload = cursor.preload.max(cursor.view);
        *cursor
    }

    /// Moves the preload cursor forward to `to`. Never moves it backwards.
    pub fn advance_preload(&self, to: usize) -> AlbumCursor {
        let mut cursor = self.cursor.lock();
        cursor.preload = cursor.preload.max(to.min(self.children.len()));
        debug_assert!(cursor.view <= cursor.preload);
        *cursor
    }

    /// Moves the preload cursor to `to` only if `still_current` holds while the
    /// cursor is locked. A concurrent [`reset_cursors`](Self::reset_cursors)
    /// therefore lands either before the check or after the move, never between.
    pub fn advance_preload_if(
        &self,
        to: usize,
        still_current: impl FnOnce() -> bool,
    ) -> Option<AlbumCursor> {
        let mut cursor = self.cursor.lock();
        if !still_current() {
            return None;
        }
        cursor.preload = cursor.preload.max(to.min(self.children.len()));
        debug_assert!(cursor.view <= cursor.preload);
        Some(*cursor)
    }

    /// Square thumbnail identities of up to `limit` leading images, used for
    /// the album tile composite.
    pub fn composite_keys(&self, limit: usize) -> Vec<ThumbnailKey> {
        self.images()
            .iter()
            .filter_map(|node| match node.as_ref() {
                GalleryNode::Image(image) => Some(image.square_thumbnail_key()),
                GalleryNode::Album(_) => None,
            })
            .take(limit)
            .collect()
    }
}

/// How a node's natural width at a given row height is obtained.
#[derive(Debug, Clone, PartialEq)]
pub enum WidthSource {
    /// Known synchronously.
    Fixed(f32),
    /// Depends on the aspect ratio of this thumbnail.
    Thumbnail(ThumbnailKey),
}

#[derive(Debug)]
pub enum GalleryNode {
    Album(Album),
    Image(Image),
}

impl GalleryNode {
    pub fn image(info: ImageInfo) -> Self {
        Self::Image(Image { info })
    }

    pub fn path(&self) -> &str {
        match self {
            Self::Album(album) => &album.path,
            Self::Image(image) => &image.info.path,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Self::Album(album) => &album.display_name,
            Self::Image(image) => &image.info.display_name,
        }
    }

    pub fn modified(&self) -> i64 {
        match self {
            Self::Album(album) => album.modified,
            Self::Image(image) => image.info.modified,
        }
    }

    pub fn as_album(&self) -> Option<&Album> {
        match self {
            Self::Album(album) => Some(album),
            Self::Image(_) => None,
        }
    }

    pub fn as_image(&self) -> Option<&Image> {
        match self {
            Self::Image(image) => Some(image),
            Self::Album(_) => None,
        }
    }

    pub fn is_album(&self) -> bool {
        matches!(self, Self::Album(_))
    }

    /// Albums render as square tiles, so their width is the row height.
    pub fn natural_width(&self, row_height: f32) -> WidthSource {
        match self {
            Self::Album(_) => WidthSource::Fixed(row_height),
            Self::Image(image) => WidthSource::Thumbnail(image.thumbnail_key()),
        }
    }

    /// Thumbnails this node needs on screen. An album tile shows a composite
    /// of up to `composite_limit` square thumbnails of its leading images.
    pub fn thumbnail_identities(&self, composite_limit: usize) -> Vec<ThumbnailKey> {
        match self {
            Self::Album(album) => album.composite_keys(composite_limit),
            Self::Image(image) => vec![image.thumbnail_key()],
        }
    }
}

/// Assembles an album node from already-built children.
pub struct AlbumBuilder {
    path: String,
    display_name: String,
    modified: i64,
    sub_albums: Vec<Arc<GalleryNode>>,
    images: Vec<Arc<GalleryNode>>,
}

impl AlbumBuilder {
    pub fn new(path: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            display_name: display_name.into(),
            modified: 0,
            sub_albums: Vec::new(),
            images: Vec::new(),
        }
    }

    pub fn modified(mut self, modified: i64) -> Self {
        self.modified = modified;
        self
    }

    pub fn sub_album(mut self, album: GalleryNode) -> Self {
        self.push(album);
        self
    }

    pub fn image(mut self, info: ImageInfo) -> Self {
        self.push(GalleryNode::image(info));
        self
    }

    pub fn push(&mut self, node: GalleryNode) {
        match node {
            GalleryNode::Album(_) => self.sub_albums.push(Arc::new(node)),
            GalleryNode::Image(_) => self.images.push(Arc::new(node)),
        }
    }

    pub fn sorted(mut self, sort: &SortConfig) -> Self {
        sort.sort_albums(&mut self.sub_albums);
        sort.sort_images(&mut self.images);
        self
    }

    pub fn build(self) -> GalleryNode {
        let album_count = self.sub_albums.len();
        let mut children = self.sub_albums;
        children.extend(self.images);
        GalleryNode::Album(Album {
            path: self.path,
            display_name: self.display_name,
            modified: self.modified,
            children,
            album_count,
            cursor: Mutex::new(AlbumCursor::default()),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub albums: usize,
    pub images: usize,
}

/// A gallery hierarchy with path lookup.
#[derive(Debug)]
pub struct GalleryTree {
    root: Arc<GalleryNode>,
    index: HashMap<String, Arc<GalleryNode>>,
}

impl GalleryTree {
    pub fn new(root: GalleryNode) -> Self {
        let root = Arc::new(root);
        let mut index = HashMap::new();
        let mut stack = vec![Arc::clone(&root)];
        while let Some(node) = stack.pop() {
            if let GalleryNode::Album(album) = node.as_ref() {
                stack.extend(album.children.iter().cloned());
            }
            index.insert(node.path().to_string(), node);
        }
        Self { root, index }
    }

    pub fn root(&self) -> &Arc<GalleryNode> {
        &self.root
    }

    pub fn node(&self, path: &str) -> Option<&Arc<GalleryNode>> {
        self.index.get(path)
    }

    pub fn album(&self, path: &str) -> Option<&Album> {
        self.node(path).and_then(|node| node.as_album())
    }

    pub fn children_of<'a>(&self, album: &'a Album) -> &'a [Arc<GalleryNode>] {
        album.children()
    }

    /// Up to `count` children starting at the album's view cursor. The cursor
    /// itself only moves through [`GalleryTree::advance_view`].
    pub fn next_unviewed(&self, album: &Album, count: usize) -> Vec<Arc<GalleryNode>> {
        let start = album.cursor().view;
        album
            .children
            .iter()
            .skip(start)
            .take(count)
            .cloned()
            .collect()
    }

    pub fn advance_view(&self, album: &Album, consumed: usize) -> AlbumCursor {
        album.advance_view(consumed)
    }

    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats::default();
        for node in self.index.values() {
            match node.as_ref() {
                GalleryNode::Album(_) => stats.albums += 1,
                GalleryNode::Image(_) => stats.images += 1,
            }
        }
        stats
    }
}
