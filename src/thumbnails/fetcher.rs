//! Thumbnail fetch providers.
//!
//! The cache only needs a thumbnail's pixel dimensions and a handle the
//! renderer can display. Transport (HTTP endpoint, local disk) is up to the
//! provider behind [`ThumbnailFetcher`].

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use image::ImageReader;
use tracing::trace;

use super::cache::{LoadedThumbnail, ThumbnailHandle, ThumbnailKey};
use crate::error::FetchError;
use crate::models::{GalleryNode, GalleryTree};
use crate::scanner::tree_scanner::source_path;

/// Default target height for thumbnails in pixels.
pub const DEFAULT_THUMB_HEIGHT: u32 = 256;

/// Minimum width for thumbnails (to handle extreme aspect ratios).
const MIN_THUMB_WIDTH: u32 = 64;

/// Maximum width for thumbnails (to handle extreme panoramas).
const MAX_THUMB_WIDTH: u32 = 1024;

pub type FetchFuture =
    Pin<Box<dyn Future<Output = Result<LoadedThumbnail, FetchError>> + Send + 'static>>;

/// Source of thumbnail dimensions and renderable handles.
pub trait ThumbnailFetcher: Send + Sync + 'static {
    fn fetch(&self, key: &ThumbnailKey) -> FetchFuture;
}

/// Fetches thumbnails for a scanned directory tree from local disk.
///
/// Only image headers are read; the reported size is the one the thumbnail
/// service would produce (fixed height, width clamped, squares at a fixed edge).
pub struct FsThumbnailFetcher {
    sources: HashMap<String, PathBuf>,
    thumb_height: u32,
}

impl FsThumbnailFetcher {
    /// Maps every image in `tree` to its file under `root`.
    pub fn from_tree(root: &Path, tree: &GalleryTree) -> Self {
        let mut sources = HashMap::new();
        let mut stack = vec![tree.root().clone()];
        while let Some(node) = stack.pop() {
            match node.as_ref() {
                GalleryNode::Album(album) => stack.extend(album.children().iter().cloned()),
                GalleryNode::Image(image) => {
                    sources.insert(
                        image.file_id().to_string(),
                        source_path(root, &image.info().path),
                    );
                }
            }
        }
        Self {
            sources,
            thumb_height: DEFAULT_THUMB_HEIGHT,
        }
    }

    pub fn with_thumb_height(mut self, height: u32) -> Self {
        self.thumb_height = height.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl ThumbnailFetcher for FsThumbnailFetcher {
    fn fetch(&self, key: &ThumbnailKey) -> FetchFuture {
        let Some(path) = self.sources.get(key.file_id()).cloned() else {
            let missing = key.file_id().to_string();
            return Box::pin(async move { Err(FetchError::NotFound(missing)) });
        };
        let square = key.square();
        let thumb_height = self.thumb_height;

        Box::pin(async move {
            let source = path.clone();
            let (src_w, src_h) = tokio::task::spawn_blocking(move || read_dimensions(&source))
                .await
                .map_err(|e| FetchError::Io(e.to_string()))??;

            let (width, height) = if square {
                (thumb_height, thumb_height)
            } else {
                calculate_dimensions(src_w, src_h, thumb_height)
            };
            trace!(?path, src_w, src_h, width, height, "Resolved thumbnail dimensions");

            Ok(LoadedThumbnail {
                width,
                height,
                handle: ThumbnailHandle::new(&path.to_string_lossy()),
            })
        })
    }
}

fn read_dimensions(path: &Path) -> Result<(u32, u32), FetchError> {
    let reader = ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => FetchError::NotFound(path.display().to_string()),
            _ => FetchError::Io(e.to_string()),
        })?;
    reader
        .into_dimensions()
        .map_err(|e| FetchError::Decode(e.to_string()))
}

/// Thumbnail size for a source image: `target_height` high (never upscaled),
/// width following the aspect ratio and clamped to sane bounds.
pub fn calculate_dimensions(src_width: u32, src_height: u32, target_height: u32) -> (u32, u32) {
    if src_height == 0 || src_width == 0 {
        return (target_height, target_height);
    }

    let effective_height = target_height.min(src_height);
    let aspect_ratio = src_width as f64 / src_height as f64;
    let calculated_width = (effective_height as f64 * aspect_ratio).round() as u32;
    let final_width = calculated_width.clamp(MIN_THUMB_WIDTH, MAX_THUMB_WIDTH);

    // If width was clamped, recalculate height to maintain aspect ratio
    let final_height = if final_width != calculated_width {
        (final_width as f64 / aspect_ratio).round() as u32
    } else {
        effective_height
    };

    (final_width.max(1), final_height.max(1))
}
