//! Builds a [`GalleryTree`] from a directory on disk.
//!
//! Every directory becomes an album and every recognised image file an image
//! node. Tree paths are relative to the scan root with a leading `/`; the root
//! album itself has the empty path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use tokio::task;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};
use xxhash_rust::xxh3::xxh3_64;

use crate::models::{AlbumBuilder, GalleryNode, GalleryTree, ImageInfo, SortConfig};

/// Configuration for the tree scanner.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Whether to follow symbolic links.
    pub follow_symlinks: bool,
    /// Whether dot-files and dot-directories are included.
    pub include_hidden: bool,
    /// Maximum directory depth (0 = unlimited).
    pub max_depth: usize,
    /// Drop albums that contain no images at any depth.
    pub skip_empty_albums: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            include_hidden: false,
            max_depth: 0,
            skip_empty_albums: true,
        }
    }
}

/// MIME type for a supported image extension.
pub fn image_mime_type(ext: &str) -> Option<&'static str> {
    match ext.to_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "tiff" | "tif" => Some("image/tiff"),
        _ => None,
    }
}

/// Stable identity of a source file: changes whenever the file is replaced.
pub fn file_id(path: &Path, modified: i64, size: u64) -> String {
    let mut input = Vec::with_capacity(path.as_os_str().len() + 16);
    input.extend_from_slice(path.as_os_str().as_encoded_bytes());
    input.extend_from_slice(&modified.to_le_bytes());
    input.extend_from_slice(&size.to_le_bytes());
    format!("{:016x}", xxh3_64(&input))
}

#[derive(Debug)]
struct DirRecord {
    display_name: String,
    modified: i64,
}

#[derive(Default)]
struct Discovered {
    dirs: HashMap<String, DirRecord>,
    /// Child directory paths per album path.
    sub_dirs: HashMap<String, Vec<String>>,
    images: HashMap<String, Vec<ImageInfo>>,
    errors: usize,
}

pub struct TreeScanner {
    config: ScanConfig,
}

impl Default for TreeScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeScanner {
    pub fn new() -> Self {
        Self {
            config: ScanConfig::default(),
        }
    }

    pub fn with_config(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Scans `root` on the blocking pool.
    pub async fn scan(&self, root: &Path, sort: &SortConfig) -> Result<GalleryTree> {
        let root = root.to_path_buf();
        let config = self.config.clone();
        let sort = *sort;

        task::spawn_blocking(move || Self::with_config(config).scan_sync(&root, &sort))
            .await
            .context("Scan task panicked")?
    }

    pub fn scan_sync(&self, root: &Path, sort: &SortConfig) -> Result<GalleryTree> {
        let meta = std::fs::metadata(root)
            .with_context(|| format!("Failed to read scan root {:?}", root))?;
        if !meta.is_dir() {
            bail!("Scan root {:?} is not a directory", root);
        }
        info!("Starting scan of {:?}", root);

        let discovered = self.discover(root);
        let display_name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());
        let root_album = self
            .assemble(
                "",
                display_name,
                modified_secs(meta.modified()),
                &discovered,
                sort,
            )
            .unwrap_or_else(|| AlbumBuilder::new("", "").build());

        let tree = GalleryTree::new(root_album);
        let stats = tree.stats();
        info!(
            "Scan complete: {} albums, {} images, {} errors",
            stats.albums, stats.images, discovered.errors
        );
        Ok(tree)
    }

    fn discover(&self, root: &Path) -> Discovered {
        let mut walker = WalkDir::new(root)
            .min_depth(1)
            .follow_links(self.config.follow_symlinks);
        if self.config.max_depth > 0 {
            walker = walker.max_depth(self.config.max_depth);
        }
        let include_hidden = self.config.include_hidden;

        let mut found = Discovered::default();
        let entries = walker
            .into_iter()
            .filter_entry(|e| include_hidden || !is_hidden(e));

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    found.errors += 1;
                    continue;
                }
            };
            let Some(tree_path) = tree_path(root, entry.path()) else {
                continue;
            };
            let (parent, name) = split_tree_path(&tree_path);
            let (parent, name) = (parent.to_string(), name.to_string());

            if entry.file_type().is_dir() {
                let modified = entry
                    .metadata()
                    .ok()
                    .map(|m| modified_secs(m.modified()))
                    .unwrap_or(0);
                found
                    .sub_dirs
                    .entry(parent)
                    .or_default()
                    .push(tree_path.clone());
                found.dirs.insert(
                    tree_path,
                    DirRecord {
                        display_name: name,
                        modified,
                    },
                );
                continue;
            }

            let path = entry.path();
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            let Some(mime_type) = image_mime_type(ext) else {
                continue;
            };

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    warn!("Failed to read metadata for {:?}: {}", path, e);
                    found.errors += 1;
                    continue;
                }
            };
            let modified = modified_secs(metadata.modified());
            let size = metadata.len();

            found.images.entry(parent).or_default().push(ImageInfo {
                file_id: file_id(path, modified, size),
                path: tree_path,
                display_name: name,
                mime_type: mime_type.to_string(),
                size,
                modified,
            });
        }

        debug!(
            "Discovered {} directories and {} images",
            found.dirs.len(),
            found.images.values().map(Vec::len).sum::<usize>()
        );
        found
    }

    fn assemble(
        &self,
        path: &str,
        display_name: String,
        modified: i64,
        found: &Discovered,
        sort: &SortConfig,
    ) -> Option<GalleryNode> {
        let mut builder = AlbumBuilder::new(path, display_name).modified(modified);
        let mut has_content = false;

        for dir in found.sub_dirs.get(path).into_iter().flatten() {
            let Some(record) = found.dirs.get(dir) else {
                continue;
            };
            if let Some(album) = self.assemble(
                dir,
                record.display_name.clone(),
                record.modified,
                found,
                sort,
            ) {
                builder.push(album);
                has_content = true;
            }
        }
        for info in found.images.get(path).into_iter().flatten() {
            builder.push(GalleryNode::image(info.clone()));
            has_content = true;
        }

        if !has_content && self.config.skip_empty_albums && !path.is_empty() {
            return None;
        }
        Some(builder.sorted(sort).build())
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

fn tree_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut out = String::new();
    for component in relative.components() {
        out.push('/');
        out.push_str(&component.as_os_str().to_string_lossy());
    }
    (!out.is_empty()).then_some(out)
}

fn split_tree_path(path: &str) -> (&str, &str) {
    path.rsplit_once('/').unwrap_or(("", path))
}

fn modified_secs(modified: std::io::Result<SystemTime>) -> i64 {
    modified
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Resolves a tree path back to its location under `root`.
pub fn source_path(root: &Path, tree_path: &str) -> PathBuf {
    root.join(tree_path.trim_start_matches('/'))
}
