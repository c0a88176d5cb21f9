use std::cmp::Ordering;
use std::sync::Arc;

use super::gallery::GalleryNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Name,
    Date,
}

impl SortKey {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "name" => Some(Self::Name),
            "date" | "mtime" => Some(Self::Date),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    fn apply(self, ord: Ordering) -> Ordering {
        match self {
            Self::Asc => ord,
            Self::Desc => ord.reverse(),
        }
    }
}

/// Ordering applied by the tree provider before nodes reach the layout engine.
///
/// Images follow `key` + `order`; sub-albums follow `key` + `album_order`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortConfig {
    pub key: SortKey,
    pub order: SortOrder,
    pub album_order: SortOrder,
}

impl SortConfig {
    pub fn sort_albums(&self, albums: &mut [Arc<GalleryNode>]) {
        albums.sort_by(|a, b| self.album_order.apply(compare(self.key, a, b)));
    }

    pub fn sort_images(&self, images: &mut [Arc<GalleryNode>]) {
        images.sort_by(|a, b| self.order.apply(compare(self.key, a, b)));
    }
}

fn compare(key: SortKey, a: &GalleryNode, b: &GalleryNode) -> Ordering {
    let by_name = || {
        a.display_name()
            .to_lowercase()
            .cmp(&b.display_name().to_lowercase())
            .then_with(|| a.path().cmp(b.path()))
    };
    match key {
        SortKey::Name => by_name(),
        SortKey::Date => a.modified().cmp(&b.modified()).then_with(by_name),
    }
}
