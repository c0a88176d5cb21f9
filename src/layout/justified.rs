use tracing::{debug, trace};

use super::source::NodeSource;
use crate::models::{RowItem, RowModel, RowState, WidthSource};
use crate::thumbnails::ThumbnailCache;

/// Geometry of the justified wall.
#[derive(Debug, Clone, PartialEq)]
pub struct JustifiedLayout {
    /// Natural row height in pixels before rescaling (default: 200)
    pub row_height: f32,
    /// Gutter added for every placed item, plus one leading gutter (default: 4)
    pub margin: f32,
}

impl Default for JustifiedLayout {
    fn default() -> Self {
        Self {
            row_height: 200.0,
            margin: 4.0,
        }
    }
}

impl JustifiedLayout {
    pub fn new(row_height: f32, margin: f32) -> Self {
        Self {
            row_height: row_height.max(1.0),
            margin: margin.max(0.0),
        }
    }
}

/// Greedily fills one row at a time.
///
/// Each node's natural width must be known before the next node is admitted,
/// so a row is built strictly in sequence. Thumbnail loads for other rows and
/// for preloading still overlap through the cache.
#[derive(Debug, Clone)]
pub struct RowBuilder {
    layout: JustifiedLayout,
    cache: ThumbnailCache,
}

impl RowBuilder {
    pub fn new(layout: JustifiedLayout, cache: ThumbnailCache) -> Self {
        Self { layout, cache }
    }

    pub fn layout(&self) -> &JustifiedLayout {
        &self.layout
    }

    /// Builds the next row from `source`.
    ///
    /// # Algorithm
    /// 1. Start with one leading gutter.
    /// 2. Pull a node; albums are square, images wait for their thumbnail's
    ///    aspect ratio. A node whose thumbnail fails is dropped but still counts
    ///    as consumed.
    /// 3. Add `width + margin`; once the total exceeds `target_width` the row is
    ///    `Full`. Running out of nodes makes it `Exhausted`.
    pub async fn fill_row<S>(&self, target_width: f32, source: &mut S) -> RowModel
    where
        S: NodeSource + ?Sized,
    {
        let row_height = self.layout.row_height;
        let margin = self.layout.margin;
        let mut items: Vec<RowItem> = Vec::new();
        let mut accumulated = margin;
        let mut consumed = 0usize;

        let mut state = RowState::Filling;
        while state == RowState::Filling {
            let Some(node) = source.next_node() else {
                state = RowState::Exhausted;
                break;
            };
            consumed += 1;

            let (natural_w, handle) = match node.natural_width(row_height) {
                WidthSource::Fixed(width) => (width, None),
                WidthSource::Thumbnail(key) => match self.cache.request_key(&key).await {
                    Ok(loaded) => (row_height * loaded.aspect_ratio(), Some(loaded.handle)),
                    Err(err) => {
                        debug!(path = node.path(), error = %err, "Dropping node from row");
                        continue;
                    }
                },
            };

            accumulated += natural_w + margin;
            items.push(RowItem {
                node,
                natural_w,
                handle,
            });
            if accumulated > target_width {
                state = RowState::Full;
            }
        }

        let row = RowModel::new(
            items,
            state,
            accumulated,
            target_width,
            row_height,
            margin,
            consumed,
        );
        trace!(
            items = row.len(),
            consumed,
            accumulated,
            scale = row.scale_ratio(),
            state = ?row.state(),
            "Row complete"
        );
        row
    }
}
