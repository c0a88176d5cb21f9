use std::sync::Arc;

use super::gallery::GalleryNode;
use crate::thumbnails::ThumbnailHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowState {
    /// Still accepting nodes. Only seen inside the row builder; a finished
    /// [`RowModel`] is always `Full` or `Exhausted`.
    Filling,
    /// Accumulated width exceeded the target.
    Full,
    /// The node source ran out.
    Exhausted,
}

/// A node placed in a row, at its natural (unscaled) width.
#[derive(Debug, Clone)]
pub struct RowItem {
    pub node: Arc<GalleryNode>,
    pub natural_w: f32,
    /// Renderable thumbnail for images; albums render their own composite.
    pub handle: Option<ThumbnailHandle>,
}

/// On-screen box for one row item after rescaling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayBox {
    pub display_w: f32,
    pub display_h: f32,
    /// Gutter to the left of the item, scaled with the row.
    pub offset_left: f32,
}

/// A completed row. Built only by the row builder and immutable afterwards.
#[derive(Debug, Clone)]
pub struct RowModel {
    items: Vec<RowItem>,
    state: RowState,
    accumulated_w: f32,
    target_w: f32,
    row_height: f32,
    margin: f32,
    consumed: usize,
}

impl RowModel {
    pub(crate) fn new(
        items: Vec<RowItem>,
        state: RowState,
        accumulated_w: f32,
        target_w: f32,
        row_height: f32,
        margin: f32,
        consumed: usize,
    ) -> Self {
        debug_assert!(state != RowState::Filling);
        Self {
            items,
            state,
            accumulated_w,
            target_w,
            row_height,
            margin,
            consumed,
        }
    }

    pub fn items(&self) -> &[RowItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn state(&self) -> RowState {
        self.state
    }

    pub fn accumulated_width(&self) -> f32 {
        self.accumulated_w
    }

    pub fn target_width(&self) -> f32 {
        self.target_w
    }

    pub fn row_height(&self) -> f32 {
        self.row_height
    }

    pub fn margin(&self) -> f32 {
        self.margin
    }

    /// Source nodes this row used up, including nodes dropped after a failed
    /// thumbnail load.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn scale_ratio(&self) -> f32 {
        if self.accumulated_w <= 0.0 {
            return 1.0;
        }
        (self.target_w / self.accumulated_w).min(1.0)
    }

    /// Rendered height of the row including its bottom gutter.
    pub fn display_height(&self) -> f32 {
        (self.row_height + self.margin) * self.scale_ratio()
    }

    pub fn display_boxes(&self) -> Vec<DisplayBox> {
        let scale = self.scale_ratio();
        self.items
            .iter()
            .map(|item| DisplayBox {
                display_w: item.natural_w * scale,
                display_h: self.row_height * scale,
                offset_left: self.margin * scale,
            })
            .collect()
    }

    /// Total rendered width: leading gutter plus every item and its gutter.
    pub fn display_width(&self) -> f32 {
        let boxes = self.display_boxes();
        let trailing = if boxes.is_empty() {
            0.0
        } else {
            self.margin * self.scale_ratio()
        };
        boxes
            .iter()
            .map(|b| b.display_w + b.offset_left)
            .sum::<f32>()
            + trailing
    }
}
