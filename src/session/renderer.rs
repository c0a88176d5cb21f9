//! Output side of a view session.

use flume::{Receiver, Sender};
use tracing::trace;

use crate::models::{DisplayBox, GalleryNode, RowModel, RowState};
use crate::thumbnails::ThumbnailHandle;

/// Receives completed rows. Only rows of the current generation are ever
/// delivered, always in the order they were built.
pub trait Renderer: Send + Sync {
    /// The wall was cleared for a newly entered album.
    fn begin_album(&self, album: &GalleryNode, generation: u64);

    fn append_row(&self, row: &RowModel, generation: u64);
}

/// One placed item of a rendered row.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedItem {
    pub path: String,
    pub display_name: String,
    pub is_album: bool,
    pub handle: Option<ThumbnailHandle>,
    /// Left edge of the item within the row.
    pub x: f32,
    pub placement: DisplayBox,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    AlbumEntered {
        path: String,
        generation: u64,
    },
    Row {
        generation: u64,
        state: RowState,
        height: f32,
        items: Vec<RenderedItem>,
    },
}

/// Forwards render calls over a flume channel so another task or thread can
/// own the actual drawing.
#[derive(Debug, Clone)]
pub struct ChannelRenderer {
    tx: Sender<RenderEvent>,
}

impl ChannelRenderer {
    pub fn new() -> (Self, Receiver<RenderEvent>) {
        let (tx, rx) = flume::unbounded();
        (Self { tx }, rx)
    }

    fn send(&self, event: RenderEvent) {
        if self.tx.send(event).is_err() {
            trace!("Render receiver dropped, discarding event");
        }
    }
}

impl Renderer for ChannelRenderer {
    fn begin_album(&self, album: &GalleryNode, generation: u64) {
        self.send(RenderEvent::AlbumEntered {
            path: album.path().to_string(),
            generation,
        });
    }

    fn append_row(&self, row: &RowModel, generation: u64) {
        let mut x = 0.0f32;
        let items = row
            .items()
            .iter()
            .zip(row.display_boxes())
            .map(|(item, placement)| {
                x += placement.offset_left;
                let left = x;
                x += placement.display_w;
                RenderedItem {
                    path: item.node.path().to_string(),
                    display_name: item.node.display_name().to_string(),
                    is_album: item.node.is_album(),
                    handle: item.handle.clone(),
                    x: left,
                    placement,
                }
            })
            .collect();
        self.send(RenderEvent::Row {
            generation,
            state: row.state(),
            height: row.display_height(),
            items,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::gallery::fixtures::album_with_images;
    use crate::models::{RowItem, RowModel};

    #[test]
    fn test_channel_renderer_forwards_placed_rows() {
        let (renderer, rx) = ChannelRenderer::new();
        let album = album_with_images("/a", 2);
        let children = album.as_album().unwrap().children().to_vec();

        let items = children
            .iter()
            .map(|node| RowItem {
                node: node.clone(),
                natural_w: 200.0,
                handle: Some(ThumbnailHandle::new(node.path())),
            })
            .collect();
        let row = RowModel::new(items, RowState::Exhausted, 412.0, 1000.0, 200.0, 4.0, 2);

        renderer.begin_album(&album, 7);
        renderer.append_row(&row, 7);

        assert_eq!(
            rx.try_recv().unwrap(),
            RenderEvent::AlbumEntered {
                path: "/a".into(),
                generation: 7
            }
        );
        match rx.try_recv().unwrap() {
            RenderEvent::Row {
                generation,
                items,
                height,
                ..
            } => {
                assert_eq!(generation, 7);
                assert_eq!(height, 204.0);
                assert_eq!(items.len(), 2);
                assert_eq!(items[1].path, "/a/1.jpg");
                assert_eq!(items[1].x, 208.0);
                assert_eq!(items[1].placement.offset_left, 4.0);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let (renderer, rx) = ChannelRenderer::new();
        drop(rx);
        renderer.begin_album(&album_with_images("/a", 0), 1);
    }
}
