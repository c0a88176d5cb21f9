//! Test doubles shared by the unit tests of several modules.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::FetchError;
use crate::models::{GalleryNode, RowModel, RowState};
use crate::session::Renderer;
use crate::thumbnails::{FetchFuture, LoadedThumbnail, ThumbnailFetcher, ThumbnailHandle, ThumbnailKey};

type Reply = oneshot::Sender<Result<LoadedThumbnail, FetchError>>;

/// Lets spawned loads and fill loops run to their next suspension point.
pub(crate) async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

/// In-memory fetcher. Square 256x256 by default; per-file sizes and failures
/// are configurable. In gated mode each fetch waits for an explicit release.
pub(crate) struct FakeFetcher {
    gated: AtomicBool,
    sizes: Mutex<HashMap<String, (u32, u32)>>,
    failing: Mutex<HashSet<String>>,
    waiting: Mutex<VecDeque<(ThumbnailKey, Reply)>>,
    calls: Mutex<Vec<ThumbnailKey>>,
}

impl FakeFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            gated: AtomicBool::new(false),
            sizes: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            waiting: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn gated() -> Arc<Self> {
        let fetcher = Self::new();
        fetcher.gated.store(true, Ordering::SeqCst);
        fetcher
    }

    pub fn set_size(&self, file_id: &str, width: u32, height: u32) {
        self.sizes.lock().insert(file_id.to_string(), (width, height));
    }

    pub fn fail(&self, file_id: &str) {
        self.failing.lock().insert(file_id.to_string());
    }

    pub fn calls_for(&self, file_id: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|k| k.file_id() == file_id)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn waiting(&self) -> Vec<ThumbnailKey> {
        self.waiting.lock().iter().map(|(k, _)| k.clone()).collect()
    }

    /// Completes the oldest gated fetch for `file_id`.
    pub fn release(&self, file_id: &str) -> bool {
        let entry = {
            let mut waiting = self.waiting.lock();
            waiting
                .iter()
                .position(|(k, _)| k.file_id() == file_id)
                .and_then(|idx| waiting.remove(idx))
        };
        match entry {
            Some((key, reply)) => {
                let _ = reply.send(self.outcome(&key));
                true
            }
            None => false,
        }
    }

    pub fn release_all(&self) {
        let drained: Vec<_> = self.waiting.lock().drain(..).collect();
        for (key, reply) in drained {
            let _ = reply.send(self.outcome(&key));
        }
    }

    fn outcome(&self, key: &ThumbnailKey) -> Result<LoadedThumbnail, FetchError> {
        if self.failing.lock().contains(key.file_id()) {
            return Err(FetchError::NotFound(key.file_id().to_string()));
        }
        let (width, height) = if key.square() {
            (256, 256)
        } else {
            self.sizes
                .lock()
                .get(key.file_id())
                .copied()
                .unwrap_or((256, 256))
        };
        Ok(LoadedThumbnail {
            width,
            height,
            handle: ThumbnailHandle::new(&format!("thumb://{key}")),
        })
    }
}

impl ThumbnailFetcher for FakeFetcher {
    fn fetch(&self, key: &ThumbnailKey) -> FetchFuture {
        self.calls.lock().push(key.clone());
        if !self.gated.load(Ordering::SeqCst) {
            let outcome = self.outcome(key);
            return Box::pin(async move { outcome });
        }
        let (tx, rx) = oneshot::channel();
        self.waiting.lock().push_back((key.clone(), tx));
        Box::pin(async move {
            rx.await
                .unwrap_or_else(|_| Err(FetchError::Io("fetch gate dropped".to_string())))
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RenderedRow {
    pub generation: u64,
    pub paths: Vec<String>,
    pub state: RowState,
    pub display_width: f32,
    pub target_width: f32,
}

/// Renderer that records everything it is asked to draw.
#[derive(Default)]
pub(crate) struct RecordingRenderer {
    pub albums: Mutex<Vec<(String, u64)>>,
    pub rows: Mutex<Vec<RenderedRow>>,
}

impl RecordingRenderer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn row_paths(&self) -> Vec<Vec<String>> {
        self.rows.lock().iter().map(|r| r.paths.clone()).collect()
    }

    pub fn rendered_paths(&self) -> Vec<String> {
        self.rows
            .lock()
            .iter()
            .flat_map(|r| r.paths.iter().cloned())
            .collect()
    }
}

impl Renderer for RecordingRenderer {
    fn begin_album(&self, album: &GalleryNode, generation: u64) {
        self.albums.lock().push((album.path().to_string(), generation));
    }

    fn append_row(&self, row: &RowModel, generation: u64) {
        self.rows.lock().push(RenderedRow {
            generation,
            paths: row.items().iter().map(|i| i.node.path().to_string()).collect(),
            state: row.state(),
            display_width: row.display_width(),
            target_width: row.target_width(),
        });
    }
}
