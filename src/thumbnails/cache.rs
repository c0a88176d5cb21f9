//! Deduplicating thumbnail cache with a bounded-concurrency loader.
//!
//! - Exactly one [`Thumbnail`] exists per [`ThumbnailKey`]
//! - At most `concurrency_limit` fetches are in flight, the rest wait in a FIFO queue
//! - `Failed` is terminal, a failed identity is never fetched again
//! - A global pause flag stops new loads from starting without touching in-flight ones
//!
//! Every started load holds a [`LoadPermit`]. Dropping the permit is the only way
//! the active-load counter goes down, so success, failure, timeout and a torn-down
//! fetch task all release their slot the same way.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use super::fetcher::ThumbnailFetcher;
use crate::error::ThumbnailError;

/// Default number of simultaneous thumbnail fetches.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 3;

/// Identity of a thumbnail: the source file and whether it is a square crop.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThumbnailKey {
    file_id: Arc<str>,
    square: bool,
}

impl ThumbnailKey {
    pub fn new(file_id: &str, square: bool) -> Self {
        Self {
            file_id: Arc::from(file_id),
            square,
        }
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    pub fn square(&self) -> bool {
        self.square
    }
}

impl fmt::Display for ThumbnailKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.square {
            write!(f, "{}#square", self.file_id)
        } else {
            f.write_str(&self.file_id)
        }
    }
}

/// Opaque renderable reference (URL, path) handed through to the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThumbnailHandle(Arc<str>);

impl ThumbnailHandle {
    pub fn new(value: &str) -> Self {
        Self(Arc::from(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A successfully loaded thumbnail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedThumbnail {
    pub width: u32,
    pub height: u32,
    pub handle: ThumbnailHandle,
}

impl LoadedThumbnail {
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ThumbnailState {
    Unrequested,
    Queued,
    Loading,
    Loaded(LoadedThumbnail),
    Failed(ThumbnailError),
}

impl ThumbnailState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Loaded(_) | Self::Failed(_))
    }
}

/// The single shared instance for one identity.
#[derive(Debug)]
pub struct Thumbnail {
    key: ThumbnailKey,
    state: watch::Sender<ThumbnailState>,
}

impl Thumbnail {
    fn new(key: ThumbnailKey) -> Self {
        let (state, _) = watch::channel(ThumbnailState::Unrequested);
        Self { key, state }
    }

    pub fn key(&self) -> &ThumbnailKey {
        &self.key
    }

    pub fn state(&self) -> ThumbnailState {
        self.state.borrow().clone()
    }

    /// The loaded result, if the thumbnail already settled successfully.
    pub fn loaded(&self) -> Option<LoadedThumbnail> {
        match &*self.state.borrow() {
            ThumbnailState::Loaded(loaded) => Some(loaded.clone()),
            _ => None,
        }
    }
}

/// Point-in-time view of the cache, taken under the scheduler lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub active_loads: usize,
    pub queued: usize,
    pub loading: usize,
    pub loaded: usize,
    pub failed: usize,
    pub paused: bool,
}

#[derive(Default)]
struct Scheduler {
    entries: HashMap<ThumbnailKey, Arc<Thumbnail>>,
    queue: VecDeque<Arc<Thumbnail>>,
    active_loads: usize,
    paused: bool,
    fetches_issued: usize,
}

struct Inner {
    fetcher: Arc<dyn ThumbnailFetcher>,
    limit: usize,
    timeout: Option<Duration>,
    scheduler: Mutex<Scheduler>,
}

impl Inner {
    /// Moves queued thumbnails to `Loading` while slots are free.
    /// Must be called with the scheduler locked; the caller spawns the returned loads.
    fn drain(&self, scheduler: &mut Scheduler) -> Vec<Arc<Thumbnail>> {
        let mut started = Vec::new();
        while !scheduler.paused && scheduler.active_loads < self.limit {
            let Some(thumbnail) = scheduler.queue.pop_front() else {
                break;
            };
            thumbnail.state.send_replace(ThumbnailState::Loading);
            scheduler.active_loads += 1;
            scheduler.fetches_issued += 1;
            started.push(thumbnail);
        }
        debug_assert!(scheduler.active_loads <= self.limit);
        started
    }

    fn finish(
        &self,
        thumbnail: &Thumbnail,
        outcome: Result<LoadedThumbnail, ThumbnailError>,
    ) -> Vec<Arc<Thumbnail>> {
        let mut scheduler = self.scheduler.lock();
        let state = match outcome {
            Ok(loaded) => {
                trace!(key = %thumbnail.key, loaded.width, loaded.height, "Thumbnail loaded");
                ThumbnailState::Loaded(loaded)
            }
            Err(err) => {
                debug!(key = %thumbnail.key, error = %err, "Thumbnail failed");
                ThumbnailState::Failed(err)
            }
        };
        thumbnail.state.send_replace(state);

        debug_assert!(scheduler.active_loads > 0);
        scheduler.active_loads = scheduler.active_loads.saturating_sub(1);
        self.drain(&mut scheduler)
    }

    fn spawn_loads(self: &Arc<Self>, started: Vec<Arc<Thumbnail>>) {
        for thumbnail in started {
            let permit = LoadPermit {
                inner: Arc::clone(self),
                thumbnail,
                outcome: None,
            };
            let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                warn!(key = %permit.thumbnail.key, "No async runtime, abandoning thumbnail load");
                drop(permit);
                continue;
            };

            let fetch = self.fetcher.fetch(&permit.thumbnail.key);
            let timeout = self.timeout;
            runtime.spawn(async move {
                let file_id = permit.thumbnail.key.file_id().to_string();
                let outcome = match timeout {
                    Some(limit) => match tokio::time::timeout(limit, fetch).await {
                        Ok(result) => result,
                        Err(_) => {
                            permit.settle(Err(ThumbnailError::TimedOut {
                                file_id,
                                timeout_ms: limit.as_millis() as u64,
                            }));
                            return;
                        }
                    },
                    None => fetch.await,
                };
                permit.settle(outcome.map_err(|source| ThumbnailError::Fetch { file_id, source }));
            });
        }
    }
}

/// Holds one of the `concurrency_limit` load slots.
struct LoadPermit {
    inner: Arc<Inner>,
    thumbnail: Arc<Thumbnail>,
    outcome: Option<Result<LoadedThumbnail, ThumbnailError>>,
}

impl LoadPermit {
    fn settle(mut self, outcome: Result<LoadedThumbnail, ThumbnailError>) {
        self.outcome = Some(outcome);
    }
}

impl Drop for LoadPermit {
    fn drop(&mut self) {
        let outcome = self.outcome.take().unwrap_or_else(|| {
            Err(ThumbnailError::Abandoned {
                file_id: self.thumbnail.key.file_id().to_string(),
            })
        });
        let next = self.inner.finish(&self.thumbnail, outcome);
        self.inner.spawn_loads(next);
    }
}

/// Shared thumbnail cache. Cloning is cheap and every clone sees the same
/// identity table and load counter.
#[derive(Clone)]
pub struct ThumbnailCache {
    inner: Arc<Inner>,
}

impl ThumbnailCache {
    pub fn new(fetcher: Arc<dyn ThumbnailFetcher>) -> Self {
        ThumbnailCacheBuilder::new().build(fetcher)
    }

    /// Returns the instance for `key`, creating an `Unrequested` one on first use.
    pub fn get(&self, key: &ThumbnailKey) -> Arc<Thumbnail> {
        let mut scheduler = self.inner.scheduler.lock();
        Arc::clone(
            scheduler
                .entries
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Thumbnail::new(key.clone()))),
        )
    }

    /// Current state of `key` without creating an entry.
    pub fn peek(&self, key: &ThumbnailKey) -> Option<ThumbnailState> {
        self.inner
            .scheduler
            .lock()
            .entries
            .get(key)
            .map(|thumbnail| thumbnail.state())
    }

    /// Requests a load and returns a future for its outcome.
    ///
    /// The load is queued synchronously, so dropping the returned future does
    /// not cancel it. Requests for a thumbnail that is already queued, loading or
    /// settled never issue a second fetch. Must be called inside a tokio runtime.
    pub fn request(
        &self,
        thumbnail: &Arc<Thumbnail>,
    ) -> impl Future<Output = Result<LoadedThumbnail, ThumbnailError>> + Send + 'static {
        let started = {
            let mut scheduler = self.inner.scheduler.lock();
            let unrequested = matches!(*thumbnail.state.borrow(), ThumbnailState::Unrequested);
            if unrequested {
                thumbnail.state.send_replace(ThumbnailState::Queued);
                scheduler.queue.push_back(Arc::clone(thumbnail));
                trace!(
                    key = %thumbnail.key,
                    queued = scheduler.queue.len(),
                    active = scheduler.active_loads,
                    "Thumbnail requested"
                );
                self.inner.drain(&mut scheduler)
            } else {
                Vec::new()
            }
        };
        self.inner.spawn_loads(started);

        let mut state = thumbnail.state.subscribe();
        let file_id = thumbnail.key.file_id().to_string();
        async move {
            let settled = match state.wait_for(ThumbnailState::is_terminal).await {
                Ok(settled) => settled.clone(),
                Err(_) => return Err(ThumbnailError::Abandoned { file_id }),
            };
            match settled {
                ThumbnailState::Loaded(loaded) => Ok(loaded),
                ThumbnailState::Failed(err) => Err(err),
                _ => Err(ThumbnailError::Abandoned { file_id }),
            }
        }
    }

    /// Queues a load for `key` without waiting on it.
    pub fn enqueue(&self, key: &ThumbnailKey) {
        drop(self.request_key(key));
    }

    /// Shorthand for `request(&get(key))`.
    pub fn request_key(
        &self,
        key: &ThumbnailKey,
    ) -> impl Future<Output = Result<LoadedThumbnail, ThumbnailError>> + Send + 'static {
        let thumbnail = self.get(key);
        self.request(&thumbnail)
    }

    /// Stops queued loads from starting. In-flight loads are unaffected.
    /// Un-pausing starts queued loads up to the concurrency limit.
    pub fn set_paused(&self, paused: bool) {
        let started = {
            let mut scheduler = self.inner.scheduler.lock();
            if scheduler.paused == paused {
                return;
            }
            scheduler.paused = paused;
            debug!(paused, queued = scheduler.queue.len(), "Thumbnail queue pause changed");
            self.inner.drain(&mut scheduler)
        };
        self.inner.spawn_loads(started);
    }

    pub fn is_paused(&self) -> bool {
        self.inner.scheduler.lock().paused
    }

    pub fn concurrency_limit(&self) -> usize {
        self.inner.limit
    }

    /// Number of underlying fetches issued so far.
    pub fn fetch_count(&self) -> usize {
        self.inner.scheduler.lock().fetches_issued
    }

    pub fn len(&self) -> usize {
        self.inner.scheduler.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let scheduler = self.inner.scheduler.lock();
        let mut stats = CacheStats {
            entries: scheduler.entries.len(),
            active_loads: scheduler.active_loads,
            paused: scheduler.paused,
            ..Default::default()
        };
        for thumbnail in scheduler.entries.values() {
            match &*thumbnail.state.borrow() {
                ThumbnailState::Unrequested => {}
                ThumbnailState::Queued => stats.queued += 1,
                ThumbnailState::Loading => stats.loading += 1,
                ThumbnailState::Loaded(_) => stats.loaded += 1,
                ThumbnailState::Failed(_) => stats.failed += 1,
            }
        }
        stats
    }
}

impl fmt::Debug for ThumbnailCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThumbnailCache")
            .field("limit", &self.inner.limit)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Builder for [`ThumbnailCache`] with configuration options.
pub struct ThumbnailCacheBuilder {
    limit: usize,
    timeout: Option<Duration>,
}

impl ThumbnailCacheBuilder {
    pub fn new() -> Self {
        Self {
            limit: DEFAULT_CONCURRENCY_LIMIT,
            timeout: None,
        }
    }

    pub fn concurrency_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Fails loads that take longer than `timeout`. Off by default: without it a
    /// fetch that never resolves stays `Loading` forever.
    pub fn fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self, fetcher: Arc<dyn ThumbnailFetcher>) -> ThumbnailCache {
        debug!(limit = self.limit, timeout = ?self.timeout, "Initialized thumbnail cache");
        ThumbnailCache {
            inner: Arc::new(Inner {
                fetcher,
                limit: self.limit,
                timeout: self.timeout,
                scheduler: Mutex::new(Scheduler::default()),
            }),
        }
    }
}

impl Default for ThumbnailCacheBuilder {
    fn default() -> Self {
        Self::new()
    }
}
