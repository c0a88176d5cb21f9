use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic navigation counter shared by a session and its in-flight work.
#[derive(Debug, Clone, Default)]
pub struct Generation {
    current: Arc<AtomicU64>,
}

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    /// Invalidates every guard handed out so far and returns the new value.
    pub fn bump(&self) -> u64 {
        self.current.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Captures the current generation.
    pub fn guard(&self) -> GenerationGuard {
        GenerationGuard {
            token: self.current(),
            current: Arc::clone(&self.current),
        }
    }
}

/// A generation captured when work started. Every commit of that work checks
/// [`GenerationGuard::is_current`] first and becomes a no-op when it is stale.
#[derive(Debug, Clone)]
pub struct GenerationGuard {
    token: u64,
    current: Arc<AtomicU64>,
}

impl GenerationGuard {
    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.token
    }
}
