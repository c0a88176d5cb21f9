//! Wall configuration: defaults plus `PHOTOWALL_*` environment overrides.

use std::time::Duration;

use tracing::warn;

use crate::layout::preload::{
    DEFAULT_ALBUM_COMPOSITE, DEFAULT_PRELOAD_BUFFER, DEFAULT_PRELOAD_LOOKAHEAD,
};
use crate::layout::JustifiedLayout;
use crate::models::{SortConfig, SortKey, SortOrder};
use crate::thumbnails::{ThumbnailCacheBuilder, DEFAULT_CONCURRENCY_LIMIT};

/// Content is loaded until it reaches this many viewport heights below the
/// scroll offset.
const DEFAULT_FILL_AHEAD_SCREENS: f32 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub struct WallConfig {
    pub concurrency_limit: usize,
    pub row_height: f32,
    pub margin: f32,
    pub preload_buffer: usize,
    pub preload_lookahead: usize,
    pub album_composite: usize,
    pub fill_ahead_screens: f32,
    /// `None` keeps a stuck fetch waiting forever.
    pub fetch_timeout: Option<Duration>,
    pub sort: SortConfig,
}

impl Default for WallConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            row_height: 200.0,
            margin: 4.0,
            preload_buffer: DEFAULT_PRELOAD_BUFFER,
            preload_lookahead: DEFAULT_PRELOAD_LOOKAHEAD,
            album_composite: DEFAULT_ALBUM_COMPOSITE,
            fill_ahead_screens: DEFAULT_FILL_AHEAD_SCREENS,
            fetch_timeout: None,
            sort: SortConfig::default(),
        }
    }
}

impl WallConfig {
    /// Defaults overridden by any valid `PHOTOWALL_*` variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = parse_var(&lookup, "PHOTOWALL_CONCURRENCY", |v| {
            v.parse::<usize>().ok().filter(|n| *n > 0)
        }) {
            config.concurrency_limit = v;
        }
        if let Some(v) = parse_var(&lookup, "PHOTOWALL_ROW_HEIGHT", |v| {
            v.parse::<f32>().ok().filter(|h| *h >= 1.0)
        }) {
            config.row_height = v;
        }
        if let Some(v) = parse_var(&lookup, "PHOTOWALL_MARGIN", |v| {
            v.parse::<f32>().ok().filter(|m| *m >= 0.0)
        }) {
            config.margin = v;
        }
        if let Some(v) = parse_var(&lookup, "PHOTOWALL_PRELOAD_LOOKAHEAD", |v| {
            v.parse::<usize>().ok()
        }) {
            config.preload_lookahead = v;
        }
        if let Some(ms) = parse_var(&lookup, "PHOTOWALL_FETCH_TIMEOUT_MS", |v| {
            v.parse::<u64>().ok()
        }) {
            config.fetch_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(key) = parse_var(&lookup, "PHOTOWALL_SORT", SortKey::parse) {
            config.sort.key = key;
        }
        if let Some(order) = parse_var(&lookup, "PHOTOWALL_ORDER", SortOrder::parse) {
            config.sort.order = order;
        }
        if let Some(order) = parse_var(&lookup, "PHOTOWALL_ALBUM_ORDER", SortOrder::parse) {
            config.sort.album_order = order;
        }

        config
    }

    pub fn layout(&self) -> JustifiedLayout {
        JustifiedLayout::new(self.row_height, self.margin)
    }

    pub fn cache_builder(&self) -> ThumbnailCacheBuilder {
        ThumbnailCacheBuilder::new()
            .concurrency_limit(self.concurrency_limit)
            .fetch_timeout(self.fetch_timeout)
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let raw = lookup(name)?;
    let parsed = parse(raw.trim());
    if parsed.is_none() {
        warn!(name, value = %raw, "Ignoring invalid configuration value");
    }
    parsed
}
