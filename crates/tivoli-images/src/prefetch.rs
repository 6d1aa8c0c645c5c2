//! Warming the cache ahead of scrolling.
//!
//! Whenever an item becomes visible, the [`PrefetchScheduler`] requests the next items in
//! [`VisualOrder`] from the cache. It is meant to be called on every appearance of an item; the
//! cache skips everything that is already cached or being fetched, so repeated calls are cheap.

use std::ops::Range;

use crate::caching::ImageCache;
use crate::config::PrefetchConfig;
use crate::decode::Decode;
use crate::layout::VisualOrder;
use crate::types::ResourceKey;

/// Receives the keys to warm, in order.
pub trait Prefetch {
    fn prefetch(&self, keys: Vec<ResourceKey>);
}

impl<D: Decode> Prefetch for ImageCache<D> {
    fn prefetch(&self, keys: Vec<ResourceKey>) {
        ImageCache::prefetch(self, keys)
    }
}

/// The result of [`PrefetchScheduler::on_visible`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// The following items were handed to the cache.
    Scheduled { count: usize },
    /// The visible item is not part of the layout yet. Nothing was scheduled.
    NotLaidOut,
}

/// The positions following `position` in a visual order of `len` items, at most `window_size`.
pub fn window(position: usize, window_size: usize, len: usize) -> Range<usize> {
    let start = position.saturating_add(1).min(len);
    let end = start.saturating_add(window_size).min(len);
    start..end
}

/// Prefetches a window of items following the visible one.
#[derive(Clone, Debug)]
pub struct PrefetchScheduler<P = ImageCache> {
    target: P,
    window_size: usize,
}

impl<P: Prefetch> PrefetchScheduler<P> {
    pub fn new(target: P, window_size: usize) -> Self {
        Self {
            target,
            window_size,
        }
    }

    pub fn from_config(target: P, config: &PrefetchConfig) -> Self {
        Self::new(target, config.window_size)
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Schedules prefetches for the items following `item_index` in `order`.
    ///
    /// `key_for` maps an item index to the key of its image. Items without a key are skipped.
    pub fn on_visible<F>(&self, item_index: usize, order: &VisualOrder, key_for: F) -> ScheduleOutcome
    where
        F: FnMut(usize) -> Option<ResourceKey>,
    {
        let Some(position) = order.position_of(item_index) else {
            tracing::trace!(item_index, "Visible item not laid out yet");
            return ScheduleOutcome::NotLaidOut;
        };

        let keys: Vec<_> = window(position, self.window_size, order.len())
            .filter_map(|position| order.index_at(position))
            .filter_map(key_for)
            .collect();

        let count = keys.len();
        if count > 0 {
            metric!(counter("prefetch.scheduled") += count as i64);
            tracing::trace!(item_index, position, count, "Scheduling prefetch window");
            self.target.prefetch(keys);
        }

        ScheduleOutcome::Scheduled { count }
    }
}
