//! # Image caching
//!
//! Scrolling through a photo grid requests the same images over and over, often many times
//! concurrently, and usually long before they are actually visible. This module holds the
//! [`ImageCache`] which absorbs all of that.
//!
//! ## Layers
//!
//! - A bounded in-memory [`MemoryStore`] of decoded images. It is a strict LRU, bounded both by
//!   the number of entries and by their total decoded size.
//! - A table of in-flight *interactive* fetches. Every concurrent [`ImageCache::load`] of the
//!   same image attaches to the one running fetch and receives the same result.
//! - A table of in-flight *background* fetches started by [`ImageCache::prefetch`]. These run
//!   against their own, smaller connection pool.
//!
//! A key is never cached and in flight at the same time: the in-flight entry is removed in the
//! same critical section that inserts the decoded image.
//!
//! ## Promotion
//!
//! When an image is loaded while it is only being prefetched, the background fetch is cancelled
//! and an interactive fetch is started in its place. The background fetch observes its
//! cancellation token while waiting for a connection or for the transfer, right before decoding,
//! and once more under the lock right before inserting. A cancelled background fetch never
//! writes into the cache.
//!
//! ## Errors
//!
//! Failures of interactive loads are reported to every waiter as an [`ImageError`] and are not
//! cached, the next load retries. Failures of prefetches are logged at debug level and
//! otherwise dropped.
//!
//! ### Metrics
//!
//! - `images.access`: All interactive loads.
//! - `images.memory.hit`: Loads served from memory.
//! - `images.channel.hit`: Loads deduplicated onto a running fetch.
//! - `images.promoted`: Background fetches replaced by an interactive one.
//! - `images.prefetch.skipped` / `images.prefetch.cancelled` / `images.prefetch.failed`
//! - `images.load.failed`: Failed interactive loads, tagged with the error kind.
//! - `images.evicted`: Entries evicted to restore the cache bounds.
//! - `images.oversized`: Images too large to be cached at all.
//! - `images.memory.entries` / `images.memory.cost`: Gauges of the cache contents.

mod cache_error;
mod memory;
mod store;

pub use cache_error::{ImageError, ImageResult};
pub use memory::{CacheStats, ImageCache};
pub use store::MemoryStore;
