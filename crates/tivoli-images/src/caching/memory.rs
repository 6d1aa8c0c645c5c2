use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::config::ImageCacheConfig;
use crate::decode::{Decode, Decoded, ImageDecoder};
use crate::fetch::{ConnectionPool, FetchPorts};
use crate::types::ResourceKey;
use crate::utils::defer::defer;

use super::{ImageError, ImageResult, MemoryStore};

type ComputationChannel<T> = Shared<oneshot::Receiver<ImageResult<T>>>;

/// A running interactive fetch that any number of loads can attach to.
struct PendingFetch<T> {
    /// Distinguishes this fetch from later fetches of the same key.
    id: u64,
    channel: ComputationChannel<T>,
}

/// A running background fetch.
struct BackgroundFetch {
    id: u64,
    cancel: CancellationToken,
}

/// All mutable cache state, guarded by one lock.
struct State<T> {
    store: MemoryStore<T>,
    interactive: HashMap<ResourceKey, PendingFetch<T>>,
    background: HashMap<ResourceKey, BackgroundFetch>,
}

impl<T: Clone> State<T> {
    fn remove_interactive(&mut self, key: &ResourceKey, id: u64) {
        if self.interactive.get(key).is_some_and(|pending| pending.id == id) {
            self.interactive.remove(key);
        }
    }

    fn remove_background(&mut self, key: &ResourceKey, id: u64) {
        if self.background.get(key).is_some_and(|fetch| fetch.id == id) {
            self.background.remove(key);
        }
    }

    /// Stores a freshly decoded image and returns it.
    fn insert(&mut self, key: ResourceKey, decoded: Decoded<T>) -> T {
        let image = decoded.image.clone();
        let evicted = self.store.insert(key, decoded.image, decoded.cost);
        if !evicted.is_empty() {
            metric!(counter("images.evicted") += evicted.len() as i64);
            tracing::trace!(count = evicted.len(), "Evicted images from memory");
        }

        metric!(gauge("images.memory.entries") = self.store.len() as u64);
        metric!(gauge("images.memory.cost") = self.store.total_cost());
        image
    }
}

/// A snapshot of the cache contents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of decoded images in memory.
    pub entries: usize,
    /// Total decoded size of all images in memory.
    pub total_cost: u64,
    /// Number of running interactive fetches.
    pub interactive_in_flight: usize,
    /// Number of running background fetches.
    pub background_in_flight: usize,
}

struct Inner<D: Decode> {
    state: Mutex<State<D::Image>>,
    ports: FetchPorts,
    decoder: Arc<D>,
    runtime: Handle,
    next_id: AtomicU64,
}

/// A bounded in-memory cache of decoded images.
///
/// Transparently fetches and decodes missing images through two [`ConnectionPool`]s: one for
/// images about to be displayed ([`load`](Self::load)), one for speculative warming
/// ([`prefetch`](Self::prefetch)).
///
/// Internally deduplicates concurrent fetches of the same image. The cache is cheap to clone,
/// all clones share the same state.
pub struct ImageCache<D: Decode = ImageDecoder> {
    inner: Arc<Inner<D>>,
}

impl<D: Decode> Clone for ImageCache<D> {
    fn clone(&self) -> Self {
        // https://github.com/rust-lang/rust/issues/26925
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Decode> fmt::Debug for ImageCache<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageCache")
            .field("stats", &self.stats())
            .field("ports", &self.inner.ports)
            .finish()
    }
}

impl<D: Decode> ImageCache<D> {
    /// Creates an empty cache.
    ///
    /// Fetches are spawned onto `runtime`, which allows calling [`prefetch`](Self::prefetch)
    /// from outside of it.
    pub fn new(config: &ImageCacheConfig, ports: FetchPorts, decoder: D, runtime: Handle) -> Self {
        let state = State {
            store: MemoryStore::new(config.max_count, config.max_cost_bytes),
            interactive: HashMap::new(),
            background: HashMap::new(),
        };
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                ports,
                decoder: Arc::new(decoder),
                runtime,
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Loads an image that is about to be displayed.
    ///
    /// This returns the cached image if there is one. Otherwise it attaches to a running
    /// interactive fetch of the same image, or starts one, cancelling a background fetch of the
    /// image if there is one.
    ///
    /// # Errors
    ///
    /// Fails with [`ImageError::FetchFailed`] or [`ImageError::DecodeFailed`]. Every load
    /// attached to the same fetch receives the same error. Failures are not cached.
    pub async fn load(&self, key: &ResourceKey) -> ImageResult<D::Image> {
        metric!(counter("images.access") += 1);

        let (channel, task) = {
            let mut state = self.inner.state.lock();

            if let Some(image) = state.store.get(key) {
                metric!(counter("images.memory.hit") += 1);
                tracing::trace!(key = %key, "Image served from memory");
                return Ok(image);
            }

            match state.interactive.get(key) {
                Some(pending) => {
                    // A concurrent load was deduplicated.
                    metric!(counter("images.channel.hit") += 1);
                    (pending.channel.clone(), None)
                }
                None => {
                    if let Some(background) = state.background.remove(key) {
                        background.cancel.cancel();
                        metric!(counter("images.promoted") += 1);
                        tracing::trace!(key = %key, "Promoted background fetch");
                    }

                    let (pending, task) = self.interactive_fetch(key.clone());
                    let channel = pending.channel.clone();
                    state.interactive.insert(key.clone(), pending);
                    (channel, Some(task))
                }
            }
        };

        // Spawned outside of the lock, the task needs it to complete.
        if let Some(task) = task {
            self.inner.runtime.spawn(task);
        }

        let result = channel.await.unwrap_or_else(|_canceled| {
            tracing::error!(key = %key, "Image fetch channel dropped");
            Err(ImageError::InternalError)
        });

        if let Err(err) = &result {
            metric!(counter("images.load.failed") += 1, "kind" => err.metrics_tag());
        }
        result
    }

    /// Warms the cache with the given images, in order.
    ///
    /// Images that are cached or already being fetched are skipped. This returns immediately,
    /// the fetches run on the background connection pool and their failures are dropped.
    pub fn prefetch<I>(&self, keys: I)
    where
        I: IntoIterator<Item = ResourceKey>,
    {
        let mut tasks = Vec::new();
        {
            let mut state = self.inner.state.lock();
            for key in keys {
                if state.store.contains(&key)
                    || state.interactive.contains_key(&key)
                    || state.background.contains_key(&key)
                {
                    metric!(counter("images.prefetch.skipped") += 1);
                    continue;
                }

                let id = self.next_id();
                let cancel = CancellationToken::new();
                state.background.insert(
                    key.clone(),
                    BackgroundFetch {
                        id,
                        cancel: cancel.clone(),
                    },
                );
                tasks.push(self.background_fetch(key, id, cancel));
            }
        }

        if !tasks.is_empty() {
            tracing::trace!(count = tasks.len(), "Scheduling prefetches");
        }
        for task in tasks {
            self.inner.runtime.spawn(task);
        }
    }

    /// Returns the cached image, marking it as recently used.
    ///
    /// This never fetches.
    pub fn cached(&self, key: &ResourceKey) -> Option<D::Image> {
        self.inner.state.lock().store.get(key)
    }

    /// Checks whether an image is cached, without marking it as recently used.
    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.inner.state.lock().store.contains(key)
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.inner.state.lock();
        CacheStats {
            entries: state.store.len(),
            total_cost: state.store.total_cost(),
            interactive_in_flight: state.interactive.len(),
            background_in_flight: state.background.len(),
        }
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Creates the table entry and the task of a new interactive fetch.
    ///
    /// The task has to be spawned after the entry is registered.
    fn interactive_fetch(
        &self,
        key: ResourceKey,
    ) -> (PendingFetch<D::Image>, impl Future<Output = ()> + Send + use<D>) {
        let id = self.next_id();
        let (sender, receiver) = oneshot::channel();

        // Evicts the table entry in case the task is dropped before it completes. Waiters then
        // observe a dropped channel.
        let cleanup = {
            let this = self.clone();
            let key = key.clone();
            defer(move || this.inner.state.lock().remove_interactive(&key, id))
        };

        let this = self.clone();
        let task = async move {
            let result = this
                .fetch_and_decode(&this.inner.ports.interactive, &key)
                .await;

            let result = {
                let mut state = this.inner.state.lock();
                state.remove_interactive(&key, id);
                result.map(|decoded| state.insert(key, decoded))
            };
            cleanup.cancel();

            sender.send(result).ok();
        };

        let pending = PendingFetch {
            id,
            channel: receiver.shared(),
        };
        (pending, task)
    }

    /// Creates the task of a new background fetch.
    fn background_fetch(
        &self,
        key: ResourceKey,
        id: u64,
        cancel: CancellationToken,
    ) -> impl Future<Output = ()> + Send + use<D> {
        let cleanup = {
            let this = self.clone();
            let key = key.clone();
            defer(move || this.inner.state.lock().remove_background(&key, id))
        };

        let this = self.clone();
        async move {
            // Abandons the transfer, or the wait for a connection, once promoted.
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                bytes = this.inner.ports.background.fetch(&key) => Some(bytes),
            };

            let result = match fetched {
                Some(Ok(bytes)) if !cancel.is_cancelled() => this.decode(bytes).await,
                Some(Err(err)) => Err(err),
                _ => {
                    metric!(counter("images.prefetch.cancelled") += 1);
                    tracing::trace!(key = %key, "Prefetch cancelled");
                    cleanup.cancel();
                    return;
                }
            };

            {
                let mut state = this.inner.state.lock();
                // The promoting load already removed our table entry.
                if cancel.is_cancelled() {
                    metric!(counter("images.prefetch.cancelled") += 1);
                } else {
                    state.remove_background(&key, id);
                    match result {
                        Ok(decoded) => {
                            state.insert(key, decoded);
                        }
                        Err(err) => {
                            metric!(
                                counter("images.prefetch.failed") += 1,
                                "kind" => err.metrics_tag(),
                            );
                            tracing::debug!(
                                error = &err as &dyn std::error::Error,
                                key = %key,
                                "Prefetch failed",
                            );
                        }
                    }
                }
            }
            cleanup.cancel();
        }
    }

    async fn fetch_and_decode(
        &self,
        pool: &ConnectionPool,
        key: &ResourceKey,
    ) -> ImageResult<Decoded<D::Image>> {
        let bytes = pool.fetch(key).await?;
        self.decode(bytes).await
    }

    /// Decodes on the blocking thread pool.
    async fn decode(&self, bytes: Bytes) -> ImageResult<Decoded<D::Image>> {
        let decoder = Arc::clone(&self.inner.decoder);
        self.inner
            .runtime
            .spawn_blocking(move || decoder.decode(bytes))
            .await?
    }
}
