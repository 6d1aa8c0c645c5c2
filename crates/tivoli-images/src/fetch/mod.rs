//! Retrieval of raw image bytes.
//!
//! A [`FetchPort`] is the transport: it turns a [`ResourceKey`] into bytes. The cache never talks
//! to a port directly, but through a [`ConnectionPool`], which enforces the connection budget of
//! one priority tier. Interactive and background fetches use two separate pools, so a saturated
//! background pool cannot delay images that are about to be displayed.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::sync::Semaphore;

use crate::caching::{ImageError, ImageResult};
use crate::config::FetchConfig;
use crate::types::{Priority, ResourceKey};

mod http;

pub use http::{FetchTimeouts, HttpFetcher, USER_AGENT};

/// Retrieves the raw bytes of an image.
///
/// The returned future owns everything it needs. Dropping it abandons the transfer.
pub trait FetchPort: Send + Sync + 'static {
    fn fetch(&self, key: &ResourceKey) -> BoxFuture<'static, ImageResult<Bytes>>;
}

impl<T: FetchPort + ?Sized> FetchPort for Arc<T> {
    fn fetch(&self, key: &ResourceKey) -> BoxFuture<'static, ImageResult<Bytes>> {
        (**self).fetch(key)
    }
}

/// A [`FetchPort`] limited to a fixed number of concurrent fetches.
#[derive(Clone)]
pub struct ConnectionPool {
    priority: Priority,
    port: Arc<dyn FetchPort>,
    permits: Arc<Semaphore>,
    concurrency: usize,
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("priority", &self.priority)
            .field("concurrency", &self.concurrency)
            .field("available", &self.permits.available_permits())
            .finish()
    }
}

impl ConnectionPool {
    /// Creates a pool allowing `concurrency` fetches at once, at least one.
    pub fn new(priority: Priority, port: Arc<dyn FetchPort>, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            priority,
            port,
            permits: Arc::new(Semaphore::new(concurrency)),
            concurrency,
        }
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// The number of fetches that could start right now without waiting.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Fetches `key` once a connection slot is free.
    ///
    /// The slot is held until the transfer completes or the returned future is dropped.
    pub async fn fetch(&self, key: &ResourceKey) -> ImageResult<Bytes> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(ImageError::from_std_error)?;

        let priority = self.priority.as_str();
        metric!(counter("images.fetch") += 1, "priority" => priority);
        tracing::trace!(key = %key, priority, "Fetching image");

        let start = Instant::now();
        let result = self.port.fetch(key).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metric!(
            timer("images.fetch.duration") = start.elapsed(),
            "priority" => priority,
            "status" => status,
        );
        if let Ok(bytes) = &result {
            metric!(time_raw("images.fetch.size") = bytes.len() as u64, "priority" => priority);
        }
        result
    }
}

/// The interactive and the background connection pool.
#[derive(Clone, Debug)]
pub struct FetchPorts {
    pub interactive: ConnectionPool,
    pub background: ConnectionPool,
}

impl FetchPorts {
    /// Wraps the two transports in pools sized according to `config`.
    pub fn new(
        interactive: Arc<dyn FetchPort>,
        background: Arc<dyn FetchPort>,
        config: &FetchConfig,
    ) -> Self {
        Self {
            interactive: ConnectionPool::new(
                Priority::Interactive,
                interactive,
                config.interactive_concurrency,
            ),
            background: ConnectionPool::new(
                Priority::Background,
                background,
                config.background_concurrency,
            ),
        }
    }

    /// Creates two independent HTTP transports, each with its own connection pool.
    pub fn http(config: &FetchConfig) -> reqwest::Result<Self> {
        let timeouts = FetchTimeouts::from_config(config);
        let interactive = HttpFetcher::new(&timeouts, config.interactive_concurrency)?;
        let background = HttpFetcher::new(&timeouts, config.background_concurrency)?;
        Ok(Self::new(Arc::new(interactive), Arc::new(background), config))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::test::{MockFetcher, key};

    #[tokio::test]
    async fn test_pool_limits_concurrency() {
        let fetcher = MockFetcher::gated();
        let pool = ConnectionPool::new(Priority::Background, Arc::new(fetcher.clone()), 2);

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.fetch(&key(&i.to_string())).await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fetcher.total_calls(), 2);
        assert_eq!(pool.available(), 0);

        fetcher.open();
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(fetcher.total_calls(), 5);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_pools_are_independent() {
        let background = MockFetcher::gated();
        let interactive = MockFetcher::default();
        let ports = FetchPorts::new(
            Arc::new(interactive.clone()),
            Arc::new(background.clone()),
            &FetchConfig {
                background_concurrency: 1,
                ..Default::default()
            },
        );
        assert_eq!(ports.interactive.priority(), Priority::Interactive);
        assert_eq!(ports.background.priority(), Priority::Background);
        assert_eq!(ports.background.concurrency(), 1);

        let blocked = {
            let pool = ports.background.clone();
            tokio::spawn(async move { pool.fetch(&key("slow")).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(ports.background.available(), 0);

        let bytes = ports.interactive.fetch(&key("fast")).await.unwrap();
        assert_eq!(bytes, MockFetcher::body_for(&key("fast")));

        background.open();
        assert!(blocked.await.unwrap().is_ok());
    }

    #[test]
    fn test_concurrency_is_clamped() {
        let pool = ConnectionPool::new(Priority::Interactive, Arc::new(MockFetcher::default()), 0);
        assert_eq!(pool.concurrency(), 1);
        assert_eq!(pool.available(), 1);
    }
}
