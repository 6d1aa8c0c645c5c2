//! Support to fetch images from the photo server over HTTP.

use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use reqwest::{Client, header};

use crate::caching::{ImageError, ImageResult};
use crate::config::FetchConfig;
use crate::types::ResourceKey;

use super::FetchPort;

/// The user agent sent with every image request.
pub const USER_AGENT: &str = concat!("tivoli/", env!("CARGO_PKG_VERSION"));

/// Timeouts applied to every image request.
#[derive(Copy, Clone, Debug)]
pub struct FetchTimeouts {
    /// The timeout for establishing a connection.
    pub connect: Duration,
    /// Global timeout for one request, including the body.
    pub request: Duration,
}

impl FetchTimeouts {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            connect: config.connect_timeout,
            request: config.request_timeout,
        }
    }
}

impl Default for FetchTimeouts {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

/// A [`FetchPort`] backed by its own [`reqwest::Client`].
///
/// Every fetcher owns a separate connection pool. Creating one fetcher per priority tier keeps
/// background transfers from occupying connections needed for interactive ones.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates a fetcher keeping at most `max_idle_per_host` idle connections around.
    pub fn new(timeouts: &FetchTimeouts, max_idle_per_host: usize) -> reqwest::Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .gzip(true)
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.request)
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(max_idle_per_host.max(1))
            .build()?;
        Ok(Self { client })
    }
}

impl FetchPort for HttpFetcher {
    fn fetch(&self, key: &ResourceKey) -> BoxFuture<'static, ImageResult<Bytes>> {
        let client = self.client.clone();
        let key = key.clone();
        Box::pin(async move {
            let url = key
                .to_url()
                .map_err(|err| ImageError::FetchFailed(err.to_string()))?;

            tracing::debug!("Fetching image from `{}`", url);

            let response = client
                .get(url)
                .header(header::USER_AGENT, USER_AGENT)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                tracing::debug!("Unexpected status code from `{key}`: {status}");
                return Err(ImageError::FetchFailed(status.to_string()));
            }

            Ok(response.bytes().await?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_from_server() {
        tivoli_test::setup();
        let server = tivoli_test::image_server();
        let key: ResourceKey = server.url("images/tall-20x40/file").into();

        let fetcher = HttpFetcher::new(&Default::default(), 1).unwrap();
        let bytes = fetcher.fetch(&key).await.unwrap();

        assert_eq!(bytes, Bytes::from(tivoli_test::png_bytes(20, 40)));
    }

    #[tokio::test]
    async fn test_fetch_missing() {
        tivoli_test::setup();
        let server = tivoli_test::image_server();
        let key: ResourceKey = server.url("images/missing/file").into();

        let fetcher = HttpFetcher::new(&Default::default(), 1).unwrap();
        let result = fetcher.fetch(&key).await;

        assert_eq!(
            result,
            Err(ImageError::FetchFailed("404 Not Found".into()))
        );
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        tivoli_test::setup();
        // Nothing listens on the discard port locally.
        let key: ResourceKey = "http://127.0.0.1:9/images/x/file".parse().unwrap();

        let fetcher = HttpFetcher::new(&Default::default(), 1).unwrap();
        let result = fetcher.fetch(&key).await;

        assert!(matches!(result, Err(ImageError::FetchFailed(_))));
    }
}
