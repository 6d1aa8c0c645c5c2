mod cache;
mod prefetch;

use tivoli_images::caching::ImageCache;
use tivoli_images::config::{FetchConfig, ImageCacheConfig};
use tivoli_images::decode::ImageDecoder;
use tivoli_images::fetch::FetchPorts;
use tivoli_images::types::ImageUrls;
use tivoli_test::ImageServer;

/// Creates a cache talking to the given test server over HTTP.
pub fn http_cache(config: ImageCacheConfig) -> ImageCache {
    let ports = FetchPorts::http(&FetchConfig::default()).unwrap();
    ImageCache::new(
        &config,
        ports,
        ImageDecoder,
        tokio::runtime::Handle::current(),
    )
}

/// Image URLs pointing at the test server.
pub fn urls(server: &ImageServer) -> ImageUrls {
    ImageUrls::new(server.url("/"))
}
