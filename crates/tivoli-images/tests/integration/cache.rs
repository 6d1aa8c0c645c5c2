use std::time::Duration;

use tivoli_images::caching::ImageError;

use crate::{http_cache, urls};

#[tokio::test]
async fn test_concurrent_loads_hit_server_once() {
    tivoli_test::setup();
    let server = tivoli_test::image_server_with_delay(Duration::from_millis(50));
    let cache = http_cache(Default::default());
    let key = urls(&server).image_key("wide-40x20").unwrap();

    let loads: Vec<_> = (0..5)
        .map(|_| {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move { cache.load(&key).await })
        })
        .collect();

    for load in loads {
        let image = load.await.unwrap().unwrap();
        assert_eq!((image.width(), image.height()), (40, 20));
    }

    assert_eq!(server.hits("images/wide-40x20/file"), 1);
    assert_eq!(cache.stats().total_cost, 40 * 20 * 4);
}

#[tokio::test]
async fn test_thumbnail_width_is_clamped() {
    tivoli_test::setup();
    let server = tivoli_test::image_server();
    let cache = http_cache(Default::default());
    let key = urls(&server)
        .with_thumbnails(10)
        .image_key("wide-100x50")
        .unwrap();

    let image = cache.load(&key).await.unwrap();
    assert_eq!((image.width(), image.height()), (50, 25));
    assert_eq!(server.hits("images/wide-100x50/file?w=50"), 1);
}

#[tokio::test]
async fn test_load_errors() {
    tivoli_test::setup();
    let server = tivoli_test::image_server();
    let cache = http_cache(Default::default());
    let urls = urls(&server);

    let missing = urls.image_key("missing").unwrap();
    assert_eq!(
        cache.load(&missing).await.unwrap_err(),
        ImageError::FetchFailed("404 Not Found".into())
    );

    let corrupt = urls.image_key("corrupt").unwrap();
    assert!(matches!(
        cache.load(&corrupt).await,
        Err(ImageError::DecodeFailed(_))
    ));

    // failures are not cached
    assert!(cache.load(&missing).await.is_err());
    assert_eq!(server.hits("images/missing/file"), 2);
    assert_eq!(cache.stats().entries, 0);
}

#[tokio::test]
async fn test_promotion_over_http() {
    tivoli_test::setup();
    let server = tivoli_test::image_server_with_delay(Duration::from_millis(200));
    let cache = http_cache(Default::default());
    let key = urls(&server).image_key("tall-20x40").unwrap();

    cache.prefetch([key.clone()]);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(cache.stats().background_in_flight, 1);

    let image = cache.load(&key).await.unwrap();
    assert_eq!((image.width(), image.height()), (20, 40));

    let stats = cache.stats();
    assert_eq!(stats.background_in_flight, 0);
    assert_eq!(stats.interactive_in_flight, 0);
    assert_eq!(stats.entries, 1);
    // the abandoned background request and the interactive one
    assert_eq!(server.hits("images/tall-20x40/file"), 2);

    // the abandoned background request does not start over
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.hits("images/tall-20x40/file"), 2);
    assert_eq!(cache.stats().entries, 1);
}
