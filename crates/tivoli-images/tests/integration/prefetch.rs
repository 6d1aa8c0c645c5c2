use std::time::Duration;

use tivoli_images::layout::WaterfallLayout;
use tivoli_images::prefetch::{PrefetchScheduler, ScheduleOutcome};
use tivoli_images::types::ImageSummary;

use crate::{http_cache, urls};

fn summary(uuid: &str, width: i64, height: i64) -> ImageSummary {
    ImageSummary {
        uuid: uuid.into(),
        path: format!("studio/set/{uuid}.png"),
        collection: "studio".into(),
        gallery: "set".into(),
        width,
        height,
    }
}

#[tokio::test]
async fn test_scroll_warms_following_images() {
    tivoli_test::setup();
    let server = tivoli_test::image_server();
    let cache = http_cache(Default::default());
    let urls = urls(&server);

    let images: Vec<_> = (0..8)
        .map(|i| summary(&format!("img{i}-30x30"), 30, 30))
        .collect();
    let layout = WaterfallLayout::new(2, 100.0, 2.0).layout_images(&images);
    let scheduler = PrefetchScheduler::new(cache.clone(), 3);

    let outcome = scheduler.on_visible(0, layout.visual_order(), |index| {
        urls.key_for(&images[index]).ok()
    });
    assert_eq!(outcome, ScheduleOutcome::Scheduled { count: 3 });

    tokio::time::timeout(Duration::from_secs(5), async {
        while cache.stats().entries < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    for image in &images[1..4] {
        assert!(cache.contains(&urls.key_for(image).unwrap()));
    }

    // the visible image itself is loaded interactively, the warmed ones are hits
    cache.load(&urls.key_for(&images[0]).unwrap()).await.unwrap();
    cache.load(&urls.key_for(&images[1]).unwrap()).await.unwrap();
    assert_eq!(server.accesses(), 4);
}
