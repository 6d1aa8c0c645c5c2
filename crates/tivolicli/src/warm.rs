use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tivoli_images::caching::ImageCache;
use tivoli_images::config::Config;
use tivoli_images::decode::ImageDecoder;
use tivoli_images::fetch::FetchPorts;
use tivoli_images::layout::{WaterfallLayout, column_width};
use tivoli_images::prefetch::{PrefetchScheduler, ScheduleOutcome};
use tivoli_images::types::ImageUrls;
use url::Url;

use crate::settings::{WarmArgs, read_search};

/// Lays out the search result, prefetches behind the visible item and loads the item itself.
pub async fn warm(config: Config, args: WarmArgs) -> Result<()> {
    let images = read_search(&args.search)?;

    let base_url = match args.server.as_deref() {
        Some(url) => Url::parse(url).context("invalid server URL")?,
        None => match config.server.url.clone() {
            Some(url) => url,
            None => bail!("no server URL, pass `--server` or set `server.url`"),
        },
    };
    let mut urls = ImageUrls::new(base_url);
    if config.server.use_thumbnails {
        urls = urls.with_thumbnails(config.server.thumbnail_width);
    }

    let ports = FetchPorts::http(&config.fetch).context("failed to create HTTP clients")?;
    let cache = ImageCache::new(
        &config.cache,
        ports,
        ImageDecoder,
        tokio::runtime::Handle::current(),
    );

    let layout = WaterfallLayout::new(
        config.layout.column_count,
        column_width(args.width, config.layout.column_count, config.layout.spacing),
        config.layout.spacing,
    )
    .layout_images(&images);

    let scheduler = PrefetchScheduler::from_config(cache.clone(), &config.prefetch);
    let outcome = scheduler.on_visible(args.visible, layout.visual_order(), |index| {
        images.get(index).and_then(|image| urls.key_for(image).ok())
    });
    match outcome {
        ScheduleOutcome::Scheduled { count } => tracing::info!(count, "Scheduled prefetches"),
        ScheduleOutcome::NotLaidOut => bail!("item {} is not part of the layout", args.visible),
    }

    let key = urls
        .key_for(&images[args.visible])
        .context("invalid image URL")?;
    let start = Instant::now();
    match cache.load(&key).await {
        Ok(image) => tracing::info!(
            key = %key,
            width = image.width(),
            height = image.height(),
            elapsed = ?start.elapsed(),
            "Loaded visible image",
        ),
        Err(error) => tracing::warn!(
            key = %key,
            error = &error as &dyn std::error::Error,
            "Failed to load visible image",
        ),
    }

    let settled = tokio::time::timeout(Duration::from_secs(args.timeout), async {
        while cache.stats().background_in_flight > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    if settled.is_err() {
        tracing::warn!("Prefetches did not settle within {}s", args.timeout);
    }

    serde_json::to_writer_pretty(std::io::stdout(), &cache.stats())?;
    println!();
    Ok(())
}
