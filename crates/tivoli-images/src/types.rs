//! Core data types shared by the cache, the layout engine and the prefetch scheduler.
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

/// The smallest thumbnail width the photo server renders.
pub const MIN_THUMBNAIL_WIDTH: u32 = 50;
/// The largest thumbnail width the photo server renders.
pub const MAX_THUMBNAIL_WIDTH: u32 = 1920;

/// Identifies one fetchable image, and thereby one cache slot.
///
/// This is a normalized URL string. Two keys are equal exactly when their normalized URLs are.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey(Arc<str>);

impl ResourceKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses the key back into a [`Url`] for the transport.
    pub fn to_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.0)
    }
}

impl From<Url> for ResourceKey {
    fn from(url: Url) -> Self {
        Self(url.as_str().into())
    }
}

impl From<&Url> for ResourceKey {
    fn from(url: &Url) -> Self {
        Self(url.as_str().into())
    }
}

impl FromStr for ResourceKey {
    type Err = url::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Url::parse(s).map(Self::from)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The two scheduling tiers of a fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Priority {
    /// The image is about to be displayed.
    Interactive,
    /// The image is speculatively warmed ahead of scrolling.
    Background,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::Background => "background",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An image as returned by the photo server's search endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSummary {
    pub uuid: String,
    pub path: String,
    pub collection: String,
    pub gallery: String,
    pub width: i64,
    pub height: i64,
}

impl ImageSummary {
    /// Width divided by height, or `1` for images without a usable height.
    pub fn aspect_ratio(&self) -> f64 {
        if self.height <= 0 {
            return 1.0;
        }
        self.width as f64 / self.height as f64
    }
}

/// Derives [`ResourceKey`]s for images hosted on a photo server.
#[derive(Clone, Debug)]
pub struct ImageUrls {
    base_url: Url,
    thumbnail_width: Option<u32>,
}

impl ImageUrls {
    /// Creates URLs pointing at full-size images.
    pub fn new(mut base_url: Url) -> Self {
        // `Url::join` would otherwise replace the last path segment.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            base_url,
            thumbnail_width: None,
        }
    }

    /// Requests server-side thumbnails of the given width instead of full-size images.
    ///
    /// The width is clamped to the range the server renders, so that equivalent requests map
    /// onto the same key.
    pub fn with_thumbnails(mut self, width: u32) -> Self {
        self.thumbnail_width = Some(width.clamp(MIN_THUMBNAIL_WIDTH, MAX_THUMBNAIL_WIDTH));
        self
    }

    /// Returns the key of the image file with the given uuid.
    pub fn image_key(&self, uuid: &str) -> Result<ResourceKey, url::ParseError> {
        let mut url = self.base_url.join("images/")?;
        url.path_segments_mut()
            .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend([uuid, "file"]);
        if let Some(width) = self.thumbnail_width {
            url.query_pairs_mut().append_pair("w", &width.to_string());
        }
        Ok(url.into())
    }

    /// Returns the key for the given search result.
    pub fn key_for(&self, image: &ImageSummary) -> Result<ResourceKey, url::ParseError> {
        self.image_key(&image.uuid)
    }
}
