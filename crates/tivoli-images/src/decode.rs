//! Decoding of fetched bytes into in-memory images.
use std::sync::Arc;

use bytes::Bytes;
use image::DynamicImage;

use crate::caching::ImageResult;

/// An image decoded from fetched bytes, together with its cache accounting.
#[derive(Clone, Debug)]
pub struct Decoded<T> {
    pub image: T,
    /// The in-memory size of the decoded image in bytes, used as the cache cost.
    pub cost: u64,
    pub width: u32,
    pub height: u32,
}

/// Turns raw bytes into images.
///
/// Decoding is CPU bound and is run on the blocking thread pool by the cache.
pub trait Decode: Send + Sync + 'static {
    /// The decoded image handed out to callers. Cloning it should be cheap.
    type Image: Clone + Send + Sync + 'static;

    fn decode(&self, bytes: Bytes) -> ImageResult<Decoded<Self::Image>>;
}

/// Decodes every format supported by the [`image`] crate into RGBA.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageDecoder;

impl Decode for ImageDecoder {
    type Image = Arc<DynamicImage>;

    fn decode(&self, bytes: Bytes) -> ImageResult<Decoded<Self::Image>> {
        let image = image::load_from_memory(&bytes)?;
        let image = DynamicImage::ImageRgba8(image.into_rgba8());

        Ok(Decoded {
            cost: image.as_bytes().len() as u64,
            width: image.width(),
            height: image.height(),
            image: Arc::new(image),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::ImageError;

    #[test]
    fn test_decode_png() {
        let bytes = Bytes::from(tivoli_test::png_bytes(30, 10));
        let decoded = ImageDecoder.decode(bytes).unwrap();

        assert_eq!((decoded.width, decoded.height), (30, 10));
        assert_eq!(decoded.cost, 30 * 10 * 4);
    }

    #[test]
    fn test_decode_garbage() {
        let result = ImageDecoder.decode(Bytes::from_static(b"definitely not an image"));
        assert!(matches!(result, Err(ImageError::DecodeFailed(_))));
    }
}
