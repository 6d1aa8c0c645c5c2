use std::error::Error;

use thiserror::Error;

/// An error that happens while loading an image.
///
/// The error is shared between every waiter of a deduplicated fetch, which is why it only
/// carries a rendered message and is cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    /// The image could not be retrieved, because of a connection problem, a timeout, or an
    /// unsuccessful server response.
    #[error("fetch failed: {0}")]
    FetchFailed(String),
    /// The image was retrieved, but the bytes are corrupt or in an unsupported format.
    #[error("decode failed: {0}")]
    DecodeFailed(String),
    /// An unexpected error in the cache itself, like a panicking decoder.
    #[error("internal error")]
    InternalError,
}

impl ImageError {
    /// Creates a [`FetchFailed`](Self::FetchFailed) from the root cause of a transport error.
    pub fn fetch_error(mut error: &dyn Error) -> Self {
        while let Some(src) = error.source() {
            error = src;
        }

        let mut error_string = error.to_string();

        if error_string.contains("certificate verify failed") {
            error_string = "certificate verify failed".to_string();
        }

        Self::FetchFailed(error_string)
    }

    #[track_caller]
    pub fn from_std_error<E: Error + 'static>(e: E) -> Self {
        let dynerr: &dyn Error = &e; // tracing expects a `&dyn Error`
        tracing::error!(error = dynerr);
        Self::InternalError
    }

    /// A short name of the error kind, used as a metrics tag.
    pub fn metrics_tag(&self) -> &'static str {
        match self {
            Self::FetchFailed(_) => "fetch",
            Self::DecodeFailed(_) => "decode",
            Self::InternalError => "internal",
        }
    }
}

impl From<reqwest::Error> for ImageError {
    fn from(error: reqwest::Error) -> Self {
        Self::fetch_error(&error)
    }
}

impl From<image::ImageError> for ImageError {
    fn from(error: image::ImageError) -> Self {
        Self::DecodeFailed(error.to_string())
    }
}

impl From<tokio::task::JoinError> for ImageError {
    #[track_caller]
    fn from(error: tokio::task::JoinError) -> Self {
        Self::from_std_error(error)
    }
}

/// The outcome of loading one image.
pub type ImageResult<T> = Result<T, ImageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("outer")]
    struct Outer(#[source] std::io::Error);

    #[test]
    fn test_fetch_error_uses_root_cause() {
        let inner = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset");
        let error = ImageError::fetch_error(&Outer(inner));
        assert_eq!(error, ImageError::FetchFailed("connection reset".into()));
    }
}
