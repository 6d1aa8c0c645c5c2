//! Helpers for testing the image pipeline against a real HTTP server.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - When using [`image_server`], make sure that the server is held until all requests to
//!    the server have been made. The server stops serving when dropped, and all pending
//!    connections to it fail. To avoid this, assign it to a variable: `let server =
//!    image_server();`.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::{self, OriginalUri, Request};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use image::{ImageFormat, Rgba, RgbaImage};
use reqwest::Url;
use serde::Deserialize;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

/// The dimensions of images whose name does not specify any.
pub const DEFAULT_DIMENSIONS: (u32, u32) = (16, 16);

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `tivoli_images` crate and mutes all
///    other logs (such as hyper or reqwest).
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("tivoli_images=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// Encodes a PNG of the given size with a deterministic gradient.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_fn(width, height, |x, y| Rgba([x as u8, y as u8, 0x80, 0xff]));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// A test server that binds to a random port and serves a web app.
///
/// This server requires a `tokio` runtime and is supposed to be run in a `tokio::test`. It
/// automatically stops serving when dropped.
#[derive(Debug)]
pub struct Server {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
}

impl Server {
    pub fn with_router(router: Router) -> Self {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();
        let listener = tokio::net::TcpListener::from_std(listener).unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { handle, socket }
    }

    /// Returns the socket address that this server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.socket
    }

    /// Returns the port that this server listens on.
    pub fn port(&self) -> u16 {
        self.addr().port()
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> Url {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.port(), path)
            .parse()
            .unwrap()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Debug, Deserialize)]
struct ImageQuery {
    w: Option<u32>,
}

/// Parses the dimensions from a name like `landscape-40x20`.
fn dimensions(uuid: &str) -> (u32, u32) {
    let suffix = uuid.rsplit('-').next().unwrap_or(uuid);
    suffix
        .split_once('x')
        .and_then(|(width, height)| Some((width.parse().ok()?, height.parse().ok()?)))
        .filter(|&(width, height)| width > 0 && height > 0)
        .unwrap_or(DEFAULT_DIMENSIONS)
}

fn image_file(uuid: &str, thumbnail_width: Option<u32>) -> Response {
    if uuid.starts_with("missing") {
        return StatusCode::NOT_FOUND.into_response();
    }
    if uuid.starts_with("corrupt") {
        return ([(header::CONTENT_TYPE, "image/png")], "definitely not a png").into_response();
    }

    let (mut width, mut height) = dimensions(uuid);
    if let Some(w) = thumbnail_width.filter(|&w| w < width) {
        height = (height * w / width).max(1);
        width = w;
    }

    ([(header::CONTENT_TYPE, "image/png")], png_bytes(width, height)).into_response()
}

/// An HTTP server mimicking the photo server's image route.
///
/// `GET /images/{uuid}/file[?w=]` serves a PNG whose dimensions are taken from the uuid, such as
/// `tall-20x40`, downscaled to `w` when given. Uuids starting with `missing` respond with `404`,
/// uuids starting with `corrupt` with bytes that are not an image.
///
/// All requests are counted by path and query.
pub struct ImageServer {
    server: Server,
    hits: Arc<Mutex<BTreeMap<String, usize>>>,
}

impl ImageServer {
    pub fn new(delay: Duration) -> Self {
        let hits = Arc::new(Mutex::new(BTreeMap::new()));

        let hitcounter = {
            let hits = hits.clone();
            move |OriginalUri(uri), req: Request, next: Next| {
                let hits = hits.clone();
                async move {
                    {
                        let mut hits = hits.lock().unwrap();
                        let hits = hits.entry(uri.to_string()).or_default();
                        *hits += 1;
                    }

                    next.run(req).await
                }
            }
        };

        let router = Router::new()
            .route(
                "/images/:uuid/file",
                get(
                    move |extract::Path(uuid): extract::Path<String>,
                          extract::Query(query): extract::Query<ImageQuery>| async move {
                        tokio::time::sleep(delay).await;
                        image_file(&uuid, query.w)
                    },
                ),
            )
            .layer(middleware::from_fn(hitcounter));

        let server = Server::with_router(router);

        Self { server, hits }
    }

    /// Returns the number of requests to the given path, including the query string.
    pub fn hits(&self, path: &str) -> usize {
        let path = format!("/{}", path.trim_start_matches('/'));
        self.hits.lock().unwrap().get(&path).copied().unwrap_or(0)
    }

    /// Returns the number of requests since the last call and resets the counter.
    pub fn accesses(&self) -> usize {
        let map = std::mem::take(&mut *self.hits.lock().unwrap());
        map.into_values().sum()
    }

    pub fn url(&self, path: &str) -> Url {
        self.server.url(path)
    }
}

/// Spawns an [`ImageServer`] responding immediately.
pub fn image_server() -> ImageServer {
    ImageServer::new(Duration::ZERO)
}

/// Spawns an [`ImageServer`] that waits for `delay` before every response.
pub fn image_server_with_delay(delay: Duration) -> ImageServer {
    ImageServer::new(delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimensions() {
        assert_eq!(dimensions("tall-20x40"), (20, 40));
        assert_eq!(dimensions("a-b-300x200"), (300, 200));
        assert_eq!(dimensions("plain"), DEFAULT_DIMENSIONS);
        assert_eq!(dimensions("zero-0x10"), DEFAULT_DIMENSIONS);
    }

    #[test]
    fn test_png_bytes() {
        let image = image::load_from_memory(&png_bytes(3, 5)).unwrap();
        assert_eq!((image.width(), image.height()), (3, 5));
    }
}
