use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sentry::types::Dsn;
use serde::{Deserialize, Deserializer, de};
use tracing::level_filters::LevelFilter;
use url::Url;

/// Controls the log format
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect (pretty for tty, simplified for other)
    Auto,
    /// With colors
    Pretty,
    /// Simplified log output
    Simplified,
    /// Dump out JSON lines
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// The log level.
    #[serde(deserialize_with = "deserialize_level_filter")]
    pub level: LevelFilter,
    /// Controls the log format.
    pub format: LogFormat,
    /// When set to true, backtraces are forced on.
    pub enable_backtraces: bool,
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
            enable_backtraces: true,
        }
    }
}

/// Control the metrics.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Metrics {
    /// host/port of statsd instance
    pub statsd: Option<String>,
    /// The prefix that should be added to all metrics.
    pub prefix: String,
    /// A map containing custom tags and their values.
    ///
    /// These tags will be appended to every metric.
    pub custom_tags: BTreeMap<String, String>,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            statsd: env::var("STATSD_SERVER").ok(),
            prefix: "tivoli".into(),
            custom_tags: BTreeMap::new(),
        }
    }
}

/// Bounds of the in-memory image cache.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct ImageCacheConfig {
    /// The maximum number of decoded images kept in memory.
    ///
    /// Defaults to `200`.
    pub max_count: usize,

    /// The maximum total decoded size (in bytes) of all images kept in memory.
    ///
    /// Defaults to `100 MiB (= 104_857_600)`.
    pub max_cost_bytes: u64,
}

impl Default for ImageCacheConfig {
    fn default() -> Self {
        Self {
            max_count: 200,
            max_cost_bytes: 100 * 1024 * 1024,
        }
    }
}

/// Connection budgets and timeouts of the two fetch tiers.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    /// The maximum number of concurrent connections for images about to be displayed.
    pub interactive_concurrency: usize,

    /// The maximum number of concurrent connections for speculative prefetches.
    ///
    /// This pool is separate from the interactive one, a saturated background pool never
    /// delays interactive fetches.
    pub background_concurrency: usize,

    /// The timeout for establishing a connection.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// The timeout for a whole request, including reading the body.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            interactive_concurrency: 8,
            background_concurrency: 3,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct PrefetchConfig {
    /// How many images ahead of the visible one, in visual order, are warmed up.
    pub window_size: usize,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self { window_size: 50 }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct LayoutConfig {
    /// Number of columns of the waterfall grid.
    pub column_count: usize,
    /// Vertical and horizontal gap between grid items.
    pub spacing: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            column_count: 3,
            spacing: 2.0,
        }
    }
}

/// The photo server images are loaded from.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the photo server.
    pub url: Option<Url>,
    /// Whether the grid loads server-rendered thumbnails instead of full-size images.
    pub use_thumbnails: bool,
    /// The width of requested thumbnails, clamped by the server to `50..=1920`.
    pub thumbnail_width: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: None,
            use_thumbnails: true,
            thumbnail_width: 400,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Configuration for internal logging.
    pub logging: Logging,

    /// Configuration for reporting metrics to a statsd instance.
    pub metrics: Metrics,

    /// DSN to report internal errors to
    pub sentry_dsn: Option<Dsn>,

    /// Bounds of the in-memory image cache.
    pub cache: ImageCacheConfig,

    /// Connection budgets of the interactive and background fetch tiers.
    pub fetch: FetchConfig,

    /// Lookahead of the prefetch scheduler.
    pub prefetch: PrefetchConfig,

    /// Shape of the waterfall grid.
    pub layout: LayoutConfig,

    /// The photo server to load images from.
    pub server: ServerConfig,
}

impl Config {
    pub fn get(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_reader(
                fs::File::open(path).context("failed to open configuration file")?,
            ),
            None => Ok(Config::default()),
        }
    }

    fn from_reader(mut reader: impl std::io::Read) -> Result<Self> {
        let mut config = String::new();
        reader
            .read_to_string(&mut config)
            .context("failed reading config file")?;
        // check for empty files explicitly
        if config.trim().is_empty() {
            anyhow::bail!("config file empty");
        }
        serde_yaml::from_str(&config).context("failed to parse config YAML")
    }
}

#[derive(Debug)]
struct LevelFilterVisitor;

impl de::Visitor<'_> for LevelFilterVisitor {
    type Value = LevelFilter;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(
            formatter,
            r#"one of the strings "off", "error", "warn", "info", "debug", or "trace""#
        )
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match v {
            "off" => Ok(LevelFilter::OFF),
            "error" => Ok(LevelFilter::ERROR),
            "warn" => Ok(LevelFilter::WARN),
            "info" => Ok(LevelFilter::INFO),
            "debug" => Ok(LevelFilter::DEBUG),
            "trace" => Ok(LevelFilter::TRACE),
            _ => Err(de::Error::unknown_variant(
                v,
                &["off", "error", "warn", "info", "debug", "trace"],
            )),
        }
    }
}

fn deserialize_level_filter<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<LevelFilter, D::Error> {
    deserializer.deserialize_str(LevelFilterVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::get(None).unwrap();
        assert_eq!(cfg.cache.max_count, 200);
        assert_eq!(cfg.cache.max_cost_bytes, 104_857_600);
        assert_eq!(cfg.fetch.interactive_concurrency, 8);
        assert_eq!(cfg.fetch.background_concurrency, 3);
        assert_eq!(cfg.prefetch.window_size, 50);
        assert_eq!(cfg.layout, LayoutConfig::default());
        assert!(cfg.server.use_thumbnails);
    }

    #[test]
    fn test_partial_config() {
        // It should be possible to set individual values without affecting the defaults of
        // their siblings.
        let yaml = r#"
            cache:
              max_count: 20
            fetch:
              request_timeout: 30s
            prefetch:
              window_size: 12
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();
        assert_eq!(cfg.cache.max_count, 20);
        assert_eq!(
            cfg.cache.max_cost_bytes,
            ImageCacheConfig::default().max_cost_bytes
        );
        assert_eq!(cfg.fetch.request_timeout, Duration::from_secs(30));
        assert_eq!(
            cfg.fetch.connect_timeout,
            FetchConfig::default().connect_timeout
        );
        assert_eq!(cfg.prefetch.window_size, 12);
    }

    #[test]
    fn test_server_and_logging() {
        let yaml = r#"
            logging:
              level: debug
              format: json
            server:
              url: "http://photos.local:3000/"
              use_thumbnails: false
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();
        assert_eq!(cfg.logging.level, LevelFilter::DEBUG);
        assert_eq!(cfg.logging.format, LogFormat::Json);
        assert_eq!(
            cfg.server.url.as_ref().map(Url::as_str),
            Some("http://photos.local:3000/")
        );
        assert!(!cfg.server.use_thumbnails);
        assert_eq!(cfg.server.thumbnail_width, 400);
    }

    #[test]
    fn test_invalid_level() {
        let yaml = r#"
            logging:
              level: loud
        "#;
        assert!(Config::from_reader(yaml.as_bytes()).is_err());
    }

    #[test]
    fn test_unknown_fields() {
        // Unknown fields should not cause failure
        let yaml = r#"
            cache:
              not_a_limit: 1
        "#;
        let cfg = Config::from_reader(yaml.as_bytes());
        assert!(cfg.is_ok());
    }

    #[test]
    fn test_empty_file() {
        // Empty files aren't supported
        let yaml = r#""#;
        let result = Config::from_reader(yaml.as_bytes());
        assert!(result.is_err());
    }
}
