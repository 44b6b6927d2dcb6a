//! Feed, sitemap and prerender configuration.
//!
//! # Example (TOML)
//!
//! ```toml
//! [feed]
//! item_count = 20
//! article_url_format = "https://log.ana.st/{handle}/{slug}"
//! sitemap_dir = "./sitemap"
//! sitemap_prefix = "https://log.ana.st/sitemaps/"
//!
//! [feed.channel]
//! title = "Analog"
//! link = "https://log.ana.st/"
//!
//! [render]
//! permits = 4
//! ```

use std::path::PathBuf;
use std::time::Duration;

use alog_core::LogUrlBuilder;
use serde::{Deserialize, Serialize};

use crate::error::FeedError;

/// Sitemap protocol limit on `<url>` entries per file.
pub const DEFAULT_MAX_URLS_PER_PART: usize = 50_000;

/// Byte cap per part file, kept under the protocol's 50MB limit.
pub const DEFAULT_MAX_PART_BYTES: u64 = 49_000_000;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Number of most recent logs in the RSS channel.
    pub item_count: u32,

    pub channel: ChannelConfig,

    /// Canonical article URL with `{handle}` and `{slug}` placeholders.
    pub article_url_format: String,

    pub sitemap_dir: PathBuf,

    /// Public URL prefix under which part files are served; each index
    /// entry is `{sitemap_prefix}sitemap-{N}.xml`.
    pub sitemap_prefix: String,

    pub max_urls_per_part: usize,

    pub max_part_bytes: u64,

    /// How long shutdown waits for an in-flight regeneration pass.
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            item_count: 20,
            channel: ChannelConfig::default(),
            article_url_format: "https://log.ana.st/{handle}/{slug}".to_string(),
            sitemap_dir: PathBuf::from("./sitemap"),
            sitemap_prefix: "https://log.ana.st/sitemaps/".to_string(),
            max_urls_per_part: DEFAULT_MAX_URLS_PER_PART,
            max_part_bytes: DEFAULT_MAX_PART_BYTES,
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl FeedConfig {
    pub fn validate(&self) -> Result<(), FeedError> {
        if self.item_count == 0 {
            return Err(FeedError::InvalidConfig(
                "feed.item_count must be positive".into(),
            ));
        }
        if !self.article_url_format.contains(LogUrlBuilder::SLUG) {
            return Err(FeedError::InvalidConfig(format!(
                "feed.article_url_format must contain {}",
                LogUrlBuilder::SLUG
            )));
        }
        if self.max_urls_per_part == 0 || self.max_urls_per_part > DEFAULT_MAX_URLS_PER_PART {
            return Err(FeedError::InvalidConfig(format!(
                "feed.max_urls_per_part must be between 1 and {DEFAULT_MAX_URLS_PER_PART}"
            )));
        }
        if self.max_part_bytes == 0 {
            return Err(FeedError::InvalidConfig(
                "feed.max_part_bytes must be positive".into(),
            ));
        }
        self.channel.validate()
    }

    #[must_use]
    pub fn url_builder(&self) -> LogUrlBuilder {
        LogUrlBuilder::new(self.article_url_format.clone())
    }
}

/// Fixed `<channel>` metadata.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub title: String,
    pub link: String,
    pub description: String,
    pub copyright: String,
    /// Minutes readers may cache the channel.
    pub ttl: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            title: "Analog".to_string(),
            link: "https://log.ana.st/".to_string(),
            description: "Latest articles from Analog".to_string(),
            copyright: "2026 Application and Architecture Club, Sunrin Internet High School"
                .to_string(),
            ttl: 60,
        }
    }
}

impl ChannelConfig {
    fn validate(&self) -> Result<(), FeedError> {
        if self.title.trim().is_empty() || self.link.trim().is_empty() {
            return Err(FeedError::InvalidConfig(
                "feed.channel.title and feed.channel.link are required".into(),
            ));
        }
        Ok(())
    }
}

/// Markdown prerender worker pool.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Maximum number of concurrent render jobs.
    pub permits: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { permits: 4 }
    }
}

impl RenderConfig {
    pub fn validate(&self) -> Result<(), FeedError> {
        if self.permits == 0 {
            return Err(FeedError::InvalidConfig(
                "render.permits must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = FeedConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.item_count, 20);
        assert_eq!(config.max_urls_per_part, 50_000);
        assert_eq!(config.channel.ttl, 60);
        assert!(RenderConfig::default().validate().is_ok());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: FeedConfig = toml::from_str(
            r#"
            item_count = 5
            sitemap_dir = "/var/lib/alog/sitemap"
            shutdown_timeout = "2s"

            [channel]
            title = "Test Feed"
            "#,
        )
        .unwrap();

        assert_eq!(config.item_count, 5);
        assert_eq!(config.sitemap_dir, PathBuf::from("/var/lib/alog/sitemap"));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(2));
        assert_eq!(config.channel.title, "Test Feed");
        assert_eq!(config.channel.link, "https://log.ana.st/");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = FeedConfig {
            article_url_format: "https://log.ana.st/{handle}".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = FeedConfig {
            max_urls_per_part: 60_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        assert!(RenderConfig { permits: 0 }.validate().is_err());
    }
}
