//! # alog-feed
//!
//! Derived artifacts for published logs:
//!
//! - [`rss`]: the RSS 2.0 channel served at `/feed`, cached in memory.
//! - [`sitemap`]: the on-disk sitemap index and its numbered part files.
//! - [`regenerator`]: the background component that keeps both in step
//!   with log mutations, coalescing bursts of triggers into at most one
//!   extra pass.
//! - [`render`]: the bounded worker pool that recomputes `preRendered`
//!   HTML from log markdown.

pub mod config;
pub mod error;
pub mod regenerator;
pub mod render;
pub mod rss;
pub mod sitemap;

pub use config::{ChannelConfig, FeedConfig, RenderConfig};
pub use error::{FeedError, RenderError, SitemapError};
pub use regenerator::{FeedRegenerator, RegeneratorStats};
pub use render::{RenderPool, build_description, markdown_to_html};
pub use rss::RssRenderer;
pub use sitemap::{AppendReport, SitemapStore};
