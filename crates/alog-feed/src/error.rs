//! Error types for feed generation, sitemap files and prerendering.

use std::path::PathBuf;

use alog_core::{LogId, StorageError};

/// Errors from sitemap file handling.
#[derive(Debug, thiserror::Error)]
pub enum SitemapError {
    /// The requested file name is not a sitemap file name.
    #[error("Invalid sitemap file name: {0}")]
    InvalidName(String),

    /// The sitemap file does not exist.
    #[error("Sitemap file not found: {0}")]
    NotFound(String),

    #[error("Date formatting failed: {0}")]
    Format(#[from] time::error::Format),

    /// Reading or writing a sitemap file failed.
    #[error("Sitemap I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An append stopped part-way. The first `written` URLs are on disk.
    #[error("Sitemap append stopped after {written} URLs: {source}")]
    Incomplete {
        written: usize,
        #[source]
        source: Box<SitemapError>,
    },
}

impl SitemapError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    #[must_use]
    pub fn is_invalid_name(&self) -> bool {
        matches!(self, Self::InvalidName(_))
    }

    /// Number of URLs an append persisted before failing.
    #[must_use]
    pub fn urls_written(&self) -> usize {
        match self {
            Self::Incomplete { written, .. } => *written,
            _ => 0,
        }
    }

    pub(crate) fn after(self, written: usize) -> Self {
        if written == 0 {
            return self;
        }
        Self::Incomplete {
            written,
            source: Box::new(self),
        }
    }
}

/// Errors from a regeneration pass or from feed configuration.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Invalid feed configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Sitemap(#[from] SitemapError),

    #[error("Date formatting failed: {0}")]
    Format(#[from] time::error::Format),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Errors from a prerender job.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Render task for log {log_id} failed: {message}")]
    Task { log_id: LogId, message: String },
}
