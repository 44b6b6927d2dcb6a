//! Canonical article URLs.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::types::{Log, LogId};

/// Bytes escaped inside a single path segment. Unreserved characters and the
/// sub-delimiters `$ & + : = @` pass through; `/ ; , ?` and everything else
/// outside the alphanumerics are percent-encoded.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b':')
    .remove(b'=')
    .remove(b'@');

fn escape_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

/// Builds the slug for a log: the title with spaces replaced by hyphens,
/// escaped as a path segment, followed by the id in uppercase hexadecimal.
///
/// ```
/// assert_eq!(alog_core::log_slug("Help Me", 1), "Help-Me-1");
/// assert_eq!(alog_core::log_slug("Rust", 255), "Rust-FF");
/// assert_eq!(alog_core::log_slug("C++ & Rust: a=b", 1), "C++-&-Rust:-a=b-1");
/// ```
#[must_use]
pub fn log_slug(title: &str, id: LogId) -> String {
    let hyphenated = title.replace(' ', "-");
    format!("{}-{:X}", escape_segment(&hyphenated), id)
}

/// Expands an article URL format such as
/// `https://log.example.com/{handle}/{slug}` for a given log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogUrlBuilder {
    format: String,
}

impl LogUrlBuilder {
    pub const HANDLE: &'static str = "{handle}";
    pub const SLUG: &'static str = "{slug}";

    #[must_use]
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
        }
    }

    #[must_use]
    pub fn format(&self) -> &str {
        &self.format
    }

    /// Canonical URL for `log`, keyed by its first author's handle.
    ///
    /// Returns `None` when the authors were not hydrated.
    #[must_use]
    pub fn build(&self, log: &Log) -> Option<String> {
        let author = log.first_author()?;
        Some(self.build_parts(&author.handle, &log.title, log.id))
    }

    #[must_use]
    pub fn build_parts(&self, handle: &str, title: &str, id: LogId) -> String {
        self.format
            .replace(Self::HANDLE, &escape_segment(handle))
            .replace(Self::SLUG, &log_slug(title, id))
    }
}
