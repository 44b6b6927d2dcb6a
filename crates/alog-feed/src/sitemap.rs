//! On-disk sitemap index and part files.
//!
//! Layout under the sitemap directory:
//!
//! ```text
//! sitemap-index.xml   lists every part that exists
//! sitemap-0.xml       parts, numbered from 0
//! sitemap-1.xml
//! ```
//!
//! Appending reads the newest part, checks that it ends with the
//! `</urlset>` tail, adds entries and rewrites the file through a
//! temporary file and a rename. A part that is full, over the byte cap or
//! malformed is left untouched and the next number is started. The index
//! is rebuilt from the directory listing after every append.
//!
//! All methods except [`SitemapStore::read`] do blocking file I/O and must
//! only be called from one writer at a time.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::config::{DEFAULT_MAX_PART_BYTES, DEFAULT_MAX_URLS_PER_PART, FeedConfig};
use crate::error::SitemapError;
use crate::rss::escape_xml;

pub const INDEX_FILE: &str = "sitemap-index.xml";

const NAME_PREFIX: &str = "sitemap-";
const NAME_SUFFIX: &str = ".xml";
const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";
const URLSET_CLOSE: &str = "</urlset>";

/// Checks that `name` is `sitemap-<word>.xml` where `<word>` is ASCII
/// letters, digits, `-` or `_`.
///
/// Anything else, including path separators and dots, is rejected without
/// touching the filesystem.
pub fn validate_name(name: &str) -> Result<(), SitemapError> {
    let stem = name
        .strip_prefix(NAME_PREFIX)
        .and_then(|rest| rest.strip_suffix(NAME_SUFFIX));

    match stem {
        Some(stem)
            if !stem.is_empty()
                && stem
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_') =>
        {
            Ok(())
        }
        _ => Err(SitemapError::InvalidName(name.to_string())),
    }
}

fn part_file_name(index: u32) -> String {
    format!("{NAME_PREFIX}{index}{NAME_SUFFIX}")
}

fn parse_part_index(name: &str) -> Option<u32> {
    let digits = name.strip_prefix(NAME_PREFIX)?.strip_suffix(NAME_SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Outcome of [`SitemapStore::append`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppendReport {
    pub urls_written: usize,
    /// Part numbers started by this call.
    pub parts_created: Vec<u32>,
}

/// A part file being filled.
#[derive(Debug)]
struct PartBuffer {
    index: u32,
    entries: String,
    count: usize,
}

impl PartBuffer {
    fn empty(index: u32) -> Self {
        Self {
            index,
            entries: String::new(),
            count: 0,
        }
    }

    /// Extracts the entries of an existing part. `None` if the document
    /// does not have a `<urlset ...>` head and a `</urlset>` tail.
    fn parse(index: u32, content: &str) -> Option<Self> {
        let body = content.trim_end().strip_suffix(URLSET_CLOSE)?;
        let open = body.find("<urlset")?;
        let head_end = open + body[open..].find('>')? + 1;
        let inner = body[head_end..].trim();

        let mut entries = String::with_capacity(inner.len() + 1);
        if !inner.is_empty() {
            entries.push_str(inner);
            entries.push('\n');
        }
        Some(Self {
            index,
            count: entries.matches("<url>").count(),
            entries,
        })
    }

    fn overhead() -> usize {
        XML_DECLARATION.len() + 1 + r#"<urlset xmlns="">"#.len() + SITEMAP_NS.len() + 1
            + URLSET_CLOSE.len()
            + 1
    }

    fn byte_len(&self) -> u64 {
        (Self::overhead() + self.entries.len()) as u64
    }

    fn fits(&self, entry: &str, max_urls: usize, max_bytes: u64) -> bool {
        self.count < max_urls && self.byte_len() + entry.len() as u64 <= max_bytes
    }

    fn push(&mut self, entry: &str) {
        self.entries.push_str(entry);
        self.count += 1;
    }

    fn render(&self) -> String {
        let mut xml = String::with_capacity(Self::overhead() + self.entries.len());
        xml.push_str(XML_DECLARATION);
        xml.push('\n');
        xml.push_str(&format!(r#"<urlset xmlns="{SITEMAP_NS}">"#));
        xml.push('\n');
        xml.push_str(&self.entries);
        xml.push_str(URLSET_CLOSE);
        xml.push('\n');
        xml
    }
}

/// Sitemap files under one directory.
#[derive(Debug, Clone)]
pub struct SitemapStore {
    dir: PathBuf,
    prefix: String,
    max_urls: usize,
    max_bytes: u64,
}

impl SitemapStore {
    /// Creates a store with the protocol limits. `prefix` is the public URL
    /// the part files are served under.
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            max_urls: DEFAULT_MAX_URLS_PER_PART,
            max_bytes: DEFAULT_MAX_PART_BYTES,
        }
    }

    pub fn from_config(config: &FeedConfig) -> Self {
        Self::new(config.sitemap_dir.clone(), config.sitemap_prefix.clone())
            .with_limits(config.max_urls_per_part, config.max_part_bytes)
    }

    #[must_use]
    pub fn with_limits(mut self, max_urls: usize, max_bytes: u64) -> Self {
        self.max_urls = max_urls.max(1);
        self.max_bytes = max_bytes;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    fn part_path(&self, index: u32) -> PathBuf {
        self.dir.join(part_file_name(index))
    }

    /// Creates the directory if missing, and writes the index if it is
    /// missing or older than a part file.
    ///
    /// Returns `true` if the index was written.
    pub fn ensure_initialized(&self) -> Result<bool, SitemapError> {
        fs::create_dir_all(&self.dir).map_err(|e| SitemapError::io(&self.dir, e))?;
        let index = self.index_path();
        let created = !index.is_file();
        if !created && !self.index_is_stale()? {
            return Ok(false);
        }
        self.write_index()?;
        if created {
            tracing::info!(dir = %self.dir.display(), "sitemap index created");
        } else {
            tracing::warn!(dir = %self.dir.display(), "stale sitemap index rewritten");
        }
        Ok(true)
    }

    fn index_is_stale(&self) -> Result<bool, SitemapError> {
        let index_path = self.index_path();
        let index_modified = modified(&index_path)?;
        for part in self.part_indices()? {
            if modified(&self.part_path(part))? > index_modified {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Part numbers present on disk, ascending.
    pub fn part_indices(&self) -> Result<Vec<u32>, SitemapError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SitemapError::io(&self.dir, e)),
        };

        let mut indices = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SitemapError::io(&self.dir, e))?;
            if let Some(index) = entry.file_name().to_str().and_then(parse_part_index) {
                indices.push(index);
            }
        }
        indices.sort_unstable();
        Ok(indices)
    }

    /// Appends one `<url>` entry per URL, rolling over to new parts as the
    /// caps are reached. The index is rewritten after every part write.
    ///
    /// On failure, [`SitemapError::urls_written`] tells how many leading
    /// URLs were persisted.
    pub fn append(&self, urls: &[String]) -> Result<AppendReport, SitemapError> {
        self.ensure_initialized()?;

        let mut report = AppendReport::default();
        if urls.is_empty() {
            return Ok(report);
        }

        let lastmod = OffsetDateTime::now_utc().format(&Rfc3339)?;
        let mut part = self.writable_part(&mut report)?;
        let mut committed = 0;

        for url in urls {
            let entry = format!(
                "<url><loc>{}</loc><lastmod>{lastmod}</lastmod></url>\n",
                escape_xml(url)
            );

            if !part.fits(&entry, self.max_urls, self.max_bytes) && part.count > 0 {
                self.commit(&part, &mut committed, report.urls_written)?;
                part = PartBuffer::empty(part.index + 1);
                report.parts_created.push(part.index);
            }
            part.push(&entry);
            report.urls_written += 1;
        }

        self.commit(&part, &mut committed, report.urls_written)?;

        tracing::debug!(
            urls = report.urls_written,
            parts_created = report.parts_created.len(),
            "sitemap updated"
        );
        Ok(report)
    }

    /// Loads the newest part if it can take more entries, otherwise starts
    /// the next number.
    fn writable_part(&self, report: &mut AppendReport) -> Result<PartBuffer, SitemapError> {
        let Some(latest) = self.part_indices()?.last().copied() else {
            report.parts_created.push(0);
            return Ok(PartBuffer::empty(0));
        };

        let path = self.part_path(latest);
        let content = fs::read_to_string(&path).map_err(|e| SitemapError::io(&path, e))?;

        match PartBuffer::parse(latest, &content) {
            Some(part) if part.count < self.max_urls && part.byte_len() < self.max_bytes => {
                Ok(part)
            }
            Some(_) => {
                report.parts_created.push(latest + 1);
                Ok(PartBuffer::empty(latest + 1))
            }
            None => {
                tracing::warn!(part = latest, "sitemap part is malformed, starting a new part");
                report.parts_created.push(latest + 1);
                Ok(PartBuffer::empty(latest + 1))
            }
        }
    }

    /// Writes `part`, which holds URLs up to `through`, then the index.
    fn commit(
        &self,
        part: &PartBuffer,
        committed: &mut usize,
        through: usize,
    ) -> Result<(), SitemapError> {
        write_atomic(&self.part_path(part.index), &part.render())
            .map_err(|e| e.after(*committed))?;
        *committed = through;
        // A failed index write is repaired by the next `ensure_initialized`.
        self.write_index().map_err(|e| e.after(through))
    }

    /// Rewrites the index from the parts on disk.
    pub fn write_index(&self) -> Result<(), SitemapError> {
        let mut xml = String::new();
        xml.push_str(XML_DECLARATION);
        xml.push('\n');
        xml.push_str(&format!(r#"<sitemapindex xmlns="{SITEMAP_NS}">"#));
        xml.push('\n');

        let prefix = escape_xml(&self.prefix);
        for index in self.part_indices()? {
            let modified = modified(&self.part_path(index))?;
            let lastmod = OffsetDateTime::from(modified).format(&Rfc3339)?;
            xml.push_str(&format!(
                "<sitemap><loc>{prefix}{}</loc><lastmod>{lastmod}</lastmod></sitemap>\n",
                part_file_name(index)
            ));
        }

        xml.push_str("</sitemapindex>\n");
        write_atomic(&self.index_path(), &xml)
    }

    /// Reads a sitemap file by its public name.
    pub async fn read(&self, name: &str) -> Result<Vec<u8>, SitemapError> {
        validate_name(name)?;
        let path = self.dir.join(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(SitemapError::NotFound(name.to_string()))
            }
            Err(e) => Err(SitemapError::io(path, e)),
        }
    }
}

fn modified(path: &Path) -> Result<SystemTime, SitemapError> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| SitemapError::io(path, e))
}

fn write_atomic(path: &Path, contents: &str) -> Result<(), SitemapError> {
    let tmp = path.with_extension("xml.tmp");
    fs::write(&tmp, contents).map_err(|e| SitemapError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| SitemapError::io(path, e))
}
