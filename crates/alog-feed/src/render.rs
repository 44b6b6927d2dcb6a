//! Markdown prerendering.
//!
//! `preRendered` and `description` are caches derived from a log's
//! markdown. Descriptions are computed inline when a log is written;
//! HTML is produced off the request path by [`RenderPool`], which runs at
//! most a fixed number of jobs at once. Each job reads the current content
//! so a late job never writes HTML for stale markdown; concurrent jobs for
//! the same log are last-writer-wins.

use std::sync::Arc;

use alog_core::{DynLogStorage, LogId};
use pulldown_cmark::{Event, Options, Parser, TagEnd, html};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::config::RenderConfig;
use crate::error::RenderError;

/// Descriptions longer than this many characters are truncated.
pub const DESCRIPTION_MAX_CHARS: usize = 100;
const DESCRIPTION_KEEP_CHARS: usize = 97;

fn parser_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_FOOTNOTES
}

/// Renders markdown to HTML. Raw HTML in the source is emitted as escaped
/// text.
#[must_use]
pub fn markdown_to_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, parser_options()).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Plain-text excerpt of a markdown document.
///
/// Whitespace is collapsed. Results longer than 100 characters become the
/// first 97 characters followed by `...`.
#[must_use]
pub fn build_description(markdown: &str) -> String {
    let mut text = String::with_capacity(markdown.len().min(1024));
    for event in Parser::new_ext(markdown, parser_options()) {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(&t),
            Event::SoftBreak | Event::HardBreak => text.push(' '),
            Event::End(TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item) => text.push(' '),
            _ => {}
        }
    }

    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= DESCRIPTION_MAX_CHARS {
        return collapsed;
    }

    let mut truncated: String = collapsed.chars().take(DESCRIPTION_KEEP_CHARS).collect();
    truncated.push_str("...");
    truncated
}

/// Bounded pool of prerender jobs.
#[derive(Clone)]
pub struct RenderPool {
    logs: DynLogStorage,
    permits: Arc<Semaphore>,
}

impl RenderPool {
    pub fn new(logs: DynLogStorage, config: &RenderConfig) -> Self {
        Self {
            logs,
            permits: Arc::new(Semaphore::new(config.permits.max(1))),
        }
    }

    /// Jobs that could start right now.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Schedules a re-render of `log_id`. Returns immediately; failures are
    /// logged.
    pub fn submit(&self, log_id: LogId) -> JoinHandle<()> {
        let logs = self.logs.clone();
        let permits = self.permits.clone();

        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            match render_one(&logs, log_id).await {
                Ok(true) => tracing::debug!(log_id, "log prerendered"),
                Ok(false) => tracing::debug!(log_id, "log deleted before prerender"),
                Err(e) => tracing::error!(log_id, error = %e, "prerender failed"),
            }
        })
    }
}

async fn render_one(logs: &DynLogStorage, log_id: LogId) -> Result<bool, RenderError> {
    let Some(log) = logs.find_by_id(log_id).await? else {
        return Ok(false);
    };

    let html = tokio::task::spawn_blocking(move || markdown_to_html(&log.content))
        .await
        .map_err(|e| RenderError::Task {
            log_id,
            message: e.to_string(),
        })?;

    logs.set_rendered(log_id, &html).await?;
    Ok(true)
}
