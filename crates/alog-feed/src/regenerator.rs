//! Coalescing RSS and sitemap regeneration.
//!
//! # State machine
//!
//! ```text
//! Idle --trigger--> Updating --pass done, not pending--> Idle
//!                      |  ^
//!              trigger |  | pass done, pending: clear and run again
//!                      v  |
//!               Updating + pending
//! ```
//!
//! Any number of triggers during a pass collapse into one extra pass. The
//! flags live behind one mutex so two triggers can never both start a
//! pass. Sitemap files are only written from inside the active pass.
//!
//! Each pass:
//!
//! 1. loads the newest logs, renders the channel and swaps the cached
//!    document;
//! 2. makes sure the sitemap directory and index exist and appends the
//!    canonical URLs of logs queued by triggers since the last pass.
//!
//! Failures are logged and never reach the caller of
//! [`FeedRegenerator::trigger`]. The previous document and files stay
//! servable.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alog_core::{DynLogStorage, Log};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::config::FeedConfig;
use crate::error::FeedError;
use crate::rss::RssRenderer;
use crate::sitemap::SitemapStore;

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Default)]
struct PassState {
    updating: bool,
    pending: bool,
    closed: bool,
    /// Canonical URLs waiting to be appended to the sitemap.
    queued_urls: Vec<String>,
}

/// Counters since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegeneratorStats {
    pub triggers: u64,
    pub passes: u64,
    pub failed_passes: u64,
}

struct Inner {
    logs: DynLogStorage,
    renderer: RssRenderer,
    sitemap: Arc<SitemapStore>,
    item_count: u32,
    state: Mutex<PassState>,
    rss: ArcSwap<String>,
    idle: Notify,
    triggers: AtomicU64,
    passes: AtomicU64,
    failed_passes: AtomicU64,
}

// =============================================================================
// Regenerator
// =============================================================================

/// Owner of the cached RSS document and the sitemap writer.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct FeedRegenerator {
    inner: Arc<Inner>,
}

impl FeedRegenerator {
    pub fn new(
        logs: DynLogStorage,
        renderer: RssRenderer,
        sitemap: SitemapStore,
        item_count: u32,
    ) -> Self {
        let empty = renderer.render(&[]).unwrap_or_default();
        Self {
            inner: Arc::new(Inner {
                logs,
                renderer,
                sitemap: Arc::new(sitemap),
                item_count: item_count.max(1),
                state: Mutex::new(PassState::default()),
                rss: ArcSwap::from_pointee(empty),
                idle: Notify::new(),
                triggers: AtomicU64::new(0),
                passes: AtomicU64::new(0),
                failed_passes: AtomicU64::new(0),
            }),
        }
    }

    pub fn from_config(config: &FeedConfig, logs: DynLogStorage) -> Result<Self, FeedError> {
        config.validate()?;
        let renderer = RssRenderer::new(config.channel.clone(), config.url_builder());
        Ok(Self::new(
            logs,
            renderer,
            SitemapStore::from_config(config),
            config.item_count,
        ))
    }

    /// Requests a pass. `log` is a newly created or changed log whose
    /// canonical URL should be added to the sitemap.
    ///
    /// Returns immediately. Must be called within a Tokio runtime.
    pub fn trigger(&self, log: Option<&Log>) {
        self.inner.triggers.fetch_add(1, Ordering::Relaxed);

        let url = log.and_then(|log| {
            let url = self.inner.renderer.urls().build(log);
            if url.is_none() {
                tracing::warn!(log_id = log.id, "log has no authors, not added to sitemap");
            }
            url
        });

        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.queued_urls.extend(url);
            if state.updating {
                state.pending = true;
                return;
            }
            state.updating = true;
        }

        let inner = self.inner.clone();
        tokio::spawn(async move { inner.run().await });
    }

    /// The last successfully generated RSS document.
    pub fn rss(&self) -> Arc<String> {
        self.inner.rss.load_full()
    }

    pub fn sitemap(&self) -> &SitemapStore {
        &self.inner.sitemap
    }

    pub fn is_updating(&self) -> bool {
        self.inner.state.lock().updating
    }

    pub fn stats(&self) -> RegeneratorStats {
        RegeneratorStats {
            triggers: self.inner.triggers.load(Ordering::Relaxed),
            passes: self.inner.passes.load(Ordering::Relaxed),
            failed_passes: self.inner.failed_passes.load(Ordering::Relaxed),
        }
    }

    /// Waits until no pass is running.
    pub async fn wait_until_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.inner.state.lock().updating {
                return;
            }
            notified.await;
        }
    }

    /// Stops accepting triggers and waits up to `timeout` for an in-flight
    /// pass. Returns `false` if the pass was abandoned.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        {
            let mut state = self.inner.state.lock();
            state.closed = true;
            state.pending = false;
        }

        if tokio::time::timeout(timeout, self.wait_until_idle())
            .await
            .is_err()
        {
            tracing::warn!(
                timeout_ms = timeout.as_millis() as u64,
                "feed regeneration still running at shutdown, abandoning"
            );
            return false;
        }
        tracing::info!("feed regenerator stopped");
        true
    }
}

impl Inner {
    async fn run(self: Arc<Self>) {
        loop {
            let urls = std::mem::take(&mut self.state.lock().queued_urls);

            if let Err(e) = self.pass(urls).await {
                self.failed_passes.fetch_add(1, Ordering::Relaxed);
                tracing::error!(error = %e, "feed regeneration failed, keeping previous output");
            }
            self.passes.fetch_add(1, Ordering::Relaxed);

            let mut state = self.state.lock();
            if state.pending && !state.closed {
                state.pending = false;
                continue;
            }
            state.updating = false;
            state.pending = false;
            drop(state);

            self.idle.notify_waiters();
            return;
        }
    }

    #[tracing::instrument(name = "feed.pass", skip_all, fields(urls = urls.len()))]
    async fn pass(&self, urls: Vec<String>) -> Result<(), FeedError> {
        // A failed RSS refresh still lets the sitemap catch up.
        let rss_result = self.refresh_rss().await;

        let sitemap = self.sitemap.clone();
        let pending = urls.clone();
        let written = tokio::task::spawn_blocking(move || {
            sitemap.ensure_initialized()?;
            sitemap.append(&pending)
        })
        .await;

        match written {
            Ok(Ok(report)) => {
                if report.urls_written > 0 {
                    tracing::info!(
                        urls = report.urls_written,
                        parts_created = ?report.parts_created,
                        "sitemap updated"
                    );
                }
            }
            Ok(Err(e)) => {
                let mut urls = urls;
                self.requeue(urls.split_off(e.urls_written().min(urls.len())));
                return Err(e.into());
            }
            Err(e) => {
                self.requeue(urls);
                return Err(FeedError::Task(e.to_string()));
            }
        }

        rss_result
    }

    /// Puts URLs that were not written ahead of those queued since.
    fn requeue(&self, urls: Vec<String>) {
        if urls.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        let newer = std::mem::replace(&mut state.queued_urls, urls);
        state.queued_urls.extend(newer);
    }

    async fn refresh_rss(&self) -> Result<(), FeedError> {
        let page = self.logs.list(self.item_count, 0).await?;
        let xml = self.renderer.render(&page.items)?;
        self.rss.store(Arc::new(xml));
        tracing::debug!(items = page.items.len(), "RSS feed regenerated");
        Ok(())
    }
}
