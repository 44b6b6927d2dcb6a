//! Log (article) service.
//!
//! Writes go through [`LogService`] so every mutation recomputes the
//! description, schedules a prerender and triggers feed regeneration.

use alog_core::{DynLogStorage, Log, LogId, LogPatch, NewLog, Page, StorageError, UserId};
use alog_feed::{FeedRegenerator, RenderPool, build_description};
use serde::Deserialize;
use time::OffsetDateTime;

use crate::error::{ApiError, ApiResult};

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Clamps a requested page size to `1..=MAX_PAGE_LIMIT`.
pub fn clamp_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLogRequest {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub generations: Vec<u16>,
    /// Additional authors. The caller is always the first author.
    #[serde(default)]
    pub co_authors: Vec<UserId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLogRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub topics: Option<Vec<String>>,
    pub generations: Option<Vec<u16>>,
    /// Replaces every author but the owner.
    pub co_authors: Option<Vec<UserId>>,
}

#[derive(Clone)]
pub struct LogService {
    logs: DynLogStorage,
    render: RenderPool,
    regenerator: FeedRegenerator,
}

impl LogService {
    pub fn new(logs: DynLogStorage, render: RenderPool, regenerator: FeedRegenerator) -> Self {
        Self {
            logs,
            render,
            regenerator,
        }
    }

    #[tracing::instrument(skip(self, request), fields(title = %request.title))]
    pub async fn create(&self, author: UserId, request: CreateLogRequest) -> ApiResult<Log> {
        let title = required("title", request.title)?;
        let content = required("content", request.content)?;

        let new = NewLog {
            description: build_description(&content),
            title,
            content,
            topics: normalize_topics(request.topics),
            generations: request.generations,
            logged_by: authors(author, request.co_authors),
            created_at: OffsetDateTime::now_utc(),
        };

        let log = self.logs.create(new).await.map_err(unknown_author)?;
        tracing::info!(log_id = log.id, "log created");

        self.render.submit(log.id);
        self.regenerator.trigger(Some(&log));
        Ok(log)
    }

    #[tracing::instrument(skip(self, request))]
    pub async fn update(
        &self,
        id: LogId,
        caller: UserId,
        request: UpdateLogRequest,
    ) -> ApiResult<Log> {
        let existing = self.get(id).await?;
        if !existing.is_authored_by(caller) {
            return Err(ApiError::forbidden("only authors may edit this log"));
        }

        let title = request.title.map(|t| required("title", t)).transpose()?;
        let content = request
            .content
            .map(|c| required("content", c))
            .transpose()?
            .filter(|c| *c != existing.content);
        let owner = existing.logged_by.first().copied().unwrap_or(caller);

        let patch = LogPatch {
            title,
            description: content.as_deref().map(build_description),
            topics: request.topics.map(normalize_topics),
            generations: request.generations,
            logged_by: request.co_authors.map(|co| authors(owner, co)),
            content,
        };
        if patch.is_empty() {
            return Ok(existing);
        }
        let rerender = patch.content.is_some();

        let log = self.logs.update(id, patch).await.map_err(unknown_author)?;
        tracing::info!(log_id = log.id, rerender, "log updated");

        if rerender {
            self.render.submit(log.id);
        }
        self.regenerator.trigger(Some(&log));
        Ok(log)
    }

    pub async fn get(&self, id: LogId) -> ApiResult<Log> {
        self.logs
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("log {id:X}")))
    }

    pub async fn list(&self, limit: Option<u32>, offset: Option<u32>) -> ApiResult<Page<Log>> {
        Ok(self
            .logs
            .list(clamp_limit(limit), offset.unwrap_or(0))
            .await?)
    }

    pub async fn search(
        &self,
        query: &str,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> ApiResult<Page<Log>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ApiError::bad_request("q is required"));
        }
        Ok(self
            .logs
            .search(query, clamp_limit(limit), offset.unwrap_or(0))
            .await?)
    }

    /// Deletes a log and its comments. Author-only.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: LogId, caller: UserId) -> ApiResult<()> {
        let existing = self.get(id).await?;
        if !existing.is_authored_by(caller) {
            return Err(ApiError::forbidden("only authors may delete this log"));
        }
        self.logs.delete(id).await?;
        tracing::info!(log_id = id, "log deleted");
        self.regenerator.trigger(None);
        Ok(())
    }
}

fn required(field: &str, value: String) -> ApiResult<String> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(format!("{field} is required")));
    }
    Ok(value)
}

/// Owner first, then co-authors in order without duplicates.
fn authors(owner: UserId, co_authors: Vec<UserId>) -> Vec<UserId> {
    let mut ids = vec![owner];
    for id in co_authors {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

fn normalize_topics(topics: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(topics.len());
    for topic in topics {
        let topic = topic.trim();
        if !topic.is_empty() && !out.iter().any(|t| t == topic) {
            out.push(topic.to_string());
        }
    }
    out
}

fn unknown_author(err: StorageError) -> ApiError {
    match err {
        StorageError::NotFound { entity: "user", id } => {
            ApiError::bad_request(format!("unknown author: {id}"))
        }
        other => other.into(),
    }
}
