use alog_auth::{AuthUser, MaybeAuthUser};
use alog_core::{Log, LogId, Page, User};
use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::logs::{CreateLogRequest, UpdateLogRequest};
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// The cached RSS document.
pub async fn feed(State(state): State<AppState>) -> impl IntoResponse {
    let rss = state.regenerator.rss();
    (
        [(header::CONTENT_TYPE, "application/rss+xml")],
        String::clone(&rss),
    )
}

/// Serves the sitemap index or a part file.
pub async fn sitemap(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let body = state
        .regenerator
        .sitemap()
        .read(&file)
        .await
        .map_err(|e| {
            if e.is_invalid_name() {
                ApiError::bad_request(e.to_string())
            } else if e.is_not_found() {
                ApiError::not_found(format!("sitemap {file}"))
            } else {
                ApiError::internal(e.to_string())
            }
        })?;
    Ok(([(header::CONTENT_TYPE, "application/xml")], body))
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Log ids in paths are uppercase hexadecimal, as in canonical URLs.
fn parse_log_id(raw: &str) -> ApiResult<LogId> {
    LogId::from_str_radix(raw, 16)
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::bad_request(format!("invalid log id: {raw}")))
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    body.map(|Json(v)| v)
        .map_err(|e| ApiError::bad_request(e.body_text()))
}

pub async fn list_logs(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<Page<Log>>> {
    Ok(Json(state.logs.list(params.limit, params.offset).await?))
}

pub async fn search_logs(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Page<Log>>> {
    Ok(Json(
        state
            .logs
            .search(&params.q, params.limit, params.offset)
            .await?,
    ))
}

pub async fn get_log(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Log>> {
    let id = parse_log_id(&id)?;
    let log = state.logs.get(id).await?;
    tracing::debug!(
        log_id = id,
        viewer = viewer.as_ref().map(|v| v.user_id),
        "log read"
    );
    Ok(Json(log))
}

pub async fn create_log(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    body: Result<Json<CreateLogRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Log>)> {
    let request = json_body(body)?;
    let log = state.logs.create(auth.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(log)))
}

pub async fn update_log(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Path(id): Path<String>,
    body: Result<Json<UpdateLogRequest>, JsonRejection>,
) -> ApiResult<Json<Log>> {
    let id = parse_log_id(&id)?;
    let request = json_body(body)?;
    Ok(Json(state.logs.update(id, auth.user_id, request).await?))
}

pub async fn delete_log(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_log_id(&id)?;
    state.logs.delete(id, auth.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(State(state): State<AppState>, AuthUser(auth): AuthUser) -> ApiResult<Json<User>> {
    state
        .users
        .find_by_id(auth.user_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("user {}", auth.user_id)))
}
