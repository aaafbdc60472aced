//! Route handlers.
//!
//! Public routes (`submit`, `next_token`, `login`, `health`) take no
//! credentials. Every admin handler takes an [`Admin`] argument, which
//! rejects the request with `401` before the handler body runs.

use crate::server::{
    auth::Admin,
    error::{ApiError, ApiResult},
    export::ExportFormat,
    service::state::AppState,
    telemetry::{
        increment_exports, increment_status_updates, increment_submissions,
        increment_validation_failures,
    },
};
use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{
        HeaderMap, Method, StatusCode, Uri,
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    response::IntoResponse,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokenq::{NewServiceRequest, RequestFilter, ServiceRequest, Stats, Status, StatusFilter};
use tracing::instrument;
use uuid::Uuid;

#[instrument(skip_all)]
pub async fn submit(
    State(state): State<AppState>,
    payload: Result<Json<NewServiceRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ServiceRequest>)> {
    let Json(request) = payload?;

    let record = match state.store.submit(request).await {
        Ok(record) => record,
        Err(e) => {
            if e.invalid_fields().is_some() {
                increment_validation_failures();
            }
            return Err(e.into());
        }
    };
    increment_submissions();
    tracing::info!(token = record.token_number, id = %record.id, "service request accepted");

    // Confirmation is best effort and must not hold up the response.
    let notifier = state.notifier.clone();
    let confirmed = record.clone();
    tokio::spawn(async move {
        if let Err(e) = notifier.confirm(&confirmed).await {
            tracing::warn!(token = confirmed.token_number, error = %e, "confirmation failed");
        }
    });

    Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NextToken {
    pub next_token: u64,
}

pub async fn next_token(State(state): State<AppState>) -> ApiResult<Json<NextToken>> {
    let next_token = state.store.peek_next_token().await?;
    Ok(Json(NextToken { next_token }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    #[serde(alias = "email")]
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
}

#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<LoginResponse>> {
    let Json(LoginRequest { username, password }) = payload?;
    let token = state.auth.login(username.trim(), &password)?;
    tracing::info!(%username, "admin logged in");
    Ok(Json(LoginResponse { token, username }))
}

#[derive(Debug, Default, Deserialize)]
pub struct UsersQuery {
    pub search: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UsersResponse {
    pub users: Vec<ServiceRequest>,
    pub total: usize,
}

#[instrument(skip_all)]
pub async fn list_users(
    _admin: Admin,
    State(state): State<AppState>,
    query: Result<Query<UsersQuery>, QueryRejection>,
) -> ApiResult<Json<UsersResponse>> {
    let Query(query) = query?;

    let status = match query.status.as_deref() {
        Some(raw) => raw.parse::<StatusFilter>()?,
        None => StatusFilter::All,
    };
    let mut filter = RequestFilter::default().with_status(status);
    if let Some(search) = query.search {
        filter = filter.with_search(search);
    }

    let users = state.store.list(&filter).await?;
    Ok(Json(UsersResponse {
        total: users.len(),
        users,
    }))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    admin: Admin,
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<StatusUpdate>, JsonRejection>,
) -> ApiResult<Json<ServiceRequest>> {
    // An id that is not a UUID cannot name a record.
    let uuid = Uuid::parse_str(&id).map_err(|_| tokenq::Error::NotFound { id: id.clone() })?;
    let Json(update) = payload?;
    let status: Status = update.status.trim().parse()?;

    let record = state.store.update_status(uuid, status).await?;
    increment_status_updates();
    tracing::info!(
        admin = %admin.username,
        token = record.token_number,
        %status,
        "status updated"
    );
    Ok(Json(record))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub stats: Stats,
}

pub async fn stats(_admin: Admin, State(state): State<AppState>) -> ApiResult<Json<StatsResponse>> {
    let stats = state.store.stats().await?;
    Ok(Json(StatsResponse { stats }))
}

#[instrument(skip(state))]
pub async fn export(
    _admin: Admin,
    State(state): State<AppState>,
    Path(format): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let format: ExportFormat = format.parse()?;
    let records = state.store.list(&RequestFilter::default()).await?;

    let exporter = state.exporter.clone();
    let body = tokio::task::spawn_blocking(move || exporter.render(format, &records))
        .await
        .map_err(|e| ApiError::Internal {
            context: format!("export task failed: {e}"),
        })?;

    increment_exports(format.as_str());
    let disposition = format!(
        "attachment; filename=\"{}\"",
        format.file_name(Utc::now())
    );
    Ok((
        [
            (CONTENT_TYPE, format.content_type().to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
}

pub async fn health() -> Json<Health> {
    Json(Health {
        status: "healthy".to_string(),
    })
}

/// Catch-all for unmatched paths. Unknown admin paths still demand a valid
/// bearer token before they are reported missing.
pub async fn fallback(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> ApiError {
    let path = uri.path();
    let admin_path = path
        .strip_prefix("/api")
        .unwrap_or(path)
        .starts_with("/admin/");
    if admin_path {
        if let Err(e) = Admin::from_headers(&headers, &state.auth) {
            return e;
        }
    }
    ApiError::RouteNotFound {
        method: method.to_string(),
        path: path.to_string(),
    }
}
