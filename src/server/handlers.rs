//! Endpoint handlers

use super::error::HttpError;
use super::state::AppState;
use crate::core::batch::BatchEntry;
use crate::core::media::{MediaInfo, MediaRequest};
use crate::core::outcome::Artifact;
use crate::error::{ErrorKind, MediaError};
use crate::ratelimit::{RateBackend, RateLimits};
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

pub const TRANSPORT_TRUST_HEADER: &str = "x-transport-trust";
pub const BATCH_FAILED_HEADER: &str = "x-batch-failed";

#[derive(Debug, Deserialize)]
pub struct InfoRequest {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct InfoBatchRequest {
    #[serde(default)]
    pub urls: Vec<String>,
}

/// One line of a metadata batch, in input order
#[derive(Debug, Serialize)]
pub struct InfoBatchItem {
    pub url: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<MediaInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl InfoBatchItem {
    fn from_result(url: String, result: Result<MediaInfo, MediaError>) -> Self {
        match result {
            Ok(info) => Self {
                url,
                ok: true,
                info: Some(info),
                error: None,
                kind: None,
            },
            Err(e) => Self {
                url,
                ok: false,
                info: None,
                error: Some(e.sanitized_message()),
                kind: Some(e.kind()),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    /// Quality label or raw format expression
    #[serde(default)]
    pub format_id: Option<String>,
}

/// Either explicit items or a URL list sharing one format
#[derive(Debug, Deserialize)]
pub struct BatchDownloadRequest {
    #[serde(default)]
    pub items: Vec<BatchEntry>,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub format: Option<String>,
}

impl BatchDownloadRequest {
    pub fn into_entries(self) -> Vec<BatchEntry> {
        let Self { items, urls, format } = self;
        if !items.is_empty() {
            return items
                .into_iter()
                .map(|item| BatchEntry {
                    format: item.format.or_else(|| format.clone()),
                    url: item.url,
                })
                .collect();
        }
        urls.into_iter()
            .map(|url| BatchEntry::new(url, format.clone()))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct RateLimitUpdate {
    pub limit: u32,
    pub period_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct RateLimitView {
    pub limit: u32,
    pub period_secs: u64,
    pub backend: RateBackend,
}

impl RateLimitView {
    fn of(state: &AppState) -> Self {
        let limits = state.limiter.limits();
        Self {
            limit: limits.limit,
            period_secs: limits.period.as_secs(),
            backend: state.limiter.backend(),
        }
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn info(
    State(state): State<AppState>,
    payload: Result<Json<InfoRequest>, JsonRejection>,
) -> Result<Json<MediaInfo>, HttpError> {
    let Json(body) = payload?;
    let request = MediaRequest::parse(&body.url, None)?;
    let info = state.orchestrator.info(&request).await?;
    Ok(Json(MediaInfo::clone(&info)))
}

pub async fn info_batch(
    State(state): State<AppState>,
    payload: Result<Json<InfoBatchRequest>, JsonRejection>,
) -> Result<Json<Vec<InfoBatchItem>>, HttpError> {
    let Json(body) = payload?;
    if body.urls.is_empty() {
        return Err(HttpError::bad_request("Batch contains no URLs"));
    }
    if body.urls.len() > state.batch.max_items() {
        return Err(HttpError::bad_request(format!(
            "Batch of {} items exceeds the limit of {}",
            body.urls.len(),
            state.batch.max_items()
        )));
    }

    let items = stream::iter(body.urls)
        .map(|url| {
            let orchestrator = state.orchestrator.clone();
            async move {
                let result = match MediaRequest::parse(&url, None) {
                    Ok(request) => orchestrator
                        .info(&request)
                        .await
                        .map(|info| MediaInfo::clone(&info)),
                    Err(e) => Err(e),
                };
                InfoBatchItem::from_result(url, result)
            }
        })
        .buffered(state.batch.concurrency())
        .collect::<Vec<_>>()
        .await;

    Ok(Json(items))
}

pub async fn download(
    State(state): State<AppState>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<Response, HttpError> {
    let Json(body) = payload?;
    let request = MediaRequest::parse(&body.url, body.format_id.as_deref())?;

    let (artifact, transport) = state
        .orchestrator
        .download(&request, None)
        .await
        .into_result()
        .map_err(|(kind, message)| HttpError::new(kind, message))?;

    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static(TRANSPORT_TRUST_HEADER),
        HeaderValue::from_static(transport.trust.as_str()),
    );
    stream_artifact(artifact, headers).await
}

pub async fn download_batch(
    State(state): State<AppState>,
    payload: Result<Json<BatchDownloadRequest>, JsonRejection>,
) -> Result<Response, HttpError> {
    let Json(body) = payload?;
    let entries = body.into_entries();
    let package = state.batch.download_batch(&entries).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static(BATCH_FAILED_HEADER),
        HeaderValue::from(package.failed()),
    );
    stream_artifact(package.archive, headers).await
}

pub async fn rate_limit(State(state): State<AppState>) -> Json<RateLimitView> {
    Json(RateLimitView::of(&state))
}

pub async fn update_rate_limit(
    State(state): State<AppState>,
    payload: Result<Json<RateLimitUpdate>, JsonRejection>,
) -> Result<Json<RateLimitView>, HttpError> {
    let Json(body) = payload?;
    let limits = RateLimits::new(body.limit, Duration::from_secs(body.period_secs))?;
    state.limiter.set_limits(limits);
    info!("Rate limit set to {} per {}s", body.limit, body.period_secs);
    Ok(Json(RateLimitView::of(&state)))
}

/// Stream the artifact as an attachment; its scratch goes when the body is dropped
async fn stream_artifact(artifact: Artifact, mut headers: HeaderMap) -> Result<Response, HttpError> {
    let content_type = HeaderValue::from_str(artifact.container_mime())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    headers.insert(CONTENT_TYPE, content_type);
    headers.insert(CONTENT_LENGTH, HeaderValue::from(artifact.byte_size()));
    headers.insert(CONTENT_DISPOSITION, content_disposition(&artifact.file_name()));

    let stream = artifact.into_stream().await?;
    Ok((headers, Body::from_stream(stream)).into_response())
}

/// `attachment` disposition with an ASCII fallback and the RFC 5987 form
pub fn content_disposition(file_name: &str) -> HeaderValue {
    let fallback: String = file_name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let value = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(file_name)
    );
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
