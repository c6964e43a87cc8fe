//! `GET`/`POST`/`DELETE /api/v0/files/{prefix}/{file_path}` - the streaming
//! upload/download/delete state machine.

use std::{pin::Pin, task::{Context, Poll}, time::Instant};

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use block_core::{GatewayError, ObjectBody, StorageObject};
use block_store::Retrieved;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::json;
use tokio::io::AsyncWriteExt;

use super::{reject, require_auth_header, RequestTimer};
use crate::state::AppState;

/// Checks write access to `prefix` for the resolved user: bypass skips the
/// ownership lookup entirely (it exists to let tests and local tooling
/// exercise the gateway without provisioning a real prefix).
async fn authorize_write(
    state: &AppState,
    headers: &HeaderMap,
    prefix: &str,
) -> Result<block_auth::AuthOutcome, GatewayError> {
    let header = require_auth_header(headers).map_err(|e| reject(state, e))?;
    let start = Instant::now();
    let outcome = state.auth.auth(header).await.map_err(GatewayError::from).map_err(|e| reject(state, e))?;
    state.metrics.wait_for_auth.observe(start.elapsed().as_secs_f64());

    if !outcome.is_bypass() {
        let owns = state
            .db
            .has_prefix(outcome.user().user_id, prefix)
            .await
            .map_err(GatewayError::from)?;
        if !owns {
            return Err(reject(state, GatewayError::Unauthorized("prefix not owned by this user".into())));
        }
    }
    Ok(outcome)
}

pub async fn upload(
    State(state): State<AppState>,
    Path((prefix, file_path)): Path<(String, String)>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, GatewayError> {
    let _timer = RequestTimer::start(&state);
    if prefix.is_empty() {
        return Err(reject(&state, GatewayError::BadRequest("missing prefix".into())));
    }
    let outcome = authorize_write(&state, &headers, &prefix).await?;

    // Spool to a named temp file; its `Drop` unlinks whatever is left at
    // that path once this function returns, success or not - the local
    // driver recreates an empty file there after moving the content out,
    // the S3 driver never touches the spool path at all.
    let spool = tempfile::NamedTempFile::new().map_err(|e| GatewayError::from(anyhow::Error::from(e)))?;
    let mut writer = tokio::fs::File::from_std(spool.as_file().try_clone().map_err(|e| GatewayError::from(anyhow::Error::from(e)))?);

    let mut remaining = state.max_body_size;
    let mut size: i64 = 0;
    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| GatewayError::BadRequest(format!("body stream error: {e}")))?;
        remaining -= chunk.len() as i64;
        if remaining < 0 {
            state.metrics.content_length_error.inc();
            return Err(reject(&state, GatewayError::BadRequest("Content-Length too large".into())));
        }
        writer.write_all(&chunk).await.map_err(|e| GatewayError::from(anyhow::Error::from(e)))?;
        size += chunk.len() as i64;
    }
    writer.flush().await.map_err(|e| GatewayError::from(anyhow::Error::from(e)))?;
    drop(writer);

    let old_meta = state.store.meta(&prefix, &file_path).await.map_err(GatewayError::from)?;

    if let Some(if_match) = headers.get(header::IF_MATCH) {
        let if_match = if_match.to_str().map_err(|_| GatewayError::BadRequest("malformed If-Match".into()))?;
        match &old_meta {
            None => return Err(reject(&state, GatewayError::PreconditionFailed { current_etag: None })),
            Some((etag, _)) if etag != if_match => {
                return Err(reject(
                    &state,
                    GatewayError::PreconditionFailed { current_etag: Some(etag.clone()) },
                ))
            }
            Some(_) => {}
        }
    }

    let user = outcome.user();
    let used = state.db.get_size(user.user_id).await.map_err(GatewayError::from)?;
    let quota_reached = used + size > user.quota;
    let old_size = old_meta.as_ref().map(|(_, s)| *s);
    let is_overwrite = old_size.is_some();
    let size_change = size - old_size.unwrap_or(0);
    let is_block = file_path.starts_with("block/");
    state.metrics.quota_by_request.with_label_values(&[if is_block { "block" } else { "meta" }]).observe(size as f64);
    if !block_quota::upload(quota_reached, size_change, is_block, is_overwrite) {
        return Err(reject(&state, GatewayError::QuotaReached));
    }

    let so = StorageObject::new(&prefix, &file_path).with_local_file(spool.path().to_path_buf());
    let _permit = state.worker_pool.acquire().await.expect("worker pool semaphore is never closed");
    let store_start = Instant::now();
    let (stored, size_delta) = state.store.store(so).await.map_err(GatewayError::from)?;
    state.metrics.wait_for_transfer_store.observe(store_start.elapsed().as_secs_f64());
    drop(_permit);

    state.metrics.traffic_request.inc_by(size as f64);
    state.metrics.traffic_by_request.observe(size as f64);

    state.db.update_size(&prefix, size_delta).await.map_err(GatewayError::from)?;

    let channel = format!("{prefix}/{file_path}");
    let etag = stored.etag.clone().expect("driver populates etag on store");
    let message = json!({"operation": "POST", "prefix": prefix, "path": channel, "etag": etag});
    if let Err(e) = state.pubsub.publish(&channel, message).await {
        tracing::warn!(error = %e, %channel, "publish failed");
    }

    let etag_value = axum::http::HeaderValue::from_str(&etag).map_err(|_| GatewayError::BadRequest("invalid etag".into()))?;
    let mut response = StatusCode::NO_CONTENT.into_response();
    response.headers_mut().insert(header::ETAG, etag_value);
    Ok(response)
}

pub async fn download(
    State(state): State<AppState>,
    Path((prefix, file_path)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let _timer = RequestTimer::start(&state);

    if let Some(owner) = state.db.get_prefix_owner(&prefix).await.map_err(GatewayError::from)? {
        let traffic = state.db.get_traffic_by_prefix(&prefix).await.map_err(GatewayError::from)?;
        let quota_user = state.auth.get_user(owner).await.map_err(GatewayError::from)?;
        if !block_quota::download(traffic) || traffic > quota_user.traffic_quota {
            return Err(reject(&state, GatewayError::QuotaReached));
        }
    }

    let if_none_match = headers.get(header::IF_NONE_MATCH).and_then(|v| v.to_str().ok()).map(str::to_owned);
    let retrieve_start = Instant::now();
    let retrieved = state
        .store
        .retrieve(&prefix, &file_path, if_none_match.as_deref())
        .await
        .map_err(GatewayError::from)?;
    state.metrics.wait_for_transfer_retrieve.observe(retrieve_start.elapsed().as_secs_f64());

    match retrieved {
        None => Err(reject(&state, GatewayError::NotFound)),
        Some(Retrieved::NotModified) => {
            let etag = axum::http::HeaderValue::from_str(if_none_match.as_deref().unwrap_or_default())
                .map_err(|_| GatewayError::BadRequest("invalid etag".into()))?;
            let mut response = StatusCode::NOT_MODIFIED.into_response();
            response.headers_mut().insert(header::ETAG, etag);
            Ok(response)
        }
        Some(Retrieved::Found(so)) => {
            let etag = so.etag.clone().expect("driver populates etag on retrieve");
            let size = so.size.expect("driver populates size on retrieve");
            let body_stream: ObjectBody = so.body.expect("driver populates body on retrieve");
            let counted = TrafficCountingBody {
                inner: body_stream,
                db: state.db.clone(),
                metrics: state.metrics.clone(),
                prefix: prefix.clone(),
                seen: 0,
            };
            let response = Response::builder()
                .status(StatusCode::OK)
                .header(header::ETAG, etag)
                .header(header::CONTENT_LENGTH, size)
                .body(Body::from_stream(counted))
                .expect("static headers are always valid");
            Ok(response)
        }
    }
}

pub async fn delete(
    State(state): State<AppState>,
    Path((prefix, file_path)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let _timer = RequestTimer::start(&state);
    if prefix.is_empty() {
        return Err(reject(&state, GatewayError::BadRequest("missing prefix".into())));
    }
    authorize_write(&state, &headers, &prefix).await?;

    let old_size = state.store.meta(&prefix, &file_path).await.map_err(GatewayError::from)?.map(|(_, s)| s).unwrap_or(0);
    state.store.delete(&prefix, &file_path).await.map_err(GatewayError::from)?;
    if old_size != 0 {
        state.db.update_size(&prefix, -old_size).await.map_err(GatewayError::from)?;
    }

    let channel = format!("{prefix}/{file_path}");
    let message = json!({"operation": "DELETE", "prefix": prefix, "path": channel});
    if let Err(e) = state.pubsub.publish(&channel, message).await {
        tracing::warn!(error = %e, %channel, "publish failed");
    }

    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Wraps a retrieved object's byte stream to tally bytes actually sent to
/// the client, recording the download against the prefix's traffic ledger
/// once the stream is dropped - a client that disconnects mid-download
/// still gets billed only for what it received.
struct TrafficCountingBody {
    inner: ObjectBody,
    db: std::sync::Arc<dyn block_db::UserDatabase>,
    metrics: std::sync::Arc<crate::metrics::Metrics>,
    prefix: String,
    seen: i64,
}

impl Stream for TrafficCountingBody {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.as_mut().get_mut();
        let polled = this.inner.as_mut().poll_next(cx);
        if let Poll::Ready(Some(Ok(chunk))) = &polled {
            this.seen += chunk.len() as i64;
        }
        polled
    }
}

impl Drop for TrafficCountingBody {
    fn drop(&mut self) {
        if self.seen == 0 {
            return;
        }
        let db = self.db.clone();
        let metrics = self.metrics.clone();
        let prefix = std::mem::take(&mut self.prefix);
        let seen = self.seen;
        tokio::spawn(async move {
            metrics.traffic_response.inc_by(seen as f64);
            metrics.traffic_by_request.observe(seen as f64);
            if let Err(e) = db.update_traffic(&prefix, seen).await {
                tracing::warn!(error = %e, %prefix, "failed to record download traffic");
            }
        });
    }
}
