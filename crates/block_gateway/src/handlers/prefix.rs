//! `GET`/`POST /api/v0/prefix/` - prefix listing and creation.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use block_core::GatewayError;
use serde::Serialize;

use super::{reject, require_auth_header, RequestTimer};
use crate::state::AppState;

#[derive(Serialize)]
struct PrefixList {
    prefixes: Vec<String>,
}

#[derive(Serialize)]
struct PrefixCreated {
    prefix: String,
}

pub async fn list(State(state): State<AppState>, headers: HeaderMap) -> Result<impl IntoResponse, GatewayError> {
    let _timer = RequestTimer::start(&state);
    let header = require_auth_header(&headers).map_err(|e| reject(&state, e))?;
    let outcome = state.auth.auth(header).await.map_err(GatewayError::from).map_err(|e| reject(&state, e))?;
    let prefixes = state.db.get_prefixes(outcome.user().user_id).await.map_err(GatewayError::from)?;
    Ok(Json(PrefixList { prefixes }))
}

pub async fn create(State(state): State<AppState>, headers: HeaderMap) -> Result<impl IntoResponse, GatewayError> {
    let _timer = RequestTimer::start(&state);
    let header = require_auth_header(&headers).map_err(|e| reject(&state, e))?;
    let outcome = state.auth.auth(header).await.map_err(GatewayError::from).map_err(|e| reject(&state, e))?;
    let prefix = state.db.create_prefix(outcome.user().user_id).await.map_err(GatewayError::from)?;
    Ok((StatusCode::CREATED, Json(PrefixCreated { prefix })))
}
