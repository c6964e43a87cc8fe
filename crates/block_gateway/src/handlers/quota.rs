//! `GET /api/v0/quota/` - usage view for the authenticated user.

use axum::{extract::State, http::HeaderMap, response::IntoResponse, Json};
use block_core::GatewayError;
use serde::Serialize;

use super::{reject, require_auth_header, RequestTimer};
use crate::state::AppState;

#[derive(Serialize)]
struct QuotaView {
    quota: i64,
    size: i64,
}

pub async fn view(State(state): State<AppState>, headers: HeaderMap) -> Result<impl IntoResponse, GatewayError> {
    let _timer = RequestTimer::start(&state);
    let header = require_auth_header(&headers).map_err(|e| reject(&state, e))?;
    let outcome = state.auth.auth(header).await.map_err(GatewayError::from).map_err(|e| reject(&state, e))?;
    let size = state.db.get_size(outcome.user().user_id).await.map_err(GatewayError::from)?;
    Ok(Json(QuotaView { quota: outcome.user().quota, size }))
}
