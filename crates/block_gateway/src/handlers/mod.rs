pub mod files;
pub mod health;
pub mod prefix;
pub mod quota;
pub mod websocket;

use std::time::Instant;

use axum::http::HeaderMap;
use block_core::GatewayError;

use crate::state::AppState;

/// Bumps `in_progress_requests` on creation, reverses it and observes
/// `response_time` on drop - so cancellation (client disconnect) can never
/// skip the accounting the way an early `return` inside the handler body
/// could.
pub struct RequestTimer<'a> {
    state: &'a AppState,
    start: Instant,
}

impl<'a> RequestTimer<'a> {
    pub fn start(state: &'a AppState) -> Self {
        state.metrics.in_progress_requests.inc();
        Self { state, start: Instant::now() }
    }
}

impl Drop for RequestTimer<'_> {
    fn drop(&mut self) {
        self.state.metrics.in_progress_requests.dec();
        self.state.metrics.response_time.observe(self.start.elapsed().as_secs_f64());
    }
}

/// `Authorization` header value, verbatim - the auth resolver treats the
/// whole string as the cache/lookup key, matching the original's
/// `request.headers.get("Authorization")`.
pub fn require_auth_header(headers: &HeaderMap) -> Result<&str, GatewayError> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| GatewayError::Unauthorized("missing Authorization header".into()))?
        .to_str()
        .map_err(|_| GatewayError::Unauthorized("malformed Authorization header".into()))
}

/// Tags an error with its `block_access_denied{reason}` count before
/// handing it back to the caller, so every rejection path feeds the same
/// metric regardless of which handler raised it.
pub fn reject(state: &AppState, err: GatewayError) -> GatewayError {
    state.metrics.access_denied.with_label_values(&[err.code()]).inc();
    err
}
