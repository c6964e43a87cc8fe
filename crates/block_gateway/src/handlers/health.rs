//! Liveness probe, distinct from the `/metrics` listener. Cheap on purpose:
//! reachability of `axum::serve` is all it attests to, no collaborator is
//! called.

use axum::http::StatusCode;

pub async fn healthz() -> StatusCode {
    StatusCode::OK
}
