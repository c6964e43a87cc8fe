//! Wires the `/api/v0` HTTP/WebSocket surface plus the `/healthz`
//! liveness probe onto one `axum::Router`, with the usual layering of
//! state, tracing, and body limits applied around it.

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::{handlers, state::AppState};

pub fn build(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/files/:prefix/*file_path",
            get(handlers::files::download).post(handlers::files::upload).delete(handlers::files::delete),
        )
        .route("/prefix/", get(handlers::prefix::list).post(handlers::prefix::create))
        .route("/quota/", get(handlers::quota::view))
        .route("/websocket/:prefix", get(handlers::websocket::for_prefix))
        .route("/websocket/:prefix/*file_path", get(handlers::websocket::for_file));

    Router::new()
        .nest("/api/v0", api)
        .route("/healthz", get(handlers::health::healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn metrics_router(state: AppState) -> Router {
    Router::new().route("/metrics", get(metrics_handler)).with_state(state)
}

async fn metrics_handler(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<String, (axum::http::StatusCode, String)> {
    state
        .metrics
        .encode()
        .map_err(|e| (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}
