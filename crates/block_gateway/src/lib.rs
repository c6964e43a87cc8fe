//! Library surface of the gateway binary, split out so integration tests
//! can drive the real `axum::Router` with `tower::ServiceExt::oneshot`
//! instead of a socket.

pub mod config;
pub mod handlers;
pub mod metrics;
pub mod router;
pub mod state;
