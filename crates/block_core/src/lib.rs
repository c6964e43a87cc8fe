//! Shared types and error taxonomy for the block storage gateway.
//!
//! This crate has no I/O of its own: it is the vocabulary the other
//! `block_*` crates and the request engine (`block_gateway`) share so that
//! trait boundaries don't leak implementation-specific types.

pub mod error;
pub mod types;

pub use error::GatewayError;
pub use types::{file_key, storage_cache_key, this_month, user_cache_key, ObjectBody, StorageObject, User};
