//! The object store capability and its two drivers.
//!
//! [`ObjectStore`] is the thin interface the request engine and the
//! [`caching`] decorator depend on. [`s3::RemoteObjectStore`] talks to any
//! S3-compatible service; [`local::LocalFsStore`] persists under a base
//! directory for single-node deployments and tests. Neither driver knows
//! about the metadata cache — [`caching::CachingStore`] is the thing that
//! wraps a driver and keeps the cache coherent.

pub mod caching;
pub mod local;
pub mod s3;

use async_trait::async_trait;
use block_core::StorageObject;

/// Outcome of a conditional GET.
pub enum Retrieved {
    /// `If-None-Match` matched the current ETag; caller should respond 304.
    NotModified,
    Found(StorageObject),
}

/// A place blobs live. Keys are `(prefix, file_path)` pairs, joined the same
/// way on every driver (see [`block_core::file_key`]).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Persists `so.local_file`'s contents under `(so.prefix, so.file_path)`
    /// and returns the object with `etag`/`size` populated from the driver's
    /// own view, never the caller's.
    async fn store(&self, so: StorageObject) -> anyhow::Result<StorageObject>;

    /// `None` when the object doesn't exist. `Some(Retrieved::NotModified)`
    /// when `if_none_match` was supplied and matches the current ETag.
    async fn retrieve(
        &self,
        prefix: &str,
        file_path: &str,
        if_none_match: Option<&str>,
    ) -> anyhow::Result<Option<Retrieved>>;

    /// `(etag, size)` without fetching the body. `None` if the object
    /// doesn't exist.
    async fn meta(&self, prefix: &str, file_path: &str) -> anyhow::Result<Option<(String, i64)>>;

    /// Idempotent: deleting an already-absent object is not an error.
    async fn delete(&self, prefix: &str, file_path: &str) -> anyhow::Result<()>;
}
