use bytes::Bytes;
use chrono::Datelike;
use futures::stream::BoxStream;
use std::path::PathBuf;

/// A resolved user, as returned by the accounting service (directly, or
/// mirrored through the auth cache / local ledger).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub user_id: i64,
    pub is_active: bool,
    pub quota: i64,
    pub traffic_quota: i64,
}

/// Byte range stream yielded by a retrieve; `Err` entries are I/O failures
/// surfaced mid-stream (e.g. a disconnecting remote peer).
pub type ObjectBody = BoxStream<'static, std::io::Result<Bytes>>;

/// Logical record for a single blob, reused as request/response/meta DTO
/// across the object store driver, the metadata cache and the request
/// engine. `(prefix, file_path)` is the identity key.
#[derive(Clone)]
pub struct StorageObject {
    pub prefix: String,
    pub file_path: String,
    pub etag: Option<String>,
    pub size: Option<i64>,
    /// Present while content has been spooled to a local temp file (upload
    /// path, or local-filesystem retrieval source).
    pub local_file: Option<PathBuf>,
    /// Present while content is being streamed out to the client.
    pub body: Option<ObjectBody>,
}

impl std::fmt::Debug for StorageObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageObject")
            .field("prefix", &self.prefix)
            .field("file_path", &self.file_path)
            .field("etag", &self.etag)
            .field("size", &self.size)
            .field("local_file", &self.local_file)
            .field("body", &self.body.is_some())
            .finish()
    }
}

impl StorageObject {
    pub fn new(prefix: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            file_path: file_path.into(),
            etag: None,
            size: None,
            local_file: None,
            body: None,
        }
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub fn with_local_file(mut self, path: PathBuf) -> Self {
        self.local_file = Some(path);
        self
    }

    /// Object store key: `{prefix}/{file_path}`.
    pub fn key(&self) -> String {
        file_key(&self.prefix, &self.file_path)
    }

    pub fn is_block(&self) -> bool {
        self.file_path.starts_with("block/")
    }
}

pub fn file_key(prefix: &str, file_path: &str) -> String {
    format!("{prefix}/{file_path}")
}

/// Cache key for a blob's `(etag, size)` entry.
pub fn storage_cache_key(prefix: &str, file_path: &str) -> String {
    format!("storage_{}", file_key(prefix, file_path))
}

/// Cache key for a resolved user, addressed by numeric id.
pub fn user_cache_key(user_id: i64) -> String {
    format!("user-{user_id}")
}

/// Returns the first day of the current month, used as the partition key
/// for the traffic ledger. Exposed as a free function (rather than inlined
/// at call sites) so tests can substitute it to exercise month rollover.
pub fn this_month() -> chrono::NaiveDate {
    chrono::Utc::now().date_naive().with_day0(0).expect("day0 is always valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_key_joins_prefix_and_path() {
        assert_eq!(file_key("abc-123", "foo/bar"), "abc-123/foo/bar");
    }

    #[test]
    fn storage_object_detects_blocks() {
        let block = StorageObject::new("p", "block/foobar");
        assert!(block.is_block());
        let meta = StorageObject::new("p", "meta/foobar");
        assert!(!meta.is_block());
    }

    #[test]
    fn this_month_is_first_of_month() {
        assert_eq!(this_month().day(), 1);
    }
}
