//! Metadata cache: two namespaces (`(etag, size)` per blob key, and `User`
//! per auth token / user id) on one key-value backend.
//!
//! [`MetadataCache`] is the capability trait the object store driver and
//! the auth resolver depend on. [`memory::InMemoryCache`] is a process-
//! local implementation for single-node debugging and tests;
//! [`redis_cache::RedisCache`] is the networked implementation with real
//! server-side TTL.

pub mod memory;
pub mod redis_cache;

use async_trait::async_trait;
use block_core::User;

/// TTL for cached auth entries.
pub const AUTH_CACHE_TTL_SECS: u64 = 60;

#[async_trait]
pub trait MetadataCache: Send + Sync {
    /// Looks up the cached `(etag, size)` for a blob key. Returns `None` on
    /// a cache miss (not an error: callers fall back to the driver).
    async fn get_storage(&self, prefix: &str, file_path: &str) -> anyhow::Result<Option<(String, i64)>>;

    /// Write-through after a successful store/meta. No TTL.
    async fn set_storage(&self, prefix: &str, file_path: &str, etag: &str, size: i64) -> anyhow::Result<()>;

    /// Drops a cached `(etag, size)` entry, e.g. after a delete.
    async fn invalidate_storage(&self, prefix: &str, file_path: &str) -> anyhow::Result<()>;

    async fn get_auth(&self, token: &str) -> anyhow::Result<Option<User>>;

    async fn get_user(&self, user_id: i64) -> anyhow::Result<Option<User>>;

    /// Writes both the `{token}` and `user-{user_id}` entries atomically
    /// with a 60s TTL.
    async fn set_auth(&self, token: &str, user: &User) -> anyhow::Result<()>;

    /// Clears the whole cache. Test-only hook.
    async fn flush(&self) -> anyhow::Result<()>;
}
