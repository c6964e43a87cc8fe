use std::time::{Duration, Instant};

use async_trait::async_trait;
use block_core::{storage_cache_key, user_cache_key, User};
use dashmap::DashMap;

use crate::{MetadataCache, AUTH_CACHE_TTL_SECS};

struct AuthEntry {
    user: User,
    expires_at: Instant,
}

/// Process-local cache, for single-node debugging and for tests. TTL is
/// enforced on read (lazily) rather than by a background sweeper, which is
/// enough for a cache this short-lived.
#[derive(Default)]
pub struct InMemoryCache {
    storage: DashMap<String, (String, i64)>,
    auth: DashMap<String, AuthEntry>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_auth_entry(&self, key: &str) -> Option<User> {
        let entry = self.auth.get(key)?;
        if entry.expires_at <= Instant::now() {
            drop(entry);
            self.auth.remove(key);
            return None;
        }
        Some(entry.user.clone())
    }
}

#[async_trait]
impl MetadataCache for InMemoryCache {
    async fn get_storage(&self, prefix: &str, file_path: &str) -> anyhow::Result<Option<(String, i64)>> {
        Ok(self.storage.get(&storage_cache_key(prefix, file_path)).map(|e| e.clone()))
    }

    async fn set_storage(&self, prefix: &str, file_path: &str, etag: &str, size: i64) -> anyhow::Result<()> {
        self.storage.insert(storage_cache_key(prefix, file_path), (etag.to_string(), size));
        Ok(())
    }

    async fn invalidate_storage(&self, prefix: &str, file_path: &str) -> anyhow::Result<()> {
        self.storage.remove(&storage_cache_key(prefix, file_path));
        Ok(())
    }

    async fn get_auth(&self, token: &str) -> anyhow::Result<Option<User>> {
        Ok(self.get_auth_entry(token))
    }

    async fn get_user(&self, user_id: i64) -> anyhow::Result<Option<User>> {
        Ok(self.get_auth_entry(&user_cache_key(user_id)))
    }

    async fn set_auth(&self, token: &str, user: &User) -> anyhow::Result<()> {
        let expires_at = Instant::now() + Duration::from_secs(AUTH_CACHE_TTL_SECS);
        self.auth.insert(
            token.to_string(),
            AuthEntry { user: user.clone(), expires_at },
        );
        self.auth.insert(
            user_cache_key(user.user_id),
            AuthEntry { user: user.clone(), expires_at },
        );
        Ok(())
    }

    async fn flush(&self) -> anyhow::Result<()> {
        self.storage.clear();
        self.auth.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User { user_id: 1, is_active: true, quota: 100, traffic_quota: 100 }
    }

    #[tokio::test]
    async fn storage_round_trips() {
        let cache = InMemoryCache::new();
        assert!(cache.get_storage("p", "f").await.unwrap().is_none());
        cache.set_storage("p", "f", "etag1", 42).await.unwrap();
        assert_eq!(cache.get_storage("p", "f").await.unwrap(), Some(("etag1".into(), 42)));
        cache.invalidate_storage("p", "f").await.unwrap();
        assert!(cache.get_storage("p", "f").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn auth_is_readable_by_token_and_user_id() {
        let cache = InMemoryCache::new();
        cache.set_auth("Token abc", &user()).await.unwrap();
        assert_eq!(cache.get_auth("Token abc").await.unwrap(), Some(user()));
        assert_eq!(cache.get_user(1).await.unwrap(), Some(user()));
        assert!(cache.get_auth("Token other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn auth_expires_after_ttl() {
        let cache = InMemoryCache::new();
        cache.auth.insert(
            "tok".to_string(),
            AuthEntry { user: user(), expires_at: Instant::now() - Duration::from_secs(1) },
        );
        assert!(cache.get_auth("tok").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn flush_clears_everything() {
        let cache = InMemoryCache::new();
        cache.set_storage("p", "f", "e", 1).await.unwrap();
        cache.set_auth("tok", &user()).await.unwrap();
        cache.flush().await.unwrap();
        assert!(cache.get_storage("p", "f").await.unwrap().is_none());
        assert!(cache.get_auth("tok").await.unwrap().is_none());
    }
}
