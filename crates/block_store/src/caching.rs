use std::sync::Arc;

use block_cache::MetadataCache;
use block_core::StorageObject;

use crate::{ObjectStore, Retrieved};

/// Decorates an [`ObjectStore`] driver with metadata-cache-first reads and
/// write-through on every mutation, so the request engine never has to
/// think about cache coherence itself.
pub struct CachingStore {
    inner: Arc<dyn ObjectStore>,
    cache: Arc<dyn MetadataCache>,
}

impl CachingStore {
    pub fn new(inner: Arc<dyn ObjectStore>, cache: Arc<dyn MetadataCache>) -> Self {
        Self { inner, cache }
    }

    /// `(etag, size)`, cache first, driver on miss. Used both for the
    /// `If-Match` precondition check and for the upload size-delta
    /// computation ("old size").
    pub async fn meta(&self, prefix: &str, file_path: &str) -> anyhow::Result<Option<(String, i64)>> {
        if let Some(hit) = self.cache.get_storage(prefix, file_path).await? {
            return Ok(Some(hit));
        }
        let meta = self.inner.meta(prefix, file_path).await?;
        if let Some((etag, size)) = &meta {
            self.cache.set_storage(prefix, file_path, etag, *size).await?;
        }
        Ok(meta)
    }

    /// Stores `so` and returns the persisted object plus
    /// `size_delta = new_size - old_size` (old size is 0 for a fresh key).
    pub async fn store(&self, so: StorageObject) -> anyhow::Result<(StorageObject, i64)> {
        let old_size = self.meta(&so.prefix, &so.file_path).await?.map(|(_, size)| size).unwrap_or(0);
        let stored = self.inner.store(so).await?;
        let new_size = stored.size.expect("driver populates size on store");
        let etag = stored.etag.as_deref().expect("driver populates etag on store");
        self.cache.set_storage(&stored.prefix, &stored.file_path, etag, new_size).await?;
        Ok((stored, new_size - old_size))
    }

    pub async fn retrieve(
        &self,
        prefix: &str,
        file_path: &str,
        if_none_match: Option<&str>,
    ) -> anyhow::Result<Option<Retrieved>> {
        let result = self.inner.retrieve(prefix, file_path, if_none_match).await?;
        if let Some(Retrieved::Found(so)) = &result {
            if let (Some(etag), Some(size)) = (&so.etag, so.size) {
                self.cache.set_storage(prefix, file_path, etag, size).await?;
            }
        }
        Ok(result)
    }

    pub async fn delete(&self, prefix: &str, file_path: &str) -> anyhow::Result<()> {
        self.inner.delete(prefix, file_path).await?;
        self.cache.invalidate_storage(prefix, file_path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use block_cache::memory::InMemoryCache;
    use block_core::StorageObject;

    use super::*;

    struct FakeDriver {
        objects: tokio::sync::Mutex<std::collections::HashMap<String, (String, i64)>>,
    }

    #[async_trait::async_trait]
    impl ObjectStore for FakeDriver {
        async fn store(&self, so: StorageObject) -> anyhow::Result<StorageObject> {
            let key = so.key();
            let size = 7;
            let etag = format!("etag-{size}");
            self.objects.lock().await.insert(key, (etag.clone(), size));
            Ok(StorageObject { etag: Some(etag), size: Some(size), local_file: None, body: None, ..so })
        }

        async fn retrieve(
            &self,
            prefix: &str,
            file_path: &str,
            _if_none_match: Option<&str>,
        ) -> anyhow::Result<Option<Retrieved>> {
            let key = block_core::file_key(prefix, file_path);
            Ok(self.objects.lock().await.get(&key).map(|(etag, size)| {
                Retrieved::Found(StorageObject {
                    etag: Some(etag.clone()),
                    size: Some(*size),
                    local_file: None,
                    body: None,
                    ..StorageObject::new(prefix, file_path)
                })
            }))
        }

        async fn meta(&self, prefix: &str, file_path: &str) -> anyhow::Result<Option<(String, i64)>> {
            let key = block_core::file_key(prefix, file_path);
            Ok(self.objects.lock().await.get(&key).cloned())
        }

        async fn delete(&self, prefix: &str, file_path: &str) -> anyhow::Result<()> {
            let key = block_core::file_key(prefix, file_path);
            self.objects.lock().await.remove(&key);
            Ok(())
        }
    }

    #[tokio::test]
    async fn store_computes_size_delta_against_cached_old_size() {
        let driver = Arc::new(FakeDriver { objects: Default::default() });
        let cache = Arc::new(InMemoryCache::new());
        let store = CachingStore::new(driver, cache);

        let (_, delta) = store.store(StorageObject::new("p", "f")).await.unwrap();
        assert_eq!(delta, 7);
        let (_, delta2) = store.store(StorageObject::new("p", "f")).await.unwrap();
        assert_eq!(delta2, 0);
    }

    #[tokio::test]
    async fn delete_invalidates_cache() {
        let driver = Arc::new(FakeDriver { objects: Default::default() });
        let cache = Arc::new(InMemoryCache::new());
        let store = CachingStore::new(driver, cache);
        store.store(StorageObject::new("p", "f")).await.unwrap();
        assert!(store.meta("p", "f").await.unwrap().is_some());
        store.delete("p", "f").await.unwrap();
        assert!(store.meta("p", "f").await.unwrap().is_none());
    }
}
