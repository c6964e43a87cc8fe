use std::{
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

use anyhow::Context;
use async_trait::async_trait;
use block_core::{file_key, StorageObject};
use futures::TryStreamExt;
use tokio_util::io::ReaderStream;

use crate::{ObjectStore, Retrieved};

/// Persists blobs under `basedir/{prefix}/{file_path}`. ETag is the file's
/// mtime in nanoseconds, which is monotonic per write on one host - good
/// enough for optimistic concurrency within a single deployment, not across
/// a cluster.
pub struct LocalFsStore {
    base_dir: PathBuf,
}

impl LocalFsStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    fn path_for(&self, prefix: &str, file_path: &str) -> PathBuf {
        self.base_dir.join(prefix).join(file_path)
    }

    fn mtime_etag(meta: &std::fs::Metadata) -> anyhow::Result<String> {
        let nanos = meta.modified()?.duration_since(UNIX_EPOCH)?.as_nanos();
        Ok(nanos.to_string())
    }
}

#[async_trait]
impl ObjectStore for LocalFsStore {
    async fn store(&self, so: StorageObject) -> anyhow::Result<StorageObject> {
        let spool = so
            .local_file
            .as_ref()
            .context("store() requires a spooled local_file")?
            .clone();
        let dest = self.path_for(&so.prefix, &so.file_path);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = sibling_tmp_path(&dest);

        // Fast path: same filesystem, a single atomic rename. If that fails
        // (cross-device, or any other reason), fall back to copying the
        // bytes into the sibling temp file; either way the spool path keeps
        // existing afterward so the caller's cleanup path stays uniform.
        if tokio::fs::rename(&spool, &tmp).await.is_ok() {
            let _ = tokio::fs::File::create(&spool).await;
        } else {
            tokio::fs::copy(&spool, &tmp).await.context("copy spool into destination fs")?;
        }
        tokio::fs::rename(&tmp, &dest).await.context("rename into place")?;

        let meta = tokio::fs::metadata(&dest).await?;
        let etag = Self::mtime_etag(&meta)?;
        let size = meta.len() as i64;
        Ok(StorageObject { etag: Some(etag), size: Some(size), local_file: None, body: None, ..so })
    }

    async fn retrieve(
        &self,
        prefix: &str,
        file_path: &str,
        if_none_match: Option<&str>,
    ) -> anyhow::Result<Option<Retrieved>> {
        let path = self.path_for(prefix, file_path);
        let meta = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).context(format!("stat {}", file_key(prefix, file_path))),
        };
        let etag = Self::mtime_etag(&meta)?;
        if if_none_match.is_some_and(|inm| inm == etag) {
            return Ok(Some(Retrieved::NotModified));
        }
        let size = meta.len() as i64;
        let file = tokio::fs::File::open(&path).await?;
        let body = ReaderStream::new(file).map_err(std::io::Error::other);
        Ok(Some(Retrieved::Found(StorageObject {
            etag: Some(etag),
            size: Some(size),
            local_file: None,
            body: Some(Box::pin(body)),
            ..StorageObject::new(prefix, file_path)
        })))
    }

    async fn meta(&self, prefix: &str, file_path: &str) -> anyhow::Result<Option<(String, i64)>> {
        let path = self.path_for(prefix, file_path);
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(Some((Self::mtime_etag(&meta)?, meta.len() as i64))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context(format!("stat {}", file_key(prefix, file_path))),
        }
    }

    async fn delete(&self, prefix: &str, file_path: &str) -> anyhow::Result<()> {
        let path = self.path_for(prefix, file_path);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context(format!("delete {}", file_key(prefix, file_path))),
        }
    }
}

fn sibling_tmp_path(dest: &Path) -> PathBuf {
    let file_name = dest.file_name().and_then(|n| n.to_str()).unwrap_or("blob");
    dest.with_file_name(format!(".tmp-{}-{}", std::process::id(), file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spool(dir: &tempfile::TempDir, contents: &[u8]) -> PathBuf {
        let path = dir.path().join("spool");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn store_then_retrieve_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsStore::new(dir.path());
        let spool_path = spool(&dir, b"hello world");

        let so = StorageObject::new("prefix1", "f").with_local_file(spool_path.clone());
        let stored = store.store(so).await.unwrap();
        assert!(stored.etag.is_some());
        assert_eq!(stored.size, Some(11));
        assert!(spool_path.exists(), "spool path must survive the move");

        let found = store.retrieve("prefix1", "f", None).await.unwrap();
        let Some(Retrieved::Found(obj)) = found else { panic!("expected a hit") };
        assert_eq!(obj.etag, stored.etag);

        let not_modified = store.retrieve("prefix1", "f", stored.etag.as_deref()).await.unwrap();
        assert!(matches!(not_modified, Some(Retrieved::NotModified)));
    }

    #[tokio::test]
    async fn retrieve_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsStore::new(dir.path());
        assert!(store.retrieve("p", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsStore::new(dir.path());
        store.delete("p", "missing").await.unwrap();
        let spool_path = spool(&dir, b"x");
        store.store(StorageObject::new("p", "f").with_local_file(spool_path)).await.unwrap();
        store.delete("p", "f").await.unwrap();
        store.delete("p", "f").await.unwrap();
        assert!(store.meta("p", "f").await.unwrap().is_none());
    }
}
