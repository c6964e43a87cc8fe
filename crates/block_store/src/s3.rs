use std::{env, sync::LazyLock};

use anyhow::Context;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    error::SdkError,
    operation::{get_object::GetObjectError, head_object::HeadObjectError},
    primitives::ByteStream,
    Client,
};
use aws_types::region::Region;
use block_core::{file_key, StorageObject};
use futures::TryStreamExt;

use crate::{ObjectStore, Retrieved};

static S3_ENDPOINT_URL: LazyLock<Option<String>> = LazyLock::new(|| env::var("S3_ENDPOINT_URL").ok());
static AWS_REGION: LazyLock<Option<String>> = LazyLock::new(|| env::var("AWS_REGION").ok());

/// Builds an S3 client config that bails loudly if region/credentials are
/// missing rather than letting the SDK fall back to an ambient chain we
/// didn't ask for, and honors `S3_ENDPOINT_URL` for S3-compatible services
/// used in local testing.
pub async fn client_from_env() -> anyhow::Result<Client> {
    let region = AWS_REGION.clone().context("AWS_REGION env variable must be set")?;
    if env::var("AWS_ACCESS_KEY_ID").is_err() {
        anyhow::bail!("AWS_ACCESS_KEY_ID env variable must be set");
    }
    if env::var("AWS_SECRET_ACCESS_KEY").is_err() {
        anyhow::bail!("AWS_SECRET_ACCESS_KEY env variable must be set");
    }

    let mut loader = aws_config::defaults(BehaviorVersion::v2025_01_17()).region(Region::new(region));
    if let Some(endpoint) = S3_ENDPOINT_URL.clone() {
        loader = loader.endpoint_url(endpoint);
    }
    let config = loader.load().await;
    Ok(Client::new(&config))
}

pub struct RemoteObjectStore {
    client: Client,
    bucket: String,
}

impl RemoteObjectStore {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self { client, bucket: bucket.into() }
    }
}

#[async_trait]
impl ObjectStore for RemoteObjectStore {
    async fn store(&self, so: StorageObject) -> anyhow::Result<StorageObject> {
        let local_file = so.local_file.as_ref().context("store() requires a spooled local_file")?;
        let key = file_key(&so.prefix, &so.file_path);
        let body = ByteStream::from_path(local_file).await.context("open spool file")?;
        self.client.put_object().bucket(&self.bucket).key(&key).body(body).send().await?;

        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .context("head after put")?;
        let etag = head.e_tag().map(str::to_string).context("S3 response missing ETag")?;
        let size = head.content_length().unwrap_or(0);
        Ok(StorageObject { etag: Some(etag), size: Some(size), local_file: None, body: None, ..so })
    }

    async fn retrieve(
        &self,
        prefix: &str,
        file_path: &str,
        if_none_match: Option<&str>,
    ) -> anyhow::Result<Option<Retrieved>> {
        let key = file_key(prefix, file_path);
        let mut req = self.client.get_object().bucket(&self.bucket).key(&key);
        if let Some(etag) = if_none_match {
            req = req.if_none_match(etag);
        }
        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(SdkError::ServiceError(e)) if matches!(e.err(), GetObjectError::NoSuchKey(_)) => {
                return Ok(None)
            },
            Err(SdkError::ResponseError(e)) if e.raw().status().as_u16() == 304 => {
                return Ok(Some(Retrieved::NotModified))
            },
            Err(e) => return Err(e).context(format!("get_object {key}")),
        };

        let etag = resp.e_tag().map(str::to_string).context("S3 response missing ETag")?;
        let size = resp.content_length().unwrap_or(0);
        let body = resp.body.map_err(std::io::Error::other);
        Ok(Some(Retrieved::Found(StorageObject {
            etag: Some(etag),
            size: Some(size),
            local_file: None,
            body: Some(Box::pin(body)),
            ..StorageObject::new(prefix, file_path)
        })))
    }

    async fn meta(&self, prefix: &str, file_path: &str) -> anyhow::Result<Option<(String, i64)>> {
        let key = file_key(prefix, file_path);
        match self.client.head_object().bucket(&self.bucket).key(&key).send().await {
            Ok(resp) => {
                let etag = resp.e_tag().map(str::to_string).context("S3 response missing ETag")?;
                Ok(Some((etag, resp.content_length().unwrap_or(0))))
            },
            Err(SdkError::ServiceError(e)) if matches!(e.err(), HeadObjectError::NotFound(_)) => Ok(None),
            Err(e) => Err(e).context(format!("head_object {key}")),
        }
    }

    async fn delete(&self, prefix: &str, file_path: &str) -> anyhow::Result<()> {
        let key = file_key(prefix, file_path);
        self.client.delete_object().bucket(&self.bucket).key(&key).send().await.context(format!("delete_object {key}"))?;
        Ok(())
    }
}
