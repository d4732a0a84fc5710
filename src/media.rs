use async_trait::async_trait;
use log::{error, info, warn};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::config::{AppConfig, S3Settings};

#[derive(Debug, Error)]
pub enum MediaStoreError {
    #[error("not_found")]
    NotFound,
    #[error("other: {0}")]
    Other(String),
}

/// Remote host for uploaded images, addressed by an opaque key such as
/// `ducks/2c1e....png`.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn save(&self, key: &str, mime: &str, bytes: &[u8]) -> Result<(), MediaStoreError>;
    async fn load(&self, key: &str) -> Result<(Vec<u8>, String), MediaStoreError>;
    async fn delete(&self, key: &str) -> Result<(), MediaStoreError>;
}

fn sniff_mime(bytes: &[u8]) -> String {
    infer::get(bytes)
        .map(|t| t.mime_type().to_string())
        .unwrap_or_else(|| "application/octet-stream".into())
}

// ---------------- S3 Implementation (MinIO compatible) ----------------
pub struct S3MediaStore {
    bucket: String,
    client: aws_sdk_s3::Client,
    prefix: String,
}

impl S3MediaStore {
    pub async fn new(settings: &S3Settings) -> anyhow::Result<Self> {
        use aws_credential_types::provider::SharedCredentialsProvider;
        use aws_credential_types::Credentials;

        let S3Settings { endpoint, bucket, region, access_key, secret_key, prefix } = settings.clone();

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(region.clone()))
            .endpoint_url(endpoint);
        if let (Some(access), Some(secret)) = (access_key, secret_key) {
            let creds = Credentials::new(access, secret, None, None, "static");
            loader = loader.credentials_provider(SharedCredentialsProvider::new(creds));
        }
        let conf = loader.load().await;
        // path-style: MinIO / local endpoints have no wildcard DNS
        let s3_conf = aws_sdk_s3::config::Builder::from(&conf)
            .force_path_style(true)
            .build();
        let client = aws_sdk_s3::Client::from_conf(s3_conf);
        info!("Initialized S3/MinIO media client for bucket '{bucket}'");

        if let Err(e) = client.head_bucket().bucket(&bucket).send().await {
            warn!("head_bucket failed for '{bucket}' (will attempt create): {e:?}");
            Self::create_bucket(&client, &bucket, &region).await?;
        }

        Ok(Self { bucket, client, prefix })
    }

    async fn create_bucket(client: &aws_sdk_s3::Client, bucket: &str, region: &str) -> anyhow::Result<()> {
        const MAX_ATTEMPTS: u32 = 8;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match client.create_bucket().bucket(bucket).send().await {
                Ok(_) => {
                    info!("created bucket '{bucket}' (attempt {attempt})");
                    return Ok(());
                }
                Err(e) if attempt >= MAX_ATTEMPTS => {
                    let region_hint = if region != "us-east-1" {
                        " (non-us-east-1 regions may need a CreateBucketConfiguration)"
                    } else {
                        ""
                    };
                    error!("create_bucket failed for '{bucket}' after {attempt} attempts: {e:?}");
                    anyhow::bail!("failed to ensure bucket '{bucket}': {e}{region_hint}");
                }
                Err(e) => {
                    let backoff_ms = 200 * attempt.pow(2);
                    warn!("create_bucket attempt {attempt} failed for '{bucket}': {e:?} (retrying in {backoff_ms}ms)");
                    tokio::time::sleep(std::time::Duration::from_millis(backoff_ms as u64)).await;
                }
            }
        }
    }

    fn object_key(&self, key: &str) -> String {
        format!("{}/{}", self.prefix, key)
    }
}

#[async_trait]
impl MediaStore for S3MediaStore {
    async fn save(&self, key: &str, mime: &str, bytes: &[u8]) -> Result<(), MediaStoreError> {
        use aws_sdk_s3::primitives::ByteStream;
        let object_key = self.object_key(key);
        let put = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .body(ByteStream::from(bytes.to_vec()))
            .content_type(mime);
        if let Err(e) = put.send().await {
            error!("put_object failed key={object_key} bucket={} err={:?}", self.bucket, e);
            let msg = e.to_string();
            let hint = if msg.contains("NoSuchBucket") {
                " (bucket missing or not yet propagated)"
            } else if msg.contains("AccessDenied") {
                " (check S3_ACCESS_KEY/S3_SECRET_KEY permissions)"
            } else {
                ""
            };
            return Err(MediaStoreError::Other(format!("{msg}{hint}")));
        }
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<(Vec<u8>, String), MediaStoreError> {
        let obj = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .send()
            .await
            .map_err(|_| MediaStoreError::NotFound)?;
        let content_type = obj.content_type().map(str::to_string);
        let data = obj
            .body
            .collect()
            .await
            .map_err(|e| MediaStoreError::Other(e.to_string()))?;
        let bytes = data.into_bytes().to_vec();
        let mime = content_type.unwrap_or_else(|| sniff_mime(&bytes));
        Ok((bytes, mime))
    }

    async fn delete(&self, key: &str) -> Result<(), MediaStoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .send()
            .await
            .map_err(|e| MediaStoreError::Other(e.to_string()))?;
        Ok(())
    }
}

// ---------------- Filesystem implementation (local development) ----------------
pub struct FsMediaStore {
    root: PathBuf,
}

impl FsMediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Maps a key to a path under the root; anything that could escape it is rejected.
    fn path_for(&self, key: &str) -> Result<PathBuf, MediaStoreError> {
        let rel = Path::new(key);
        let safe = !key.is_empty() && rel.components().all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(MediaStoreError::NotFound);
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl MediaStore for FsMediaStore {
    async fn save(&self, key: &str, _mime: &str, bytes: &[u8]) -> Result<(), MediaStoreError> {
        let path = self.path_for(key).map_err(|_| MediaStoreError::Other(format!("invalid key '{key}'")))?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| MediaStoreError::Other(e.to_string()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| MediaStoreError::Other(e.to_string()))
    }

    async fn load(&self, key: &str) -> Result<(Vec<u8>, String), MediaStoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let mime = sniff_mime(&bytes);
                Ok((bytes, mime))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(MediaStoreError::NotFound),
            Err(e) => Err(MediaStoreError::Other(e.to_string())),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), MediaStoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(MediaStoreError::NotFound),
            Err(e) => Err(MediaStoreError::Other(e.to_string())),
        }
    }
}

/// S3 when `config.s3` is present, otherwise files under `media_dir`.
pub async fn build_media_store(config: &AppConfig) -> anyhow::Result<Arc<dyn MediaStore>> {
    match &config.s3 {
        Some(settings) => Ok(Arc::new(S3MediaStore::new(settings).await?)),
        None => {
            info!("S3_ENDPOINT not set; storing media under '{}'", config.media_dir.display());
            Ok(Arc::new(FsMediaStore::new(config.media_dir.clone())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fs_store_round_trip_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsMediaStore::new(dir.path());
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I', b'H', b'D', b'R'];
        store.save("ducks/a.png", "image/png", &png).await.unwrap();
        let (bytes, mime) = store.load("ducks/a.png").await.unwrap();
        assert_eq!(bytes, png);
        assert_eq!(mime, "image/png");
        store.delete("ducks/a.png").await.unwrap();
        assert!(matches!(store.load("ducks/a.png").await, Err(MediaStoreError::NotFound)));
    }

    #[tokio::test]
    async fn without_s3_settings_media_lands_in_media_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig { media_dir: dir.path().join("media"), s3: None, ..AppConfig::default() };
        let store = build_media_store(&config).await.unwrap();
        store.save("avatars/q.png", "image/png", b"quack").await.unwrap();
        assert!(dir.path().join("media/avatars/q.png").is_file());
    }

    #[tokio::test]
    async fn fs_store_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsMediaStore::new(dir.path());
        assert!(matches!(store.load("../secret").await, Err(MediaStoreError::NotFound)));
        assert!(matches!(store.load("/etc/passwd").await, Err(MediaStoreError::NotFound)));
        assert!(store.save("a/../../b", "image/png", b"x").await.is_err());
    }
}
