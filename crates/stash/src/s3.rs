//! S3-compatible store.
//!
//! A single PUT per object gives the same all-or-nothing visibility as the
//! local store's rename. Custom endpoints (MinIO and friends) switch URL
//! minting and addressing to path style.

use std::path::PathBuf;

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use tokio::io::AsyncReadExt;

use crate::key::clean_key;
use crate::{BlobReader, BlobStat, BlobStore, PutReceipt, StorageError};

/// Connection settings for an S3-compatible backend. No Debug impl: the
/// secret must never reach logs.
#[derive(Clone, Default)]
pub struct S3Options {
    pub bucket: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

/// Blob store backed by an S3 bucket.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    public_base: String,
}

impl S3Store {
    /// Build a client from explicit options. Static credentials are used when
    /// both halves are provided; otherwise the ambient provider chain applies.
    pub async fn connect(options: S3Options) -> Result<Self, StorageError> {
        if options.bucket.is_empty() {
            return Err(StorageError::Unavailable("S3_BUCKET is not set".into()));
        }

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = options.region.clone() {
            loader = loader.region(Region::new(region));
        }
        if let (Some(id), Some(secret)) = (
            options.access_key_id.clone(),
            options.secret_access_key.clone(),
        ) {
            loader = loader.credentials_provider(Credentials::new(id, secret, None, None, "jamconf"));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = options.endpoint.clone() {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        let client = Client::from_conf(builder.build());

        let public_base = match (&options.endpoint, &options.region) {
            (Some(endpoint), _) => format!(
                "{}/{}",
                endpoint.trim_end_matches('/'),
                options.bucket
            ),
            (None, Some(region)) => {
                format!("https://{}.s3.{}.amazonaws.com", options.bucket, region)
            }
            (None, None) => format!("https://{}.s3.amazonaws.com", options.bucket),
        };

        Ok(Self {
            client,
            bucket: options.bucket,
            public_base,
        })
    }

    async fn put_bytes(&self, key: &str, data: Vec<u8>) -> Result<PutReceipt, StorageError> {
        let cleaned = clean_key(key)?;
        let size = data.len() as u64;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&cleaned)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(StorageError::unavailable)?;

        Ok(PutReceipt {
            url: self.url_for(&cleaned),
            size,
        })
    }
}

#[async_trait]
impl BlobStore for S3Store {
    async fn put(&self, key: &str, data: &[u8]) -> Result<PutReceipt, StorageError> {
        self.put_bytes(key, data.to_vec()).await
    }

    async fn put_stream(
        &self,
        key: &str,
        mut reader: BlobReader,
    ) -> Result<PutReceipt, StorageError> {
        // Buffered: produced media files are bounded (a couple of minutes of
        // PCM or one MP4), and a single PUT keeps visibility atomic.
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .await
            .map_err(StorageError::unavailable)?;
        self.put_bytes(key, data).await
    }

    async fn open(&self, key: &str) -> Result<BlobReader, StorageError> {
        let cleaned = clean_key(key)?;
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&cleaned)
            .send()
            .await
            .map_err(|e| match e.into_service_error() {
                err if err.is_no_such_key() => StorageError::NotFound {
                    key: cleaned.clone(),
                },
                err => StorageError::unavailable(err),
            })?;

        Ok(Box::pin(output.body.into_async_read()))
    }

    async fn open_range(
        &self,
        key: &str,
        start: u64,
        end: u64,
    ) -> Result<BlobReader, StorageError> {
        let cleaned = clean_key(key)?;
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&cleaned)
            .range(format!("bytes={start}-{end}"))
            .send()
            .await
            .map_err(|e| match e.into_service_error() {
                err if err.is_no_such_key() => StorageError::NotFound {
                    key: cleaned.clone(),
                },
                err => StorageError::unavailable(err),
            })?;

        Ok(Box::pin(output.body.into_async_read()))
    }

    async fn stat(&self, key: &str) -> Result<BlobStat, StorageError> {
        let cleaned = clean_key(key)?;
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&cleaned)
            .send()
            .await
            .map_err(|e| match e.into_service_error() {
                err if err.is_not_found() => StorageError::NotFound {
                    key: cleaned.clone(),
                },
                err => StorageError::unavailable(err),
            })?;

        let modified = output
            .last_modified()
            .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()));

        Ok(BlobStat {
            size: output.content_length().unwrap_or(0) as u64,
            modified,
        })
    }

    fn resolve_path(&self, _key: &str) -> Option<PathBuf> {
        None
    }

    fn url_for(&self, key: &str) -> String {
        let cleaned = clean_key(key).unwrap_or_else(|_| key.to_string());
        format!("{}/{}", self.public_base, cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_requires_bucket() {
        let result = S3Store::connect(S3Options::default()).await;
        assert!(matches!(result, Err(StorageError::Unavailable(_))));
    }

    #[tokio::test]
    async fn url_minting_styles() {
        let path_style = S3Store::connect(S3Options {
            bucket: "jam".into(),
            endpoint: Some("http://minio:9000/".into()),
            region: Some("us-east-1".into()),
            ..Default::default()
        })
        .await
        .unwrap();
        assert_eq!(
            path_style.url_for("assets/a.wav"),
            "http://minio:9000/jam/assets/a.wav"
        );

        let hosted = S3Store::connect(S3Options {
            bucket: "jam".into(),
            region: Some("eu-west-1".into()),
            ..Default::default()
        })
        .await
        .unwrap();
        assert_eq!(
            hosted.url_for("/assets/a.wav"),
            "https://jam.s3.eu-west-1.amazonaws.com/assets/a.wav"
        );
    }
}
