//! Bucket listing: the object metadata the crawler works from, and the backends that produce it.
mod gcs;
mod s3_compat;

pub use gcs::GcsJsonLister;
pub use s3_compat::{client_from_profile, S3CompatLister};

use crate::config::{Backend, CatalogConfig};
use crate::error::CatalogError;
use anyhow::Result;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Metadata for a single object in a bucket.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct BlobInfo {
    pub name: String,
    pub size: Option<u64>,
    pub content_type: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub md5_hash: Option<String>,
}

impl BlobInfo {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn public_url(&self, bucket_url: &str) -> String {
        format!("{}/{}", bucket_url.trim_end_matches('/'), self.name)
    }
}

pub trait BucketLister {
    async fn list_blobs(&self, prefix: &str) -> Result<Vec<BlobInfo>>;
}

/// Runtime choice of listing backend.
pub enum Lister {
    Gcs(GcsJsonLister),
    S3(S3CompatLister),
}

impl Lister {
    pub async fn from_config(config: &CatalogConfig) -> Result<Self> {
        let bucket = &config.bucket;
        let lister = match bucket.backend {
            Backend::Gcs => Self::Gcs(GcsJsonLister::from_env(&bucket.name)),
            Backend::S3 => {
                let client = client_from_profile(
                    bucket.profile.as_deref(),
                    bucket.endpoint.as_deref(),
                )
                .await;
                Self::S3(S3CompatLister::new(client, &bucket.name))
            }
        };
        Ok(lister)
    }
}

impl BucketLister for Lister {
    async fn list_blobs(&self, prefix: &str) -> Result<Vec<BlobInfo>> {
        match self {
            Self::Gcs(lister) => lister.list_blobs(prefix).await,
            Self::S3(lister) => lister.list_blobs(prefix).await,
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct BucketUrl {
    pub bucket: String,
    pub key: String,
}

impl BucketUrl {
    /// Accepts `gs://bucket/key` and `https://storage.googleapis.com/bucket/key`.
    pub fn from_url(url: &str) -> Result<Self> {
        let re = Regex::new(
            r"^(?:gs://|https://storage\.googleapis\.com/)(?<bucket>[a-z0-9][a-z0-9._-]*)(?:/(?<key>.*))?$",
        )
        .expect("Regex pattern should always compile");

        let captures = re
            .captures(url)
            .ok_or_else(|| CatalogError::InvalidBucketUrl(url.to_string()))?;

        Ok(Self {
            bucket: captures["bucket"].to_string(),
            key: captures
                .name("key")
                .map(|key| key.as_str().to_string())
                .unwrap_or_default(),
        })
    }

    pub fn to_gs_url(&self) -> String {
        format!("gs://{}/{}", self.bucket, self.key)
    }
}
