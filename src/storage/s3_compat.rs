//! Listing through any S3-compatible API, including the Cloud Storage XML interoperability endpoint.
use super::{BlobInfo, BucketLister};
use anyhow::Result;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::DateTime as SmithyDateTime;
use aws_sdk_s3::types::Object;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use tracing::debug;

const DEFAULT_REGION: &str = "auto";

pub async fn client_from_profile(profile_name: Option<&str>, endpoint: Option<&str>) -> Client {
    let mut loader = aws_config::from_env();
    if let Some(profile_name) = profile_name {
        loader = loader.profile_name(profile_name);
    }
    let base_config = loader.load().await;

    let mut s3_config = aws_sdk_s3::config::Builder::from(&base_config)
        .region(Region::new(DEFAULT_REGION))
        .force_path_style(true);
    if let Some(endpoint) = endpoint {
        s3_config = s3_config.endpoint_url(endpoint);
    }

    Client::from_conf(s3_config.build())
}

pub struct S3CompatLister {
    client: Client,
    bucket: String,
}

impl S3CompatLister {
    pub fn new(client: Client, bucket: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
        }
    }
}

fn to_chrono(timestamp: &SmithyDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(timestamp.secs(), timestamp.subsec_nanos())
}

fn blob_from_object(object: &Object) -> Option<BlobInfo> {
    let name = object.key()?.to_string();
    let modified = object.last_modified().and_then(to_chrono);
    Some(BlobInfo {
        name,
        size: object.size().and_then(|size| u64::try_from(size).ok()),
        content_type: None,
        // ListObjectsV2 only reports the modification time
        created: modified,
        updated: modified,
        etag: object.e_tag().map(|etag| etag.trim_matches('"').to_string()),
        md5_hash: None,
    })
}

impl BucketLister for S3CompatLister {
    async fn list_blobs(&self, prefix: &str) -> Result<Vec<BlobInfo>> {
        let mut blobs = vec![];
        let mut continuation: Option<String> = None;

        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await?;

            debug!(count = page.contents().len(), "Fetched object page");
            blobs.extend(page.contents().iter().filter_map(blob_from_object));

            match (page.is_truncated(), page.next_continuation_token()) {
                (Some(true), Some(token)) => continuation = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(blobs)
    }
}
