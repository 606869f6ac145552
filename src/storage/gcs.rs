use super::{BlobInfo, BucketLister};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;
use url::Url;

const JSON_API: &str = "https://storage.googleapis.com/storage/v1/";
const TOKEN_VAR: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Lists objects through the Cloud Storage JSON API. Public buckets need no token.
pub struct GcsJsonLister {
    client: reqwest::Client,
    api: Url,
    bucket: String,
    token: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectResource>,
    next_page_token: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ObjectResource {
    name: String,
    // The JSON API encodes uint64 values as strings
    size: Option<String>,
    content_type: Option<String>,
    time_created: Option<DateTime<Utc>>,
    updated: Option<DateTime<Utc>>,
    etag: Option<String>,
    md5_hash: Option<String>,
}

impl From<ObjectResource> for BlobInfo {
    fn from(object: ObjectResource) -> Self {
        Self {
            name: object.name,
            size: object.size.and_then(|size| size.parse().ok()),
            content_type: object.content_type,
            created: object.time_created,
            updated: object.updated,
            etag: object.etag,
            md5_hash: object.md5_hash,
        }
    }
}

impl GcsJsonLister {
    pub fn new(bucket: &str, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api: Url::parse(JSON_API).expect("JSON API url should always parse"),
            bucket: bucket.to_string(),
            token,
        }
    }

    pub fn from_env(bucket: &str) -> Self {
        Self::new(bucket, std::env::var(TOKEN_VAR).ok())
    }

    fn objects_url(&self) -> Result<Url> {
        let url = self.api.join(&format!("b/{}/o", self.bucket))?;
        Ok(url)
    }

    async fn fetch_page(&self, prefix: &str, page_token: Option<&str>) -> Result<ObjectList> {
        let mut request = self
            .client
            .get(self.objects_url()?)
            .query(&[("prefix", prefix)]);
        if let Some(page_token) = page_token {
            request = request.query(&[("pageToken", page_token)]);
        }
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Listing gs://{}/{} failed with {}: {}",
                self.bucket,
                prefix,
                status,
                body
            ));
        }
        let page: ObjectList = response.json().await?;
        Ok(page)
    }
}

impl BucketLister for GcsJsonLister {
    async fn list_blobs(&self, prefix: &str) -> Result<Vec<BlobInfo>> {
        let mut blobs = vec![];
        let mut page_token: Option<String> = None;

        loop {
            let page = self.fetch_page(prefix, page_token.as_deref()).await?;
            debug!(count = page.items.len(), "Fetched object page");
            blobs.extend(page.items.into_iter().map(BlobInfo::from));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(blobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_objects_url() {
        let lister = GcsJsonLister::new("swhm_data", None);
        assert_eq!(
            lister.objects_url().unwrap().as_str(),
            "https://storage.googleapis.com/storage/v1/b/swhm_data/o"
        );
    }

    #[test]
    fn test_object_list_from_json() {
        let page: ObjectList = serde_json::from_value(serde_json::json!({
            "kind": "storage#objects",
            "nextPageToken": "abc",
            "items": [{
                "name": "public/layers/raster/imperviousness.tif",
                "size": "1048576",
                "contentType": "image/tiff",
                "timeCreated": "2024-03-01T12:30:00.000Z",
                "updated": "2024-03-02T08:00:00.000Z",
                "etag": "CJyd",
                "md5Hash": "1B2M2Y8AsgTpgAmY7PhCfg=="
            }]
        }))
        .unwrap();

        assert_eq!(page.next_page_token.as_deref(), Some("abc"));
        let blob = BlobInfo::from(page.items.into_iter().next().unwrap());
        assert_eq!(blob.size, Some(1048576));
        assert_eq!(blob.content_type.as_deref(), Some("image/tiff"));
        assert_eq!(
            blob.created.unwrap().to_rfc3339(),
            "2024-03-01T12:30:00+00:00"
        );
    }

    #[test]
    fn test_empty_listing() {
        let page: ObjectList = serde_json::from_str(r#"{"kind": "storage#objects"}"#).unwrap();
        assert!(page.items.is_empty());
        assert!(page.next_page_token.is_none());
    }
}
