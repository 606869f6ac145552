//! Copies a generated catalog to its bucket, one JSON file at a time.
use crate::catalog_plan::find_json_files;
use crate::error::CatalogError;
use crate::stac_operations::{CATALOG_FILE, COLLECTION_FILE};
use crate::storage::BucketUrl;
use anyhow::{anyhow, Result};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{error, info, warn};

const CONTENT_TYPE: &str = "application/json";
const STAC_BROWSER: &str = "https://radiantearth.github.io/stac-browser/#/external/storage.googleapis.com";

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct UploadTask {
    pub local: PathBuf,
    /// Path below the catalog root, `/`-separated.
    pub relative: String,
    pub bucket: String,
    pub key: String,
}

impl UploadTask {
    pub fn new(local: PathBuf, relative: &str, bucket: &str, prefix: &str) -> Self {
        Self {
            local,
            relative: relative.to_string(),
            bucket: bucket.to_string(),
            key: format!("{prefix}{relative}"),
        }
    }

    pub fn gs_url(&self) -> String {
        BucketUrl {
            bucket: self.bucket.clone(),
            key: self.key.clone(),
        }
        .to_gs_url()
    }
}

/// Relative path of `file` below `root`, dropping a leading `catalog` component.
fn relative_key(root: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(root).ok()?;
    let mut parts = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>();
    if parts.len() > 1 && parts[0] == "catalog" {
        parts.remove(0);
    }
    Some(parts.join("/"))
}

/// One task per `*.json` file under `root`, mirrored to `gs://{bucket}/{prefix}`.
pub fn plan_uploads(root: &Path, bucket: &str, prefix: &str) -> Result<Vec<UploadTask>> {
    let files = find_json_files(root)?;
    let tasks = files
        .into_iter()
        .filter_map(|file| {
            let relative = relative_key(root, &file)?;
            Some(UploadTask::new(file, &relative, bucket, prefix))
        })
        .collect();
    Ok(tasks)
}

pub trait Uploader {
    async fn upload(&self, task: &UploadTask) -> Result<()>;
}

/// Shells out to `gsutil cp` (or any tool with the same arguments).
pub struct GsutilUploader {
    tool: String,
    cache_control: String,
    timeout: Duration,
}

impl GsutilUploader {
    pub fn new(tool: &str, cache_control: &str, timeout: Duration) -> Self {
        Self {
            tool: tool.to_string(),
            cache_control: cache_control.to_string(),
            timeout,
        }
    }

    fn command(&self, task: &UploadTask) -> Command {
        let mut command = Command::new(&self.tool);
        command
            .arg("-h")
            .arg(format!("Cache-Control:{}", self.cache_control))
            .arg("-h")
            .arg(format!("Content-Type:{CONTENT_TYPE}"))
            .arg("cp")
            .arg(&task.local)
            .arg(task.gs_url())
            .kill_on_drop(true);
        command
    }
}

impl Uploader for GsutilUploader {
    async fn upload(&self, task: &UploadTask) -> Result<()> {
        let output = match timeout(self.timeout, self.command(task).output()).await {
            Err(_) => return Err(anyhow!("{} timed out after {:?}", self.tool, self.timeout)),
            Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CatalogError::ToolNotFound(self.tool.clone()).into())
            }
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "{} exited with {}: {}",
                self.tool,
                output.status,
                stderr.trim()
            ));
        }
        Ok(())
    }
}

/// Uploads through the S3 API, e.g. Cloud Storage with HMAC interoperability keys.
pub struct S3Uploader {
    client: Client,
    cache_control: String,
}

impl S3Uploader {
    pub fn new(client: Client, cache_control: &str) -> Self {
        Self {
            client,
            cache_control: cache_control.to_string(),
        }
    }
}

impl Uploader for S3Uploader {
    async fn upload(&self, task: &UploadTask) -> Result<()> {
        let body = ByteStream::from_path(&task.local).await?;
        self.client
            .put_object()
            .bucket(&task.bucket)
            .key(&task.key)
            .cache_control(&self.cache_control)
            .content_type(CONTENT_TYPE)
            .body(body)
            .send()
            .await?;
        Ok(())
    }
}

pub enum AnyUploader {
    Gsutil(GsutilUploader),
    S3(S3Uploader),
}

impl Uploader for AnyUploader {
    async fn upload(&self, task: &UploadTask) -> Result<()> {
        match self {
            Self::Gsutil(uploader) => uploader.upload(task).await,
            Self::S3(uploader) => uploader.upload(task).await,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct FailedUpload {
    pub file: String,
    pub error: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct UploadReport {
    pub total_files: usize,
    pub uploaded: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<FailedUpload>,
}

impl UploadReport {
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Total files found: {}", self.total_files),
            format!("Successfully uploaded: {}", self.uploaded.len()),
            format!("Skipped (dry run): {}", self.skipped.len()),
            format!("Failed: {}", self.failed.len()),
        ];
        for failure in self.failed.iter() {
            lines.push(format!("  {}: {}", failure.file, failure.error));
        }
        lines.join("\n")
    }
}

/// Runs every task in order. A missing tool aborts the run; any other failure is recorded and skipped.
pub async fn run_uploads(
    uploader: &impl Uploader,
    tasks: &[UploadTask],
    dry_run: bool,
) -> Result<UploadReport> {
    let mut report = UploadReport {
        total_files: tasks.len(),
        ..Default::default()
    };

    for task in tasks {
        info!("{} -> {}", task.relative, task.gs_url());
        if dry_run {
            report.skipped.push(task.relative.clone());
            continue;
        }

        match uploader.upload(task).await {
            Ok(()) => report.uploaded.push(task.relative.clone()),
            Err(e) => {
                if let Some(CatalogError::ToolNotFound(tool)) = e.downcast_ref::<CatalogError>() {
                    error!(
                        "{} is not installed; aborting after {} of {} files",
                        tool,
                        report.uploaded.len(),
                        tasks.len()
                    );
                    return Err(e);
                }
                warn!("Upload of {} failed: {}", task.relative, e);
                report.failed.push(FailedUpload {
                    file: task.relative.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    Ok(report)
}

pub fn stac_browser_url(bucket: &str, key: &str) -> String {
    format!("{STAC_BROWSER}/{bucket}/{key}")
}

/// STAC Browser links for the root catalog and every uploaded collection.
pub fn browser_links(report: &UploadReport, bucket: &str, prefix: &str) -> Vec<(String, String)> {
    let mut links = vec![(
        "Main Catalog".to_string(),
        stac_browser_url(bucket, &format!("{prefix}{CATALOG_FILE}")),
    )];
    for relative in report.uploaded.iter() {
        let Some(collection) = relative.strip_suffix(&format!("/{COLLECTION_FILE}")) else {
            continue;
        };
        links.push((
            collection.to_string(),
            stac_browser_url(bucket, &format!("{prefix}{relative}")),
        ));
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct RecordingUploader;

    impl Uploader for RecordingUploader {
        async fn upload(&self, task: &UploadTask) -> Result<()> {
            if task.relative.contains("broken") {
                return Err(anyhow!("simulated failure"));
            }
            Ok(())
        }
    }

    fn catalog_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("raster/landcover")).unwrap();
        fs::write(root.join("catalog.json"), "{}").unwrap();
        fs::write(root.join("raster/collection.json"), "{}").unwrap();
        fs::write(root.join("raster/landcover/imperviousness.json"), "{}").unwrap();
        fs::write(root.join("raster/landcover/imperviousness.tif"), "").unwrap();
        dir
    }

    fn task(relative: &str) -> UploadTask {
        UploadTask::new(PathBuf::from(relative), relative, "swhm_data", "public/layers/")
    }

    #[test]
    fn test_plan_uploads() {
        let dir = catalog_dir();
        let tasks = plan_uploads(dir.path(), "swhm_data", "public/layers/").unwrap();
        let urls = tasks.iter().map(|task| task.gs_url()).collect::<Vec<_>>();
        assert_eq!(
            urls,
            vec![
                "gs://swhm_data/public/layers/catalog.json",
                "gs://swhm_data/public/layers/raster/collection.json",
                "gs://swhm_data/public/layers/raster/landcover/imperviousness.json",
            ]
        );
    }

    #[test]
    fn test_relative_key_strips_catalog_component() {
        let root = Path::new("/work");
        assert_eq!(
            relative_key(root, Path::new("/work/catalog/vector/collection.json")).as_deref(),
            Some("vector/collection.json")
        );
        assert_eq!(
            relative_key(root, Path::new("/work/catalog.json")).as_deref(),
            Some("catalog.json")
        );
    }

    #[tokio::test]
    async fn test_dry_run_skips_everything() {
        let tasks = vec![task("catalog.json"), task("raster/collection.json")];
        let report = run_uploads(&RecordingUploader, &tasks, true).await.unwrap();
        assert_eq!(report.total_files, 2);
        assert_eq!(report.skipped.len(), 2);
        assert!(report.uploaded.is_empty());
    }

    #[tokio::test]
    async fn test_failures_are_recorded_and_processing_continues() {
        let tasks = vec![
            task("catalog.json"),
            task("broken/collection.json"),
            task("raster/collection.json"),
        ];
        let report = run_uploads(&RecordingUploader, &tasks, false).await.unwrap();
        assert_eq!(report.uploaded, vec!["catalog.json", "raster/collection.json"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].file, "broken/collection.json");
        assert!(report.summary().contains("Failed: 1"));
    }

    #[tokio::test]
    async fn test_missing_tool_aborts() {
        let dir = catalog_dir();
        let tasks = plan_uploads(dir.path(), "swhm_data", "").unwrap();
        let uploader = GsutilUploader::new(
            "stac-crawler-no-such-tool",
            "no-cache",
            Duration::from_secs(5),
        );
        let err = run_uploads(&uploader, &tasks, false).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CatalogError>(),
            Some(CatalogError::ToolNotFound(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_reported_per_file() {
        let dir = catalog_dir();
        let tasks = plan_uploads(dir.path(), "swhm_data", "").unwrap();
        let uploader = GsutilUploader::new("false", "no-cache", Duration::from_secs(5));
        let report = run_uploads(&uploader, &tasks, false).await.unwrap();
        assert_eq!(report.failed.len(), tasks.len());
        assert!(report.uploaded.is_empty());
    }

    #[test]
    fn test_browser_links() {
        let report = UploadReport {
            total_files: 3,
            uploaded: vec![
                "catalog.json".to_string(),
                "raster/collection.json".to_string(),
                "raster/landcover/imperviousness.json".to_string(),
            ],
            ..Default::default()
        };
        let links = browser_links(&report, "swhm_data", "public/layers/");
        assert_eq!(links.len(), 2);
        assert_eq!(
            links[0].1,
            "https://radiantearth.github.io/stac-browser/#/external/storage.googleapis.com/swhm_data/public/layers/catalog.json"
        );
        assert_eq!(links[1].0, "raster");
    }
}
