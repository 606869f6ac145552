use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use toml;

pub const DEFAULT_PUBLIC_BASE: &str = "https://storage.googleapis.com";

/// Puget Sound region, used when nothing better is known about a layer's extent.
pub const DEFAULT_BBOX: [f64; 4] = [
    -124.81791282934638,
    46.593055784134464,
    -120.65459447215042,
    49.00245266588554,
];

pub fn catalog_toml() -> toml::Table {
    toml::toml! {
        [bucket]
        name = "swhm_data"
        prefix = "public/layers/"
        project = "swhm-prod"
        backend = "gcs"

        [catalog]
        id = "data-catalog"
        title = "Stormwater Heatmap Data Catalog"
        description = "STAC catalog for Stormwater Heatmap datasets including raster layers and pollutant concentration models"
        keywords = ["geospatial", "stormwater", "hydrology", "pollution", "environmental"]
        layout = "hierarchical"
        catalog_type = "absolute_published"

        [collection]
        id = "raster"
        title = "SWHM Raster Layers"
        description = "A collection of raster data layers for the Stormwater Heatmap project."
        license = "MPL-2.0"
        keywords = ["COG", "stormwater", "heatmap", "geospatial"]

        [provider]
        name = "StormwaterHeatmap.Org"

        [output]
        dir = "catalog"
        layer_metadata = "../layer_metadata/layer_metadata.json"

        [upload]
        method = "gsutil"
        tool = "gsutil"
        cache_control = "no-cache, no-store, must-revalidate"
        timeout_secs = 30
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct CatalogConfig {
    pub bucket: BucketConfig,
    pub catalog: CatalogInfo,
    #[serde(default)]
    pub collection: CollectionDefaults,
    #[serde(default)]
    pub provider: ProviderInfo,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct BucketConfig {
    pub name: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub backend: Backend,
    /// S3-compatible endpoint, e.g. `https://storage.googleapis.com` for GCS interoperability.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default = "default_public_base")]
    pub public_base: String,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    #[default]
    Gcs,
    S3,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct CatalogInfo {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub layout: Layout,
    #[serde(default)]
    pub catalog_type: CatalogType,
    #[serde(default = "default_conforms_to")]
    pub conforms_to: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// One collection per directory level, items next to the object's directory.
    #[default]
    Hierarchical,
    /// A single collection with one directory per asset.
    Flat,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CatalogType {
    #[default]
    AbsolutePublished,
    RelativePublished,
    SelfContained,
}

impl CatalogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AbsolutePublished => "ABSOLUTE_PUBLISHED",
            Self::RelativePublished => "RELATIVE_PUBLISHED",
            Self::SelfContained => "SELF_CONTAINED",
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct CollectionDefaults {
    pub id: String,
    pub title: String,
    pub description: String,
    pub license: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default = "default_bbox")]
    pub default_bbox: [f64; 4],
}

impl Default for CollectionDefaults {
    fn default() -> Self {
        Self {
            id: "raster".to_string(),
            title: "Raster Layers".to_string(),
            description: "Raster data layers discovered in the bucket.".to_string(),
            license: "MPL-2.0".to_string(),
            keywords: vec![],
            default_bbox: DEFAULT_BBOX,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ProviderInfo {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for ProviderInfo {
    fn default() -> Self {
        Self {
            name: "StormwaterHeatmap.Org".to_string(),
            url: None,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct OutputConfig {
    pub dir: PathBuf,
    #[serde(default)]
    pub layer_metadata: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("catalog"),
            layer_metadata: None,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UploadMethod {
    #[default]
    Gsutil,
    S3,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct UploadConfig {
    #[serde(default)]
    pub method: UploadMethod,
    #[serde(default = "default_tool")]
    pub tool: String,
    /// Destination prefix; the bucket prefix is used when unset.
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default = "default_cache_control")]
    pub cache_control: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            method: UploadMethod::default(),
            tool: default_tool(),
            prefix: None,
            cache_control: default_cache_control(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_public_base() -> String {
    DEFAULT_PUBLIC_BASE.to_string()
}

fn default_bbox() -> [f64; 4] {
    DEFAULT_BBOX
}

fn default_conforms_to() -> Vec<String> {
    vec![
        "https://api.stacspec.org/v1.0.0/core".to_string(),
        "https://api.stacspec.org/v1.0.0/collections".to_string(),
    ]
}

fn default_tool() -> String {
    "gsutil".to_string()
}

fn default_cache_control() -> String {
    "no-cache, no-store, must-revalidate".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Trims a leading slash and guarantees a trailing one, so `"/"` and `""` both mean the bucket root.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_start_matches('/');
    if trimmed.is_empty() || trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}

impl CatalogConfig {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn from_template(table: &toml::Table) -> Result<Self> {
        let config: Self = toml::from_str(&table.to_string())?;
        Ok(config)
    }

    pub fn crawl_prefix(&self) -> String {
        normalize_prefix(&self.bucket.prefix)
    }

    pub fn upload_prefix(&self) -> String {
        match &self.upload.prefix {
            Some(prefix) => normalize_prefix(prefix),
            None => self.crawl_prefix(),
        }
    }

    /// `https://storage.googleapis.com/<bucket>`
    pub fn bucket_url(&self) -> String {
        format!(
            "{}/{}",
            self.bucket.public_base.trim_end_matches('/'),
            self.bucket.name
        )
    }

    /// Public URL of the directory the catalog is published under, always ending in `/`.
    pub fn root_url(&self) -> String {
        format!("{}/{}", self.bucket_url(), self.upload_prefix())
    }

    pub fn provider_url(&self) -> String {
        self.provider
            .url
            .clone()
            .unwrap_or_else(|| self.bucket_url())
    }
}
