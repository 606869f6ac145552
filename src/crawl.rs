use crate::storage::{BlobInfo, BucketLister};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Vector,
    Raster,
}

impl AssetKind {
    /// Classifies an object by its suffix, case-insensitively. Anything else is not catalogued.
    pub fn from_name(name: &str) -> Option<Self> {
        let extension = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "geojson" => Some(Self::Vector),
            "tif" | "tiff" | "gtiff" => Some(Self::Raster),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Raster => "raster",
        }
    }

    pub fn format(&self) -> &'static str {
        match self {
            Self::Vector => "GeoJSON",
            Self::Raster => "GeoTIFF",
        }
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            Self::Vector => "application/geo+json",
            Self::Raster => "image/tiff; application=geotiff",
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct DiscoveredItem {
    pub name: String,
    pub filename: String,
    pub url: String,
    pub kind: AssetKind,
    pub format: String,
    pub size_bytes: Option<u64>,
    pub content_type: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub discovered_at: DateTime<Utc>,
    pub etag: Option<String>,
    pub md5_hash: Option<String>,
    /// Directory of the object relative to the crawl prefix, without a leading slash.
    pub stac_dir: String,
    pub path_parts: Vec<String>,
}

impl DiscoveredItem {
    /// Only objects at least two directories below the prefix belong to a collection.
    pub fn has_collection(&self) -> bool {
        self.path_parts.len() >= 2
    }

    pub fn collection_parts(&self) -> Option<&[String]> {
        if self.has_collection() {
            Some(&self.path_parts[..self.path_parts.len() - 1])
        } else {
            None
        }
    }

    pub fn collection_path(&self) -> Option<String> {
        self.collection_parts().map(|parts| parts.join("/"))
    }

    pub fn created_or_discovered(&self) -> DateTime<Utc> {
        self.created.unwrap_or(self.discovered_at)
    }

    pub fn updated_or_discovered(&self) -> DateTime<Utc> {
        self.updated.unwrap_or(self.discovered_at)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct DirectoryNode {
    pub name: String,
    pub path: String,
    pub children: BTreeMap<String, DirectoryNode>,
    pub items: Vec<DiscoveredItem>,
}

pub type DirectoryTree = BTreeMap<String, DirectoryNode>;

impl DirectoryNode {
    fn new(name: &str, path: String) -> Self {
        Self {
            name: name.to_string(),
            path,
            ..Default::default()
        }
    }

    /// Depth-first walk yielding each node with the path of its parent node.
    pub fn walk<'a>(&'a self, parent: Option<&'a str>, out: &mut Vec<(&'a DirectoryNode, Option<&'a str>)>) {
        out.push((self, parent));
        for child in self.children.values() {
            child.walk(Some(&self.path), out);
        }
    }
}

pub fn walk_tree(tree: &DirectoryTree) -> Vec<(&DirectoryNode, Option<&str>)> {
    let mut nodes = vec![];
    for node in tree.values() {
        node.walk(None, &mut nodes);
    }
    nodes
}

fn insert(level: &mut DirectoryTree, parts: &[String], depth: usize, item: &DiscoveredItem) {
    let part = &parts[depth];
    let node = level
        .entry(part.clone())
        .or_insert_with(|| DirectoryNode::new(part, parts[..=depth].join("/")));
    if depth + 1 == parts.len() {
        node.items.push(item.clone());
    } else {
        insert(&mut node.children, parts, depth + 1, item);
    }
}

pub fn build_tree(items: &[DiscoveredItem]) -> DirectoryTree {
    let mut tree = DirectoryTree::new();
    for item in items {
        match item.collection_parts() {
            Some(parts) => insert(&mut tree, parts, 0, item),
            None => debug!(
                item = %item.name,
                depth = item.path_parts.len(),
                "No collection for shallow item"
            ),
        }
    }
    tree
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct CrawlResult {
    pub bucket: String,
    pub prefix: String,
    pub crawled_at: DateTime<Utc>,
    pub items: Vec<DiscoveredItem>,
    pub tree: DirectoryTree,
}

impl CrawlResult {
    /// Items with no collection, linked straight from the root catalog.
    pub fn root_items(&self) -> impl Iterator<Item = &DiscoveredItem> {
        self.items.iter().filter(|item| !item.has_collection())
    }
}

pub struct Crawler {
    bucket: String,
    bucket_url: String,
    prefix: String,
    seen: HashSet<String>,
    items: Vec<DiscoveredItem>,
}

impl Crawler {
    pub fn new(bucket: &str, bucket_url: &str, prefix: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            bucket_url: bucket_url.to_string(),
            prefix: prefix.to_string(),
            seen: HashSet::new(),
            items: vec![],
        }
    }

    fn stac_dir(&self, name: &str) -> String {
        let relative = name.strip_prefix(&self.prefix).unwrap_or(name);
        let dir = match relative.rsplit_once('/') {
            Some((dir, _)) => dir,
            None => "",
        };
        dir.trim_matches('/').to_string()
    }

    /// Returns true when the blob was added as a new item.
    pub fn process_blob(&mut self, blob: &BlobInfo, discovered_at: DateTime<Utc>) -> bool {
        if blob.name.ends_with('/') {
            return false;
        }
        let Some(kind) = AssetKind::from_name(&blob.name) else {
            return false;
        };
        let name = match Path::new(&blob.name).file_stem().and_then(|stem| stem.to_str()) {
            Some(stem) => stem.to_string(),
            None => return false,
        };

        let key = format!("{}:{}:{}", kind.as_str(), name, blob.name);
        if !self.seen.insert(key) {
            info!("Skipping duplicate {}: {}", kind.as_str(), name);
            return false;
        }

        let stac_dir = self.stac_dir(&blob.name);
        let path_parts = stac_dir
            .split('/')
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();

        info!("Found {}: {} in '{}'", kind.as_str(), name, stac_dir);
        self.items.push(DiscoveredItem {
            name,
            filename: blob.name.clone(),
            url: blob.public_url(&self.bucket_url),
            kind,
            format: kind.format().to_string(),
            size_bytes: blob.size,
            content_type: blob.content_type.clone(),
            created: blob.created,
            updated: blob.updated,
            discovered_at,
            etag: blob.etag.clone(),
            md5_hash: blob.md5_hash.clone(),
            stac_dir,
            path_parts,
        });
        true
    }

    pub fn finish(self, crawled_at: DateTime<Utc>) -> CrawlResult {
        let tree = build_tree(&self.items);
        CrawlResult {
            bucket: self.bucket,
            prefix: self.prefix,
            crawled_at,
            items: self.items,
            tree,
        }
    }
}

pub async fn crawl(
    lister: &impl BucketLister,
    bucket: &str,
    bucket_url: &str,
    prefix: &str,
) -> Result<CrawlResult> {
    info!("Crawling bucket '{}' with prefix '{}'", bucket, prefix);
    let blobs = lister.list_blobs(prefix).await?;

    let now = Utc::now();
    let mut crawler = Crawler::new(bucket, bucket_url, prefix);
    for blob in blobs.iter() {
        crawler.process_blob(blob, now);
    }

    let result = crawler.finish(now);
    info!(
        "Processed {} objects, found {} unique items",
        blobs.len(),
        result.items.len()
    );
    Ok(result)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) struct MockLister {
        pub blobs: Vec<BlobInfo>,
    }

    impl BucketLister for MockLister {
        async fn list_blobs(&self, prefix: &str) -> Result<Vec<BlobInfo>> {
            Ok(self
                .blobs
                .iter()
                .filter(|blob| blob.name.starts_with(prefix))
                .cloned()
                .collect())
        }
    }

    pub(crate) fn mock_lister() -> MockLister {
        let mut raster = BlobInfo::new("public/layers/raster/landcover/imperviousness.tif");
        raster.size = Some(4096);
        raster.md5_hash = Some("md5==".to_string());
        raster.created = DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
            .ok()
            .map(|dt| dt.with_timezone(&Utc));
        MockLister {
            blobs: vec![
                BlobInfo::new("public/layers/"),
                BlobInfo::new("public/layers/raster/"),
                raster,
                BlobInfo::new("public/layers/raster/landcover/notes.txt"),
                BlobInfo::new("public/layers/vector/roads/segments/roads.geojson"),
                BlobInfo::new("public/layers/vector/parcels.GeoJSON"),
                BlobInfo::new("public/layers/overview.TIFF"),
                BlobInfo::new("public/other/ignored.tif"),
            ],
        }
    }

    pub(crate) const BUCKET_URL: &str = "https://storage.googleapis.com/swhm_data";

    #[test]
    fn test_asset_kind_from_name() {
        assert_eq!(AssetKind::from_name("a/b/c.tif"), Some(AssetKind::Raster));
        assert_eq!(AssetKind::from_name("c.TIFF"), Some(AssetKind::Raster));
        assert_eq!(AssetKind::from_name("c.gtiff"), Some(AssetKind::Raster));
        assert_eq!(AssetKind::from_name("c.geojson"), Some(AssetKind::Vector));
        assert_eq!(AssetKind::from_name("c.json"), None);
        assert_eq!(AssetKind::from_name("tif"), None);
    }

    #[test]
    fn test_process_blob_skips_directories_and_duplicates() {
        let now = Utc::now();
        let mut crawler = Crawler::new("swhm_data", BUCKET_URL, "public/layers/");
        assert!(!crawler.process_blob(&BlobInfo::new("public/layers/raster/"), now));
        assert!(crawler.process_blob(&BlobInfo::new("public/layers/raster/a/b.tif"), now));
        assert!(!crawler.process_blob(&BlobInfo::new("public/layers/raster/a/b.tif"), now));
        assert!(!crawler.process_blob(&BlobInfo::new("public/layers/readme.md"), now));

        let result = crawler.finish(now);
        assert_eq!(result.items.len(), 1);
        let item = &result.items[0];
        assert_eq!(item.name, "b");
        assert_eq!(item.stac_dir, "raster/a");
        assert_eq!(item.path_parts, vec!["raster", "a"]);
        assert_eq!(
            item.url,
            "https://storage.googleapis.com/swhm_data/public/layers/raster/a/b.tif"
        );
    }

    #[test]
    fn test_object_directly_under_prefix_has_empty_stac_dir() {
        let now = Utc::now();
        let mut crawler = Crawler::new("swhm_data", BUCKET_URL, "public/layers/");
        crawler.process_blob(&BlobInfo::new("public/layers/overview.tif"), now);
        let result = crawler.finish(now);
        assert_eq!(result.items[0].stac_dir, "");
        assert!(result.items[0].path_parts.is_empty());
        assert!(result.tree.is_empty());
    }

    #[test]
    fn test_build_tree_attaches_items_to_parent_directory() {
        let now = Utc::now();
        let mut crawler = Crawler::new("swhm_data", BUCKET_URL, "");
        crawler.process_blob(&BlobInfo::new("vector/roads/segments/roads.geojson"), now);
        crawler.process_blob(&BlobInfo::new("vector/roads/segments/bridges.geojson"), now);
        crawler.process_blob(&BlobInfo::new("raster/landcover/imperviousness.tif"), now);
        crawler.process_blob(&BlobInfo::new("raster/flow.tif"), now);
        let result = crawler.finish(now);

        let vector = &result.tree["vector"];
        assert_eq!(vector.path, "vector");
        assert!(vector.items.is_empty());
        let roads = &vector.children["roads"];
        assert_eq!(roads.path, "vector/roads");
        assert_eq!(roads.items.len(), 2);
        assert!(roads.children.is_empty());

        let raster = &result.tree["raster"];
        assert_eq!(raster.items.len(), 1);
        assert_eq!(raster.items[0].name, "imperviousness");

        assert_eq!(result.root_items().count(), 1);
        assert_eq!(walk_tree(&result.tree).len(), 3);
    }

    #[tokio::test]
    async fn test_crawl_with_mock_lister() {
        let lister = mock_lister();
        let result = crawl(&lister, "swhm_data", BUCKET_URL, "public/layers/")
            .await
            .unwrap();

        let names = result
            .items
            .iter()
            .map(|item| item.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["imperviousness", "roads", "parcels", "overview"]);
        assert_eq!(result.items[0].size_bytes, Some(4096));
        assert_eq!(result.tree.len(), 2);
        assert_eq!(result.root_items().count(), 2);
    }
}
