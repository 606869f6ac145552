use crate::config::{CatalogConfig, Layout};
use crate::crawl::{walk_tree, CrawlResult, DirectoryTree, DiscoveredItem};
use crate::error::CatalogError;
use crate::layer_metadata::LayerMetadata;
use crate::stac_operations::{
    title_case, ChildRef, CollectionDraft, ItemPlacement, StacBuilder, CATALOG_FILE,
    COLLECTION_FILE, LAYER_METADATA_PATH,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

pub const SUMMARY_FILE: &str = "crawl_summary.json";

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct PlannedDocument {
    /// Location relative to the catalog root.
    pub path: String,
    pub document: Value,
}

impl PlannedDocument {
    pub fn new(path: impl Into<String>, document: &impl Serialize) -> Result<Self> {
        Ok(Self {
            path: path.into(),
            document: serde_json::to_value(document)?,
        })
    }

    pub fn kind(&self) -> Option<&str> {
        self.document.get("type")?.as_str()
    }
}

/// Every STAC document for one crawl, in write order: catalog, collections, items.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CatalogPlan {
    pub generated_at: DateTime<Utc>,
    pub documents: Vec<PlannedDocument>,
}

fn collection_path(dir: &str) -> String {
    format!("{dir}/{COLLECTION_FILE}")
}

/// Item document location in the hierarchical layout: next to the object's directory.
pub fn hierarchical_item_path(item: &DiscoveredItem) -> String {
    if item.stac_dir.is_empty() {
        format!("{}.json", item.name)
    } else {
        format!("{}/{}.json", item.stac_dir, item.name)
    }
}

/// Item document location in the flat layout: one directory per asset.
pub fn flat_item_path(collection_id: &str, item: &DiscoveredItem) -> String {
    format!("{}/{}/{}.json", collection_id, item.name, item.name)
}

impl CatalogPlan {
    pub fn new(generated_at: DateTime<Utc>, documents: Vec<PlannedDocument>) -> Self {
        Self {
            generated_at,
            documents,
        }
    }

    pub fn from_crawl(
        config: &CatalogConfig,
        crawl: &CrawlResult,
        metadata: &LayerMetadata,
        metadata_asset: bool,
    ) -> Result<Self> {
        let builder =
            StacBuilder::new(config, metadata, crawl.crawled_at).with_metadata_asset(metadata_asset);
        let documents = match config.catalog.layout {
            Layout::Hierarchical => hierarchical(&builder, crawl)?,
            Layout::Flat => flat(&builder, config, crawl)?,
        };
        Ok(Self::new(crawl.crawled_at, documents))
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let plan: Self = serde_json::from_str(&content)?;
        Ok(plan)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn paths_of(&self, kind: &str) -> Vec<String> {
        self.documents
            .iter()
            .filter(|doc| doc.kind() == Some(kind))
            .map(|doc| doc.path.clone())
            .collect()
    }

    /// Writes every document under `out_dir`, creating directories as needed.
    pub fn execute(&self, out_dir: &Path) -> Result<usize> {
        for doc in self.documents.iter() {
            save_json(&doc.document, &out_dir.join(&doc.path))?;
        }
        Ok(self.documents.len())
    }
}

/// Objects whose hierarchical document path was already taken by an earlier object,
/// e.g. `flow.tif` and `flow.geojson` in the same directory.
fn path_collisions(crawl: &CrawlResult) -> HashSet<&str> {
    let mut taken = HashSet::new();
    let mut skipped = HashSet::new();
    for item in crawl.items.iter() {
        let path = hierarchical_item_path(item);
        if !taken.insert(path) {
            warn!(
                "Skipping {}: another asset named '{}' already uses {}",
                item.filename,
                item.name,
                hierarchical_item_path(item)
            );
            skipped.insert(item.filename.as_str());
        }
    }
    skipped
}

fn hierarchical(builder: &StacBuilder, crawl: &CrawlResult) -> Result<Vec<PlannedDocument>> {
    let skipped = path_collisions(crawl);
    let kept = |item: &&DiscoveredItem| !skipped.contains(item.filename.as_str());

    let children = crawl
        .tree
        .values()
        .map(|node| ChildRef {
            title: title_case(&node.name),
            path: collection_path(&node.path),
        })
        .collect::<Vec<_>>();
    let root_items = crawl
        .root_items()
        .filter(kept)
        .map(|item| ChildRef {
            title: title_case(&item.name),
            path: hierarchical_item_path(item),
        })
        .collect::<Vec<_>>();

    let mut documents = vec![PlannedDocument::new(
        CATALOG_FILE,
        &builder.catalog(&children, &root_items),
    )?];

    for (node, parent) in walk_tree(&crawl.tree) {
        let draft = CollectionDraft {
            id: node.name.clone(),
            title: title_case(&node.name),
            description: format!("Collection for {}", node.name),
            keywords: vec![node.name.clone()],
            path: collection_path(&node.path),
            parent_path: parent
                .map(collection_path)
                .unwrap_or_else(|| CATALOG_FILE.to_string()),
            children: node
                .children
                .values()
                .map(|child| ChildRef {
                    title: title_case(&child.name),
                    path: collection_path(&child.path),
                })
                .collect(),
            items: node
                .items
                .iter()
                .filter(kept)
                .map(|item| (item, hierarchical_item_path(item)))
                .collect(),
        };
        documents.push(PlannedDocument::new(
            draft.path.clone(),
            &builder.collection(&draft),
        )?);
    }

    for item in crawl.items.iter().filter(kept) {
        let path = hierarchical_item_path(item);
        let collection = item.collection_parts().map(|parts| {
            let id = parts[parts.len() - 1].clone();
            (id, collection_path(&parts.join("/")))
        });
        let parent_path = collection
            .as_ref()
            .map(|(_, path)| path.clone())
            .unwrap_or_else(|| CATALOG_FILE.to_string());
        let placement = ItemPlacement {
            path: &path,
            parent_path: &parent_path,
            collection: collection
                .as_ref()
                .map(|(id, path)| (id.as_str(), path.as_str())),
        };
        let document = builder.item(item, &placement)?;
        documents.push(PlannedDocument::new(path, &document)?);
    }

    Ok(documents)
}

fn flat(
    builder: &StacBuilder,
    config: &CatalogConfig,
    crawl: &CrawlResult,
) -> Result<Vec<PlannedDocument>> {
    let defaults = &config.collection;
    let collection = collection_path(&defaults.id);

    let mut seen = HashSet::new();
    let mut members = vec![];
    for item in crawl.items.iter() {
        if !seen.insert(item.name.as_str()) {
            warn!(
                "Skipping {}: an asset named '{}' is already in the collection",
                item.filename, item.name
            );
            continue;
        }
        members.push((item, flat_item_path(&defaults.id, item)));
    }

    let catalog = builder.catalog(
        &[ChildRef {
            title: defaults.title.clone(),
            path: collection.clone(),
        }],
        &[],
    );
    let draft = CollectionDraft {
        id: defaults.id.clone(),
        title: defaults.title.clone(),
        description: defaults.description.clone(),
        keywords: defaults.keywords.clone(),
        path: collection.clone(),
        parent_path: CATALOG_FILE.to_string(),
        children: vec![],
        items: members.clone(),
    };

    let mut documents = vec![
        PlannedDocument::new(CATALOG_FILE, &catalog)?,
        PlannedDocument::new(collection.clone(), &builder.collection(&draft))?,
    ];
    for (item, path) in members {
        let placement = ItemPlacement {
            path: &path,
            parent_path: &collection,
            collection: Some((defaults.id.as_str(), collection.as_str())),
        };
        let document = builder.item(item, &placement)?;
        documents.push(PlannedDocument::new(path, &document)?);
    }
    Ok(documents)
}

pub fn save_json(document: &impl Serialize, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut content = serde_json::to_string_pretty(document)?;
    content.push('\n');
    fs::write(path, content)?;
    info!("Saved: {}", path.display());
    Ok(())
}

/// Copies the layer metadata file into the catalog. Returns false when there is nothing to copy.
pub fn copy_layer_metadata(source: &Path, out_dir: &Path) -> Result<bool> {
    if !source.exists() {
        warn!("Layer metadata file not found at {}", source.display());
        return Ok(false);
    }
    let dest = out_dir.join(LAYER_METADATA_PATH);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let same_file = match (source.canonicalize(), dest.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    };
    if !same_file {
        fs::copy(source, &dest)?;
    }
    info!("Metadata file available at: {}", dest.display());
    Ok(true)
}

#[derive(Serialize, Debug)]
pub struct SummaryCounts {
    pub bucket_name: String,
    pub prefix: String,
    pub crawl_time: String,
    pub items_found: usize,
    pub collections_generated: usize,
    pub stac_items_generated: usize,
}

#[derive(Serialize, Debug)]
pub struct StacStructure {
    pub catalog: String,
    pub collections: Vec<String>,
    pub items: Vec<String>,
}

#[derive(Serialize, Debug)]
pub struct CrawlSummary<'a> {
    pub crawl_summary: SummaryCounts,
    pub discovered_items: &'a [DiscoveredItem],
    pub directory_structure: &'a DirectoryTree,
    pub stac_structure: StacStructure,
}

impl<'a> CrawlSummary<'a> {
    pub fn new(crawl: &'a CrawlResult, plan: &CatalogPlan) -> Self {
        let collections = plan.paths_of("Collection");
        let items = plan.paths_of("Feature");
        Self {
            crawl_summary: SummaryCounts {
                bucket_name: crawl.bucket.clone(),
                prefix: crawl.prefix.clone(),
                crawl_time: crate::stac_operations::timestamp(&crawl.crawled_at),
                items_found: crawl.items.len(),
                collections_generated: collections.len(),
                stac_items_generated: items.len(),
            },
            discovered_items: &crawl.items,
            directory_structure: &crawl.tree,
            stac_structure: StacStructure {
                catalog: CATALOG_FILE.to_string(),
                collections,
                items,
            },
        }
    }
}

/// All `*.json` files below `dir`, sorted.
pub fn find_json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(CatalogError::MissingDirectory(dir.to_path_buf()).into());
    }
    let mut files = vec![];
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        let is_json = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if entry.file_type().is_file() && is_json {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Removes the given files, then any empty directories below `dir`. `dir` itself is kept.
pub fn clear_catalog_directory(dir: &Path, files: &[PathBuf]) -> Result<usize> {
    let mut removed = 0;
    for file in files {
        match fs::remove_file(file) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Error removing {}: {}", file.display(), e),
        }
    }
    remove_empty_dirs(dir)?;
    Ok(removed)
}

/// Deepest directories come first, so a parent left empty by its children goes too.
fn remove_empty_dirs(dir: &Path) -> Result<usize> {
    let mut removed = 0;
    for entry in WalkDir::new(dir).contents_first(true).min_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_dir() || fs::read_dir(entry.path())?.next().is_some() {
            continue;
        }
        fs::remove_dir(entry.path())?;
        info!("Removed empty directory: {}", entry.path().display());
        removed += 1;
    }
    Ok(removed)
}

/// Text rendering of the generated directory structure.
pub fn render_tree(tree: &DirectoryTree) -> String {
    fn render(tree: &DirectoryTree, indent: &str, out: &mut String) {
        for (name, node) in tree.iter() {
            out.push_str(&format!("{indent}├── {name}/\n"));
            out.push_str(&format!("{indent}│   ├── {COLLECTION_FILE}\n"));
            for item in node.items.iter() {
                out.push_str(&format!("{indent}│   ├── {}.json\n", item.name));
            }
            render(&node.children, &format!("{indent}│   "), out);
        }
    }

    let mut out = format!("catalog/\n├── {CATALOG_FILE}\n├── {SUMMARY_FILE}\n");
    render(tree, "", &mut out);
    out
}
