use crate::catalog_plan::{find_json_files, SUMMARY_FILE};
use crate::stac_operations::{read_document, StacDocument, LAYER_METADATA_PATH};
use anyhow::{anyhow, Result};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use url::Url;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct BrokenLink {
    pub document: String,
    pub rel: String,
    pub href: String,
}

#[derive(Serialize, Debug, Clone, Default)]
pub struct VerifyReport {
    pub catalogs: usize,
    pub collections: usize,
    pub items: usize,
    pub invalid: Vec<(String, String)>,
    pub broken_links: Vec<BrokenLink>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.invalid.is_empty() && self.broken_links.is_empty()
    }

    pub fn documents(&self) -> usize {
        self.catalogs + self.collections + self.items
    }
}

/// Local file a link points at, or None when it leaves the catalog.
fn resolve_link(root: &Path, document: &Path, href: &str, root_url: &str) -> Result<Option<PathBuf>> {
    if let Some(relative) = href.strip_prefix(root_url) {
        return Ok(Some(root.join(relative)));
    }
    if Url::parse(href).is_ok() {
        return Ok(None);
    }
    let base = Url::from_file_path(document)
        .map_err(|_| anyhow!("Not an absolute path: {}", document.display()))?;
    let target = base
        .join(href)?
        .to_file_path()
        .map_err(|_| anyhow!("Cannot resolve {} from {}", href, document.display()))?;
    Ok(Some(target))
}

/// Reads back every written document through the `stac` types and checks internal links.
pub fn verify_catalog(dir: &Path, root_url: &str) -> Result<VerifyReport> {
    let root = dir.canonicalize()?;
    let mut report = VerifyReport::default();

    for file in find_json_files(&root)? {
        let relative = file
            .strip_prefix(&root)
            .unwrap_or(&file)
            .to_string_lossy()
            .replace('\\', "/");
        if relative == SUMMARY_FILE || relative == LAYER_METADATA_PATH {
            continue;
        }

        let value: Value = match serde_json::from_str(&fs::read_to_string(&file)?) {
            Ok(value) => value,
            Err(e) => {
                report.invalid.push((relative, e.to_string()));
                continue;
            }
        };

        match read_document(&file, value.clone()) {
            Ok(StacDocument::Catalog(_)) => report.catalogs += 1,
            Ok(StacDocument::Collection(_)) => report.collections += 1,
            Ok(document @ StacDocument::Item(_)) => {
                debug!("Read item {}", document.id());
                report.items += 1
            }
            Err(e) => {
                warn!("{} is not a readable STAC document: {}", relative, e);
                report.invalid.push((relative.clone(), e.to_string()));
            }
        }

        let links = value
            .get("links")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for link in links {
            let (Some(rel), Some(href)) = (
                link.get("rel").and_then(Value::as_str),
                link.get("href").and_then(Value::as_str),
            ) else {
                continue;
            };
            let Some(target) = resolve_link(&root, &file, href, root_url)? else {
                continue;
            };
            if !target.exists() {
                report.broken_links.push(BrokenLink {
                    document: relative.clone(),
                    rel: rel.to_string(),
                    href: href.to_string(),
                });
            }
        }
    }

    Ok(report)
}
