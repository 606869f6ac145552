use std::{collections::HashMap, path::Path};

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde_json::{json, Map, Value};
use stac::{Asset, Bbox, Catalog, Collection, Item, Link, Properties, Provider};

use crate::config::{CatalogConfig, CatalogType};
use crate::crawl::{AssetKind, DiscoveredItem};
use crate::error::CatalogError;
use crate::layer_metadata::{LayerMeta, LayerMetadata};

pub const CATALOG_FILE: &str = "catalog.json";
pub const COLLECTION_FILE: &str = "collection.json";
pub const LAYER_METADATA_PATH: &str = "layer_metadata/layer_metadata.json";

const JSON: &str = "application/json";
const COG: &str = "image/tiff; application=geotiff; profile=cloud-optimized";

pub fn timestamp(datetime: &DateTime<Utc>) -> String {
    datetime.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// `land_cover-2016v2` -> `Land Cover-2016V2`: underscores become spaces and
/// every run of letters starts upper case and continues lower case.
pub fn title_case(name: &str) -> String {
    let mut titled = String::with_capacity(name.len());
    let mut in_word = false;
    for c in name.chars() {
        let c = if c == '_' { ' ' } else { c };
        if c.is_alphabetic() {
            if in_word {
                titled.extend(c.to_lowercase());
            } else {
                titled.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            titled.push(c);
            in_word = false;
        }
    }
    titled
}

/// Relative href from the document at `from` to the document at `to`, both relative to the catalog root.
pub fn relative_href(from: &str, to: &str) -> String {
    let from_dir = match from.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect::<Vec<_>>(),
        None => vec![],
    };
    let to_parts = to.split('/').collect::<Vec<_>>();
    let to_dir = &to_parts[..to_parts.len() - 1];

    let common = from_dir
        .iter()
        .zip(to_dir.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let rest = to_parts[common..].join("/");
    let ups = from_dir.len() - common;

    if ups == 0 {
        format!("./{rest}")
    } else {
        format!("{}{rest}", "../".repeat(ups))
    }
}

pub fn union_bbox<I: IntoIterator<Item = [f64; 4]>>(boxes: I) -> Option<[f64; 4]> {
    boxes.into_iter().reduce(|acc, bbox| {
        [
            acc[0].min(bbox[0]),
            acc[1].min(bbox[1]),
            acc[2].max(bbox[2]),
            acc[3].max(bbox[3]),
        ]
    })
}

fn footprint(bbox: &[f64; 4]) -> Value {
    let [west, south, east, north] = *bbox;
    json!({
        "type": "Polygon",
        "coordinates": [[
            [west, south],
            [west, north],
            [east, north],
            [east, south],
            [west, south]
        ]]
    })
}

fn provider(name: &str, roles: &[&str], url: String) -> Provider {
    let mut provider = Provider::new(name);
    provider.roles = Some(roles.iter().map(|role| role.to_string()).collect());
    provider.url = Some(url);
    provider
}

/// Resolves link targets for the configured catalog type.
#[derive(Clone, Debug)]
pub struct Hrefs {
    root_url: String,
    catalog_type: CatalogType,
}

impl Hrefs {
    pub fn new(root_url: &str, catalog_type: CatalogType) -> Self {
        let root_url = if root_url.ends_with('/') {
            root_url.to_string()
        } else {
            format!("{root_url}/")
        };
        Self {
            root_url,
            catalog_type,
        }
    }

    pub fn absolute(&self, path: &str) -> String {
        format!("{}{}", self.root_url, path)
    }

    pub fn link(&self, from: &str, to: &str) -> String {
        match self.catalog_type {
            CatalogType::AbsolutePublished => self.absolute(to),
            CatalogType::RelativePublished | CatalogType::SelfContained => relative_href(from, to),
        }
    }

    pub fn self_href(&self, path: &str) -> Option<String> {
        match self.catalog_type {
            CatalogType::AbsolutePublished => Some(self.absolute(path)),
            CatalogType::RelativePublished if path == CATALOG_FILE => Some(self.absolute(path)),
            CatalogType::RelativePublished | CatalogType::SelfContained => None,
        }
    }
}

/// A linked document in the tree: where it lives and how it's titled.
#[derive(Clone, Debug)]
pub struct ChildRef {
    pub title: String,
    pub path: String,
}

pub struct CollectionDraft<'a> {
    pub id: String,
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub path: String,
    pub parent_path: String,
    pub children: Vec<ChildRef>,
    pub items: Vec<(&'a DiscoveredItem, String)>,
}

pub struct ItemPlacement<'a> {
    pub path: &'a str,
    pub parent_path: &'a str,
    /// Collection id and document path, when the item belongs to one.
    pub collection: Option<(&'a str, &'a str)>,
}

pub struct StacBuilder<'a> {
    config: &'a CatalogConfig,
    metadata: &'a LayerMetadata,
    hrefs: Hrefs,
    generated_at: DateTime<Utc>,
    metadata_asset: bool,
}

impl<'a> StacBuilder<'a> {
    pub fn new(
        config: &'a CatalogConfig,
        metadata: &'a LayerMetadata,
        generated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            config,
            metadata,
            hrefs: Hrefs::new(&config.root_url(), config.catalog.catalog_type),
            generated_at,
            metadata_asset: false,
        }
    }

    /// Advertise the copied layer metadata file as an asset of the root catalog.
    pub fn with_metadata_asset(mut self, enabled: bool) -> Self {
        self.metadata_asset = enabled;
        self
    }

    fn layer_meta(&self, item: &DiscoveredItem) -> Option<&'a LayerMeta> {
        self.metadata.find(&item.name)
    }

    pub fn item_bbox(&self, item: &DiscoveredItem) -> [f64; 4] {
        self.layer_meta(item)
            .and_then(|meta| meta.bbox)
            .unwrap_or(self.config.collection.default_bbox)
    }

    fn providers(&self, meta: Option<&LayerMeta>) -> Vec<Provider> {
        let host = &self.config.provider.name;
        match meta.and_then(|meta| meta.source_name.as_ref().map(|name| (meta, name))) {
            Some((meta, source_name)) => vec![
                provider(
                    source_name,
                    &["producer"],
                    meta.source_url
                        .clone()
                        .unwrap_or_else(|| self.config.provider_url()),
                ),
                provider(host, &["processor", "host"], self.config.provider_url()),
            ],
            None => vec![provider(
                host,
                &["producer", "processor", "host"],
                self.config.provider_url(),
            )],
        }
    }

    fn item_properties(&self, item: &DiscoveredItem, meta: Option<&LayerMeta>) -> Properties {
        let title = meta
            .and_then(LayerMeta::layer_name)
            .map(str::to_string)
            .unwrap_or_else(|| title_case(&item.name));
        let description = match meta {
            Some(meta) => meta.description.clone().unwrap_or_else(|| {
                format!("{} dataset: {}", title_case(item.kind.as_str()), item.name)
            }),
            None => item.name.clone(),
        };
        let mut properties = Properties {
            datetime: Some(item.created_or_discovered().trunc_subsecs(0)),
            title: Some(title),
            description: Some(description),
            created: Some(timestamp(&item.created_or_discovered())),
            updated: Some(timestamp(&item.updated_or_discovered())),
            ..Default::default()
        };

        properties
            .additional_fields
            .insert("providers".into(), json!(self.providers(meta)));
        let Some(meta) = meta else {
            return properties;
        };

        let fields = &mut properties.additional_fields;

        fields.insert(
            "platform".into(),
            json!(meta
                .source_name
                .clone()
                .unwrap_or_else(|| self.config.provider.name.clone())),
        );
        let optional = [
            ("gsd", meta.scale.map(|scale| json!(scale))),
            ("swmh:units", meta.units.as_ref().map(|v| json!(v))),
            ("swmh:discrete", meta.discrete.map(|v| json!(v))),
            ("swmh:viz_type", meta.viz_type.as_ref().map(|v| json!(v))),
            (
                "swmh:default_reduction",
                meta.default_reduction.as_ref().map(|v| json!(v)),
            ),
            ("swmh:safe_name", meta.safe_name.as_ref().map(|v| json!(v))),
            ("swmh:docs_link", meta.docs_link.as_ref().map(|v| json!(v))),
            ("swmh:source_url", meta.source_url.as_ref().map(|v| json!(v))),
            ("swmh:vis_params", meta.vis_params().map(|v| json!(v))),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                fields.insert(key.into(), value);
            }
        }

        if meta.is_categorical() {
            fields.insert("swmh:labels".into(), json!(meta.labels));
            fields.insert("swmh:values".into(), json!(meta.values));
        }

        properties
    }

    fn raster_band(&self, item: &DiscoveredItem, meta: &LayerMeta) -> Value {
        let mut band = Map::new();
        band.insert(
            "name".into(),
            json!(meta.safe_name.clone().unwrap_or_else(|| item.name.clone())),
        );
        band.insert(
            "description".into(),
            json!(meta
                .description
                .clone()
                .unwrap_or_else(|| "Raster band".to_string())),
        );
        band.insert("data_type".into(), json!("float32"));
        if let Some(units) = &meta.units {
            band.insert("unit".into(), json!(units));
        }
        if let Some((minimum, maximum)) = meta.value_range() {
            band.insert(
                "statistics".into(),
                json!({"minimum": minimum, "maximum": maximum}),
            );
        }
        if meta.is_categorical() {
            let classes = meta
                .labels
                .iter()
                .enumerate()
                .map(|(i, label)| json!({"value": meta.class_value(i), "description": label}))
                .collect::<Vec<_>>();
            band.insert("classification:classes".into(), json!(classes));
        }
        Value::Object(band)
    }

    /// Extension fields shared by the `data` and `cog` assets of an enriched raster.
    fn raster_enrichment(&self, item: &DiscoveredItem, meta: &LayerMeta) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("raster:bands".into(), json!([self.raster_band(item, meta)]));
        if let Some(source_name) = &meta.source_name {
            fields.insert("swmh:source_name".into(), json!(source_name));
        }
        if let Some(source_url) = &meta.source_url {
            fields.insert("swmh:source_url".into(), json!(source_url));
        }
        if let Some(scale) = meta.scale.filter(|scale| *scale != 0.0) {
            fields.insert("gsd".into(), json!(scale));
        }
        if let Some(discrete) = meta.discrete {
            fields.insert("swmh:discrete".into(), json!(discrete));
        }
        if let Some(viz_type) = &meta.viz_type {
            fields.insert("swmh:viz_type".into(), json!(viz_type));
        }
        fields
    }

    fn item_assets(
        &self,
        item: &DiscoveredItem,
        meta: Option<&LayerMeta>,
        properties: &Properties,
    ) -> HashMap<String, Asset> {
        let mut data = Asset::new(&item.url).role("data");
        data.r#type = Some(item.kind.media_type().to_string());
        match item.kind {
            AssetKind::Vector => {
                data.title = Some("GeoJSON data".to_string());
                data.description = Some("Vector data in GeoJSON format".to_string());
            }
            AssetKind::Raster => {
                data.title = properties.title.clone();
                data.description = properties.description.clone();
            }
        }
        if let Some(size) = item.size_bytes {
            data.additional_fields.insert("file:size".into(), json!(size));
        }
        if let Some(checksum) = &item.md5_hash {
            data.additional_fields
                .insert("file:checksum".into(), json!(checksum));
        }

        let mut assets = HashMap::new();
        if item.kind == AssetKind::Vector {
            assets.insert("data".to_string(), data);
            return assets;
        }

        let mut cog = Asset::new(&item.url).role("data").role("overview");
        cog.r#type = Some(COG.to_string());
        cog.title = Some("Cloud Optimized GeoTIFF".to_string());
        cog.description = Some("Cloud Optimized GeoTIFF for web access".to_string());
        if let Some(meta) = meta {
            let enrichment = self.raster_enrichment(item, meta);
            data.additional_fields.extend(enrichment.clone());
            cog.additional_fields.extend(enrichment);
        }
        assets.insert("data".to_string(), data);
        assets.insert("cog".to_string(), cog);
        assets
    }

    pub fn item(&self, item: &DiscoveredItem, placement: &ItemPlacement) -> Result<Item> {
        let meta = self.layer_meta(item);
        let properties = self.item_properties(item, meta);
        let bbox = self.item_bbox(item);

        let mut links = vec![];
        if let Some(href) = self.hrefs.self_href(placement.path) {
            links.push(Link::self_(href));
        }
        links.push(Link::parent(
            self.hrefs.link(placement.path, placement.parent_path),
        ));
        links.push(Link::root(self.hrefs.link(placement.path, CATALOG_FILE)));
        if let Some((_, collection_path)) = placement.collection {
            links.push(Link::collection(
                self.hrefs.link(placement.path, collection_path),
            ));
        }

        let mut document = Item::new(&item.name);
        document.geometry = serde_json::from_value(footprint(&bbox))?;
        document.bbox = Some(Bbox::new(bbox[0], bbox[1], bbox[2], bbox[3]));
        document.assets = self.item_assets(item, meta, &properties);
        document.properties = properties;
        document.links = links;
        document.collection = placement.collection.map(|(id, _)| id.to_string());
        Ok(document)
    }

    pub fn collection(&self, draft: &CollectionDraft) -> Collection {
        let [west, south, east, north] =
            union_bbox(draft.items.iter().map(|(item, _)| self.item_bbox(item)))
                .unwrap_or(self.config.collection.default_bbox);

        let created = draft.items.iter().filter_map(|(item, _)| item.created);
        let interval = [
            created.clone().min().map(|start| start.trunc_subsecs(0)),
            created.max().map(|end| end.trunc_subsecs(0)),
        ];

        let mut links = vec![];
        if let Some(href) = self.hrefs.self_href(&draft.path) {
            links.push(Link::self_(href));
        }
        links.push(Link::parent(
            self.hrefs.link(&draft.path, &draft.parent_path),
        ));
        links.push(Link::root(self.hrefs.link(&draft.path, CATALOG_FILE)));
        for child in draft.children.iter() {
            links.push(
                Link::child(self.hrefs.link(&draft.path, &child.path)).title(child.title.clone()),
            );
        }

        let mut item_assets = Map::new();
        for (item, item_path) in draft.items.iter() {
            links.push(
                Link::item(self.hrefs.link(&draft.path, item_path)).title(title_case(&item.name)),
            );
            match item.kind {
                AssetKind::Vector => {
                    item_assets.insert(
                        "data".into(),
                        json!({"type": item.kind.media_type(), "title": "GeoJSON data", "roles": ["data"]}),
                    );
                }
                AssetKind::Raster => {
                    item_assets.insert(
                        "data".into(),
                        json!({"type": item.kind.media_type(), "title": "GeoTIFF data", "roles": ["data"]}),
                    );
                    item_assets.insert(
                        "cog".into(),
                        json!({"type": COG, "title": "Cloud Optimized GeoTIFF", "roles": ["data", "overview"]}),
                    );
                }
            }
        }

        let mut collection = Collection::new(&draft.id, &draft.description);
        collection.title = Some(draft.title.clone());
        collection.keywords = Some(draft.keywords.clone());
        collection.license = self.config.collection.license.clone();
        collection.providers = Some(self.providers(None));
        collection.extent.spatial.bbox = vec![Bbox::new(west, south, east, north)];
        collection.extent.temporal.interval = vec![interval];
        collection.links = links;
        collection
            .additional_fields
            .insert("item_assets".into(), Value::Object(item_assets));
        collection
    }

    pub fn catalog(&self, children: &[ChildRef], items: &[ChildRef]) -> Catalog {
        let info = &self.config.catalog;

        let mut links = vec![];
        if let Some(href) = self.hrefs.self_href(CATALOG_FILE) {
            links.push(Link::self_(href).title(info.title.clone()));
        }
        links.push(Link::root(self.hrefs.link(CATALOG_FILE, CATALOG_FILE)));
        for child in children {
            links.push(
                Link::child(self.hrefs.link(CATALOG_FILE, &child.path)).title(child.title.clone()),
            );
        }
        for item in items {
            links.push(
                Link::item(self.hrefs.link(CATALOG_FILE, &item.path)).title(item.title.clone()),
            );
        }

        let mut catalog = Catalog::new(&info.id, &info.description);
        catalog.title = Some(info.title.clone());
        catalog.links = links;

        let fields = &mut catalog.additional_fields;
        fields.insert("catalog_type".into(), json!(info.catalog_type.as_str()));
        fields.insert("created".into(), json!(timestamp(&self.generated_at)));
        fields.insert("updated".into(), json!(timestamp(&self.generated_at)));
        fields.insert("keywords".into(), json!(info.keywords));
        fields.insert("providers".into(), json!(self.providers(None)));
        fields.insert("conformsTo".into(), json!(info.conforms_to));
        if self.metadata_asset {
            let mut asset = Asset::new(self.hrefs.link(CATALOG_FILE, LAYER_METADATA_PATH)).role("metadata");
            asset.r#type = Some(JSON.to_string());
            asset.title = Some("Layer Metadata".to_string());
            asset.description = Some(
                "Complete metadata for all data layers including visualization parameters, units, and source information"
                    .to_string(),
            );
            fields.insert("assets".into(), json!({ "layer_metadata": asset }));
        }
        catalog
    }
}

/// A STAC document read back from disk.
#[derive(Debug)]
pub enum StacDocument {
    Catalog(Box<Catalog>),
    Collection(Box<Collection>),
    Item(Box<Item>),
}

impl StacDocument {
    pub fn id(&self) -> &str {
        match self {
            Self::Catalog(catalog) => &catalog.id,
            Self::Collection(collection) => &collection.id,
            Self::Item(item) => &item.id,
        }
    }
}

pub fn read_document(path: &Path, value: Value) -> Result<StacDocument> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let document = match kind.as_str() {
        "Catalog" => StacDocument::Catalog(Box::new(serde_json::from_value(value)?)),
        "Collection" => StacDocument::Collection(Box::new(serde_json::from_value(value)?)),
        "Feature" => StacDocument::Item(Box::new(serde_json::from_value(value)?)),
        _ => {
            return Err(CatalogError::UnknownDocument {
                kind,
                path: path.to_path_buf(),
            }
            .into())
        }
    };
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{catalog_toml, CatalogConfig};
    use crate::crawl::Crawler;
    use crate::layer_metadata::tests::sample;
    use crate::storage::BlobInfo;

    fn config() -> CatalogConfig {
        CatalogConfig::from_template(&catalog_toml()).unwrap()
    }

    fn discovered(name: &str) -> DiscoveredItem {
        let now = Utc::now();
        let mut crawler = Crawler::new(
            "swhm_data",
            "https://storage.googleapis.com/swhm_data",
            "public/layers/",
        );
        let mut blob = BlobInfo::new(name);
        blob.size = Some(10);
        blob.md5_hash = Some("abc==".to_string());
        crawler.process_blob(&blob, now);
        crawler.finish(now).items.remove(0)
    }

    fn rels(links: &[Link]) -> Vec<&str> {
        links.iter().map(|link| link.rel.as_str()).collect()
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("land_cover_2016"), "Land Cover 2016");
        assert_eq!(title_case("ROADS"), "Roads");
        assert_eq!(title_case("a__b"), "A  B");
        assert_eq!(title_case("land-cover"), "Land-Cover");
        assert_eq!(title_case("flow_2016v2"), "Flow 2016V2");
        assert_eq!(title_case("o'neil"), "O'Neil");
    }

    #[test]
    fn test_relative_href() {
        assert_eq!(relative_href("catalog.json", "raster/collection.json"), "./raster/collection.json");
        assert_eq!(relative_href("raster/collection.json", "catalog.json"), "../catalog.json");
        assert_eq!(relative_href("raster/a/a.json", "catalog.json"), "../../catalog.json");
        assert_eq!(relative_href("raster/collection.json", "raster/a/a.json"), "./a/a.json");
        assert_eq!(
            relative_href("vector/roads/collection.json", "vector/collection.json"),
            "../collection.json"
        );
        assert_eq!(relative_href("catalog.json", "catalog.json"), "./catalog.json");
    }

    #[test]
    fn test_self_href_per_catalog_type() {
        let root = "https://storage.googleapis.com/swhm_data/public/layers";
        let absolute = Hrefs::new(root, CatalogType::AbsolutePublished);
        assert_eq!(
            absolute.self_href("raster/collection.json").as_deref(),
            Some("https://storage.googleapis.com/swhm_data/public/layers/raster/collection.json")
        );

        let relative = Hrefs::new(root, CatalogType::RelativePublished);
        assert!(relative.self_href("raster/collection.json").is_none());
        assert!(relative.self_href(CATALOG_FILE).is_some());
        assert_eq!(relative.link("raster/collection.json", CATALOG_FILE), "../catalog.json");

        let contained = Hrefs::new(root, CatalogType::SelfContained);
        assert!(contained.self_href(CATALOG_FILE).is_none());
    }

    #[test]
    fn test_union_bbox() {
        assert_eq!(union_bbox(Vec::<[f64; 4]>::new()), None);
        assert_eq!(
            union_bbox([[0.0, 0.0, 1.0, 1.0], [-1.0, 0.5, 0.5, 2.0]]),
            Some([-1.0, 0.0, 1.0, 2.0])
        );
    }

    #[test]
    fn test_vector_item_links_and_assets() {
        let config = config();
        let metadata = LayerMetadata::default();
        let builder = StacBuilder::new(&config, &metadata, Utc::now());
        let item = discovered("public/layers/vector/roads/segments/roads.geojson");

        let document = builder
            .item(
                &item,
                &ItemPlacement {
                    path: "vector/roads/segments/roads.json",
                    parent_path: "vector/roads/collection.json",
                    collection: Some(("roads", "vector/roads/collection.json")),
                },
            )
            .unwrap();

        let root = "https://storage.googleapis.com/swhm_data/public/layers/";
        assert_eq!(document.id, "roads");
        assert_eq!(document.collection.as_deref(), Some("roads"));
        assert_eq!(document.properties.title.as_deref(), Some("Roads"));
        assert_eq!(rels(&document.links), vec!["self", "parent", "root", "collection"]);
        assert_eq!(document.links[0].href, format!("{root}vector/roads/segments/roads.json"));
        assert_eq!(document.links[1].href, format!("{root}vector/roads/collection.json"));
        assert_eq!(document.links[2].href, format!("{root}catalog.json"));
        assert_eq!(document.links[2].r#type.as_deref(), Some(JSON));

        let data = &document.assets["data"];
        assert_eq!(data.r#type.as_deref(), Some("application/geo+json"));
        assert_eq!(data.additional_fields["file:size"], 10);
        assert_eq!(data.additional_fields["file:checksum"], "abc==");
        assert!(!document.assets.contains_key("cog"));

        let value = serde_json::to_value(&document).unwrap();
        assert_eq!(value["type"], "Feature");
        assert_eq!(value["stac_version"], "1.0.0");
        assert_eq!(value["geometry"]["type"], "Polygon");
        assert_eq!(value["geometry"]["coordinates"][0].as_array().unwrap().len(), 5);
        assert_eq!(value["bbox"], json!(crate::config::DEFAULT_BBOX));
    }

    #[test]
    fn test_raster_item_with_layer_metadata() {
        let config = config();
        let metadata = sample();
        let builder = StacBuilder::new(&config, &metadata, Utc::now());
        let item = discovered("public/layers/raster/landcover/imperviousness.tif");

        let document = builder
            .item(
                &item,
                &ItemPlacement {
                    path: "raster/landcover/imperviousness.json",
                    parent_path: "raster/collection.json",
                    collection: Some(("raster", "raster/collection.json")),
                },
            )
            .unwrap();

        let properties = &document.properties;
        assert_eq!(properties.title.as_deref(), Some("Imperviousness"));
        assert_eq!(properties.description.as_deref(), Some("Percent impervious surface"));
        let fields = &properties.additional_fields;
        assert_eq!(fields["platform"], "NOAA C-CAP");
        assert_eq!(fields["swmh:units"], "%");
        assert_eq!(fields["providers"].as_array().unwrap().len(), 2);
        assert_eq!(fields["providers"][0]["roles"], json!(["producer"]));

        let data = &document.assets["data"].additional_fields;
        assert_eq!(data["raster:bands"][0]["unit"], "%");
        assert_eq!(data["raster:bands"][0]["statistics"]["maximum"], 100);
        let cog = &document.assets["cog"];
        assert_eq!(cog.r#type.as_deref(), Some(COG));
        assert_eq!(cog.roles, vec!["data", "overview"]);
        assert_eq!(cog.additional_fields["raster:bands"], data["raster:bands"]);
        assert_eq!(cog.additional_fields["gsd"], 1.0);
    }

    #[test]
    fn test_categorical_raster_classes() {
        let config = config();
        let metadata = sample();
        let builder = StacBuilder::new(&config, &metadata, Utc::now());
        let item = discovered("public/layers/raster/landcover/land_cover.tif");
        let document = builder
            .item(
                &item,
                &ItemPlacement {
                    path: "raster/landcover/land_cover.json",
                    parent_path: "raster/collection.json",
                    collection: None,
                },
            )
            .unwrap();
        let classes = document.assets["data"].additional_fields["raster:bands"][0]
            ["classification:classes"]
            .as_array()
            .unwrap();
        assert_eq!(classes.len(), 3);
        assert_eq!(classes[0], json!({"value": 0, "description": "Water"}));
        assert_eq!(classes[1], json!({"value": 5, "description": "Forest"}));
        assert!(document.collection.is_none());
        assert!(serde_json::to_value(&document).unwrap().get("collection").is_none());
    }

    #[test]
    fn test_collection_document() {
        let config = config();
        let metadata = LayerMetadata::default();
        let builder = StacBuilder::new(&config, &metadata, Utc::now());
        let item = discovered("public/layers/raster/landcover/imperviousness.tif");

        let document = builder.collection(&CollectionDraft {
            id: "raster".to_string(),
            title: "Raster".to_string(),
            description: "Collection for raster".to_string(),
            keywords: vec!["raster".to_string()],
            path: "raster/collection.json".to_string(),
            parent_path: CATALOG_FILE.to_string(),
            children: vec![ChildRef {
                title: "Hydrology".to_string(),
                path: "raster/hydrology/collection.json".to_string(),
            }],
            items: vec![(&item, "raster/landcover/imperviousness.json".to_string())],
        });

        assert_eq!(document.license, "MPL-2.0");
        assert_eq!(document.extent.temporal.interval, vec![[None, None]]);
        let [west, south, east, north] = crate::config::DEFAULT_BBOX;
        assert_eq!(
            document.extent.spatial.bbox,
            vec![Bbox::new(west, south, east, north)]
        );
        assert_eq!(rels(&document.links), vec!["self", "parent", "root", "child", "item"]);
        assert_eq!(document.links[3].title.as_deref(), Some("Hydrology"));
        assert!(document.additional_fields["item_assets"].get("cog").is_some());

        let value = serde_json::to_value(&document).unwrap();
        assert_eq!(value["extent"]["temporal"]["interval"], json!([[null, null]]));
    }

    #[test]
    fn test_collection_temporal_extent_spans_created_times() {
        let config = config();
        let metadata = LayerMetadata::default();
        let builder = StacBuilder::new(&config, &metadata, Utc::now());
        let mut early = discovered("public/layers/raster/a.tif");
        let mut late = discovered("public/layers/raster/b.tif");
        let start = DateTime::from_timestamp(1_600_000_000, 0).unwrap();
        let end = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        early.created = Some(start);
        late.created = Some(end);

        let document = builder.collection(&CollectionDraft {
            id: "raster".to_string(),
            title: "Raster".to_string(),
            description: "Collection for raster".to_string(),
            keywords: vec![],
            path: "raster/collection.json".to_string(),
            parent_path: CATALOG_FILE.to_string(),
            children: vec![],
            items: vec![
                (&late, "raster/b.json".to_string()),
                (&early, "raster/a.json".to_string()),
            ],
        });
        assert_eq!(document.extent.temporal.interval, vec![[Some(start), Some(end)]]);
    }

    #[test]
    fn test_catalog_document() {
        let config = config();
        let metadata = LayerMetadata::default();
        let builder = StacBuilder::new(&config, &metadata, Utc::now()).with_metadata_asset(true);
        let document = builder.catalog(
            &[ChildRef {
                title: "Raster".to_string(),
                path: "raster/collection.json".to_string(),
            }],
            &[],
        );
        assert_eq!(rels(&document.links), vec!["self", "root", "child"]);
        let fields = &document.additional_fields;
        assert_eq!(fields["catalog_type"], "ABSOLUTE_PUBLISHED");
        assert_eq!(fields["conformsTo"].as_array().unwrap().len(), 2);
        assert_eq!(
            fields["assets"]["layer_metadata"]["href"],
            "https://storage.googleapis.com/swhm_data/public/layers/layer_metadata/layer_metadata.json"
        );
        assert_eq!(fields["assets"]["layer_metadata"]["roles"], json!(["metadata"]));
    }

    #[test]
    fn test_read_document_rejects_unknown_type() {
        let err = read_document(Path::new("x.json"), json!({"type": "FeatureCollection"}))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CatalogError>(),
            Some(CatalogError::UnknownDocument { .. })
        ));
    }

    #[test]
    fn test_generated_item_reads_back_as_stac() {
        let config = config();
        let metadata = sample();
        let builder = StacBuilder::new(&config, &metadata, Utc::now());
        let item = discovered("public/layers/raster/landcover/imperviousness.tif");
        let document = builder
            .item(
                &item,
                &ItemPlacement {
                    path: "raster/landcover/imperviousness.json",
                    parent_path: "raster/collection.json",
                    collection: Some(("raster", "raster/collection.json")),
                },
            )
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("imperviousness.json");
        std::fs::write(&path, serde_json::to_string_pretty(&document).unwrap()).unwrap();
        let value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let StacDocument::Item(read) = read_document(&path, value).unwrap() else {
            panic!("expected an item");
        };
        assert_eq!(read.id, "imperviousness");
        assert_eq!(read.collection.as_deref(), Some("raster"));
        assert_eq!(read.properties.title, document.properties.title);
        assert_eq!(read.properties.datetime, document.properties.datetime);
        assert_eq!(read.assets.len(), 2);
        assert_eq!(
            read.assets["cog"].additional_fields["raster:bands"],
            document.assets["cog"].additional_fields["raster:bands"]
        );
    }
}
