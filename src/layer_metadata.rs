//! Optional hand-curated metadata for published layers, matched to crawled items by name.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Clone, Debug, Default)]
pub struct LayerMetadata {
    pub rasters: BTreeMap<String, LayerMeta>,
    pub cocs: BTreeMap<String, LayerMeta>,
}

/// The file as written by hand: entries stay untyped until each one is checked.
#[derive(Deserialize, Default)]
struct RawLayerMetadata {
    #[serde(default)]
    rasters: Map<String, Value>,
    #[serde(default)]
    cocs: Map<String, Value>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LayerMeta {
    #[serde(rename = "safe_name")]
    pub safe_name: Option<String>,
    pub description: Option<String>,
    pub scale: Option<f64>,
    pub source_name: Option<String>,
    pub source_url: Option<String>,
    pub units: Option<String>,
    pub discrete: Option<bool>,
    pub viz_type: Option<String>,
    #[serde(rename = "default_reduction")]
    pub default_reduction: Option<String>,
    #[serde(rename = "docs_link")]
    pub docs_link: Option<String>,
    pub layer: Option<LayerStyle>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub values: Vec<Value>,
    pub bbox: Option<[f64; 4]>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LayerStyle {
    pub name: Option<String>,
    pub vis_params: Option<Map<String, Value>>,
}

impl LayerMeta {
    pub fn layer_name(&self) -> Option<&str> {
        self.layer.as_ref()?.name.as_deref()
    }

    pub fn vis_params(&self) -> Option<&Map<String, Value>> {
        self.layer.as_ref()?.vis_params.as_ref()
    }

    /// `(min, max)` from the visualisation parameters, when both are present.
    pub fn value_range(&self) -> Option<(Value, Value)> {
        let params = self.vis_params()?;
        Some((params.get("min")?.clone(), params.get("max")?.clone()))
    }

    pub fn is_categorical(&self) -> bool {
        self.discrete == Some(true) && !self.labels.is_empty()
    }

    /// Class value for the label at `index`. A missing value, a numeric zero,
    /// an empty string or an unparsable string falls back to the index.
    pub fn class_value(&self, index: usize) -> i64 {
        let value = match self.values.get(index) {
            Some(Value::Number(number)) => number
                .as_f64()
                .map(|n| n as i64)
                .filter(|value| *value != 0),
            Some(Value::String(text)) => text.trim().parse::<f64>().ok().map(|n| n as i64),
            _ => None,
        };
        value.unwrap_or(index as i64)
    }
}

fn parse_category(category: &str, entries: Map<String, Value>) -> BTreeMap<String, LayerMeta> {
    entries
        .into_iter()
        .filter_map(|(key, value)| match serde_json::from_value::<LayerMeta>(value) {
            Ok(meta) => Some((key, meta)),
            Err(e) => {
                warn!("Skipping {} entry '{}' in layer metadata: {}", category, key, e);
                None
            }
        })
        .collect()
}

impl LayerMetadata {
    /// Entries that don't fit `LayerMeta` are dropped one by one; the rest are kept.
    pub fn from_value(value: Value) -> Result<Self> {
        let raw: RawLayerMetadata = serde_json::from_value(value)?;
        Ok(Self {
            rasters: parse_category("rasters", raw.rasters),
            cocs: parse_category("cocs", raw.cocs),
        })
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_value(serde_json::from_str(&content)?)
    }

    /// Like `read`, but a missing or malformed file only costs the enrichment.
    pub fn read_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::read(&path) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(
                    "Could not load layer metadata from {}: {}",
                    path.as_ref().display(),
                    e
                );
                Self::default()
            }
        }
    }

    pub fn find(&self, layer_name: &str) -> Option<&LayerMeta> {
        let lower = layer_name.to_lowercase();
        let normalized = lower.replace(['_', '-'], " ");

        for category in [&self.rasters, &self.cocs] {
            for (key, meta) in category.iter() {
                let key_lower = key.to_lowercase();
                let key_underscored = key_lower.replace(' ', "_");

                if key_lower == normalized {
                    debug!("Metadata match for '{}' -> '{}'", layer_name, key);
                    return Some(meta);
                }
                if meta
                    .safe_name
                    .as_deref()
                    .is_some_and(|safe| safe.to_lowercase() == lower)
                {
                    debug!("Metadata match for '{}' via safe_name -> '{}'", layer_name, key);
                    return Some(meta);
                }
                if key_underscored == lower {
                    debug!("Metadata match for '{}' via normalized key -> '{}'", layer_name, key);
                    return Some(meta);
                }
                if key_underscored == normalized.replace(' ', "_") {
                    debug!("Metadata match for '{}' via underscores -> '{}'", layer_name, key);
                    return Some(meta);
                }
            }
        }
        None
    }
}
