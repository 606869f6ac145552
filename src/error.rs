use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Command-line tool not found: {0}")]
    ToolNotFound(String),
    #[error("Not a recognised bucket url: {0}")]
    InvalidBucketUrl(String),
    #[error("No catalogable assets found in {bucket} under '{prefix}'")]
    NoAssetsFound { bucket: String, prefix: String },
    #[error("Directory does not exist: {0}")]
    MissingDirectory(PathBuf),
    #[error("Unknown STAC document type '{kind}' in {path}")]
    UnknownDocument { kind: String, path: PathBuf },
}
