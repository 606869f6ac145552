#![allow(async_fn_in_trait)]
pub mod banner;
pub mod catalog_plan;
pub mod config;
pub mod crawl;
pub mod error;
pub mod layer_metadata;
pub mod stac_operations;
pub mod storage;
pub mod upload;
pub mod verify;
