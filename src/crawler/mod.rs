//! Crawler module for page fetching and site traversal
//!
//! This module contains the core crawling logic, including:
//! - Static HTTP and headless-browser fetch strategies
//! - HTML parsing and reference extraction
//! - The per-job breadth-first frontier
//! - Mapping URLs to local file paths
//! - The engine that drives a job from start to archive

mod engine;
mod fetcher;
mod frontier;
mod parser;
mod paths;
mod render;

pub use engine::CrawlEngine;
pub use fetcher::{
    build_http_client, is_markup_type, FetchError, HttpFetcher, PageFetcher, RetrievedAsset,
    RetrievedPage,
};
pub use frontier::Frontier;
pub use parser::{parse_references, AssetKind, AssetRef, PageReferences, RawReferences};
pub use paths::{local_path_for, EXTERNAL_DIR};
pub use render::{BrowserSession, RenderFetcher};
