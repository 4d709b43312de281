//! Browse taxonomy crawling and collection details lookup
//!
//! This module handles:
//! - The browse-taxonomy and collection-info endpoint clients
//! - Depth-first expansion of a collection's browse tree up to a depth cap
//! - Atomic replacement of the stored tree
//! - Enrichment of a collection with its metadata

mod client;
mod crawler;

pub use client::{BrowseApi, BrowseEntry, BrowseError, BrowseLevel, CollectionInfo, HttpBrowseClient};
pub use crawler::{CrawlOutcome, TaxonomyCrawler};
