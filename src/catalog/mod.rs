//! Catalog merging
//!
//! Turns staged search pages into collection upserts.

mod entry;
mod merger;

pub use entry::{parse_record_count, CatalogEntry, CatalogPage, EntryDescription, Loose};
pub use merger::{CatalogMerger, MergeReport};
