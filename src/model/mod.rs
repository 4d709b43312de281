//! Domain records shared by the traversals and the storage layer
//!
//! - `Collection`: one catalog record set, identified by its source key
//! - `Section`: a node of a collection's browse taxonomy
//! - `ExtractedRow`: one index row lifted off a record page, with lineage columns

mod collection;
mod row;
mod section;

pub use collection::{Collection, CollectionFeature};
pub use row::{normalize_table_name, ExtractedRow};
pub use section::{count_nodes, find_section, tree_depth, Section};
