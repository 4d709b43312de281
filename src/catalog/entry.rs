//! Decoding of search result entries
//!
//! Each staged search page carries its entries under `gridData`. The source
//! is loose about scalar types (`dbId` and `categoryId` arrive as strings or
//! numbers, `recordCount` as a string with thousands separators), so those
//! fields are read through [`Loose`].

use crate::model::{Collection, CollectionFeature};
use serde::Deserialize;
use serde_json::Value;

/// A string or number scalar
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Loose {
    Text(String),
    Number(serde_json::Number),
}

impl Loose {
    pub fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Number(n) => n.to_string(),
        }
    }
}

/// The entry list of one staged search page
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogPage {
    #[serde(rename = "gridData")]
    pub grid_data: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EntryDescription {
    #[serde(rename = "Value")]
    pub value: Option<String>,
}

/// One collection as listed by the search endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub db_id: Loose,
    pub title: Option<String>,
    pub active_date: Option<String>,
    pub updated_date: Option<String>,
    pub collection_feature: Option<String>,
    pub native_culture_id: Option<String>,
    pub category_id: Option<Loose>,
    pub record_count: Option<Loose>,
    pub collection: Option<String>,
    pub description: Option<EntryDescription>,
}

/// Parses a record count such as `"1,234"`
pub fn parse_record_count(raw: &str) -> Option<i64> {
    let digits: String = raw
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    digits.parse().ok()
}

impl CatalogEntry {
    /// Converts the entry into a collection observation
    ///
    /// Returns `None` when the entry has no usable key.
    pub fn into_collection(self) -> Option<Collection> {
        let key = self.db_id.into_string().trim().to_string();
        if key.is_empty() {
            return None;
        }

        let record_count = self.record_count.and_then(|raw| match raw {
            Loose::Number(n) => n.as_i64(),
            Loose::Text(s) => {
                let parsed = parse_record_count(&s);
                if parsed.is_none() && !s.trim().is_empty() {
                    tracing::warn!("Unreadable record count '{}' for collection {}", s, key);
                }
                parsed
            }
        });

        let feature = self.collection_feature.as_deref().and_then(|raw| {
            let feature = CollectionFeature::from_source(raw);
            if feature.is_none() {
                tracing::warn!("Unknown collection feature '{}' for collection {}", raw, key);
            }
            feature
        });

        Some(Collection {
            title: self.title,
            category_id: self.category_id.map(Loose::into_string),
            record_count,
            feature,
            collection_group: self.collection,
            description: self.description.and_then(|d| d.value),
            native_culture_id: self.native_culture_id,
            source_created: self.active_date,
            source_updated: self.updated_date,
            ..Collection::new(key)
        })
    }
}
