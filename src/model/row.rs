/// Extracted index rows and table naming
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// One row of a per-collection content table
///
/// Columns are kept sorted by name so that the serialized form, and
/// therefore the fingerprint, does not depend on insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractedRow {
    columns: BTreeMap<String, String>,
}

impl ExtractedRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a column, replacing any previous value
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.columns.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns.get(column).map(String::as_str)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Hex-encoded SHA-256 over the canonical column/value pairs
    ///
    /// Two rows with identical columns and values share a fingerprint, which
    /// the storage layer uses for duplicate removal.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (column, value) in &self.columns {
            hasher.update((column.len() as u64).to_le_bytes());
            hasher.update(column.as_bytes());
            hasher.update((value.len() as u64).to_le_bytes());
            hasher.update(value.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ExtractedRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Self::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}

/// Normalizes a collection title into a table name
///
/// Lowercases ASCII alphanumerics and collapses every other run of
/// characters into a single underscore. Returns `untitled_collection` when
/// nothing usable remains.
///
/// # Example
///
/// ```
/// use catalog_harvest::model::normalize_table_name;
///
/// assert_eq!(
///     normalize_table_name("New Orleans, Louisiana, Death Records, 1804-1964"),
///     "new_orleans_louisiana_death_records_1804_1964"
/// );
/// ```
pub fn normalize_table_name(title: &str) -> String {
    let mut name = String::with_capacity(title.len());
    let mut pending_separator = false;

    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !name.is_empty() {
                name.push('_');
            }
            pending_separator = false;
            name.push(c.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }

    if name.is_empty() {
        "untitled_collection".to_string()
    } else {
        name
    }
}
