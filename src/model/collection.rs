/// Collection records and their feature classification
use std::fmt;

/// What a collection offers: scanned images, a transcribed index, or both
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionFeature {
    ImageAndIndex,
    ImageOnly,
    IndexOnly,
}

impl CollectionFeature {
    /// Parses the feature string used by the search endpoint
    ///
    /// Accepts both the source spelling (`bothImagesAndIndex`) and the
    /// database spelling (`image-and-index`).
    pub fn from_source(s: &str) -> Option<Self> {
        match s.trim() {
            "bothImagesAndIndex" | "image-and-index" => Some(Self::ImageAndIndex),
            "imageOnly" | "image-only" => Some(Self::ImageOnly),
            "indexOnly" | "index-only" => Some(Self::IndexOnly),
            _ => None,
        }
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::ImageAndIndex => "image-and-index",
            Self::ImageOnly => "image-only",
            Self::IndexOnly => "index-only",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "image-and-index" => Some(Self::ImageAndIndex),
            "image-only" => Some(Self::ImageOnly),
            "index-only" => Some(Self::IndexOnly),
            _ => None,
        }
    }

    /// Returns true if the collection carries a transcribed index
    pub fn has_index(&self) -> bool {
        matches!(self, Self::ImageAndIndex | Self::IndexOnly)
    }
}

impl fmt::Display for CollectionFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// One observation of a collection
///
/// Every attribute besides the key is optional. `None` means the source that
/// produced this observation does not report the attribute, so an upsert
/// leaves the stored value alone. `Some` (even an empty string) overwrites.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collection {
    /// Source collection key (`dbId`)
    pub key: String,

    /// Display title, e.g. "1790 United States Federal Census"
    pub title: Option<String>,

    /// Primary category name, e.g. "cen_1790"
    pub category_name: Option<String>,

    /// Primary category id, e.g. "170"
    pub category_id: Option<String>,

    /// Source database name, e.g. "1790usfedcen"
    pub database_name: Option<String>,

    pub publication_year: Option<i32>,

    pub record_count: Option<i64>,

    pub feature: Option<CollectionFeature>,

    /// Grouping label, e.g. "Birth, Marriage & Death"
    pub collection_group: Option<String>,

    pub description: Option<String>,

    pub native_culture_id: Option<String>,

    /// Copyright and provenance text
    pub source_info: Option<String>,

    /// Source-reported activation date (not the local audit timestamp)
    pub source_created: Option<String>,

    /// Source-reported update date
    pub source_updated: Option<String>,

    pub is_yearbook: Option<bool>,

    /// Whether the viewer lets page images of this collection be saved
    pub can_save_image: Option<bool>,

    /// Labels of the browse levels, outermost first
    pub navigation_levels: Option<Vec<String>>,
}

impl Collection {
    /// Creates an observation that only carries the key
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    /// Joins navigation levels into their stored pipe-delimited form
    pub fn navigation_levels_db(&self) -> Option<String> {
        self.navigation_levels.as_ref().map(|levels| levels.join("|"))
    }

    /// Splits the stored pipe-delimited form back into labels
    pub fn parse_navigation_levels(raw: &str) -> Vec<String> {
        if raw.is_empty() {
            return Vec::new();
        }
        raw.split('|').map(str::to_string).collect()
    }
}
