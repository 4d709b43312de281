//! Page content and row batch assembly

use crate::model::ExtractedRow;
use crate::walker::session::{Role, SessionFault};
use url::Url;

/// Index panel contents of one page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexTable {
    /// Header row
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// One level of the browse path shown above the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breadcrumb {
    pub value: String,
    /// Label displayed while the level has focus
    pub title: String,
}

/// Location of a page within its collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageNavigation {
    pub page_number: u32,
    pub page_total: u32,
    pub collection_title: String,
    pub collection_link: String,
    pub breadcrumbs: Vec<Breadcrumb>,
}

/// Reads a page counter such as `"12"`, `"of 1,204"` or `"1,204"`
///
/// Blank text is an empty read (the viewer has not rendered it yet); any
/// other non-numeric text is malformed.
pub fn parse_counter(role: Role, raw: &str) -> Result<u32, SessionFault> {
    let cleaned = raw.replace(',', "");
    let token = cleaned.split_whitespace().last().ok_or(SessionFault::EmptyRead)?;
    token.parse().map_err(|_| SessionFault::Malformed {
        role,
        value: raw.trim().to_string(),
    })
}

/// Collection key: the path segment after `collections` in the viewer location
pub fn collection_key_from_location(location: &str) -> Option<String> {
    let url = Url::parse(location).ok()?;
    let mut segments = url.path_segments()?;
    segments.find(|s| *s == "collections")?;
    segments
        .next()
        .filter(|key| !key.is_empty())
        .map(str::to_string)
}

/// Image identifier: the last path segment of the viewer location
pub fn image_id_from_location(location: &str) -> String {
    if let Ok(url) = Url::parse(location) {
        if let Some(segment) = url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        {
            return segment.to_string();
        }
    }

    location
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Augments every index row with the page's lineage columns
///
/// Cells past the header, or under a blank header, are named `column_<i>`.
/// Missing trailing cells are empty. Lineage columns win over index columns
/// of the same name.
pub fn assemble_rows(
    table: &IndexTable,
    navigation: &PageNavigation,
    image: &str,
    page_link: &str,
) -> Vec<ExtractedRow> {
    let width = table
        .rows
        .iter()
        .map(Vec::len)
        .max()
        .unwrap_or(0)
        .max(table.columns.len());

    let column_names: Vec<String> = (0..width)
        .map(|i| match table.columns.get(i) {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => format!("column_{}", i),
        })
        .collect();

    table
        .rows
        .iter()
        .map(|cells| {
            let mut row = ExtractedRow::new();
            for (i, name) in column_names.iter().enumerate() {
                let value = cells.get(i).map(String::as_str).unwrap_or("");
                row.insert(name.clone(), value);
            }

            row.insert("page", navigation.page_number.to_string());
            row.insert("total_pages", navigation.page_total.to_string());
            row.insert("image", image);
            row.insert("collection_title", navigation.collection_title.as_str());
            row.insert("collection_link", navigation.collection_link.as_str());
            row.insert("page_link", page_link);
            for (n, crumb) in navigation.breadcrumbs.iter().enumerate() {
                row.insert(format!("breadcrumb_{}", n), crumb.value.as_str());
                row.insert(format!("breadcrumb_{}_title", n), crumb.title.as_str());
            }
            row
        })
        .collect()
}
