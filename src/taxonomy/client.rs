//! Browse-taxonomy and collection-info endpoints

use crate::catalog::Loose;
use crate::model::Collection;
use crate::{ConfigError, HarvestError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

/// Failure of a single browse or info call
#[derive(Debug, Clone, Error)]
pub enum BrowseError {
    #[error("HTTP status {0}")]
    Status(u16),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("undecodable response: {0}")]
    Decode(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl BrowseError {
    /// Throttling and transport failures are worth one retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Status(_) | Self::Transport(_))
    }
}

/// One sibling at a browse level
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BrowseEntry {
    pub value: String,
    pub label: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl BrowseEntry {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
            description: None,
        }
    }
}

/// Response of the browse endpoint for one path
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowseLevel {
    /// Whether the siblings at this level have child levels of their own
    #[serde(default)]
    pub has_child_levels: bool,

    #[serde(default)]
    pub entries: Vec<BrowseEntry>,
}

/// Per-collection metadata from the collection-info endpoint
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionInfo {
    pub key: String,
    pub title: Option<String>,
    pub database_name: Option<String>,
    pub category_name: Option<String>,
    pub category_id: Option<String>,
    pub publication_year: Option<i32>,
    pub source_info: Option<String>,
    pub is_yearbook: Option<bool>,
    pub can_save_image: Option<bool>,
    /// Labels of the browse levels in source order; `None` if not reported
    pub navigation_levels: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InfoEnvelope {
    image_info: ImageInfo,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageInfo {
    db_id: Option<Loose>,
    structure_type: Option<Map<String, Value>>,
    #[serde(default)]
    collection_info: InfoBlock,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct InfoBlock {
    title: Option<String>,
    database_name: Option<String>,
    primary_category_name: Option<String>,
    primary_category_id: Option<Loose>,
    publication_year: Option<Loose>,
    source_info: Option<String>,
    is_yearbook: Option<bool>,
    can_save_image: Option<bool>,
}

impl CollectionInfo {
    /// Decodes an `imageInfo` response body
    ///
    /// `requested_key` is used when the body does not echo the key back.
    pub fn from_body(requested_key: &str, body: Value) -> Result<Self, BrowseError> {
        let envelope: InfoEnvelope =
            serde_json::from_value(body).map_err(|e| BrowseError::Decode(e.to_string()))?;
        let image_info = envelope.image_info;
        let block = image_info.collection_info;

        let key = image_info
            .db_id
            .map(Loose::into_string)
            .filter(|k| !k.trim().is_empty())
            .unwrap_or_else(|| requested_key.to_string());

        let publication_year = match block.publication_year {
            None => None,
            Some(Loose::Number(n)) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
            Some(Loose::Text(s)) if s.trim().is_empty() => None,
            Some(Loose::Text(s)) => Some(s.trim().parse().map_err(|_| {
                BrowseError::Decode(format!("publicationYear is not a year: {}", s))
            })?),
        };

        let navigation_levels = image_info.structure_type.map(|levels| {
            levels
                .into_iter()
                .map(|(_, label)| match label {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect()
        });

        Ok(Self {
            key,
            title: block.title,
            database_name: block.database_name,
            category_name: block.primary_category_name,
            category_id: block.primary_category_id.map(Loose::into_string),
            publication_year,
            source_info: block.source_info,
            is_yearbook: block.is_yearbook,
            can_save_image: block.can_save_image,
            navigation_levels,
        })
    }

    /// Converts to a collection observation carrying only reported attributes
    pub fn into_collection(self) -> Collection {
        Collection {
            title: self.title,
            database_name: self.database_name,
            category_name: self.category_name,
            category_id: self.category_id,
            publication_year: self.publication_year,
            source_info: self.source_info,
            is_yearbook: self.is_yearbook,
            can_save_image: self.can_save_image,
            navigation_levels: self.navigation_levels,
            ..Collection::new(self.key)
        }
    }
}

/// Capability to query the browse taxonomy of a collection
#[async_trait]
pub trait BrowseApi: Send + Sync {
    /// Lists the siblings below `path` (empty path = top level)
    async fn browse(&self, collection_key: &str, path: &[String]) -> Result<BrowseLevel, BrowseError>;

    /// Fetches collection metadata
    async fn collection_info(&self, collection_key: &str) -> Result<CollectionInfo, BrowseError>;
}

/// reqwest implementation of the browse and info endpoints
#[derive(Debug, Clone)]
pub struct HttpBrowseClient {
    client: Client,
    browse_endpoint: Url,
    info_endpoint: Url,
}

impl HttpBrowseClient {
    pub fn new(client: Client, browse_endpoint: &str, info_endpoint: &str) -> Result<Self, HarvestError> {
        let parse = |endpoint: &str| {
            Url::parse(endpoint).map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", endpoint, e)))
        };
        Ok(Self {
            client,
            browse_endpoint: parse(browse_endpoint)?,
            info_endpoint: parse(info_endpoint)?,
        })
    }

    /// Builds the browse URL: `?dbId=<key>&path=<values joined by '/'>`
    ///
    /// `%` and `/` inside a value are percent-escaped so the joined path
    /// splits back into the same levels.
    pub fn browse_url(&self, collection_key: &str, path: &[String]) -> Url {
        let joined = path
            .iter()
            .map(|value| escape_path_value(value))
            .collect::<Vec<_>>()
            .join("/");
        let mut url = self.browse_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("dbId", collection_key)
            .append_pair("path", &joined);
        url
    }

    pub fn info_url(&self, collection_key: &str) -> Url {
        let mut url = self.info_endpoint.clone();
        url.query_pairs_mut().append_pair("dbId", collection_key);
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, BrowseError> {
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| BrowseError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(BrowseError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(BrowseError::Status(status.as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BrowseError::Transport(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| BrowseError::Decode(e.to_string()))
    }
}

#[async_trait]
impl BrowseApi for HttpBrowseClient {
    async fn browse(&self, collection_key: &str, path: &[String]) -> Result<BrowseLevel, BrowseError> {
        self.get_json(self.browse_url(collection_key, path)).await
    }

    async fn collection_info(&self, collection_key: &str) -> Result<CollectionInfo, BrowseError> {
        let body: Value = self.get_json(self.info_url(collection_key)).await?;
        CollectionInfo::from_body(collection_key, body)
    }
}

fn escape_path_value(value: &str) -> String {
    value.replace('%', "%25").replace('/', "%2F")
}
