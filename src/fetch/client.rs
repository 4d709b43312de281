//! Search endpoint client
//!
//! The catalog search endpoint takes a JSON POST body carrying a 1-based page
//! number, a page size and the paging token returned by the previous page.
//! Any non-success status is treated as a rate-limit signal.

use crate::config::{HttpConfig, SearchConfig};
use crate::{ConfigError, HarvestError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, COOKIE};
use reqwest::Client;
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Failure of a single search call
#[derive(Debug, Clone, Error)]
pub enum SearchError {
    /// Non-success HTTP status
    #[error("HTTP status {0}")]
    Status(u16),

    /// Connection, timeout or body transfer failure
    #[error("transport failure: {0}")]
    Transport(String),

    /// Body is not the expected JSON shape
    #[error("undecodable response: {0}")]
    Decode(String),
}

impl SearchError {
    /// Status and transport failures are throttling signals worth one retry
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Decode(_))
    }
}

/// Paging block of a search request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestPaging {
    /// 1-based page number
    pub page_number: u32,
    pub paging_token: String,
    pub records_per_page: u32,
}

/// Body of a search request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query_terms: Map<String, Value>,
    pub sort_by_key: String,
    pub culture_id: String,
    pub paging_info: RequestPaging,
}

impl SearchRequest {
    pub fn new(
        config: &SearchConfig,
        page_number: u32,
        records_per_page: u32,
        paging_token: impl Into<String>,
    ) -> Self {
        Self {
            query_terms: Map::new(),
            sort_by_key: config.sort_key.clone(),
            culture_id: config.locale.clone(),
            paging_info: RequestPaging {
                page_number,
                paging_token: paging_token.into(),
                records_per_page,
            },
        }
    }
}

/// Decoded search response
#[derive(Debug, Clone, PartialEq)]
pub struct SearchReply {
    /// Total result count, when the response reports it
    pub total_results: Option<u64>,

    /// Token to send with the next page request
    pub next_token: String,

    /// Full response body
    pub body: Value,
}

impl SearchReply {
    /// Extracts the paging fields from a raw response body
    pub fn from_body(body: Value) -> Result<Self, SearchError> {
        if !body.is_object() {
            return Err(SearchError::Decode(
                "response body is not a JSON object".to_string(),
            ));
        }

        let total_results = match body.get("TotalResults") {
            None | Some(Value::Null) => None,
            Some(value) => Some(value.as_u64().ok_or_else(|| {
                SearchError::Decode(format!("TotalResults is not a count: {}", value))
            })?),
        };

        let next_token = body
            .get("PagingInfo")
            .and_then(|paging| paging.get("PagingToken"))
            .map(|token| match token {
                Value::Null => Ok(String::new()),
                Value::String(s) => Ok(s.clone()),
                other => Err(SearchError::Decode(format!(
                    "PagingToken is not a string: {}",
                    other
                ))),
            })
            .transpose()?
            .ok_or_else(|| SearchError::Decode("missing PagingInfo.PagingToken".to_string()))?;

        Ok(Self {
            total_results,
            next_token,
            body,
        })
    }
}

/// Capability to call the catalog search endpoint
#[async_trait]
pub trait SearchApi: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<SearchReply, SearchError>;
}

/// Builds the shared HTTP client from the `[http]` settings
///
/// The session cookie, when configured, is sent with every request.
pub fn build_http_client(config: &HttpConfig) -> Result<Client, HarvestError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    if let Some(cookie) = &config.cookie {
        let value = HeaderValue::from_str(cookie)
            .map_err(|e| ConfigError::Validation(format!("Invalid cookie header: {}", e)))?;
        headers.insert(COOKIE, value);
    }

    let client = Client::builder()
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()?;

    Ok(client)
}

/// reqwest implementation of the search endpoint
#[derive(Debug, Clone)]
pub struct HttpSearchClient {
    client: Client,
    endpoint: Url,
}

impl HttpSearchClient {
    pub fn new(client: Client, endpoint: &str) -> Result<Self, HarvestError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", endpoint, e)))?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl SearchApi for HttpSearchClient {
    async fn search(&self, request: &SearchRequest) -> Result<SearchReply, SearchError> {
        tracing::debug!(
            "POST {} page {} ({} per page)",
            self.endpoint,
            request.paging_info.page_number,
            request.paging_info.records_per_page
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status(status.as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;
        let body: Value =
            serde_json::from_slice(&bytes).map_err(|e| SearchError::Decode(e.to_string()))?;

        SearchReply::from_body(body)
    }
}
