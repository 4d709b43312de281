use serde::Deserialize;

/// Main configuration structure for Catalog Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    pub search: SearchConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    pub taxonomy: TaxonomyConfig,
    #[serde(default)]
    pub walker: WalkerConfig,
    pub output: OutputConfig,
}

/// HTTP client configuration shared by all endpoint clients
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HttpConfig {
    pub user_agent: String,

    /// Total request timeout in seconds
    pub timeout_secs: u64,

    pub connect_timeout_secs: u64,

    /// Raw `Cookie` header for an already-authenticated session
    pub cookie: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("catalog-harvest/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 30,
            connect_timeout_secs: 10,
            cookie: None,
        }
    }
}

/// Catalog search endpoint configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SearchConfig {
    pub endpoint: String,

    /// Entries requested per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default = "default_locale")]
    pub locale: String,

    #[serde(default = "default_sort_key")]
    pub sort_key: String,
}

fn default_page_size() -> u32 {
    1000
}

fn default_locale() -> String {
    "en-US".to_string()
}

fn default_sort_key() -> String {
    "ACTIVE_DATE".to_string()
}

/// Backoff window applied before rate-limited calls
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BackoffConfig {
    pub min_seconds: f64,
    pub max_seconds: f64,

    /// Multiplier applied to the window when retrying after a throttle
    pub escalation_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_seconds: 1.0,
            max_seconds: 30.0,
            escalation_factor: 3.0,
        }
    }
}

/// Browse taxonomy and collection-info endpoints
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TaxonomyConfig {
    pub browse_endpoint: String,
    pub info_endpoint: String,

    /// Maximum number of section levels materialized below a collection
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
}

fn default_max_depth() -> u32 {
    8
}

/// Page walker behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct WalkerConfig {
    /// Retries allowed per extraction step after the first attempt
    pub retry_budget: u32,

    /// Fixed delay between extraction retries (milliseconds)
    pub retry_delay_ms: u64,

    /// Substring every record viewer location contains
    pub record_viewer_pattern: String,

    /// CSS class present on the index toggle while the panel is open
    pub index_active_class: String,

    /// WebDriver server base URL
    pub webdriver_url: String,

    /// Stop after this many pages even if a next page exists
    pub max_pages: Option<u32>,

    /// Save each page image through the viewer's download tool, unless the
    /// collection is known to forbid it
    pub save_images: bool,

    pub selectors: SelectorConfig,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            retry_budget: 3,
            retry_delay_ms: 500,
            record_viewer_pattern: "ancestry.com/imageviewer".to_string(),
            index_active_class: "toggleActive".to_string(),
            webdriver_url: "http://localhost:9515".to_string(),
            max_pages: None,
            save_images: false,
            selectors: SelectorConfig::default(),
        }
    }
}

/// CSS selectors for each element role the walker inspects
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SelectorConfig {
    pub index_toggle: String,
    pub index_row: String,
    pub index_cell: String,
    pub page_number: String,
    pub page_total: String,
    pub collection_link: String,
    pub breadcrumb: String,
    pub next_page: String,
    pub image_tools: String,
    pub download_image: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            index_toggle: ".iconPersonList".to_string(),
            index_row: ".index-panel-content .grid-row".to_string(),
            index_cell: ".grid-cell".to_string(),
            page_number: ".page-input".to_string(),
            page_total: ".imageCountText".to_string(),
            collection_link: ".collectionTitle a".to_string(),
            breadcrumb: ".browse-path-header input".to_string(),
            next_page: "button:has(.iconArrowRight)".to_string(),
            image_tools: ".iconTools".to_string(),
            download_image: ".iconDownload".to_string(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite database file
    pub database_path: String,

    /// Directory holding staged search pages
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,
}

fn default_staging_dir() -> String {
    "data".to_string()
}
