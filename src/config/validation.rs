use crate::config::types::{
    BackoffConfig, Config, HttpConfig, OutputConfig, SearchConfig, TaxonomyConfig, WalkerConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_http_config(&config.http)?;
    validate_search_config(&config.search)?;
    validate_backoff_config(&config.backoff)?;
    validate_taxonomy_config(&config.taxonomy)?;
    validate_walker_config(&config.walker)?;
    validate_output_config(&config.output)?;
    Ok(())
}

fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.timeout_secs == 0 || config.connect_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout_secs and connect_timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Checks a search page size, whether it comes from the file or the command line
pub fn validate_page_size(page_size: u32) -> Result<(), ConfigError> {
    if !(1..=10_000).contains(&page_size) {
        return Err(ConfigError::Validation(format!(
            "page_size must be between 1 and 10000, got {}",
            page_size
        )));
    }
    Ok(())
}

fn validate_search_config(config: &SearchConfig) -> Result<(), ConfigError> {
    validate_endpoint("search.endpoint", &config.endpoint)?;

    validate_page_size(config.page_size)?;

    if config.locale.is_empty() {
        return Err(ConfigError::Validation("locale cannot be empty".to_string()));
    }

    Ok(())
}

fn validate_backoff_config(config: &BackoffConfig) -> Result<(), ConfigError> {
    if !config.min_seconds.is_finite() || config.min_seconds < 0.0 {
        return Err(ConfigError::Validation(format!(
            "min_seconds must be a non-negative number, got {}",
            config.min_seconds
        )));
    }

    if !config.max_seconds.is_finite() || config.max_seconds < config.min_seconds {
        return Err(ConfigError::Validation(format!(
            "max_seconds must be >= min_seconds ({}), got {}",
            config.min_seconds, config.max_seconds
        )));
    }

    if !config.escalation_factor.is_finite() || config.escalation_factor < 1.0 {
        return Err(ConfigError::Validation(format!(
            "escalation_factor must be >= 1.0, got {}",
            config.escalation_factor
        )));
    }

    Ok(())
}

fn validate_taxonomy_config(config: &TaxonomyConfig) -> Result<(), ConfigError> {
    validate_endpoint("taxonomy.browse_endpoint", &config.browse_endpoint)?;
    validate_endpoint("taxonomy.info_endpoint", &config.info_endpoint)?;

    if config.max_depth < 1 || config.max_depth > 64 {
        return Err(ConfigError::Validation(format!(
            "max_depth must be between 1 and 64, got {}",
            config.max_depth
        )));
    }

    Ok(())
}

fn validate_walker_config(config: &WalkerConfig) -> Result<(), ConfigError> {
    if config.retry_budget > 10 {
        return Err(ConfigError::Validation(format!(
            "retry_budget must be <= 10, got {}",
            config.retry_budget
        )));
    }

    if config.record_viewer_pattern.trim().is_empty() {
        return Err(ConfigError::Validation(
            "record_viewer_pattern cannot be empty".to_string(),
        ));
    }

    if config.max_pages == Some(0) {
        return Err(ConfigError::Validation(
            "max_pages must be >= 1 when set".to_string(),
        ));
    }

    validate_endpoint("walker.webdriver_url", &config.webdriver_url)?;

    let selectors = &config.selectors;
    for (name, selector) in [
        ("index-toggle", &selectors.index_toggle),
        ("index-row", &selectors.index_row),
        ("index-cell", &selectors.index_cell),
        ("page-number", &selectors.page_number),
        ("page-total", &selectors.page_total),
        ("collection-link", &selectors.collection_link),
        ("breadcrumb", &selectors.breadcrumb),
        ("next-page", &selectors.next_page),
        ("image-tools", &selectors.image_tools),
        ("download-image", &selectors.download_image),
    ] {
        if selector.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "selector '{}' cannot be empty",
                name
            )));
        }
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.staging_dir.is_empty() {
        return Err(ConfigError::Validation(
            "staging_dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates that an endpoint is an absolute http(s) URL
fn validate_endpoint(name: &str, endpoint: &str) -> Result<(), ConfigError> {
    let url = Url::parse(endpoint)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", name, endpoint, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(format!(
            "{} must use http or https, got '{}'",
            name, endpoint
        )));
    }

    Ok(())
}
