//! W3C WebDriver document session
//!
//! Talks to a WebDriver server (chromedriver, geckodriver) over its JSON wire
//! protocol. Roles are resolved through the configured CSS selectors.

use crate::config::SelectorConfig;
use crate::walker::session::{DocumentSession, Role, SessionFault};
use crate::{ConfigError, HarvestError, Result};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use url::Url;

/// Key under which W3C drivers return element references
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Reference to an element in the remote browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebElement(pub String);

/// Error object returned by the driver
#[derive(Debug, Clone, PartialEq, Eq)]
struct WireError {
    code: String,
    message: String,
}

impl WireError {
    fn transport(message: impl Into<String>) -> Self {
        Self {
            code: "transport".to_string(),
            message: message.into(),
        }
    }

    fn into_fault(self, role: Option<Role>) -> SessionFault {
        match (self.code.as_str(), role) {
            ("stale element reference", _) => SessionFault::Stale,
            ("no such element", Some(role)) => SessionFault::MissingElement(role),
            _ => SessionFault::Other(format!("{}: {}", self.code, self.message)),
        }
    }
}

/// Document session backed by a WebDriver browser session
#[derive(Debug, Clone)]
pub struct WebDriverSession {
    client: Client,
    base: Url,
    session_id: String,
    selectors: SelectorConfig,
}

impl WebDriverSession {
    /// Opens a new browser session on the driver
    pub async fn start(client: Client, driver_url: &str, selectors: SelectorConfig) -> Result<Self> {
        let base = parse_driver_url(driver_url)?;
        let capabilities = json!({ "capabilities": { "alwaysMatch": {} } });

        let value = send(&client, Method::POST, join(&base, "session")?, Some(capabilities))
            .await
            .map_err(|e| HarvestError::Session(e.into_fault(None)))?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| HarvestError::Decode {
                context: "new session reply".to_string(),
                message: "missing sessionId".to_string(),
            })?
            .to_string();

        tracing::info!("Opened WebDriver session {}", session_id);
        Ok(Self {
            client,
            base,
            session_id,
            selectors,
        })
    }

    /// Attaches to a browser session that is already open
    pub fn attach(
        client: Client,
        driver_url: &str,
        session_id: impl Into<String>,
        selectors: SelectorConfig,
    ) -> Result<Self> {
        Ok(Self {
            client,
            base: parse_driver_url(driver_url)?,
            session_id: session_id.into(),
            selectors,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Ends the browser session
    pub async fn close(self) -> Result<()> {
        let url = join(&self.base, &format!("session/{}", self.session_id))?;
        send(&self.client, Method::DELETE, url, None)
            .await
            .map_err(|e| HarvestError::Session(e.into_fault(None)))?;
        tracing::info!("Closed WebDriver session {}", self.session_id);
        Ok(())
    }

    fn selector(&self, role: Role) -> &str {
        let s = &self.selectors;
        match role {
            Role::IndexToggle => &s.index_toggle,
            Role::IndexRow => &s.index_row,
            Role::IndexCell => &s.index_cell,
            Role::PageNumber => &s.page_number,
            Role::PageTotal => &s.page_total,
            Role::CollectionLink => &s.collection_link,
            Role::Breadcrumb => &s.breadcrumb,
            Role::NextPage => &s.next_page,
            Role::ImageTools => &s.image_tools,
            Role::DownloadImage => &s.download_image,
        }
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        role: Option<Role>,
    ) -> std::result::Result<Value, SessionFault> {
        let url = join(&self.base, &format!("session/{}/{}", self.session_id, path))
            .map_err(|e| SessionFault::Other(e.to_string()))?;
        send(&self.client, method, url, body)
            .await
            .map_err(|e| e.into_fault(role))
    }

    fn locator(&self, role: Role) -> Value {
        json!({ "using": "css selector", "value": self.selector(role) })
    }
}

fn parse_driver_url(driver_url: &str) -> Result<Url> {
    let mut base = Url::parse(driver_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", driver_url, e)))?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base)
}

fn join(base: &Url, path: &str) -> Result<Url> {
    base.join(path).map_err(|e| {
        HarvestError::Config(ConfigError::InvalidUrl(format!("{}{}: {}", base, path, e)))
    })
}

/// Sends one command and unwraps the `value` member of the reply
async fn send(
    client: &Client,
    method: Method,
    url: Url,
    body: Option<Value>,
) -> std::result::Result<Value, WireError> {
    tracing::trace!("{} {}", method, url);
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request
        .send()
        .await
        .map_err(|e| WireError::transport(e.to_string()))?;
    let status = response.status();
    let reply: Value = response
        .json()
        .await
        .map_err(|e| WireError::transport(format!("HTTP {}: {}", status.as_u16(), e)))?;
    let value = reply.get("value").cloned().unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }

    let code = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Err(WireError { code, message })
}

fn element_ref(value: &Value) -> std::result::Result<WebElement, SessionFault> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(|id| WebElement(id.to_string()))
        .ok_or_else(|| SessionFault::Other(format!("not an element reference: {}", value)))
}

fn element_refs(value: &Value) -> std::result::Result<Vec<WebElement>, SessionFault> {
    value
        .as_array()
        .ok_or_else(|| SessionFault::Other(format!("not an element list: {}", value)))?
        .iter()
        .map(element_ref)
        .collect()
}

fn string_value(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl DocumentSession for WebDriverSession {
    type Element = WebElement;

    async fn navigate(&mut self, url: &str) -> std::result::Result<(), SessionFault> {
        self.command(Method::POST, "url", Some(json!({ "url": url })), None)
            .await
            .map(|_| ())
    }

    async fn current_location(&mut self) -> std::result::Result<String, SessionFault> {
        let value = self.command(Method::GET, "url", None, None).await?;
        string_value(value).ok_or(SessionFault::EmptyRead)
    }

    async fn find(&mut self, role: Role) -> std::result::Result<WebElement, SessionFault> {
        let value = self
            .command(Method::POST, "element", Some(self.locator(role)), Some(role))
            .await?;
        element_ref(&value)
    }

    async fn find_all(&mut self, role: Role) -> std::result::Result<Vec<WebElement>, SessionFault> {
        let value = self
            .command(Method::POST, "elements", Some(self.locator(role)), Some(role))
            .await?;
        element_refs(&value)
    }

    async fn find_all_within(
        &mut self,
        parent: &WebElement,
        role: Role,
    ) -> std::result::Result<Vec<WebElement>, SessionFault> {
        let path = format!("element/{}/elements", parent.0);
        let value = self
            .command(Method::POST, &path, Some(self.locator(role)), Some(role))
            .await?;
        element_refs(&value)
    }

    async fn read_text(&mut self, element: &WebElement) -> std::result::Result<String, SessionFault> {
        let path = format!("element/{}/text", element.0);
        let value = self.command(Method::GET, &path, None, None).await?;
        Ok(string_value(value).unwrap_or_default())
    }

    async fn read_attribute(
        &mut self,
        element: &WebElement,
        name: &str,
    ) -> std::result::Result<Option<String>, SessionFault> {
        // Live input values and resolved links are properties, not attributes
        let kind = match name {
            "value" | "href" => "property",
            _ => "attribute",
        };
        let path = format!("element/{}/{}/{}", element.0, kind, name);
        let value = self.command(Method::GET, &path, None, None).await?;
        Ok(string_value(value))
    }

    async fn click(&mut self, element: &WebElement) -> std::result::Result<(), SessionFault> {
        let path = format!("element/{}/click", element.0);
        self.command(Method::POST, &path, Some(json!({})), None)
            .await
            .map(|_| ())
    }

    async fn is_enabled(&mut self, element: &WebElement) -> std::result::Result<bool, SessionFault> {
        let path = format!("element/{}/enabled", element.0);
        let value = self.command(Method::GET, &path, None, None).await?;
        value
            .as_bool()
            .ok_or_else(|| SessionFault::Other(format!("not a boolean: {}", value)))
    }

    async fn reload(&mut self) -> std::result::Result<(), SessionFault> {
        tracing::debug!("Reloading session {}", self.session_id);
        self.command(Method::POST, "refresh", Some(json!({})), None)
            .await
            .map(|_| ())
    }
}
