//! Document session capability
//!
//! The page walker drives a live record viewer only through this trait. The
//! viewer's elements are addressed by [`Role`]; how a role maps onto the
//! rendered page is up to the session implementation.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Viewer elements the walker interacts with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Button that shows or hides the index panel
    IndexToggle,
    /// Row of the index panel (the first one holds the column headers)
    IndexRow,
    /// Cell within an index row
    IndexCell,
    /// Input holding the current page number
    PageNumber,
    /// Text holding the page count of the current section
    PageTotal,
    /// Link to the collection the page belongs to
    CollectionLink,
    /// One level of the browse path header
    Breadcrumb,
    /// Control that moves to the next page
    NextPage,
    /// Toggle of the image tool popout
    ImageTools,
    /// Tool that saves the displayed image
    DownloadImage,
}

impl Role {
    pub const ALL: [Role; 10] = [
        Role::IndexToggle,
        Role::IndexRow,
        Role::IndexCell,
        Role::PageNumber,
        Role::PageTotal,
        Role::CollectionLink,
        Role::Breadcrumb,
        Role::NextPage,
        Role::ImageTools,
        Role::DownloadImage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IndexToggle => "index-toggle",
            Self::IndexRow => "index-row",
            Self::IndexCell => "index-cell",
            Self::PageNumber => "page-number",
            Self::PageTotal => "page-total",
            Self::CollectionLink => "collection-link",
            Self::Breadcrumb => "breadcrumb",
            Self::NextPage => "next-page",
            Self::ImageTools => "image-tools",
            Self::DownloadImage => "download-image",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a document session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionFault {
    /// An element handle no longer refers to the rendered page
    #[error("stale element reference")]
    Stale,

    #[error("no element found for {0}")]
    MissingElement(Role),

    /// The page rendered without the expected content
    #[error("empty read")]
    EmptyRead,

    #[error("unreadable {role} value '{value}'")]
    Malformed { role: Role, value: String },

    #[error("{0}")]
    Other(String),
}

impl SessionFault {
    /// Stale references, missing elements and empty reads are worth a retry
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Stale | Self::MissingElement(_) | Self::EmptyRead)
    }
}

/// A live, navigable record viewer
#[async_trait]
pub trait DocumentSession: Send {
    /// Handle to a rendered element
    type Element: Clone + Send + Sync;

    async fn navigate(&mut self, url: &str) -> Result<(), SessionFault>;

    async fn current_location(&mut self) -> Result<String, SessionFault>;

    /// Finds the first element with a role, or `MissingElement`
    async fn find(&mut self, role: Role) -> Result<Self::Element, SessionFault>;

    /// Finds every element with a role (possibly none)
    async fn find_all(&mut self, role: Role) -> Result<Vec<Self::Element>, SessionFault>;

    /// Finds every element with a role below `parent`
    async fn find_all_within(
        &mut self,
        parent: &Self::Element,
        role: Role,
    ) -> Result<Vec<Self::Element>, SessionFault>;

    async fn read_text(&mut self, element: &Self::Element) -> Result<String, SessionFault>;

    /// Reads an attribute or property; `None` when it is not set
    async fn read_attribute(
        &mut self,
        element: &Self::Element,
        name: &str,
    ) -> Result<Option<String>, SessionFault>;

    async fn click(&mut self, element: &Self::Element) -> Result<(), SessionFault>;

    async fn is_enabled(&mut self, element: &Self::Element) -> Result<bool, SessionFault>;

    async fn reload(&mut self) -> Result<(), SessionFault>;
}
