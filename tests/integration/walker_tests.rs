//! Integration tests for the page walker
//!
//! A scripted in-memory viewer stands in for the browser so that page
//! sequences and fault patterns are deterministic.

use async_trait::async_trait;
use catalog_harvest::storage::{lock_storage, share, SharedStorage, SqliteStorage};
use catalog_harvest::walker::{
    DocumentSession, Immediate, PageWalker, Role, SessionFault, WalkerSettings,
};
use catalog_harvest::{Collection, ExtractionStep, HarvestError, WalkerState};
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const TITLE: &str = "1790 United States Federal Census";
const TABLE: &str = "1790_united_states_federal_census";

struct FakePage {
    location: String,
    rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Toggle,
    Row(usize),
    Cell(usize, usize),
    PageInput,
    PageTotal,
    Link,
    Crumb(usize),
    Next,
    Tools,
    Download,
}

/// Record viewer with an index panel, a two-level browse path, an image
/// tool popout and a next-page button
struct FakeViewer {
    pages: Vec<FakePage>,
    current: usize,
    panel_open: bool,
    focused_crumb: Option<usize>,
    tools_open: bool,
    /// Pages whose image download was triggered, in order
    saved_images: Vec<usize>,
    /// Remaining stale faults to raise when the index rows are read, by page
    stale_index_reads: HashMap<usize, u32>,
    /// Remaining index reads that show only the header row, by page
    header_only_reads: HashMap<usize, u32>,
    /// Remaining breadcrumb lookups that find nothing, by page
    missing_crumb_reads: HashMap<usize, u32>,
    reloads: u32,
}

const COLUMNS: [&str; 3] = ["Name", "Age", "Relation"];
const CRUMBS: [(&str, &str); 2] = [("New York", "State"), ("Albany", "County")];

impl FakeViewer {
    fn new(page_count: usize, rows_per_page: usize) -> Self {
        let pages = (0..page_count)
            .map(|p| FakePage {
                location: format!(
                    "https://viewer.example/imageviewer/collections/5058/images/img_{:03}",
                    p + 1
                ),
                rows: (0..rows_per_page)
                    .map(|r| {
                        vec![
                            format!("Person {}-{}", p + 1, r + 1),
                            format!("{}", 20 + r),
                            "Head".to_string(),
                        ]
                    })
                    .collect(),
            })
            .collect();

        Self {
            pages,
            current: 0,
            panel_open: false,
            focused_crumb: None,
            tools_open: false,
            saved_images: Vec::new(),
            stale_index_reads: HashMap::new(),
            header_only_reads: HashMap::new(),
            missing_crumb_reads: HashMap::new(),
            reloads: 0,
        }
    }

    fn with_stale_index_reads(mut self, page: usize, count: u32) -> Self {
        self.stale_index_reads.insert(page, count);
        self
    }

    fn with_header_only_reads(mut self, page: usize, count: u32) -> Self {
        self.header_only_reads.insert(page, count);
        self
    }

    fn with_missing_crumbs(mut self, page: usize, count: u32) -> Self {
        self.missing_crumb_reads.insert(page, count);
        self
    }

    fn with_location(mut self, page: usize, location: &str) -> Self {
        self.pages[page].location = location.to_string();
        self
    }

    fn page(&self) -> &FakePage {
        &self.pages[self.current]
    }

    fn take_injected(injected: &mut HashMap<usize, u32>, page: usize) -> bool {
        match injected.get_mut(&page) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl DocumentSession for FakeViewer {
    type Element = Node;

    async fn navigate(&mut self, url: &str) -> Result<(), SessionFault> {
        match self.pages.iter().position(|p| p.location == url) {
            Some(index) => {
                self.current = index;
                Ok(())
            }
            None => Err(SessionFault::Other(format!("unknown page {}", url))),
        }
    }

    async fn current_location(&mut self) -> Result<String, SessionFault> {
        Ok(self.page().location.clone())
    }

    async fn find(&mut self, role: Role) -> Result<Node, SessionFault> {
        self.find_all(role)
            .await?
            .into_iter()
            .next()
            .ok_or(SessionFault::MissingElement(role))
    }

    async fn find_all(&mut self, role: Role) -> Result<Vec<Node>, SessionFault> {
        let nodes = match role {
            Role::IndexToggle => vec![Node::Toggle],
            Role::PageNumber => vec![Node::PageInput],
            Role::PageTotal => vec![Node::PageTotal],
            Role::CollectionLink => vec![Node::Link],
            Role::NextPage => vec![Node::Next],
            Role::ImageTools => vec![Node::Tools],
            Role::DownloadImage if self.tools_open => vec![Node::Download],
            Role::DownloadImage => Vec::new(),
            Role::Breadcrumb => {
                if Self::take_injected(&mut self.missing_crumb_reads, self.current) {
                    return Err(SessionFault::MissingElement(Role::Breadcrumb));
                }
                (0..CRUMBS.len()).map(Node::Crumb).collect()
            }
            Role::IndexCell => Vec::new(),
            Role::IndexRow => {
                if Self::take_injected(&mut self.stale_index_reads, self.current) {
                    return Err(SessionFault::Stale);
                }
                if !self.panel_open {
                    return Ok(Vec::new());
                }
                if Self::take_injected(&mut self.header_only_reads, self.current) {
                    return Ok(vec![Node::Row(0)]);
                }
                // Header row plus one row per record
                (0..=self.page().rows.len()).map(Node::Row).collect()
            }
        };
        Ok(nodes)
    }

    async fn find_all_within(&mut self, parent: &Node, role: Role) -> Result<Vec<Node>, SessionFault> {
        match (parent, role) {
            (Node::Row(r), Role::IndexCell) => {
                Ok((0..COLUMNS.len()).map(|c| Node::Cell(*r, c)).collect())
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn read_text(&mut self, element: &Node) -> Result<String, SessionFault> {
        let text = match *element {
            Node::Cell(0, c) => COLUMNS[c].to_string(),
            Node::Cell(r, c) => self.page().rows[r - 1][c].clone(),
            Node::PageTotal => format!("of {}", self.pages.len()),
            Node::Link => TITLE.to_string(),
            Node::Crumb(i) => CRUMBS[i].0.to_string(),
            _ => String::new(),
        };
        Ok(text)
    }

    async fn read_attribute(&mut self, element: &Node, name: &str) -> Result<Option<String>, SessionFault> {
        let value = match (*element, name) {
            (Node::Toggle, "class") => Some(if self.panel_open {
                "iconPersonList toggleActive".to_string()
            } else {
                "iconPersonList".to_string()
            }),
            (Node::PageInput, "value") => Some((self.current + 1).to_string()),
            (Node::Link, "href") => Some("https://viewer.example/collections/5058".to_string()),
            (Node::Crumb(i), "value") => Some(CRUMBS[i].0.to_string()),
            (Node::Crumb(i), "title") if self.focused_crumb == Some(i) => {
                Some(CRUMBS[i].1.to_string())
            }
            _ => None,
        };
        Ok(value)
    }

    async fn click(&mut self, element: &Node) -> Result<(), SessionFault> {
        match *element {
            Node::Toggle => self.panel_open = !self.panel_open,
            Node::Crumb(i) => self.focused_crumb = Some(i),
            Node::Tools => self.tools_open = !self.tools_open,
            Node::Download => {
                self.saved_images.push(self.current);
                self.tools_open = false;
            }
            Node::Next => {
                if self.current + 1 >= self.pages.len() {
                    return Err(SessionFault::Other("next page is disabled".to_string()));
                }
                self.current += 1;
                self.focused_crumb = None;
            }
            _ => {}
        }
        Ok(())
    }

    async fn is_enabled(&mut self, element: &Node) -> Result<bool, SessionFault> {
        Ok(match element {
            Node::Next => self.current + 1 < self.pages.len(),
            _ => true,
        })
    }

    async fn reload(&mut self) -> Result<(), SessionFault> {
        self.reloads += 1;
        self.panel_open = false;
        self.focused_crumb = None;
        self.tools_open = false;
        Ok(())
    }
}

fn settings() -> WalkerSettings {
    WalkerSettings {
        retry_budget: 3,
        retry_delay: Duration::ZERO,
        record_viewer_pattern: "/imageviewer/".to_string(),
        index_active_class: "toggleActive".to_string(),
        max_pages: None,
        save_images: false,
    }
}

fn memory_storage() -> SharedStorage {
    share(SqliteStorage::open_in_memory().expect("in-memory database"))
}

#[tokio::test]
async fn test_walk_three_pages_with_lineage() {
    let storage = memory_storage();
    let mut walker = PageWalker::new(FakeViewer::new(3, 5), storage.clone(), settings());

    let report = walker.run(&mut Immediate).await.unwrap();
    assert_eq!(walker.state(), WalkerState::Done);
    assert_eq!(report.pages, 3);
    assert_eq!(report.rows_extracted, 15);
    assert_eq!(report.rows_inserted, 15);
    assert_eq!(report.tables, vec![TABLE.to_string()]);
    assert_eq!(report.retries, 0);
    assert_eq!(report.breadcrumb_focus_clicks, 6);

    let rows = lock_storage(&storage).unwrap().get_rows(TABLE).unwrap();
    assert_eq!(rows.len(), 15);

    for (i, row) in rows.iter().enumerate() {
        let page = i / 5 + 1;
        assert_eq!(row.get("page"), Some(page.to_string().as_str()));
        assert_eq!(row.get("total_pages"), Some("3"));
        assert_eq!(row.get("image"), Some(format!("img_{:03}", page).as_str()));
        assert_eq!(row.get("breadcrumb_0"), Some("New York"));
        assert_eq!(row.get("breadcrumb_0_title"), Some("State"));
        assert_eq!(row.get("breadcrumb_1"), Some("Albany"));
        assert_eq!(row.get("breadcrumb_1_title"), Some("County"));
        assert_eq!(row.get("collection_title"), Some(TITLE));
        assert_eq!(row.get("Name"), Some(format!("Person {}-{}", page, i % 5 + 1).as_str()));
    }
}

#[tokio::test]
async fn test_transient_fault_within_budget_recovers() {
    let storage = memory_storage();
    let viewer = FakeViewer::new(3, 5).with_stale_index_reads(1, 1);
    let mut walker = PageWalker::new(viewer, storage.clone(), settings());

    let report = walker.run(&mut Immediate).await.unwrap();
    assert_eq!(walker.state(), WalkerState::Done);
    assert_eq!(report.retries, 1);
    assert_eq!(report.rows_extracted, 15);
    assert_eq!(walker.session().reloads, 1);
    assert_eq!(lock_storage(&storage).unwrap().count_rows(TABLE).unwrap(), 15);
}

#[tokio::test]
async fn test_fault_beyond_budget_fails_page() {
    let storage = memory_storage();
    let viewer = FakeViewer::new(3, 5).with_stale_index_reads(1, 4);
    let mut walker = PageWalker::new(viewer, storage.clone(), settings());

    let err = walker.run(&mut Immediate).await.unwrap_err();
    match err {
        HarvestError::Extraction {
            page,
            image,
            step,
            attempts,
            fault,
        } => {
            assert_eq!(page, 2);
            assert_eq!(image, "img_002");
            assert_eq!(step, ExtractionStep::Index);
            assert_eq!(attempts, 4);
            assert_eq!(fault, SessionFault::Stale);
        }
        other => panic!("unexpected error: {}", other),
    }

    assert_eq!(walker.state(), WalkerState::Failed);
    assert_eq!(walker.report().pages, 1);
    assert_eq!(walker.report().retries, 3);

    // Only the first page was committed
    let rows = lock_storage(&storage).unwrap().get_rows(TABLE).unwrap();
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|row| row.get("page") == Some("1")));
}

#[tokio::test]
async fn test_header_only_index_is_reread_without_reload() {
    let storage = memory_storage();
    let viewer = FakeViewer::new(3, 5).with_header_only_reads(0, 1);
    let mut walker = PageWalker::new(viewer, storage.clone(), settings());

    let report = walker.run(&mut Immediate).await.unwrap();
    assert_eq!(walker.state(), WalkerState::Done);
    assert_eq!(report.retries, 1);
    assert_eq!(walker.session().reloads, 0);
    assert_eq!(lock_storage(&storage).unwrap().count_rows(TABLE).unwrap(), 15);
}

#[tokio::test]
async fn test_missing_breadcrumbs_recover_after_reload() {
    let storage = memory_storage();
    let viewer = FakeViewer::new(3, 5).with_missing_crumbs(1, 1);
    let mut walker = PageWalker::new(viewer, storage.clone(), settings());

    let report = walker.run(&mut Immediate).await.unwrap();
    assert_eq!(walker.state(), WalkerState::Done);
    assert_eq!(report.retries, 1);
    assert_eq!(report.breadcrumb_focus_clicks, 6);
    assert_eq!(walker.session().reloads, 1);

    let rows = lock_storage(&storage).unwrap().get_rows(TABLE).unwrap();
    assert_eq!(rows.len(), 15);
    assert!(rows
        .iter()
        .all(|row| row.get("breadcrumb_1_title") == Some("County")));
}

#[tokio::test]
async fn test_missing_breadcrumbs_beyond_budget_fail_navigation() {
    let storage = memory_storage();
    let viewer = FakeViewer::new(3, 5).with_missing_crumbs(1, 4);
    let mut walker = PageWalker::new(viewer, storage.clone(), settings());

    let err = walker.run(&mut Immediate).await.unwrap_err();
    match err {
        HarvestError::Extraction {
            page,
            image,
            step,
            attempts,
            fault,
        } => {
            assert_eq!(page, 2);
            assert_eq!(image, "img_002");
            assert_eq!(step, ExtractionStep::Navigation);
            assert_eq!(attempts, 4);
            assert_eq!(fault, SessionFault::MissingElement(Role::Breadcrumb));
        }
        other => panic!("unexpected error: {}", other),
    }

    assert_eq!(walker.state(), WalkerState::Failed);
    assert_eq!(walker.report().retries, 3);
    assert_eq!(walker.session().reloads, 3);

    // The index of page 2 was read but never committed
    let rows = lock_storage(&storage).unwrap().get_rows(TABLE).unwrap();
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|row| row.get("page") == Some("1")));
}

#[tokio::test]
async fn test_page_images_saved_before_index() {
    let storage = memory_storage();
    let mut saving = settings();
    saving.save_images = true;
    let mut walker = PageWalker::new(FakeViewer::new(3, 5), storage.clone(), saving);

    let report = walker.run(&mut Immediate).await.unwrap();
    assert_eq!(report.images_saved, 3);
    assert_eq!(report.images_withheld, 0);
    assert_eq!(walker.session().saved_images, vec![0, 1, 2]);
    assert_eq!(report.rows_extracted, 15);
}

#[tokio::test]
async fn test_collection_forbidding_saves_keeps_images() {
    let storage = memory_storage();
    let locked = Collection {
        can_save_image: Some(false),
        ..Collection::new("5058")
    };
    lock_storage(&storage)
        .unwrap()
        .upsert_collection(&locked)
        .unwrap();

    let mut saving = settings();
    saving.save_images = true;
    let mut walker = PageWalker::new(FakeViewer::new(3, 5), storage.clone(), saving);

    let report = walker.run(&mut Immediate).await.unwrap();
    assert_eq!(report.images_saved, 0);
    assert_eq!(report.images_withheld, 3);
    assert!(walker.session().saved_images.is_empty());
    assert_eq!(lock_storage(&storage).unwrap().count_rows(TABLE).unwrap(), 15);
}

#[tokio::test]
async fn test_images_not_saved_by_default() {
    let storage = memory_storage();
    let mut walker = PageWalker::new(FakeViewer::new(2, 1), storage, settings());

    let report = walker.run(&mut Immediate).await.unwrap();
    assert_eq!(report.images_saved, 0);
    assert!(walker.session().saved_images.is_empty());
}

#[tokio::test]
async fn test_non_viewer_location_is_invalid_page() {
    let storage = memory_storage();
    let viewer = FakeViewer::new(2, 5).with_location(0, "https://viewer.example/search/results");
    let mut walker = PageWalker::new(viewer, storage.clone(), settings());

    let err = walker.run(&mut Immediate).await.unwrap_err();
    assert!(matches!(
        err,
        HarvestError::InvalidPage { ref location } if location.ends_with("/search/results")
    ));
    assert_eq!(walker.state(), WalkerState::Failed);
    assert!(lock_storage(&storage).unwrap().list_row_tables().unwrap().is_empty());
}

#[tokio::test]
async fn test_page_limit_ends_walk() {
    let storage = memory_storage();
    let mut limited = settings();
    limited.max_pages = Some(2);
    let mut walker = PageWalker::new(FakeViewer::new(5, 3), storage.clone(), limited);

    let report = walker.run(&mut Immediate).await.unwrap();
    assert_eq!(walker.state(), WalkerState::Done);
    assert_eq!(report.pages, 2);
    assert_eq!(lock_storage(&storage).unwrap().count_rows(TABLE).unwrap(), 6);
}

#[tokio::test]
async fn test_stop_request_before_first_page() {
    let storage = memory_storage();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut walker =
        PageWalker::new(FakeViewer::new(3, 5), storage, settings()).with_cancellation(cancel);

    let err = walker.run(&mut Immediate).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(walker.state(), WalkerState::Stopped);
    assert_eq!(walker.report().pages, 0);
}

#[tokio::test]
async fn test_walker_runs_once() {
    let storage = memory_storage();
    let mut walker = PageWalker::new(FakeViewer::new(1, 2), storage, settings());
    walker.run(&mut Immediate).await.unwrap();

    let err = walker.run(&mut Immediate).await.unwrap_err();
    assert!(matches!(err, HarvestError::InvalidTransition { .. }));
    assert_eq!(walker.state(), WalkerState::Done);
}
