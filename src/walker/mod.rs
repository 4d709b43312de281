//! Record page walking
//!
//! This module handles:
//! - The document session capability and its WebDriver implementation
//! - The operator handoff that starts a walk
//! - The page walker state machine with bounded per-step retries
//! - Assembly of index rows with their page lineage

mod operator;
mod page_walker;
mod rows;
mod session;
mod webdriver;

pub use operator::{Immediate, OperatorSignal, StdinOperator};
pub use page_walker::{PageWalker, WalkReport, WalkerSettings};
pub use rows::{
    assemble_rows, collection_key_from_location, image_id_from_location, parse_counter, Breadcrumb,
    IndexTable, PageNavigation,
};
pub use session::{DocumentSession, Role, SessionFault};
pub use webdriver::{WebDriverSession, WebElement, ELEMENT_KEY};
