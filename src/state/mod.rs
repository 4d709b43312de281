//! State module for tracking page-walker progress
//!
//! # Components
//!
//! - `WalkerState`: where the page walker is in its record-page cycle
//! - `ExtractionStep`: which extraction step a fault came from

mod walker_state;

// Re-export main types
pub use walker_state::{ExtractionStep, WalkerState};
