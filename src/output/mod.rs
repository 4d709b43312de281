//! Output module for reporting on harvested data
//!
//! This module handles:
//! - Recording harvest statistics from the store
//! - Printing them for the command line

pub mod stats;

pub use stats::{load_statistics, print_statistics, HarvestStatistics};
