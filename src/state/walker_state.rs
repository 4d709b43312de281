/// Page walker state definitions
///
/// The walker moves through a fixed cycle per record page. Transitions outside
/// the cycle are rejected so that a bug in the driver loop surfaces as an
/// error instead of a silently skipped page.
use std::fmt;

/// Represents the current state of the page walker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalkerState {
    // ===== Active States =====
    /// Waiting for the operator to position the session on a record page
    AwaitingOperatorStart,

    /// Positioned on a record page, about to validate it
    OnRecordPage,

    /// Reading the index panel table
    ExtractingIndex,

    /// Reading counters, collection link and breadcrumbs
    ExtractingNavigation,

    // ===== Terminal States =====
    /// Reached the last page of the sequence
    Done,

    /// An unrecovered fault stopped the walk
    Failed,

    /// A stop signal was honored between pages
    Stopped,
}

impl WalkerState {
    /// Returns true if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Stopped)
    }

    /// Returns true if the walker is between start and a terminal state
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: WalkerState) -> bool {
        use WalkerState::*;

        if self.is_terminal() {
            return false;
        }
        if matches!(next, Failed | Stopped) {
            return true;
        }

        matches!(
            (self, next),
            (AwaitingOperatorStart, OnRecordPage)
                | (OnRecordPage, ExtractingIndex)
                | (ExtractingIndex, ExtractingNavigation)
                | (ExtractingNavigation, OnRecordPage)
                | (ExtractingNavigation, Done)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingOperatorStart => "awaiting_operator_start",
            Self::OnRecordPage => "on_record_page",
            Self::ExtractingIndex => "extracting_index",
            Self::ExtractingNavigation => "extracting_navigation",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for WalkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The extraction step a fault was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractionStep {
    ImageSave,
    Index,
    Navigation,
}

impl fmt::Display for ExtractionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ImageSave => write!(f, "image save"),
            Self::Index => write!(f, "index extraction"),
            Self::Navigation => write!(f, "navigation extraction"),
        }
    }
}
