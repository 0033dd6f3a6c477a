use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{DiscoveryMethod, Title};

/// A single visit record. The sequence index orders entries by recency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub title: Title,
    pub discovery_method: DiscoveryMethod,
    pub visited_at: DateTime<Utc>,
    pub sequence: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveStatus {
    Queued,
    Downloading,
    Saved,
    Failed,
}

impl SaveStatus {
    pub fn key(&self) -> &'static str {
        match self {
            SaveStatus::Queued => "queued",
            SaveStatus::Downloading => "downloading",
            SaveStatus::Saved => "saved",
            SaveStatus::Failed => "failed",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "queued" => Some(SaveStatus::Queued),
            "downloading" => Some(SaveStatus::Downloading),
            "saved" => Some(SaveStatus::Saved),
            "failed" => Some(SaveStatus::Failed),
            _ => None,
        }
    }

    /// Whether a saved page may move from `self` to `next`.
    ///
    /// Re-queueing is allowed from `Failed` (retry) and `Saved` (refresh).
    pub fn can_transition_to(&self, next: SaveStatus) -> bool {
        use SaveStatus::*;
        matches!(
            (self, next),
            (Queued, Downloading)
                | (Queued, Failed)
                | (Downloading, Saved)
                | (Downloading, Failed)
                | (Failed, Queued)
                | (Saved, Queued)
        )
    }
}

impl fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedPageEntry {
    pub title: Title,
    pub status: SaveStatus,
    pub saved_at: DateTime<Utc>,
}

/// What the presentation layer should display after an open request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationIntent {
    pub title: Title,
    pub discovery_method: DiscoveryMethod,
}
