//! Provenance-aware tracking of visited and saved articles.
//!
//! [`ArticleTracker`] records every article open together with its
//! [`DiscoveryMethod`], keeps the bounded history and the saved-page list in
//! memory, and persists changes to a [`DataStore`] in the background.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod lists;
pub mod models;
pub mod storage;
pub mod tracker;

pub use config::Config;
pub use diagnostics::{DiagnosticsSink, RecordingDiagnostics, TracingDiagnostics};
pub use error::{ErrorKind, StorageError, TrackingError};
pub use lists::{HistoryList, HydrationDrops, RecordedVisit, SavedPageList, Snapshot};
pub use models::{
    DiscoveryMethod, HistoryEntry, NavigationIntent, SaveStatus, SavedPageEntry, Site, Title,
};
pub use storage::{DataStore, MemoryStore, RetryPolicy, RetryingStore, SqliteStore};
pub use tracker::{ArticleOpener, ArticleTracker};
