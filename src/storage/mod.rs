use async_trait::async_trait;

use crate::error::StorageError;
use crate::models::{HistoryEntry, SavedPageEntry, Title};

mod memory;
mod retry;
mod sqlite;

pub use memory::MemoryStore;
pub use retry::{RetryPolicy, RetryingStore};
pub use sqlite::SqliteStore;

/// Durable backing for the history and saved-page lists.
///
/// `load_history` returns entries most recent first; `load_saved` returns
/// entries in the order they were saved. Deltas are upserts keyed by title.
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn load_history(&self) -> Result<Vec<HistoryEntry>, StorageError>;
    async fn load_saved(&self) -> Result<Vec<SavedPageEntry>, StorageError>;
    async fn persist_history_delta(&self, entry: &HistoryEntry) -> Result<(), StorageError>;
    async fn persist_saved_delta(&self, entry: &SavedPageEntry) -> Result<(), StorageError>;
    async fn delete_history(&self, title: &Title) -> Result<(), StorageError>;
    async fn delete_saved(&self, title: &Title) -> Result<(), StorageError>;
    async fn clear_history(&self) -> Result<(), StorageError>;
}
