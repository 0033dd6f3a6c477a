use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::StorageError;
use crate::models::{HistoryEntry, SavedPageEntry, Title};
use crate::storage::DataStore;

#[derive(Debug, Default)]
struct MemoryState {
    history: HashMap<Title, HistoryEntry>,
    saved: Vec<SavedPageEntry>,
}

/// Volatile `DataStore`.
///
/// Every write can be delayed by a fixed latency and made to fail on demand,
/// which makes it the store of choice for exercising the tracker's
/// persistence path without a database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    write_delay: Mutex<Duration>,
    failing: AtomicBool,
    load_failing: AtomicBool,
    writes: AtomicUsize,
    attempts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(self, entries: Vec<HistoryEntry>) -> Self {
        {
            let mut state = self.state();
            for entry in entries {
                state.history.insert(entry.title.clone(), entry);
            }
        }
        self
    }

    pub fn with_saved(self, entries: Vec<SavedPageEntry>) -> Self {
        self.state().saved.extend(entries);
        self
    }

    pub fn set_write_delay(&self, delay: Duration) {
        *self
            .write_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// When set, every write fails with `StorageError::Unavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// When set, both loads fail with `StorageError::Unavailable`.
    pub fn set_load_failing(&self, failing: bool) {
        self.load_failing.store(failing, Ordering::SeqCst);
    }

    /// Number of writes that completed successfully.
    pub fn completed_writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of writes attempted, including failed ones.
    pub fn write_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn stored_history(&self, title: &Title) -> Option<HistoryEntry> {
        self.state().history.get(title).cloned()
    }

    pub fn stored_saved(&self, title: &Title) -> Option<SavedPageEntry> {
        self.state().saved.iter().find(|e| &e.title == title).cloned()
    }

    pub fn history_len(&self) -> usize {
        self.state().history.len()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn write<F>(&self, apply: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut MemoryState) + Send,
    {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *self
            .write_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory store set to fail".to_string()));
        }
        apply(&mut self.state());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn check_load(&self) -> Result<(), StorageError> {
        if self.load_failing.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory store set to fail loads".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn load_history(&self) -> Result<Vec<HistoryEntry>, StorageError> {
        self.check_load()?;
        let mut entries: Vec<HistoryEntry> = self.state().history.values().cloned().collect();
        entries.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        Ok(entries)
    }

    async fn load_saved(&self) -> Result<Vec<SavedPageEntry>, StorageError> {
        self.check_load()?;
        Ok(self.state().saved.clone())
    }

    async fn persist_history_delta(&self, entry: &HistoryEntry) -> Result<(), StorageError> {
        let entry = entry.clone();
        self.write(move |state| {
            state.history.insert(entry.title.clone(), entry);
        })
        .await
    }

    async fn persist_saved_delta(&self, entry: &SavedPageEntry) -> Result<(), StorageError> {
        let entry = entry.clone();
        self.write(move |state| {
            match state.saved.iter_mut().find(|e| e.title == entry.title) {
                Some(existing) => *existing = entry,
                None => state.saved.push(entry),
            }
        })
        .await
    }

    async fn delete_history(&self, title: &Title) -> Result<(), StorageError> {
        let title = title.clone();
        self.write(move |state| {
            state.history.remove(&title);
        })
        .await
    }

    async fn delete_saved(&self, title: &Title) -> Result<(), StorageError> {
        let title = title.clone();
        self.write(move |state| state.saved.retain(|e| e.title != title))
            .await
    }

    async fn clear_history(&self) -> Result<(), StorageError> {
        self.write(|state| state.history.clear()).await
    }
}
