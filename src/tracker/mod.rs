//! The coordinator between the presentation layer, the in-memory lists and
//! the durable store.

use chrono::Utc;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::diagnostics::DiagnosticsSink;
use crate::error::TrackingError;
use crate::lists::{HistoryList, SavedPageList, Snapshot};
use crate::models::{
    DiscoveryMethod, HistoryEntry, NavigationIntent, SaveStatus, SavedPageEntry, Title,
};
use crate::storage::DataStore;

mod persistence;

use persistence::{run_worker, PersistOp};

/// Entry point the presentation layer holds on to. Opening an article never
/// fails and never waits on storage.
pub trait ArticleOpener: Send + Sync {
    fn open_article(&self, title: Title, discovery_method: DiscoveryMethod) -> NavigationIntent;
}

/// Owns the session's history and saved-page lists.
///
/// Each list has its own lock; no operation holds both. Every mutation
/// queues its write while still holding the list's write lock, and a single
/// background task applies the queue in order, so the store sees changes in
/// the same order as memory and converges on it.
pub struct ArticleTracker {
    history: RwLock<HistoryList>,
    saved: RwLock<SavedPageList>,
    record_saved_opens: bool,
    diagnostics: Arc<dyn DiagnosticsSink>,
    persist_tx: mpsc::UnboundedSender<PersistOp>,
    worker: Option<JoinHandle<()>>,
}

impl ArticleTracker {
    /// Hydrates both lists from `store` and starts the persistence worker.
    ///
    /// The tracker only exists once hydration is over, so no open request can
    /// observe the pre-hydration empty state. A list that fails to load starts
    /// empty and the failure is reported.
    pub async fn initialize(
        config: &Config,
        store: Arc<dyn DataStore>,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        let mut history = HistoryList::new(config.history_capacity());
        let mut saved = SavedPageList::new();
        let (persist_tx, persist_rx) = mpsc::unbounded_channel();

        match store.load_history().await {
            Ok(entries) => {
                let drops = history.hydrate(entries);
                if !drops.duplicates.is_empty() {
                    diagnostics.report(&TrackingError::Inconsistency(format!(
                        "{} duplicate history entries in storage",
                        drops.duplicates.len()
                    )));
                }
                // Deletes are keyed by title, so a row sharing its title with a
                // kept entry must stay: deleting it would remove the kept one.
                for entry in drops.trimmed.into_iter().chain(drops.duplicates) {
                    if history.contains(&entry.title) {
                        continue;
                    }
                    debug!("Dropping stored history entry for {}", entry.title);
                    let _ = persist_tx.send(PersistOp::DeleteHistory(entry.title));
                }
            }
            Err(source) => diagnostics.report(&TrackingError::Storage {
                operation: "load history",
                source,
            }),
        }

        match store.load_saved().await {
            Ok(entries) => {
                let duplicates = saved.hydrate(entries);
                if !duplicates.is_empty() {
                    diagnostics.report(&TrackingError::Inconsistency(format!(
                        "{} duplicate saved pages in storage",
                        duplicates.len()
                    )));
                }
            }
            Err(source) => diagnostics.report(&TrackingError::Storage {
                operation: "load saved pages",
                source,
            }),
        }

        info!(
            "Hydrated {} history entries and {} saved pages",
            history.len(),
            saved.len()
        );

        let worker = tokio::spawn(run_worker(store, diagnostics.clone(), persist_rx));

        Self {
            history: RwLock::new(history),
            saved: RwLock::new(saved),
            record_saved_opens: config.record_saved_opens,
            diagnostics,
            persist_tx,
            worker: Some(worker),
        }
    }

    /// Records the visit and returns what to display. See [`ArticleOpener`].
    pub fn open_article(&self, title: Title, discovery_method: DiscoveryMethod) -> NavigationIntent {
        if discovery_method == DiscoveryMethod::Saved && !self.is_saved(&title) {
            self.diagnostics.report(&TrackingError::Inconsistency(format!(
                "{} opened from the saved list but is not saved",
                title
            )));
        }

        if discovery_method != DiscoveryMethod::Saved || self.record_saved_opens {
            let mut history = self.history_mut();
            let visit = history.record_visit(title.clone(), discovery_method, Utc::now());
            if let Some(evicted) = visit.evicted {
                debug!("Evicted {} from history", evicted.title);
                self.enqueue(PersistOp::DeleteHistory(evicted.title));
            }
            self.enqueue(PersistOp::History(visit.entry));
        }

        NavigationIntent {
            title,
            discovery_method,
        }
    }

    pub fn history_entries(&self) -> Snapshot<HistoryEntry> {
        self.history().entries()
    }

    pub fn history_entry(&self, title: &Title) -> Option<HistoryEntry> {
        self.history().get(title).cloned()
    }

    pub fn remove_from_history(&self, title: &Title) -> bool {
        let mut history = self.history_mut();
        let removed = history.remove(title);
        if removed {
            self.enqueue(PersistOp::DeleteHistory(title.clone()));
        }
        removed
    }

    pub fn clear_history(&self) {
        let mut history = self.history_mut();
        history.clear();
        self.enqueue(PersistOp::ClearHistory);
        drop(history);
        info!("History cleared");
    }

    /// Returns `true` when the page was newly saved.
    pub fn save_page(&self, title: Title) -> bool {
        let mut saved = self.saved_mut();
        let created = saved.save(title, Utc::now());
        match created {
            Some(entry) => {
                self.enqueue(PersistOp::Saved(entry));
                true
            }
            None => false,
        }
    }

    pub fn unsave_page(&self, title: &Title) -> bool {
        let mut saved = self.saved_mut();
        let removed = saved.unsave(title);
        if removed {
            self.enqueue(PersistOp::DeleteSaved(title.clone()));
        }
        removed
    }

    /// Errors are also sent to the diagnostics sink.
    pub fn update_save_status(
        &self,
        title: &Title,
        status: SaveStatus,
    ) -> Result<SavedPageEntry, TrackingError> {
        let mut saved = self.saved_mut();
        let result = saved.update_status(title, status);
        match result {
            Ok(entry) => {
                self.enqueue(PersistOp::Saved(entry.clone()));
                Ok(entry)
            }
            Err(err) => {
                drop(saved);
                self.diagnostics.report(&err);
                Err(err)
            }
        }
    }

    pub fn is_saved(&self, title: &Title) -> bool {
        self.saved().contains(title)
    }

    pub fn saved_entry(&self, title: &Title) -> Option<SavedPageEntry> {
        self.saved().get(title).cloned()
    }

    pub fn saved_entries(&self) -> Snapshot<SavedPageEntry> {
        self.saved().entries()
    }

    /// Waits until everything enqueued before this call has been handed to
    /// the store.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.persist_tx.send(PersistOp::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }

    /// Drains pending persistence and stops the worker.
    pub async fn shutdown(mut self) {
        let _ = self.persist_tx.send(PersistOp::Shutdown);
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                warn!("Persistence worker ended abnormally: {}", e);
            }
        }
    }

    fn enqueue(&self, op: PersistOp) {
        if self.persist_tx.send(op).is_err() {
            warn!("Persistence worker is gone, change kept in memory only");
        }
    }

    fn history(&self) -> RwLockReadGuard<'_, HistoryList> {
        self.history.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn history_mut(&self) -> RwLockWriteGuard<'_, HistoryList> {
        self.history.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn saved(&self) -> RwLockReadGuard<'_, SavedPageList> {
        self.saved.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn saved_mut(&self) -> RwLockWriteGuard<'_, SavedPageList> {
        self.saved.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ArticleOpener for ArticleTracker {
    fn open_article(&self, title: Title, discovery_method: DiscoveryMethod) -> NavigationIntent {
        ArticleTracker::open_article(self, title, discovery_method)
    }
}

// Dropping without `shutdown` cancels whatever is still queued; the next
// hydration reconciles from what did reach the store.
impl Drop for ArticleTracker {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}
