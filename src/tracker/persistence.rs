use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::diagnostics::DiagnosticsSink;
use crate::error::{StorageError, TrackingError};
use crate::models::{HistoryEntry, SavedPageEntry, Title};
use crate::storage::DataStore;

/// A unit of work for the background persistence worker.
#[derive(Debug)]
pub(crate) enum PersistOp {
    History(HistoryEntry),
    Saved(SavedPageEntry),
    DeleteHistory(Title),
    DeleteSaved(Title),
    ClearHistory,
    Flush(oneshot::Sender<()>),
    Shutdown,
}

impl PersistOp {
    fn label(&self) -> &'static str {
        match self {
            PersistOp::History(_) => "persist history entry",
            PersistOp::Saved(_) => "persist saved page",
            PersistOp::DeleteHistory(_) => "delete history entry",
            PersistOp::DeleteSaved(_) => "delete saved page",
            PersistOp::ClearHistory => "clear history",
            PersistOp::Flush(_) => "flush",
            PersistOp::Shutdown => "shutdown",
        }
    }

    async fn apply(&self, store: &dyn DataStore) -> Result<(), StorageError> {
        match self {
            PersistOp::History(entry) => store.persist_history_delta(entry).await,
            PersistOp::Saved(entry) => store.persist_saved_delta(entry).await,
            PersistOp::DeleteHistory(title) => store.delete_history(title).await,
            PersistOp::DeleteSaved(title) => store.delete_saved(title).await,
            PersistOp::ClearHistory => store.clear_history().await,
            PersistOp::Flush(_) | PersistOp::Shutdown => Ok(()),
        }
    }
}

/// Applies queued operations in order until `Shutdown` arrives or every
/// sender is gone. A failed write is reported and the queue moves on; the
/// in-memory lists stay as they are.
pub(crate) async fn run_worker(
    store: Arc<dyn DataStore>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    mut rx: mpsc::UnboundedReceiver<PersistOp>,
) {
    while let Some(op) = rx.recv().await {
        match op {
            PersistOp::Flush(ack) => {
                let _ = ack.send(());
            }
            PersistOp::Shutdown => {
                info!("Persistence worker shutting down");
                break;
            }
            op => {
                debug!("Applying {}", op.label());
                if let Err(source) = op.apply(store.as_ref()).await {
                    diagnostics.report(&TrackingError::Storage {
                        operation: op.label(),
                        source,
                    });
                }
            }
        }
    }
}
