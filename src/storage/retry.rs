use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, warn};

use crate::config::RetryConfig;
use crate::error::StorageError;
use crate::models::{HistoryEntry, SavedPageEntry, Title};
use crate::storage::DataStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    // Exponential: base, 2*base, 4*base, ...
    fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }
}

/// Wraps a `DataStore` so that writes are retried with exponential backoff.
/// Loads are not retried; hydration falls back to an empty list instead.
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: DataStore> RetryingStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

async fn with_retry<F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> Result<(), StorageError>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<(), StorageError>> + Send,
{
    let mut attempts = 0;

    loop {
        match op().await {
            Ok(()) => return Ok(()),
            Err(e) => {
                attempts += 1;
                if attempts >= policy.max_attempts {
                    error!("{} failed after {} attempts: {}", operation, attempts, e);
                    return Err(e);
                }
                let delay = policy.delay_after(attempts);
                warn!(
                    "{} failed: {}. Retrying in {:?}... (attempt {}/{})",
                    operation,
                    e,
                    delay,
                    attempts + 1,
                    policy.max_attempts
                );
                sleep(delay).await;
            }
        }
    }
}

#[async_trait]
impl<S: DataStore> DataStore for RetryingStore<S> {
    async fn load_history(&self) -> Result<Vec<HistoryEntry>, StorageError> {
        self.inner.load_history().await
    }

    async fn load_saved(&self) -> Result<Vec<SavedPageEntry>, StorageError> {
        self.inner.load_saved().await
    }

    async fn persist_history_delta(&self, entry: &HistoryEntry) -> Result<(), StorageError> {
        with_retry(&self.policy, "persist history entry", || {
            self.inner.persist_history_delta(entry)
        })
        .await
    }

    async fn persist_saved_delta(&self, entry: &SavedPageEntry) -> Result<(), StorageError> {
        with_retry(&self.policy, "persist saved page", || {
            self.inner.persist_saved_delta(entry)
        })
        .await
    }

    async fn delete_history(&self, title: &Title) -> Result<(), StorageError> {
        with_retry(&self.policy, "delete history entry", || {
            self.inner.delete_history(title)
        })
        .await
    }

    async fn delete_saved(&self, title: &Title) -> Result<(), StorageError> {
        with_retry(&self.policy, "delete saved page", || self.inner.delete_saved(title)).await
    }

    async fn clear_history(&self) -> Result<(), StorageError> {
        with_retry(&self.policy, "clear history", || self.inner.clear_history()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DiscoveryMethod;
    use crate::storage::MemoryStore;
    use chrono::Utc;
    use tokio_test::{assert_err, assert_ok};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
        }
    }

    fn entry() -> HistoryEntry {
        HistoryEntry {
            title: Title::new("en.wikipedia.org", "Backoff").unwrap(),
            discovery_method: DiscoveryMethod::Search,
            visited_at: Utc::now(),
            sequence: 1,
        }
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let store = RetryingStore::new(MemoryStore::new(), policy(3));
        store.inner().set_failing(true);

        assert_err!(store.persist_history_delta(&entry()).await);
        assert_eq!(store.inner().write_attempts(), 3);
        assert_eq!(store.inner().completed_writes(), 0);
    }

    #[tokio::test]
    async fn succeeds_without_retrying_healthy_store() {
        let store = RetryingStore::new(MemoryStore::new(), policy(3));

        assert_ok!(store.persist_history_delta(&entry()).await);
        assert_eq!(store.inner().write_attempts(), 1);
        assert!(store.inner().stored_history(&entry().title).is_some());
    }
}
