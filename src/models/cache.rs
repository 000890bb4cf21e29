//! Time-bounded cache for the model list.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::ClientError;
use crate::models::Model;

/// Immutable model list shared between readers.
pub type ModelSnapshot = Arc<Vec<Model>>;

#[derive(Debug, Default)]
struct Entry {
    models: ModelSnapshot,
    expires_at: Option<Instant>,
}

impl Entry {
    fn fresh(&self, now: Instant) -> Option<ModelSnapshot> {
        match self.expires_at {
            Some(expires_at) if now < expires_at && !self.models.is_empty() => {
                Some(self.models.clone())
            }
            _ => None,
        }
    }
}

/// Cache holding one model-list snapshot and its expiry.
///
/// The snapshot is replaced wholesale on refresh. A miss takes the write lock
/// and checks freshness again before fetching, so concurrent misses trigger a
/// single fetch.
#[derive(Debug)]
pub struct ModelCache {
    ttl: Duration,
    entry: RwLock<Entry>,
}

impl ModelCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: RwLock::new(Entry::default()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached snapshot while fresh, otherwise run `fetch` and store
    /// its result for `ttl` from the time it completed.
    ///
    /// A failed fetch leaves the previous snapshot in place.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<ModelSnapshot, ClientError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Model>, ClientError>>,
    {
        if let Some(models) = self.entry.read().await.fresh(Instant::now()) {
            return Ok(models);
        }

        let mut entry = self.entry.write().await;
        if let Some(models) = entry.fresh(Instant::now()) {
            return Ok(models);
        }

        let models = Arc::new(fetch().await?);
        debug!("model cache refreshed with {} models", models.len());
        *entry = Entry {
            models: models.clone(),
            expires_at: Some(Instant::now() + self.ttl),
        };
        Ok(models)
    }

    /// Drop the snapshot so the next read fetches.
    pub async fn invalidate(&self) {
        *self.entry.write().await = Entry::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn model(id: &str) -> Model {
        Model {
            id: id.to_string(),
            ..Default::default()
        }
    }

    async fn fetch_counted(calls: &AtomicUsize) -> Result<Vec<Model>, ClientError> {
        calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(vec![model("a/1"), model("b/2")])
    }

    #[tokio::test]
    async fn serves_same_snapshot_within_ttl() {
        let cache = ModelCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        let first = cache.get_or_fetch(|| fetch_counted(&calls)).await.unwrap();
        let second = cache.get_or_fetch(|| fetch_counted(&calls)).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refetches_after_expiry_once_under_concurrency() {
        let cache = ModelCache::new(Duration::from_millis(30));
        let calls = AtomicUsize::new(0);

        cache.get_or_fetch(|| fetch_counted(&calls)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let results = futures::future::join_all(
            (0..8).map(|_| cache.get_or_fetch(|| fetch_counted(&calls))),
        )
        .await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_snapshot_is_not_served() {
        let cache = ModelCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let fetch = move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        };

        cache.get_or_fetch(fetch).await.unwrap();
        cache.get_or_fetch(fetch).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_previous_state() {
        let cache = ModelCache::new(Duration::from_secs(60));
        let err = cache
            .get_or_fetch(|| async { Err(ClientError::Cancelled) })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Cancelled));

        let calls = AtomicUsize::new(0);
        let models = cache.get_or_fetch(|| fetch_counted(&calls)).await.unwrap();
        assert_eq!(models.len(), 2);

        cache.invalidate().await;
        cache.get_or_fetch(|| fetch_counted(&calls)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
