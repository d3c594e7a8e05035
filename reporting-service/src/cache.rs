use std::{
    collections::HashMap,
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use chrono::{DateTime, Utc};
use futures::{
    future::{BoxFuture, Shared},
    FutureExt,
};
use parking_lot::Mutex;
use reporting_client::domain::{MasterTable, QueryKey};

use crate::error::ReportError;

type SharedFetch = Shared<BoxFuture<'static, Result<Arc<MasterTable>, ReportError>>>;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: QueryKey,
    pub table: Arc<MasterTable>,
    pub fetched_at: DateTime<Utc>,
}

enum Slot {
    Ready(CacheEntry),
    InFlight { id: u64, fetch: SharedFetch },
}

#[derive(Default)]
struct Inner {
    slots: Mutex<HashMap<QueryKey, Slot>>,
    next_id: AtomicU64,
}

impl Inner {
    /// Store the outcome of fetch `id`, unless the slot was invalidated or
    /// replaced while it ran.
    fn settle(&self, key: QueryKey, id: u64, result: &Result<Arc<MasterTable>, ReportError>) {
        let mut slots = self.slots.lock();
        let current = matches!(slots.get(&key), Some(Slot::InFlight { id: cur, .. }) if *cur == id);
        if !current {
            return;
        }
        match result {
            Ok(table) => {
                slots.insert(
                    key,
                    Slot::Ready(CacheEntry {
                        key,
                        table: Arc::clone(table),
                        fetched_at: Utc::now(),
                    }),
                );
            }
            Err(_) => {
                slots.remove(&key);
            }
        }
    }
}

/// Single-flight memoization of report results keyed by [`QueryKey`].
///
/// Concurrent callers for the same key share one fetch. Successful results
/// are kept until invalidated; failures are never stored.
#[derive(Clone, Default)]
pub struct ResultCache {
    inner: Arc<Inner>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: QueryKey,
        fetch: F,
    ) -> Result<Arc<MasterTable>, ReportError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<MasterTable, ReportError>> + Send + 'static,
    {
        let shared = {
            let mut slots = self.inner.slots.lock();
            match slots.get(&key) {
                Some(Slot::Ready(entry)) => {
                    metrics::counter!("report_cache_hits_total").increment(1);
                    return Ok(Arc::clone(&entry.table));
                }
                Some(Slot::InFlight { fetch, .. }) => {
                    metrics::counter!("report_cache_coalesced_total").increment(1);
                    fetch.clone()
                }
                None => {
                    metrics::counter!("report_cache_misses_total").increment(1);
                    let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                    let shared = spawn_fetch(Arc::clone(&self.inner), key, id, fetch());
                    slots.insert(
                        key,
                        Slot::InFlight {
                            id,
                            fetch: shared.clone(),
                        },
                    );
                    shared
                }
            }
        };

        shared.await
    }

    /// Drop the entry for `key`. An in-flight fetch still completes for its
    /// waiters but is not stored.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        self.inner.slots.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.inner.slots.lock().clear();
    }

    /// Number of stored results; in-flight fetches are not counted.
    pub fn len(&self) -> usize {
        self.inner
            .slots
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        matches!(self.inner.slots.lock().get(key), Some(Slot::Ready(_)))
    }

    pub fn entry(&self, key: &QueryKey) -> Option<CacheEntry> {
        match self.inner.slots.lock().get(key) {
            Some(Slot::Ready(entry)) => Some(entry.clone()),
            _ => None,
        }
    }
}

/// Run the fetch on its own task so the result is stored even when every
/// caller that was waiting on it has gone away.
fn spawn_fetch<Fut>(inner: Arc<Inner>, key: QueryKey, id: u64, fut: Fut) -> SharedFetch
where
    Fut: Future<Output = Result<MasterTable, ReportError>> + Send + 'static,
{
    let handle = tokio::spawn(async move {
        let result = fut.await.map(Arc::new);
        inner.settle(key, id, &result);
        result
    });

    async move {
        handle.await.unwrap_or_else(|e| {
            Err(ReportError::Upstream {
                attempts: 0,
                detail: format!("report task failed: {e}"),
            })
        })
    }
    .boxed()
    .shared()
}
