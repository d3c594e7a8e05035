use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use reporting_client::domain::{MasterTable, MicrogridDescriptor, QueryKey};

use crate::{cache::ResultCache, error::ReportError, pipeline::Envelope, pipeline::ReportPipeline};

pub const DEFAULT_SESSION: &str = "default";

/// Sessions not touched for this long are dropped on the next access.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Default)]
struct ViewState {
    selection: Option<QueryKey>,
    current: Option<Envelope<Arc<MasterTable>>>,
    last_good: Option<Envelope<Arc<MasterTable>>>,
}

/// Per-user state: a result cache, the current filter selection and the
/// result shown for it.
///
/// Results arrive tagged with the key they were fetched for. Only a result
/// whose key still matches the current selection is applied to the view, so
/// a slow response for an abandoned selection can never overwrite a newer one.
pub struct SessionContext {
    id: String,
    cache: ResultCache,
    view: Mutex<ViewState>,
}

impl SessionContext {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cache: ResultCache::new(),
            view: Mutex::new(ViewState::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Make `key` the current selection. The view is cleared when the
    /// selection changes; the last good result is kept.
    pub fn select(&self, key: QueryKey) {
        let mut view = self.view.lock();
        if view.selection != Some(key) {
            view.selection = Some(key);
            view.current = None;
        }
    }

    pub fn selection(&self) -> Option<QueryKey> {
        self.view.lock().selection
    }

    /// Apply a finished result. Returns `false` and discards it when its key
    /// is no longer the current selection.
    pub fn apply(&self, result: Envelope<Arc<MasterTable>>) -> bool {
        let mut view = self.view.lock();
        if view.selection != Some(result.key) {
            tracing::debug!(
                session = %self.id,
                microgrid_id = result.key.microgrid_id,
                "discarding result for superseded selection"
            );
            return false;
        }
        view.last_good = Some(result.clone());
        view.current = Some(result);
        true
    }

    /// Result for the current selection, if it has arrived.
    pub fn current(&self) -> Option<Arc<MasterTable>> {
        self.view.lock()
            .current
            .as_ref()
            .map(|env| Arc::clone(&env.payload))
    }

    /// Most recent result applied in this session, for any selection.
    pub fn last_good(&self) -> Option<Envelope<Arc<MasterTable>>> {
        self.view.lock().last_good.clone()
    }

    /// Select `key`, then fetch it through the session cache and apply it.
    ///
    /// The table is returned to the caller even when a newer selection
    /// superseded it in the meantime; only the view ignores it.
    pub async fn request(
        &self,
        pipeline: &ReportPipeline,
        descriptor: &MicrogridDescriptor,
        key: QueryKey,
    ) -> Result<Arc<MasterTable>, ReportError> {
        self.select(key);

        let pipeline = pipeline.clone();
        let descriptor = descriptor.clone();
        let table = self
            .cache
            .get_or_fetch(key, move || async move { pipeline.run(&key, &descriptor).await })
            .await?;

        self.apply(Envelope::new(key, Arc::clone(&table)));
        Ok(table)
    }
}

struct Tracked {
    session: Arc<SessionContext>,
    last_seen: Instant,
}

/// Live sessions by id. A session ends explicitly via [`SessionRegistry::end`]
/// or implicitly once it has been idle for longer than the idle timeout.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Tracked>>,
    idle_timeout: Duration,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_idle_timeout(DEFAULT_IDLE_TIMEOUT)
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_timeout,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn get_or_create(&self, id: &str) -> Arc<SessionContext> {
        self.get_or_create_at(id, Instant::now())
    }

    /// Look up or start session `id` as of `now`, evicting idle sessions first.
    pub fn get_or_create_at(&self, id: &str, now: Instant) -> Arc<SessionContext> {
        let mut sessions = self.sessions.lock();

        let before = sessions.len();
        let idle_timeout = self.idle_timeout;
        sessions.retain(|_, tracked| {
            now.saturating_duration_since(tracked.last_seen) < idle_timeout
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::info!(evicted, remaining = sessions.len(), "evicted idle sessions");
            metrics::counter!("report_sessions_evicted_total").increment(evicted as u64);
        }

        if let Some(tracked) = sessions.get_mut(id) {
            tracked.last_seen = tracked.last_seen.max(now);
            return Arc::clone(&tracked.session);
        }
        tracing::info!(session = %id, "session started");
        let session = Arc::new(SessionContext::new(id));
        sessions.insert(
            id.to_string(),
            Tracked {
                session: Arc::clone(&session),
                last_seen: now,
            },
        );
        session
    }

    /// End a session, dropping its cache and view state.
    pub fn end(&self, id: &str) -> bool {
        let removed = self.sessions.lock().remove(id);
        if let Some(tracked) = &removed {
            tracing::info!(session = %id, cached = tracked.session.cache().len(), "session ended");
        }
        removed.is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone, Utc};

    fn key(microgrid_id: u64) -> QueryKey {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        QueryKey::new(
            microgrid_id,
            start,
            start + TimeDelta::days(1),
            TimeDelta::minutes(15),
        )
        .unwrap()
    }

    fn table(microgrid_id: u64) -> Arc<MasterTable> {
        Arc::new(MasterTable {
            microgrid_id,
            timezone: "UTC".to_string(),
            resolution_seconds: 900,
            columns: Vec::new(),
            rows: Vec::new(),
        })
    }

    #[test]
    fn result_for_superseded_selection_is_not_applied() {
        let session = SessionContext::new("s1");
        session.select(key(1));
        session.select(key(2));

        assert!(!session.apply(Envelope::new(key(1), table(1))));
        assert!(session.current().is_none());

        assert!(session.apply(Envelope::new(key(2), table(2))));
        assert_eq!(session.current().map(|t| t.microgrid_id), Some(2));
    }

    #[test]
    fn late_result_does_not_replace_newer_one() {
        let session = SessionContext::new("s1");
        session.select(key(1));
        session.select(key(2));
        assert!(session.apply(Envelope::new(key(2), table(2))));
        assert!(!session.apply(Envelope::new(key(1), table(1))));

        assert_eq!(session.current().map(|t| t.microgrid_id), Some(2));
        assert_eq!(session.last_good().map(|e| e.key), Some(key(2)));
    }

    #[test]
    fn changing_selection_keeps_last_good_result() {
        let session = SessionContext::new("s1");
        session.select(key(1));
        assert!(session.apply(Envelope::new(key(1), table(1))));

        session.select(key(2));
        assert!(session.current().is_none());
        assert_eq!(session.last_good().map(|e| e.key), Some(key(1)));

        // Re-selecting the same key does not clear the view.
        session.select(key(1));
        session.apply(Envelope::new(key(1), table(1)));
        session.select(key(1));
        assert!(session.current().is_some());
    }

    #[test]
    fn registry_reuses_and_ends_sessions() {
        let registry = SessionRegistry::new();
        let a = registry.get_or_create("a");
        let again = registry.get_or_create("a");
        assert!(Arc::ptr_eq(&a, &again));
        registry.get_or_create("b");
        assert_eq!(registry.len(), 2);

        assert!(registry.end("a"));
        assert!(!registry.end("a"));
        let fresh = registry.get_or_create("a");
        assert!(!Arc::ptr_eq(&a, &fresh));
    }

    #[test]
    fn idle_sessions_are_evicted_on_next_access() {
        let registry = SessionRegistry::with_idle_timeout(Duration::from_secs(60));
        let t0 = Instant::now();

        let stale = registry.get_or_create_at("stale", t0);
        for i in 0..100 {
            registry.get_or_create_at(&format!("ad-hoc-{i}"), t0);
        }
        let active = registry.get_or_create_at("active", t0);
        assert_eq!(registry.len(), 102);

        // "active" keeps being used; everything else goes quiet.
        assert!(Arc::ptr_eq(
            &active,
            &registry.get_or_create_at("active", t0 + Duration::from_secs(50))
        ));
        let later = t0 + Duration::from_secs(100);
        assert!(Arc::ptr_eq(&active, &registry.get_or_create_at("active", later)));
        assert_eq!(registry.len(), 1);

        let revived = registry.get_or_create_at("stale", later);
        assert!(!Arc::ptr_eq(&stale, &revived));
        assert_eq!(registry.len(), 2);
    }
}
