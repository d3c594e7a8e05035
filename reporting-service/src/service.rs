use std::{sync::Arc, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use reporting_client::domain::{MasterTable, MicrogridDescriptor, QueryKey};

use crate::{
    error::ReportError,
    microgrids::MicrogridRegistry,
    pipeline::ReportPipeline,
    session::{SessionContext, SessionRegistry, DEFAULT_SESSION},
};

/// Entry point for report requests: resolves microgrids, owns the sessions
/// and the fetch pipeline.
pub struct ReportService {
    microgrids: Arc<MicrogridRegistry>,
    pipeline: ReportPipeline,
    sessions: SessionRegistry,
}

impl ReportService {
    pub fn new(microgrids: Arc<MicrogridRegistry>, pipeline: ReportPipeline) -> Self {
        Self {
            microgrids,
            pipeline,
            sessions: SessionRegistry::new(),
        }
    }

    /// Replace the session registry with one that drops sessions idle for
    /// longer than `idle_timeout`.
    pub fn with_session_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.sessions = SessionRegistry::with_idle_timeout(idle_timeout);
        self
    }

    pub fn microgrids(&self) -> &MicrogridRegistry {
        &self.microgrids
    }

    pub fn session(&self, id: &str) -> Arc<SessionContext> {
        self.sessions.get_or_create(id)
    }

    pub fn end_session(&self, id: &str) -> bool {
        self.sessions.end(id)
    }

    /// Resolve the microgrid and validate the range.
    pub fn query_key(
        &self,
        microgrid_id: u64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        resolution: TimeDelta,
    ) -> Result<(QueryKey, &MicrogridDescriptor), ReportError> {
        let descriptor = self
            .microgrids
            .get(microgrid_id)
            .ok_or(ReportError::UnknownMicrogrid(microgrid_id))?;
        let key = QueryKey::new(microgrid_id, start, end, resolution)?;
        Ok((key, descriptor))
    }

    /// Report through the shared default session.
    pub async fn report(
        &self,
        microgrid_id: u64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        resolution: TimeDelta,
    ) -> Result<Arc<MasterTable>, ReportError> {
        let session = self.session(DEFAULT_SESSION);
        self.report_in(&session, microgrid_id, start, end, resolution)
            .await
    }

    pub async fn report_in(
        &self,
        session: &SessionContext,
        microgrid_id: u64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        resolution: TimeDelta,
    ) -> Result<Arc<MasterTable>, ReportError> {
        let (key, descriptor) = self.query_key(microgrid_id, start, end, resolution)?;
        session.request(&self.pipeline, descriptor, key).await
    }
}
