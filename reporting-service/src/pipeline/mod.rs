use std::{sync::Arc, time::Instant, time::SystemTime};

use reporting_client::{
    api::PageTransport,
    domain::{MasterTable, MicrogridDescriptor, QueryKey, RawSample},
    ClientError, ReportingClient,
};

use crate::{error::ReportError, transform::normalize::normalize_with_stats};

/// A payload tagged with the query it answers.
#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub key: QueryKey,
    pub payload: T,
    pub received_at: SystemTime,
}

impl<T> Envelope<T> {
    pub fn new(key: QueryKey, payload: T) -> Self {
        Self {
            key,
            payload,
            received_at: SystemTime::now(),
        }
    }
}

/// Where raw samples come from.
#[async_trait::async_trait]
pub trait SampleSource: Send + Sync {
    async fn fetch(&self, key: &QueryKey) -> Result<Vec<RawSample>, ClientError>;
}

#[async_trait::async_trait]
impl<T> SampleSource for ReportingClient<T>
where
    T: PageTransport + 'static,
{
    async fn fetch(&self, key: &QueryKey) -> Result<Vec<RawSample>, ClientError> {
        self.fetch_key(key).await
    }
}

/// Fetch followed by normalization: the unit of work the cache memoizes.
#[derive(Clone)]
pub struct ReportPipeline {
    source: Arc<dyn SampleSource>,
}

impl ReportPipeline {
    pub fn new(source: Arc<dyn SampleSource>) -> Self {
        Self { source }
    }

    pub async fn run(
        &self,
        key: &QueryKey,
        descriptor: &MicrogridDescriptor,
    ) -> Result<MasterTable, ReportError> {
        let started = Instant::now();
        let raw = self.source.fetch(key).await.map_err(|e| {
            metrics::counter!("report_fetch_failed_total").increment(1);
            ReportError::from(e)
        })?;

        let (table, stats) = normalize_with_stats(&raw, descriptor, key);
        metrics::histogram!("report_fetch_seconds").record(started.elapsed().as_secs_f64());

        tracing::info!(
            microgrid_id = key.microgrid_id,
            start = %key.start,
            end = %key.end,
            resolution_s = key.resolution.num_seconds(),
            samples = raw.len(),
            accepted = stats.accepted,
            rows = table.rows.len(),
            "report built"
        );
        Ok(table)
    }
}
