use std::{collections::HashSet, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use futures::{Stream, StreamExt};
use tracing::{error, info, warn};

use super::http::{Credentials, HttpTransport};
use super::transport::{Page, PageRequest, PageTransport, TransportError};
use crate::domain::{QueryKey, RawSample};
use crate::error::ClientError;

/// Retry, timeout and pagination policy for the reporting API.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Upper bound for a single page request, including reading the body.
    pub request_timeout: Duration,
    /// Total attempts per page request (first try included).
    pub max_retries: u32,
    /// Backoff unit; attempt `n` waits `retry_backoff * n`.
    pub retry_backoff: Duration,
    /// Largest time window the API accepts in one request.
    pub max_span: TimeDelta,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
            max_span: TimeDelta::days(7),
        }
    }
}

/// Split `[start, end)` into consecutive windows no longer than `max_span`.
///
/// Window length is rounded down to a whole number of resolutions (at least
/// one) so bucket boundaries never straddle two requests.
pub fn split_windows(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    max_span: TimeDelta,
    resolution: TimeDelta,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let res_ms = resolution.num_milliseconds().max(1);
    let span_ms = (max_span.num_milliseconds() / res_ms).max(1) * res_ms;
    let step = TimeDelta::milliseconds(span_ms);

    let mut windows = Vec::new();
    let mut cursor = start;
    while cursor < end {
        let next = (cursor + step).min(end);
        windows.push((cursor, next));
        cursor = next;
    }
    windows
}

pub struct ReportingClient<T = HttpTransport> {
    transport: T,
    settings: ClientSettings,
}

impl ReportingClient<HttpTransport> {
    pub fn connect(
        base_url: impl Into<String>,
        credentials: Credentials,
        settings: ClientSettings,
    ) -> Result<Self, ClientError> {
        let transport = HttpTransport::new(base_url, credentials, settings.request_timeout)?;
        Ok(Self::new(transport, settings))
    }
}

impl<T> ReportingClient<T>
where
    T: PageTransport,
{
    pub fn new(transport: T, settings: ClientSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Fetch every raw sample for `[start, end)` at `resolution`.
    pub async fn fetch_raw(
        &self,
        microgrid_id: u64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        resolution: TimeDelta,
    ) -> Result<Vec<RawSample>, ClientError> {
        let key = QueryKey::new(microgrid_id, start, end, resolution)?;
        self.fetch_key(&key).await
    }

    pub async fn fetch_key(&self, key: &QueryKey) -> Result<Vec<RawSample>, ClientError> {
        let key = QueryKey::new(key.microgrid_id, key.start, key.end, key.resolution)?;

        let pages = self.pages(key);
        futures::pin_mut!(pages);

        let mut samples = Vec::new();
        let mut page_count: usize = 0;
        while let Some(page) = pages.next().await {
            let page = page?;
            page_count += 1;
            samples.extend(page.samples);
        }

        info!(
            microgrid_id = key.microgrid_id,
            pages = page_count,
            samples = samples.len(),
            "fetched raw samples"
        );
        Ok(samples)
    }

    /// Pages for `key` in chronological request order: windows first, then
    /// page tokens within a window.
    pub fn pages(&self, key: QueryKey) -> impl Stream<Item = Result<Page, ClientError>> + Send + '_ {
        async_stream::try_stream! {
            for (start, end) in split_windows(key.start, key.end, self.settings.max_span, key.resolution) {
                let mut page_token: Option<String> = None;
                let mut seen_tokens: HashSet<String> = HashSet::new();
                loop {
                    let request = PageRequest {
                        microgrid_id: key.microgrid_id,
                        start,
                        end,
                        resolution: key.resolution,
                        page_token: page_token.clone(),
                    };
                    let page = self.fetch_page_with_retry(&request).await?;
                    let next = page.next_page_token.clone();
                    yield page;

                    match next {
                        Some(token) if !seen_tokens.insert(token.clone()) => {
                            Err::<(), ClientError>(ClientError::Upstream {
                                attempts: 1,
                                detail: format!("pagination revisited token '{token}'"),
                            })?;
                        }
                        Some(token) => page_token = Some(token),
                        None => break,
                    }
                }
            }
        }
    }

    async fn fetch_page_with_retry(&self, request: &PageRequest) -> Result<Page, ClientError> {
        let max_attempts = self.settings.max_retries.max(1);
        let timeout = self.settings.request_timeout;

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            metrics::counter!("upstream_requests_total").increment(1);

            let outcome = match tokio::time::timeout(timeout, self.transport.fetch_page(request)).await {
                Ok(res) => res,
                Err(_) => Err(TransportError::Transient(format!(
                    "request timed out after {timeout:?}"
                ))),
            };

            match outcome {
                Ok(page) => return Ok(page),
                Err(TransportError::Unauthorized(detail)) => {
                    error!(microgrid_id = request.microgrid_id, detail = %detail, "reporting API rejected credentials");
                    metrics::counter!("upstream_errors_total").increment(1);
                    return Err(ClientError::Auth(detail));
                }
                Err(TransportError::Rejected { status, message }) => {
                    error!(status, message = %message, "reporting API rejected request");
                    metrics::counter!("upstream_errors_total").increment(1);
                    return Err(ClientError::Upstream {
                        attempts: attempt,
                        detail: format!("status {status}: {message}"),
                    });
                }
                Err(TransportError::Transient(detail)) if attempt < max_attempts => {
                    let sleep_for = self.settings.retry_backoff * attempt;
                    warn!(
                        detail = %detail,
                        attempt,
                        max_attempts,
                        "reporting API request failed, retrying with backoff"
                    );
                    metrics::counter!("upstream_retry_total").increment(1);
                    tokio::time::sleep(sleep_for).await;
                }
                Err(TransportError::Transient(detail)) => {
                    error!(detail = %detail, attempt, "reporting API request failed, giving up");
                    metrics::counter!("upstream_errors_total").increment(1);
                    return Err(ClientError::Upstream {
                        attempts: attempt,
                        detail,
                    });
                }
            }
        }
    }
}
