use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;

use crate::domain::RawSample;

/// A single upstream request: one time window, optionally continuing a page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub microgrid_id: u64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub resolution: TimeDelta,
    pub page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Page {
    pub samples: Vec<RawSample>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Credentials were rejected. Never retried.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Network failure, timeout, 5xx or throttling. Eligible for retry.
    #[error("transient failure: {0}")]
    Transient(String),
    /// The server understood and refused the request.
    #[error("request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

#[async_trait::async_trait]
pub trait PageTransport: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page, TransportError>;
}
