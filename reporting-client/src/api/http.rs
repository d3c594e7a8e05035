use std::{fmt, time::Duration};

use chrono::{SecondsFormat, Utc};
use reqwest::{Client, StatusCode, Url};
use tracing::{debug, warn};

use super::transport::{Page, PageRequest, PageTransport, TransportError};
use crate::error::ClientError;

#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Request signature: keyed BLAKE3 over method, path, query and timestamp.
///
/// The key is the BLAKE3 hash of the shared secret so secrets of any length
/// map onto the 32-byte key BLAKE3 expects.
pub fn sign(secret: &str, method: &str, path: &str, query: &str, timestamp: i64) -> String {
    let key = blake3::hash(secret.as_bytes());
    let mut h = blake3::Hasher::new_keyed(key.as_bytes());
    h.update(method.as_bytes());
    h.update(b"\n");
    h.update(path.as_bytes());
    h.update(b"\n");
    h.update(query.as_bytes());
    h.update(b"\n");
    h.update(timestamp.to_string().as_bytes());
    h.finalize().to_hex().to_string()
}

/// `reqwest` transport for the reporting API samples endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    credentials: Credentials,
    client: Client,
}

impl HttpTransport {
    pub fn new(
        base_url: impl Into<String>,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Setup(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into(),
            credentials,
            client,
        })
    }

    fn url_for(&self, request: &PageRequest) -> Result<Url, TransportError> {
        let raw = format!(
            "{}/v1/microgrids/{}/samples",
            self.base_url.trim_end_matches('/'),
            request.microgrid_id
        );
        let mut url = Url::parse(&raw).map_err(|e| TransportError::Rejected {
            status: 0,
            message: format!("invalid base url '{raw}': {e}"),
        })?;

        {
            let mut q = url.query_pairs_mut();
            q.append_pair("start", &request.start.to_rfc3339_opts(SecondsFormat::Secs, true));
            q.append_pair("end", &request.end.to_rfc3339_opts(SecondsFormat::Secs, true));
            q.append_pair("resolution_s", &request.resolution.num_seconds().to_string());
            if let Some(token) = &request.page_token {
                q.append_pair("page_token", token);
            }
        }

        Ok(url)
    }
}

#[async_trait::async_trait]
impl PageTransport for HttpTransport {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page, TransportError> {
        let url = self.url_for(request)?;
        let timestamp = Utc::now().timestamp();
        let signature = sign(
            &self.credentials.api_secret,
            "GET",
            url.path(),
            url.query().unwrap_or(""),
            timestamp,
        );

        debug!(url = %url, "requesting samples page");

        let response = self
            .client
            .get(url.clone())
            .header("x-api-key", &self.credentials.api_key)
            .header("x-timestamp", timestamp.to_string())
            .header("x-signature", signature)
            .send()
            .await
            .map_err(|e| TransportError::Transient(format!("request to {} failed: {e}", url.path())))?;

        let status = response.status();
        if status == StatusCode::OK {
            // A body that breaks off mid-read is a network failure; only a
            // body that arrived whole but does not decode is a rejection.
            let body = response.bytes().await.map_err(|e| {
                TransportError::Transient(format!("reading samples page failed: {e}"))
            })?;
            return serde_json::from_slice::<Page>(&body).map_err(|e| TransportError::Rejected {
                status: status.as_u16(),
                message: format!("malformed samples page: {e}"),
            });
        }

        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), body = %body, "reporting API returned an error status");

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(TransportError::Unauthorized(
                format!("status {}: {body}", status.as_u16()),
            )),
            s if s == StatusCode::TOO_MANY_REQUESTS || s.is_server_error() => Err(
                TransportError::Transient(format!("status {}: {body}", s.as_u16())),
            ),
            s => Err(TransportError::Rejected {
                status: s.as_u16(),
                message: body,
            }),
        }
    }
}
