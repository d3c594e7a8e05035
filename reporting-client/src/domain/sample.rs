use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One measurement as returned by the reporting API.
///
/// `metric` and `unit` are kept as the wire strings; interpretation happens
/// during normalization so that unknown metrics never fail a whole page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub component_id: u64,
    pub timestamp: DateTime<Utc>,
    pub metric: String,
    pub value: f64,
    pub unit: String,
}
