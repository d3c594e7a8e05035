use chrono::{DateTime, TimeDelta, Utc};

use crate::error::ClientError;

/// Identity of one report request. Used as the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub microgrid_id: u64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub resolution: TimeDelta,
}

impl QueryKey {
    /// Build a key, rejecting empty/inverted ranges and resolutions that are
    /// not a positive whole number of seconds (the API takes `resolution_s`).
    pub fn new(
        microgrid_id: u64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        resolution: TimeDelta,
    ) -> Result<Self, ClientError> {
        if start >= end {
            return Err(ClientError::InvalidRange(format!(
                "start {start} must be before end {end}"
            )));
        }
        if resolution.num_seconds() <= 0 || resolution.subsec_nanos() != 0 {
            return Err(ClientError::InvalidRange(format!(
                "resolution must be a positive whole number of seconds, got {resolution}"
            )));
        }
        Ok(Self {
            microgrid_id,
            start,
            end,
            resolution,
        })
    }

    fn resolution_ms(&self) -> i64 {
        self.resolution.num_milliseconds().max(1)
    }

    /// Number of resolution-aligned buckets covering `[start, end)`.
    pub fn bucket_count(&self) -> usize {
        let span = (self.end - self.start).num_milliseconds().max(0);
        let res = self.resolution_ms();
        ((span + res - 1) / res) as usize
    }

    pub fn bucket_start(&self, index: usize) -> DateTime<Utc> {
        self.start + TimeDelta::milliseconds(self.resolution_ms() * index as i64)
    }

    /// Bucket holding `ts`, or `None` when `ts` is outside `[start, end)`.
    pub fn bucket_index(&self, ts: DateTime<Utc>) -> Option<usize> {
        if ts < self.start || ts >= self.end {
            return None;
        }
        let offset = (ts - self.start).num_milliseconds();
        Some((offset / self.resolution_ms()) as usize)
    }
}
