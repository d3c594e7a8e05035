use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};

use crate::{error::ReportError, microgrids::MicrogridRegistry};

pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::Berlin;
pub const DEFAULT_RESOLUTION: &str = "15min";
pub const RESOLUTION_OPTIONS: [&str; 4] = ["15min", "30min", "1hour", "4hour"];
/// Largest number of rows a single selection may produce.
pub const MAX_BUCKETS: i64 = 200_000;

static RESOLUTION_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)^(\d+)\s*(min|hour|h)$").ok());

/// Parse `15min`, `1hour`, `1 hour` or `4h` into a duration.
pub fn parse_resolution(input: &str) -> Result<TimeDelta, ReportError> {
    let unsupported = || ReportError::InvalidFilter(format!("unsupported resolution '{input}'"));

    let caps = RESOLUTION_PATTERN
        .as_ref()
        .and_then(|re| re.captures(input.trim()))
        .ok_or_else(unsupported)?;
    let amount: i64 = caps[1].parse().map_err(|_| unsupported())?;
    if amount <= 0 {
        return Err(ReportError::InvalidFilter(format!(
            "resolution must be positive, got '{input}'"
        )));
    }

    let minutes = if caps[2].eq_ignore_ascii_case("min") {
        Some(amount)
    } else {
        amount.checked_mul(60)
    };
    minutes
        .and_then(TimeDelta::try_minutes)
        .ok_or_else(unsupported)
}

/// Local midnight of `date` in `tz`, as a UTC instant.
///
/// Where midnight does not exist locally (a DST jump at 00:00) the first
/// instant after the gap is used.
pub fn midnight(date: NaiveDate, tz: Tz) -> Result<DateTime<Utc>, ReportError> {
    let naive = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + TimeDelta::hours(1))).earliest())
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| {
            ReportError::InvalidFilter(format!("{date} has no local midnight in {}", tz.name()))
        })
}

fn parse_timezone(name: &str) -> Result<Tz, ReportError> {
    name.trim()
        .parse()
        .map_err(|_| ReportError::InvalidFilter(format!("unknown timezone '{name}'")))
}

/// Raw filter selection as received from a request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub microgrid_id: Option<u64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub timezone: Option<String>,
    pub resolution: Option<String>,
}

impl PageQuery {
    /// Fill in defaults and validate.
    ///
    /// Defaults: the first configured microgrid, today (in the selected
    /// timezone) for both dates, `Europe/Berlin`, `15min`. Dates after today
    /// and selections of more than [`MAX_BUCKETS`] rows are rejected.
    pub fn resolve(
        &self,
        microgrids: &MicrogridRegistry,
        now: DateTime<Utc>,
    ) -> Result<AppliedFilters, ReportError> {
        let microgrid_id = match self.microgrid_id {
            Some(id) if microgrids.get(id).is_some() => id,
            Some(id) => return Err(ReportError::UnknownMicrogrid(id)),
            None => microgrids
                .microgrid_ids()
                .first()
                .copied()
                .ok_or_else(|| ReportError::InvalidFilter("no microgrids configured".into()))?,
        };

        let timezone = match &self.timezone {
            Some(name) => parse_timezone(name)?,
            None => DEFAULT_TIMEZONE,
        };
        let today = now.with_timezone(&timezone).date_naive();
        let start_date = self.start_date.unwrap_or(today);
        let end_date = self.end_date.unwrap_or(today);
        if start_date > end_date {
            return Err(ReportError::InvalidFilter(format!(
                "end date {end_date} must be on or after start date {start_date}"
            )));
        }
        if end_date > today {
            return Err(ReportError::InvalidFilter(format!(
                "end date {end_date} is in the future (today is {today} in {})",
                timezone.name()
            )));
        }

        let label = self
            .resolution
            .as_deref()
            .map(str::trim)
            .unwrap_or(DEFAULT_RESOLUTION)
            .to_string();
        let resolution = parse_resolution(&label)?;

        let days = (end_date - start_date).num_days() + 1;
        let buckets = days.saturating_mul(86_400) / resolution.num_seconds().max(1);
        if buckets > MAX_BUCKETS {
            return Err(ReportError::InvalidFilter(format!(
                "{days} days at {label} is {buckets} rows, more than the limit of {MAX_BUCKETS}"
            )));
        }

        Ok(AppliedFilters {
            microgrid_id,
            start_date,
            end_date,
            timezone,
            resolution_label: label,
            resolution,
        })
    }
}

fn serialize_tz<S: Serializer>(tz: &Tz, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(tz.name())
}

fn serialize_seconds<S: Serializer>(d: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(d.num_seconds())
}

/// Validated filter selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedFilters {
    pub microgrid_id: u64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(serialize_with = "serialize_tz")]
    pub timezone: Tz,
    #[serde(rename = "resolution")]
    pub resolution_label: String,
    #[serde(rename = "resolution_seconds", serialize_with = "serialize_seconds")]
    pub resolution: TimeDelta,
}

impl AppliedFilters {
    /// UTC range to fetch: local midnight of the start date up to local
    /// midnight of the day after the end date, so the last day is covered.
    pub fn fetch_range(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), ReportError> {
        let start = midnight(self.start_date, self.timezone)?;
        let day_after = self
            .end_date
            .checked_add_days(Days::new(1))
            .ok_or_else(|| ReportError::InvalidFilter("end date out of range".into()))?;
        let end = midnight(day_after, self.timezone)?;
        Ok((start, end))
    }
}
