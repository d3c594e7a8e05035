use std::collections::HashMap;

use reporting_client::domain::{
    ColumnKey, MasterRow, MasterTable, Metric, MicrogridDescriptor, QueryKey, RawSample,
};
use tracing::{debug, warn};

use super::{derived, units::to_canonical, validate_sample};

/// Per-call accounting of what happened to the raw samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub accepted: usize,
    pub invalid: usize,
    pub out_of_range: usize,
    pub undeclared: usize,
    pub unknown_unit: usize,
}

impl NormalizeStats {
    pub fn dropped(&self) -> usize {
        self.invalid + self.out_of_range + self.undeclared + self.unknown_unit
    }

    fn record(&self) {
        for (reason, n) in [
            ("invalid", self.invalid),
            ("out_of_range", self.out_of_range),
            ("undeclared", self.undeclared),
            ("unknown_unit", self.unknown_unit),
        ] {
            if n > 0 {
                metrics::counter!("normalize_dropped_samples_total", "reason" => reason)
                    .increment(n as u64);
            }
        }
    }
}

/// Merge raw samples into one row per resolution bucket of `key`.
///
/// Never fails: samples that cannot be placed are dropped and counted.
pub fn normalize(
    raw: &[RawSample],
    descriptor: &MicrogridDescriptor,
    key: &QueryKey,
) -> MasterTable {
    normalize_with_stats(raw, descriptor, key).0
}

pub fn normalize_with_stats(
    raw: &[RawSample],
    descriptor: &MicrogridDescriptor,
    key: &QueryKey,
) -> (MasterTable, NormalizeStats) {
    let columns = descriptor.columns();
    let index: HashMap<ColumnKey, usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| (c.key, i))
        .collect();

    let buckets = key.bucket_count();
    let mut grid: Vec<Vec<Option<f64>>> = vec![vec![None; columns.len()]; buckets];
    let mut stats = NormalizeStats::default();

    for sample in raw {
        if let Err(e) = validate_sample(sample) {
            debug!(component_id = sample.component_id, error = %e, "dropping sample");
            stats.invalid += 1;
            continue;
        }

        let Some(metric) = Metric::from_wire(&sample.metric) else {
            stats.undeclared += 1;
            continue;
        };
        let column_key = ColumnKey {
            component_id: sample.component_id,
            metric,
        };
        let Some(&col) = index.get(&column_key) else {
            stats.undeclared += 1;
            continue;
        };
        let Some(bucket) = key.bucket_index(sample.timestamp) else {
            stats.out_of_range += 1;
            continue;
        };
        let Some(value) = to_canonical(metric, sample.value, &sample.unit) else {
            debug!(
                component_id = sample.component_id,
                metric = metric.wire_name(),
                unit = %sample.unit,
                "dropping sample with unknown unit"
            );
            stats.unknown_unit += 1;
            continue;
        };

        // Later arrivals overwrite earlier ones in the same bucket.
        grid[bucket][col] = Some(value);
        stats.accepted += 1;
    }

    if stats.dropped() > 0 {
        warn!(
            microgrid_id = descriptor.id,
            accepted = stats.accepted,
            invalid = stats.invalid,
            out_of_range = stats.out_of_range,
            undeclared = stats.undeclared,
            unknown_unit = stats.unknown_unit,
            "samples dropped during normalization"
        );
    }
    stats.record();

    let tz = descriptor.timezone;
    let rows = grid
        .into_iter()
        .enumerate()
        .map(|(n, values)| MasterRow {
            timestamp: key.bucket_start(n).with_timezone(&tz).fixed_offset(),
            derived: derived::compute(&columns, &values),
            values,
        })
        .collect();

    let table = MasterTable {
        microgrid_id: descriptor.id,
        timezone: tz.name().to_string(),
        resolution_seconds: key.resolution.num_seconds(),
        columns,
        rows,
    };
    (table, stats)
}
