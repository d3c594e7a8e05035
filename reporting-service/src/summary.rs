use chrono::{DateTime, FixedOffset};
use reporting_client::domain::{ComponentKind, MasterRow, MasterTable, Metric, SourceBreakdown};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Peak {
    pub kw: f64,
    pub at: DateTime<FixedOffset>,
}

/// Headline KPIs over a whole master table. Energies in kWh.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnergySummary {
    pub production_kwh: SourceBreakdown,
    pub total_production_kwh: Option<f64>,
    pub total_consumption_kwh: Option<f64>,
    pub grid_import_kwh: Option<f64>,
    pub grid_feed_in_kwh: Option<f64>,
    pub peak_consumption: Option<Peak>,
    /// Share of local production consumed on site, in percent.
    pub self_consumption_pct: Option<f64>,
    pub rows_with_data: usize,
}

fn accumulate(acc: &mut Option<f64>, v: Option<f64>, hours: f64) {
    if let Some(v) = v {
        *acc = Some(acc.unwrap_or(0.0) + v * hours);
    }
}

fn grid_power(table: &MasterTable, row: &MasterRow) -> Option<f64> {
    table
        .columns
        .iter()
        .zip(&row.values)
        .filter(|(c, _)| c.kind == ComponentKind::Grid && c.key.metric == Metric::AcActivePower)
        .filter_map(|(_, v)| *v)
        .fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
}

impl EnergySummary {
    /// Energy is power times bucket length: `kW * resolution_seconds / 3600`.
    pub fn from_table(table: &MasterTable) -> Self {
        let hours = table.resolution_seconds as f64 / 3600.0;
        let mut s = EnergySummary::default();

        for row in &table.rows {
            let d = &row.derived;
            if row.values.iter().any(Option::is_some) {
                s.rows_with_data += 1;
            }

            accumulate(&mut s.production_kwh.pv, d.production.pv, hours);
            accumulate(&mut s.production_kwh.wind, d.production.wind, hours);
            accumulate(&mut s.production_kwh.battery, d.production.battery, hours);
            accumulate(&mut s.production_kwh.chp, d.production.chp, hours);
            accumulate(&mut s.total_production_kwh, d.total_production, hours);
            accumulate(&mut s.total_consumption_kwh, d.total_consumption, hours);

            if let Some(grid) = grid_power(table, row) {
                accumulate(&mut s.grid_import_kwh, Some(grid.max(0.0)), hours);
                accumulate(&mut s.grid_feed_in_kwh, Some((-grid).max(0.0)), hours);
            }

            if let Some(kw) = d.total_consumption {
                if s.peak_consumption.map_or(true, |p| kw > p.kw) {
                    s.peak_consumption = Some(Peak {
                        kw,
                        at: row.timestamp,
                    });
                }
            }
        }

        s.self_consumption_pct = match s.total_production_kwh {
            Some(produced) if produced > 0.0 => {
                let exported = s.grid_feed_in_kwh.unwrap_or(0.0);
                Some(((produced - exported) / produced * 100.0).clamp(0.0, 100.0))
            }
            _ => None,
        };
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use reporting_client::domain::{Column, ColumnKey};

    use crate::transform::derived;

    fn columns() -> Vec<Column> {
        [(1, ComponentKind::Pv), (2, ComponentKind::Grid)]
            .into_iter()
            .map(|(id, kind)| Column {
                key: ColumnKey {
                    component_id: id,
                    metric: Metric::AcActivePower,
                },
                kind,
                label: kind.to_string(),
            })
            .collect()
    }

    fn table(rows: &[(Option<f64>, Option<f64>)]) -> MasterTable {
        let columns = columns();
        let start = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 6, 1, 0, 0, 0)
            .unwrap();
        let rows = rows
            .iter()
            .enumerate()
            .map(|(i, &(pv, grid))| {
                let values = vec![pv, grid];
                MasterRow {
                    timestamp: start + chrono::TimeDelta::minutes(15 * i as i64),
                    derived: derived::compute(&columns, &values),
                    values,
                }
            })
            .collect();
        MasterTable {
            microgrid_id: 1,
            timezone: "UTC".to_string(),
            resolution_seconds: 900,
            columns,
            rows,
        }
    }

    #[test]
    fn energy_is_power_times_quarter_hours() {
        // Quarter-hour rows: PV 4 kW throughout; grid imports 2 kW, then exports 2 kW.
        let t = table(&[
            (Some(4.0), Some(2.0)),
            (Some(4.0), Some(2.0)),
            (Some(4.0), Some(-2.0)),
            (Some(4.0), Some(-2.0)),
        ]);
        let s = EnergySummary::from_table(&t);

        assert_eq!(s.production_kwh.pv, Some(4.0));
        assert_eq!(s.total_production_kwh, Some(4.0));
        assert_eq!(s.grid_import_kwh, Some(1.0));
        assert_eq!(s.grid_feed_in_kwh, Some(1.0));
        // Consumption is 6 kW twice and 2 kW twice.
        assert_eq!(s.total_consumption_kwh, Some(4.0));
        assert_eq!(s.self_consumption_pct, Some(75.0));
        assert_eq!(s.rows_with_data, 4);

        let peak = s.peak_consumption.unwrap();
        assert_eq!(peak.kw, 6.0);
        assert_eq!(peak.at, t.rows[0].timestamp);
    }

    #[test]
    fn no_production_means_no_self_consumption_share() {
        let t = table(&[(None, Some(3.0)), (Some(0.0), Some(3.0))]);
        let s = EnergySummary::from_table(&t);

        assert_eq!(s.total_production_kwh, Some(0.0));
        assert_eq!(s.self_consumption_pct, None);
        assert_eq!(s.grid_feed_in_kwh, Some(0.0));
    }

    #[test]
    fn empty_table_summarizes_to_nothing() {
        let t = table(&[(None, None), (None, None)]);
        assert_eq!(EnergySummary::from_table(&t), EnergySummary::default());
    }
}
