use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use super::microgrid::{ComponentKind, Metric};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ColumnKey {
    pub component_id: u64,
    pub metric: Metric,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub key: ColumnKey,
    pub kind: ComponentKind,
    pub label: String,
}

impl Column {
    /// Display name, e.g. `Roof PV [kW]`.
    pub fn name(&self) -> String {
        format!("{} [{}]", self.label, self.key.metric.canonical_unit())
    }
}

/// Per-source values for the producing asset kinds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceBreakdown {
    pub pv: Option<f64>,
    pub wind: Option<f64>,
    pub battery: Option<f64>,
    pub chp: Option<f64>,
}

impl SourceBreakdown {
    pub fn iter(&self) -> impl Iterator<Item = (ComponentKind, Option<f64>)> {
        [
            (ComponentKind::Pv, self.pv),
            (ComponentKind::Wind, self.wind),
            (ComponentKind::Battery, self.battery),
            (ComponentKind::Chp, self.chp),
        ]
        .into_iter()
    }

    /// Sum of the present sources; `None` when every source is `None`.
    pub fn total(&self) -> Option<f64> {
        self.iter()
            .filter_map(|(_, v)| v)
            .fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DerivedColumns {
    pub total_consumption: Option<f64>,
    pub total_production: Option<f64>,
    pub production: SourceBreakdown,
    pub mix_pct: SourceBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MasterRow {
    pub timestamp: DateTime<FixedOffset>,
    /// One value per table column, `None` where no sample arrived.
    pub values: Vec<Option<f64>>,
    pub derived: DerivedColumns,
}

/// Normalized report for one query: one row per resolution bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MasterTable {
    pub microgrid_id: u64,
    pub timezone: String,
    pub resolution_seconds: i64,
    pub columns: Vec<Column>,
    pub rows: Vec<MasterRow>,
}

impl MasterTable {
    pub fn column_index(&self, key: ColumnKey) -> Option<usize> {
        self.columns.iter().position(|c| c.key == key)
    }

    pub fn value(&self, row: usize, key: ColumnKey) -> Option<f64> {
        let col = self.column_index(key)?;
        self.rows.get(row)?.values.get(col).copied().flatten()
    }

    /// Whether at least one measured value made it into the table.
    pub fn has_data(&self) -> bool {
        self.rows
            .iter()
            .any(|r| r.values.iter().any(Option::is_some))
    }

    /// Time series restricted to the columns of one component kind.
    pub fn component_view(&self, kind: ComponentKind) -> ComponentTable {
        let picked: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind == kind)
            .map(|(i, _)| i)
            .collect();

        ComponentTable {
            kind,
            columns: picked.iter().map(|&i| self.columns[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|r| ComponentRow {
                    timestamp: r.timestamp,
                    values: picked.iter().map(|&i| r.values[i]).collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentRow {
    pub timestamp: DateTime<FixedOffset>,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentTable {
    pub kind: ComponentKind,
    pub columns: Vec<Column>,
    pub rows: Vec<ComponentRow>,
}

impl ComponentTable {
    pub fn has_data(&self) -> bool {
        self.rows
            .iter()
            .any(|r| r.values.iter().any(Option::is_some))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn table() -> MasterTable {
        let ts = FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 1, 1, 0, 0)
            .unwrap();
        MasterTable {
            microgrid_id: 1,
            timezone: "Europe/Berlin".to_string(),
            resolution_seconds: 900,
            columns: vec![
                Column {
                    key: ColumnKey {
                        component_id: 10,
                        metric: Metric::AcActivePower,
                    },
                    kind: ComponentKind::Pv,
                    label: "PV".to_string(),
                },
                Column {
                    key: ColumnKey {
                        component_id: 20,
                        metric: Metric::AcActivePower,
                    },
                    kind: ComponentKind::Battery,
                    label: "Battery".to_string(),
                },
            ],
            rows: vec![MasterRow {
                timestamp: ts,
                values: vec![Some(4.0), None],
                derived: DerivedColumns::default(),
            }],
        }
    }

    #[test]
    fn component_view_keeps_only_matching_columns() {
        let view = table().component_view(ComponentKind::Pv);
        assert_eq!(view.columns.len(), 1);
        assert_eq!(view.rows[0].values, vec![Some(4.0)]);
        assert!(view.has_data());

        let batt = table().component_view(ComponentKind::Battery);
        assert!(!batt.has_data());
    }

    #[test]
    fn value_lookup_by_column_key() {
        let t = table();
        let pv = ColumnKey {
            component_id: 10,
            metric: Metric::AcActivePower,
        };
        assert_eq!(t.value(0, pv), Some(4.0));
        assert_eq!(t.value(1, pv), None);
        assert!(t.has_data());
    }

    #[test]
    fn breakdown_total_ignores_missing_sources() {
        let b = SourceBreakdown {
            pv: Some(3.0),
            chp: Some(1.5),
            ..Default::default()
        };
        assert_eq!(b.total(), Some(4.5));
        assert_eq!(SourceBreakdown::default().total(), None);
    }

    #[test]
    fn column_name_carries_canonical_unit() {
        assert_eq!(table().columns[0].name(), "PV [kW]");
    }
}
