use reporting_client::domain::{Column, ComponentKind, DerivedColumns, Metric, SourceBreakdown};

fn add(acc: Option<f64>, v: f64) -> Option<f64> {
    Some(acc.unwrap_or(0.0) + v)
}

/// Aggregate columns for one row.
///
/// Only `AcActivePower` columns contribute. Sign convention: generation is
/// positive, battery positive means discharge, grid positive means import.
pub fn compute(columns: &[Column], values: &[Option<f64>]) -> DerivedColumns {
    let mut pv = None;
    let mut wind = None;
    let mut chp = None;
    let mut battery_net = None;
    let mut battery_discharge = None;
    let mut grid = None;

    for (column, value) in columns.iter().zip(values) {
        if column.key.metric != Metric::AcActivePower {
            continue;
        }
        let Some(v) = *value else { continue };
        match column.kind {
            ComponentKind::Pv => pv = add(pv, v),
            ComponentKind::Wind => wind = add(wind, v),
            ComponentKind::Chp => chp = add(chp, v),
            ComponentKind::Battery => {
                battery_net = add(battery_net, v);
                battery_discharge = add(battery_discharge, v.max(0.0));
            }
            ComponentKind::Grid => grid = add(grid, v),
            ComponentKind::Ev | ComponentKind::Other => {}
        }
    }

    let production = SourceBreakdown {
        pv: pv.map(|v: f64| v.max(0.0)),
        wind: wind.map(|v: f64| v.max(0.0)),
        battery: battery_discharge,
        chp: chp.map(|v: f64| v.max(0.0)),
    };
    let total_production = production.total();

    let total_consumption = [grid, pv, wind, chp, battery_net]
        .into_iter()
        .flatten()
        .fold(None, add);

    let mix_pct = match total_production {
        Some(total) if total > 0.0 => {
            let share = |v: Option<f64>| v.map(|v| v * 100.0 / total);
            SourceBreakdown {
                pv: share(production.pv),
                wind: share(production.wind),
                battery: share(production.battery),
                chp: share(production.chp),
            }
        }
        _ => SourceBreakdown::default(),
    };

    DerivedColumns {
        total_consumption,
        total_production,
        production,
        mix_pct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reporting_client::domain::ColumnKey;

    fn col(id: u64, kind: ComponentKind, metric: Metric) -> Column {
        Column {
            key: ColumnKey {
                component_id: id,
                metric,
            },
            kind,
            label: format!("{kind} {id}"),
        }
    }

    fn columns() -> Vec<Column> {
        vec![
            col(1, ComponentKind::Pv, Metric::AcActivePower),
            col(2, ComponentKind::Battery, Metric::AcActivePower),
            col(2, ComponentKind::Battery, Metric::StateOfCharge),
            col(3, ComponentKind::Grid, Metric::AcActivePower),
            col(4, ComponentKind::Chp, Metric::AcActivePower),
        ]
    }

    #[test]
    fn balance_and_mix_for_a_mixed_row() {
        // PV 6 kW, battery discharging 2 kW, grid importing 1 kW, CHP 2 kW.
        let values = vec![Some(6.0), Some(2.0), Some(55.0), Some(1.0), Some(2.0)];
        let d = compute(&columns(), &values);

        assert_eq!(d.total_production, Some(10.0));
        assert_eq!(d.total_consumption, Some(11.0));
        assert_eq!(d.production.pv, Some(6.0));
        assert_eq!(d.production.battery, Some(2.0));
        assert_eq!(d.production.wind, None);
        assert_eq!(d.mix_pct.pv, Some(60.0));
        assert_eq!(d.mix_pct.battery, Some(20.0));
        assert_eq!(d.mix_pct.chp, Some(20.0));
        assert_eq!(d.mix_pct.wind, None);
    }

    #[test]
    fn charging_battery_is_not_production_but_counts_in_balance() {
        // PV 5 kW, battery charging 3 kW, grid exporting 1 kW.
        let values = vec![Some(5.0), Some(-3.0), None, Some(-1.0), None];
        let d = compute(&columns(), &values);

        assert_eq!(d.production.battery, Some(0.0));
        assert_eq!(d.total_production, Some(5.0));
        assert_eq!(d.total_consumption, Some(1.0));
    }

    #[test]
    fn zero_production_leaves_mix_empty() {
        let values = vec![Some(0.0), None, None, Some(4.0), None];
        let d = compute(&columns(), &values);

        assert_eq!(d.total_production, Some(0.0));
        assert_eq!(d.total_consumption, Some(4.0));
        assert_eq!(d.mix_pct, SourceBreakdown::default());
    }

    #[test]
    fn empty_row_has_no_aggregates() {
        let values = vec![None; 5];
        let d = compute(&columns(), &values);
        assert_eq!(d, DerivedColumns::default());
    }
}
