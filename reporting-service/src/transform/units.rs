use reporting_client::domain::Metric;

/// Convert a raw value into the canonical unit of `metric`.
///
/// Returns `None` when the unit does not belong to the metric's dimension.
pub fn to_canonical(metric: Metric, value: f64, unit: &str) -> Option<f64> {
    let canonical = match (metric, unit.trim()) {
        (Metric::AcActivePower, "W") | (Metric::AcActiveEnergy, "Wh") => value / 1000.0,
        (Metric::AcActivePower, "kW") | (Metric::AcActiveEnergy, "kWh") => value,
        (Metric::AcActivePower, "MW") | (Metric::AcActiveEnergy, "MWh") => value * 1000.0,
        (Metric::StateOfCharge, "%") => value,
        _ => return None,
    };
    Some(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_units_scale_to_kilowatts() {
        assert_eq!(to_canonical(Metric::AcActivePower, 1500.0, "W"), Some(1.5));
        assert_eq!(to_canonical(Metric::AcActivePower, 2.5, "kW"), Some(2.5));
        assert_eq!(to_canonical(Metric::AcActivePower, 0.5, "MW"), Some(500.0));
    }

    #[test]
    fn energy_and_soc_units() {
        assert_eq!(to_canonical(Metric::AcActiveEnergy, 250.0, "Wh"), Some(0.25));
        assert_eq!(to_canonical(Metric::AcActiveEnergy, 2.0, "MWh"), Some(2000.0));
        assert_eq!(to_canonical(Metric::StateOfCharge, 81.0, "%"), Some(81.0));
    }

    #[test]
    fn mismatched_or_unknown_units_are_refused() {
        assert_eq!(to_canonical(Metric::AcActivePower, 1.0, "kWh"), None);
        assert_eq!(to_canonical(Metric::StateOfCharge, 1.0, "kW"), None);
        assert_eq!(to_canonical(Metric::AcActivePower, 1.0, "hp"), None);
    }
}
