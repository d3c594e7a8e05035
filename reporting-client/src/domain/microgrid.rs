use std::fmt;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::table::{Column, ColumnKey};

/// Kind of an energy asset behind a metered component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    #[serde(alias = "PV")]
    Pv,
    #[serde(alias = "BATTERY")]
    Battery,
    #[serde(alias = "WIND")]
    Wind,
    #[serde(alias = "bhkw", alias = "BHKW", alias = "CHP")]
    Chp,
    #[serde(alias = "EV")]
    Ev,
    #[serde(alias = "GRID")]
    Grid,
    #[serde(alias = "OTHER")]
    Other,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 7] = [
        ComponentKind::Pv,
        ComponentKind::Battery,
        ComponentKind::Wind,
        ComponentKind::Chp,
        ComponentKind::Ev,
        ComponentKind::Grid,
        ComponentKind::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ComponentKind::Pv => "pv",
            ComponentKind::Battery => "battery",
            ComponentKind::Wind => "wind",
            ComponentKind::Chp => "chp",
            ComponentKind::Ev => "ev",
            ComponentKind::Grid => "grid",
            ComponentKind::Other => "other",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Measured quantity reported by the API for a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Metric {
    AcActivePower,
    AcActiveEnergy,
    StateOfCharge,
}

impl Metric {
    pub fn wire_name(self) -> &'static str {
        match self {
            Metric::AcActivePower => "AC_ACTIVE_POWER",
            Metric::AcActiveEnergy => "AC_ACTIVE_ENERGY",
            Metric::StateOfCharge => "STATE_OF_CHARGE",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "AC_ACTIVE_POWER" => Some(Metric::AcActivePower),
            "AC_ACTIVE_ENERGY" => Some(Metric::AcActiveEnergy),
            "STATE_OF_CHARGE" => Some(Metric::StateOfCharge),
            _ => None,
        }
    }

    /// Unit every value of this metric is stored in after normalization.
    pub fn canonical_unit(self) -> &'static str {
        match self {
            Metric::AcActivePower => "kW",
            Metric::AcActiveEnergy => "kWh",
            Metric::StateOfCharge => "%",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComponentRef {
    pub id: u64,
    pub kind: ComponentKind,
    pub label: String,
    pub metrics: Vec<Metric>,
}

/// Static description of one microgrid, loaded once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct MicrogridDescriptor {
    pub id: u64,
    pub name: String,
    pub timezone: Tz,
    pub components: Vec<ComponentRef>,
}

impl MicrogridDescriptor {
    /// Master table columns in declaration order, one per (component, metric).
    pub fn columns(&self) -> Vec<Column> {
        self.components
            .iter()
            .flat_map(|c| {
                c.metrics.iter().map(move |&metric| Column {
                    key: ColumnKey {
                        component_id: c.id,
                        metric,
                    },
                    kind: c.kind,
                    label: c.label.clone(),
                })
            })
            .collect()
    }

    /// Distinct component kinds, in `ComponentKind::ALL` order.
    pub fn component_kinds(&self) -> Vec<ComponentKind> {
        ComponentKind::ALL
            .into_iter()
            .filter(|kind| self.components.iter().any(|c| c.kind == *kind))
            .collect()
    }
}
