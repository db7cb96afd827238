use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::HdError;

/// Energy unit of a source dataset. Everything is harmonized to MWh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EnergyUnit {
    KWh,
    MWh,
    GWh,
    GJ,
    TJ,
}

impl EnergyUnit {
    /// Factor turning a value in this unit into MWh
    pub fn mwh_factor(&self) -> f64 {
        match self {
            EnergyUnit::KWh => 1e-3,
            EnergyUnit::MWh => 1.0,
            EnergyUnit::GWh => 1e3,
            EnergyUnit::GJ => 1.0 / 3.6,
            EnergyUnit::TJ => 1000.0 / 3.6,
        }
    }

    pub fn to_mwh(&self, value: f64) -> f64 {
        value * self.mwh_factor()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EnergyUnit::KWh => "kWh",
            EnergyUnit::MWh => "MWh",
            EnergyUnit::GWh => "GWh",
            EnergyUnit::GJ => "GJ",
            EnergyUnit::TJ => "TJ",
        }
    }
}

impl FromStr for EnergyUnit {
    type Err = HdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kwh" => Ok(EnergyUnit::KWh),
            "mwh" => Ok(EnergyUnit::MWh),
            "gwh" => Ok(EnergyUnit::GWh),
            "gj" => Ok(EnergyUnit::GJ),
            "tj" => Ok(EnergyUnit::TJ),
            _ => Err(HdError::UnknownValue {
                kind: "energy unit",
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for EnergyUnit {
    type Error = HdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EnergyUnit> for String {
    fn from(unit: EnergyUnit) -> Self {
        unit.as_str().to_string()
    }
}

impl fmt::Display for EnergyUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference area of a density value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaUnit {
    SquareMetre,
    Hectare,
    SquareKilometre,
}

impl AreaUnit {
    pub fn square_metres(&self) -> f64 {
        match self {
            AreaUnit::SquareMetre => 1.0,
            AreaUnit::Hectare => 10_000.0,
            AreaUnit::SquareKilometre => 1_000_000.0,
        }
    }
}

/// Whether a feature value is an amount or an amount per area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ValueKind {
    #[default]
    Absolute,
    Density(AreaUnit),
}

impl ValueKind {
    /// Energy of a feature in MWh, given its value and its area in m²
    pub fn feature_mwh(&self, unit: EnergyUnit, value: f64, area_m2: f64) -> f64 {
        match self {
            ValueKind::Absolute => unit.to_mwh(value),
            ValueKind::Density(area_unit) => {
                unit.to_mwh(value) * area_m2 / area_unit.square_metres()
            }
        }
    }

    pub fn is_density(&self) -> bool {
        matches!(self, ValueKind::Density(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Absolute => "absolute",
            ValueKind::Density(AreaUnit::SquareMetre) => "per_m2",
            ValueKind::Density(AreaUnit::Hectare) => "per_ha",
            ValueKind::Density(AreaUnit::SquareKilometre) => "per_km2",
        }
    }
}

impl FromStr for ValueKind {
    type Err = HdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "absolute" => Ok(ValueKind::Absolute),
            "per_m2" => Ok(ValueKind::Density(AreaUnit::SquareMetre)),
            "per_ha" => Ok(ValueKind::Density(AreaUnit::Hectare)),
            "per_km2" => Ok(ValueKind::Density(AreaUnit::SquareKilometre)),
            _ => Err(HdError::UnknownValue {
                kind: "value kind",
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for ValueKind {
    type Error = HdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ValueKind> for String {
    fn from(kind: ValueKind) -> Self {
        kind.as_str().to_string()
    }
}
