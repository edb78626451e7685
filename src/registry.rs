use serde::Serialize;

use crate::domain::Aggregation;
use crate::error::HarvestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VariableSpec {
    pub name: &'static str,
    pub collection_id: &'static str,
    /// Nominal pixel scale in meters.
    pub scale: u32,
    pub aggregation: Aggregation,
    pub band: &'static str,
}

// Registry order is the submission order.
pub const VARIABLES: &[VariableSpec] = &[
    VariableSpec {
        name: "NDVI",
        collection_id: "MODIS/061/MOD13Q1",
        scale: 250,
        aggregation: Aggregation::Mean,
        band: "NDVI",
    },
    VariableSpec {
        name: "LST",
        collection_id: "MODIS/061/MOD11A2",
        scale: 1000,
        aggregation: Aggregation::Mean,
        band: "LST_Day_1km",
    },
    VariableSpec {
        name: "SoilMoisture",
        collection_id: "NASA_USDA/HSL/SMAP10KM_soil_moisture",
        scale: 10000,
        aggregation: Aggregation::Mean,
        band: "ssm",
    },
    VariableSpec {
        name: "Rainfall",
        collection_id: "NASA/GPM_L3/IMERG_V06",
        scale: 10000,
        aggregation: Aggregation::Sum,
        band: "precipitationCal",
    },
    VariableSpec {
        name: "FireCount",
        collection_id: "MODIS/061/MOD14A1",
        scale: 1000,
        aggregation: Aggregation::ThresholdCount,
        band: "FireMask",
    },
];

pub fn all() -> &'static [VariableSpec] {
    VARIABLES
}

pub fn lookup(name: &str) -> Result<&'static VariableSpec, HarvestError> {
    VARIABLES
        .iter()
        .find(|spec| spec.name == name)
        .ok_or_else(|| HarvestError::UnknownVariable(name.to_string()))
}

/// Resolves a selection of names, keeping registry order and dropping duplicates.
pub fn select(names: &[String]) -> Result<Vec<&'static VariableSpec>, HarvestError> {
    if names.is_empty() {
        return Ok(VARIABLES.iter().collect());
    }
    for name in names {
        lookup(name)?;
    }
    Ok(VARIABLES
        .iter()
        .filter(|spec| names.iter().any(|name| name == spec.name))
        .collect())
}
