//! Load records ("Fuhren")

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Truck configuration; decides the default load volume
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TruckType {
    #[serde(rename = "3-axle")]
    ThreeAxle,
    #[default]
    #[serde(rename = "4-axle")]
    FourAxle,
}

impl TruckType {
    /// Default volume in m³
    pub fn default_volume(&self) -> f64 {
        match self {
            TruckType::ThreeAxle => 10.0,
            TruckType::FourAxle => 12.0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TruckType::ThreeAxle => "3-Achser",
            TruckType::FourAxle => "4-Achser",
        }
    }
}

impl std::fmt::Display for TruckType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TruckType::ThreeAxle => write!(f, "3-axle"),
            TruckType::FourAxle => write!(f, "4-axle"),
        }
    }
}

impl FromStr for TruckType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "3" | "3-axle" | "3-achser" | "three" => Ok(TruckType::ThreeAxle),
            "4" | "4-axle" | "4-achser" | "four" => Ok(TruckType::FourAxle),
            other => Err(format!("unknown truck type: {}", other)),
        }
    }
}

/// Round to one decimal place
pub fn round_volume(volume: f64) -> f64 {
    (volume * 10.0).round() / 10.0
}

/// One recorded truck load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Load {
    pub id: String,
    pub site_id: String,
    pub zone_id: String,
    pub material: String,
    /// Volume in m³, one decimal
    pub volume: f64,
    pub truck_type: TruckType,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub auto_generated: bool,
}

impl Load {
    /// Manually entered load with the truck type's default volume
    pub fn manual(
        site_id: impl Into<String>,
        zone_id: impl Into<String>,
        material: impl Into<String>,
        truck_type: TruckType,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            site_id: site_id.into(),
            zone_id: zone_id.into(),
            material: material.into(),
            volume: truck_type.default_volume(),
            truck_type,
            timestamp,
            auto_generated: false,
        }
    }
}
