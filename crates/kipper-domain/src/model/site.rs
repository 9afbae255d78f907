//! Construction sites and their loading zones

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_SITE_RADIUS_M, DEFAULT_ZONE_RADIUS_M};
use crate::model::Coordinate;

/// Loading point: circular geofence around a material pile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    pub id: String,
    pub name: String,
    pub material: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "default_zone_radius")]
    pub radius: f64,
}

fn default_zone_radius() -> f64 {
    DEFAULT_ZONE_RADIUS_M
}

fn default_site_radius() -> f64 {
    DEFAULT_SITE_RADIUS_M
}

impl Zone {
    /// New zone named after its material
    pub fn new(material: impl Into<String>, center: Coordinate) -> Self {
        let material = material.into();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: material.clone(),
            material,
            latitude: center.latitude,
            longitude: center.longitude,
            radius: DEFAULT_ZONE_RADIUS_M,
        }
    }

    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        self
    }

    pub fn center(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    /// Radius used for containment; unset (zero) radii fall back to the default
    pub fn effective_radius(&self) -> f64 {
        if self.radius > 0.0 {
            self.radius
        } else {
            DEFAULT_ZONE_RADIUS_M
        }
    }
}

/// Construction site with an ordered list of loading zones
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "default_site_radius")]
    pub radius: f64,
    #[serde(default)]
    pub zones: Vec<Zone>,
}

impl Site {
    /// New site; names are always stored upper-case
    pub fn new(name: &str, center: Coordinate) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_uppercase(),
            created_at: Utc::now(),
            latitude: center.latitude,
            longitude: center.longitude,
            radius: DEFAULT_SITE_RADIUS_M,
            zones: Vec::new(),
        }
    }

    pub fn with_zone(mut self, zone: Zone) -> Self {
        self.zones.push(zone);
        self
    }

    pub fn center(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    pub fn effective_radius(&self) -> f64 {
        if self.radius > 0.0 {
            self.radius
        } else {
            DEFAULT_SITE_RADIUS_M
        }
    }

    pub fn zone(&self, zone_id: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.id == zone_id)
    }
}
