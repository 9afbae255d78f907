//! Repository trait definitions for loads and the zone registry

mod memory;

pub use memory::MemoryLoadStore;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kipper_types::Result;

use crate::model::{Load, Site};

/// Criteria for [`LoadStore::query`]; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadFilter {
    pub site_id: Option<String>,
    pub zone_id: Option<String>,
    pub auto_generated: Option<bool>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl LoadFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_zone(zone_id: &str) -> Self {
        Self {
            zone_id: Some(zone_id.to_string()),
            ..Self::default()
        }
    }

    pub fn for_site(site_id: &str) -> Self {
        Self {
            site_id: Some(site_id.to_string()),
            ..Self::default()
        }
    }

    pub fn auto_generated(mut self, auto_generated: bool) -> Self {
        self.auto_generated = Some(auto_generated);
        self
    }

    pub fn between(mut self, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        self.since = since;
        self.until = until;
        self
    }

    pub fn matches(&self, load: &Load) -> bool {
        self.site_id.as_ref().map_or(true, |id| *id == load.site_id)
            && self.zone_id.as_ref().map_or(true, |id| *id == load.zone_id)
            && self
                .auto_generated
                .map_or(true, |auto| auto == load.auto_generated)
            && self.since.map_or(true, |t| load.timestamp >= t)
            && self.until.map_or(true, |t| load.timestamp <= t)
    }
}

/// Collection of load records shared between the detector and the views
pub trait LoadStore {
    /// Append a new load
    fn append(&self, load: Load) -> Result<()>;

    /// Remove a load; returns false if it did not exist
    fn remove(&self, id: &str) -> Result<bool>;

    /// Loads matching the filter, newest first
    fn query(&self, filter: &LoadFilter) -> Result<Vec<Load>>;

    /// Find a load by id
    fn get(&self, id: &str) -> Result<Option<Load>>;

    /// Replace a stored load; returns false if it did not exist
    fn update(&self, load: &Load) -> Result<bool>;
}

/// Read access to the configured sites and their zones
pub trait ZoneRegistry {
    /// Sites in registration order, each with zones in registration order
    fn snapshot(&self) -> Result<Vec<Site>>;
}

impl<T: LoadStore + ?Sized> LoadStore for Arc<T> {
    fn append(&self, load: Load) -> Result<()> {
        (**self).append(load)
    }

    fn remove(&self, id: &str) -> Result<bool> {
        (**self).remove(id)
    }

    fn query(&self, filter: &LoadFilter) -> Result<Vec<Load>> {
        (**self).query(filter)
    }

    fn get(&self, id: &str) -> Result<Option<Load>> {
        (**self).get(id)
    }

    fn update(&self, load: &Load) -> Result<bool> {
        (**self).update(load)
    }
}

impl<T: ZoneRegistry + ?Sized> ZoneRegistry for Arc<T> {
    fn snapshot(&self) -> Result<Vec<Site>> {
        (**self).snapshot()
    }
}

/// Fixed registry
impl ZoneRegistry for Vec<Site> {
    fn snapshot(&self) -> Result<Vec<Site>> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TruckType;
    use chrono::TimeZone;

    fn load_at(zone: &str, secs: i64, auto: bool) -> Load {
        let mut load = Load::manual(
            "site",
            zone,
            "Aushub",
            TruckType::FourAxle,
            Utc.timestamp_opt(secs, 0).unwrap(),
        );
        load.auto_generated = auto;
        load
    }

    #[test]
    fn test_filter_matches_zone_and_flag() {
        let filter = LoadFilter::for_zone("z1").auto_generated(true);
        assert!(filter.matches(&load_at("z1", 0, true)));
        assert!(!filter.matches(&load_at("z1", 0, false)));
        assert!(!filter.matches(&load_at("z2", 0, true)));
    }

    #[test]
    fn test_filter_time_bounds_inclusive() {
        let filter = LoadFilter::all().between(
            Some(Utc.timestamp_opt(10, 0).unwrap()),
            Some(Utc.timestamp_opt(20, 0).unwrap()),
        );
        assert!(filter.matches(&load_at("z", 10, false)));
        assert!(filter.matches(&load_at("z", 20, false)));
        assert!(!filter.matches(&load_at("z", 21, false)));
    }
}
