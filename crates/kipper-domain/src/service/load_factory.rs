//! Auto-load creation and duplicate suppression

use chrono::{DateTime, TimeDelta, Utc};
use kipper_types::Result;

use crate::model::{Load, TruckType, Zone};
use crate::repository::{LoadFilter, LoadStore};

/// Build an auto-generated load for `zone`
pub fn create_auto_load(
    site_id: &str,
    zone: &Zone,
    truck_type: TruckType,
    now: DateTime<Utc>,
) -> Load {
    Load {
        id: uuid::Uuid::new_v4().to_string(),
        site_id: site_id.to_string(),
        zone_id: zone.id.clone(),
        material: zone.material.clone(),
        volume: truck_type.default_volume(),
        truck_type,
        timestamp: now,
        auto_generated: true,
    }
}

/// Rejects a new auto load when the zone already produced one recently
#[derive(Debug, Clone, Copy)]
pub struct DuplicateGuard {
    window: TimeDelta,
}

impl DuplicateGuard {
    pub fn new(window: TimeDelta) -> Self {
        Self { window }
    }

    /// Timestamp of the newest auto-generated load for `zone_id`
    pub fn last_auto_load_at<S: LoadStore + ?Sized>(
        store: &S,
        zone_id: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        let loads = store.query(&LoadFilter::for_zone(zone_id).auto_generated(true))?;
        Ok(loads.iter().map(|l| l.timestamp).max())
    }

    /// Decision given the newest auto load timestamp
    pub fn allows_after(&self, last_auto_load_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last_auto_load_at {
            None => true,
            Some(last) => now - last > self.window,
        }
    }

    pub fn allow<S: LoadStore + ?Sized>(
        &self,
        zone_id: &str,
        now: DateTime<Utc>,
        store: &S,
    ) -> Result<bool> {
        let last = Self::last_auto_load_at(store, zone_id)?;
        Ok(self.allows_after(last, now))
    }
}
