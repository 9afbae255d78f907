//! Detection engine: state machine plus its collaborators
//!
//! Classifies samples against a fresh registry snapshot, feeds the state
//! machine and writes the resulting loads to the store. Timer effects are
//! returned to the caller, which owns the clock.

use chrono::{DateTime, Utc};
use kipper_types::Result;
use tracing::{debug, info, warn};

use crate::model::{Load, Position, TruckType};
use crate::repository::{LoadStore, ZoneRegistry};
use crate::service::detection::{
    DetectionConfig, DetectionEffect, DetectionEvent, DetectionMemory, DetectionState,
};
use crate::service::load_editing;
use crate::service::load_factory::DuplicateGuard;
use crate::service::zone_index::locate;

pub struct DetectionEngine<R, S> {
    registry: R,
    store: S,
    config: DetectionConfig,
    memory: DetectionMemory,
    truck_type: TruckType,
    auto_detect_enabled: bool,
}

impl<R: ZoneRegistry, S: LoadStore> DetectionEngine<R, S> {
    pub fn new(registry: R, store: S, config: DetectionConfig) -> Self {
        Self {
            registry,
            store,
            config,
            memory: DetectionMemory::new(),
            truck_type: TruckType::default(),
            auto_detect_enabled: true,
        }
    }

    pub fn with_truck_type(mut self, truck_type: TruckType) -> Self {
        self.truck_type = truck_type;
        self
    }

    pub fn with_auto_detect(mut self, enabled: bool) -> Self {
        self.auto_detect_enabled = enabled;
        self
    }

    pub fn memory(&self) -> &DetectionMemory {
        &self.memory
    }

    pub fn state(&self) -> DetectionState {
        self.memory.state()
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn active_load_id(&self) -> Option<&str> {
        self.memory.active_load_id()
    }

    /// Device-wide default for new auto loads
    pub fn truck_type(&self) -> TruckType {
        self.truck_type
    }

    pub fn set_truck_type(&mut self, truck_type: TruckType) {
        self.truck_type = truck_type;
    }

    pub fn auto_detect_enabled(&self) -> bool {
        self.auto_detect_enabled
    }

    /// Disabling only gates new samples; the memory is kept as is
    pub fn set_auto_detect_enabled(&mut self, enabled: bool) {
        self.auto_detect_enabled = enabled;
    }

    /// Dwell progress in percent
    pub fn progress(&self, now: DateTime<Utc>) -> f64 {
        self.memory.dwell().progress(now)
    }

    /// Ticket and deadline of the outstanding timer
    pub fn next_deadline(&self) -> Option<(u64, DateTime<Utc>)> {
        self.memory
            .dwell()
            .armed()
            .map(|armed| (armed.ticket, armed.deadline))
    }

    pub fn on_position(&mut self, position: &Position) -> Result<Vec<DetectionEffect>> {
        if !self.auto_detect_enabled {
            return Ok(Vec::new());
        }
        if !position.is_accurate(self.config.accuracy_threshold_m) {
            debug!(accuracy = position.accuracy, "Sample dropped: accuracy too low");
            return Ok(Vec::new());
        }

        let sites = self.registry.snapshot()?;
        let hit = locate(position.coordinate(), &sites);
        let effects = self.memory.apply(
            DetectionEvent::Sample {
                position,
                hit,
                truck_type: self.truck_type,
            },
            &self.config,
        );
        self.commit(effects)
    }

    pub fn on_timer_expired(&mut self, ticket: u64, now: DateTime<Utc>) -> Result<Vec<DetectionEffect>> {
        let last_auto_load_at = match self.memory.dwell().armed() {
            Some(armed) if armed.ticket == ticket => {
                DuplicateGuard::last_auto_load_at(&self.store, &armed.zone.id)?
            }
            _ => None,
        };
        let effects = self.memory.apply(
            DetectionEvent::TimerExpired {
                ticket,
                now,
                last_auto_load_at,
            },
            &self.config,
        );
        self.commit(effects)
    }

    /// Fire the outstanding timer if it is due at `now`, using its deadline
    /// as the expiry time. Drives the engine in simulated time.
    pub fn poll_timer(&mut self, now: DateTime<Utc>) -> Result<Vec<DetectionEffect>> {
        match self.next_deadline() {
            Some((ticket, deadline)) if deadline <= now => self.on_timer_expired(ticket, deadline),
            _ => Ok(Vec::new()),
        }
    }

    pub fn on_cancel_active(&mut self) -> Result<Vec<DetectionEffect>> {
        let effects = self.memory.apply(DetectionEvent::CancelActive, &self.config);
        self.commit(effects)
    }

    pub fn on_finalize_active(&mut self, now: DateTime<Utc>) -> Result<Vec<DetectionEffect>> {
        let finalized = self.memory.active_load_id().map(str::to_string);
        let effects = self
            .memory
            .apply(DetectionEvent::FinalizeActive { now }, &self.config);
        if let Some(load_id) = finalized {
            info!(load_id = %load_id, "Load finalized");
        }
        self.commit(effects)
    }

    /// Change a load's truck type; editing the open load also changes the
    /// device default used for later auto loads
    pub fn switch_truck_type(&mut self, load_id: &str, truck_type: TruckType) -> Result<Load> {
        let load = load_editing::switch_load_truck_type(&self.store, load_id, truck_type)?;
        if self.memory.active_load_id() == Some(load_id) {
            self.truck_type = truck_type;
        }
        Ok(load)
    }

    /// Change a load's volume by `delta` m³
    pub fn adjust_volume(&self, load_id: &str, delta: f64) -> Result<Load> {
        load_editing::adjust_load_volume(&self.store, load_id, delta)
    }

    pub fn set_material(&self, load_id: &str, material: &str) -> Result<Load> {
        load_editing::set_load_material(&self.store, load_id, material)
    }

    fn commit(&mut self, effects: Vec<DetectionEffect>) -> Result<Vec<DetectionEffect>> {
        for effect in &effects {
            match effect {
                DetectionEffect::AppendLoad(load) => {
                    if let Err(e) = self.store.append(load.clone()) {
                        warn!(load_id = %load.id, error = %e, "Failed to store auto load");
                        self.memory.release_active(&load.id);
                        return Err(e);
                    }
                    info!(
                        load_id = %load.id,
                        zone_id = %load.zone_id,
                        material = %load.material,
                        volume = load.volume,
                        "Auto load recorded"
                    );
                }
                DetectionEffect::RemoveLoad(load_id) => {
                    if self.store.remove(load_id)? {
                        info!(load_id = %load_id, "Active load canceled");
                    } else {
                        warn!(load_id = %load_id, "Canceled load was already deleted");
                    }
                }
                DetectionEffect::DuplicateSuppressed { zone_id } => {
                    info!(zone_id = %zone_id, "Auto load skipped: recent load for zone");
                }
                DetectionEffect::ArmTimer { .. } | DetectionEffect::CancelTimer { .. } => {}
            }
        }
        Ok(effects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Coordinate, Site, Zone};
    use crate::repository::{LoadFilter, MemoryLoadStore};
    use chrono::TimeZone;
    use kipper_types::StoreError;
    use std::sync::Arc;

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn sites() -> Vec<Site> {
        vec![Site::new("A", Coordinate::new(0.0, 0.0))
            .with_zone(Zone::new("Aushub", Coordinate::new(0.0, 0.0)))]
    }

    fn engine() -> DetectionEngine<Vec<Site>, Arc<MemoryLoadStore>> {
        DetectionEngine::new(sites(), Arc::new(MemoryLoadStore::new()), DetectionConfig::default())
    }

    fn inside(ms: i64) -> Position {
        Position::new(0.0, 0.0, 5.0, t(ms))
    }

    struct FailingStore;

    impl LoadStore for FailingStore {
        fn append(&self, _load: Load) -> Result<()> {
            Err(StoreError::Corrupted("disk full".to_string()).into())
        }
        fn remove(&self, _id: &str) -> Result<bool> {
            Ok(false)
        }
        fn query(&self, _filter: &LoadFilter) -> Result<Vec<Load>> {
            Ok(Vec::new())
        }
        fn get(&self, _id: &str) -> Result<Option<Load>> {
            Ok(None)
        }
        fn update(&self, _load: &Load) -> Result<bool> {
            Ok(false)
        }
    }

    #[test]
    fn test_disabled_engine_ignores_samples() {
        let mut engine = engine().with_auto_detect(false);
        assert!(engine.on_position(&inside(0)).unwrap().is_empty());
        assert_eq!(engine.state(), DetectionState::Outside);
    }

    #[test]
    fn test_poll_timer_creates_load() {
        let mut engine = engine();
        engine.on_position(&inside(0)).unwrap();
        assert!(engine.poll_timer(t(4_999)).unwrap().is_empty());
        engine.poll_timer(t(5_200)).unwrap();
        let loads = engine.store().query(&LoadFilter::all()).unwrap();
        assert_eq!(loads.len(), 1);
        assert_eq!(loads[0].timestamp, t(5_000));
        assert_eq!(engine.active_load_id(), Some(loads[0].id.as_str()));
    }

    #[test]
    fn test_truck_type_captured_at_arm_time() {
        let mut engine = engine().with_truck_type(TruckType::ThreeAxle);
        engine.on_position(&inside(0)).unwrap();
        engine.set_truck_type(TruckType::FourAxle);
        engine.poll_timer(t(5_000)).unwrap();
        let loads = engine.store().query(&LoadFilter::all()).unwrap();
        assert_eq!(loads[0].truck_type, TruckType::ThreeAxle);
        assert_eq!(loads[0].volume, 10.0);
    }

    #[test]
    fn test_failed_append_releases_active() {
        let mut engine = DetectionEngine::new(sites(), FailingStore, DetectionConfig::default());
        engine.on_position(&inside(0)).unwrap();
        assert!(engine.poll_timer(t(5_000)).is_err());
        assert!(engine.active_load_id().is_none());
        assert_eq!(engine.state(), DetectionState::Suppressed);
    }

    #[test]
    fn test_switch_truck_type_of_active_load_updates_default() {
        let mut engine = engine();
        engine.on_position(&inside(0)).unwrap();
        engine.poll_timer(t(5_000)).unwrap();
        let id = engine.active_load_id().unwrap().to_string();

        let load = engine.switch_truck_type(&id, TruckType::ThreeAxle).unwrap();
        assert_eq!(load.volume, 10.0);
        assert_eq!(engine.truck_type(), TruckType::ThreeAxle);
    }

    #[test]
    fn test_switch_truck_type_of_other_load_keeps_default() {
        let mut engine = engine();
        let manual = Load::manual("s", "z", "Humus", TruckType::FourAxle, t(0));
        engine.store().append(manual.clone()).unwrap();

        engine.switch_truck_type(&manual.id, TruckType::ThreeAxle).unwrap();
        assert_eq!(engine.truck_type(), TruckType::FourAxle);
        let stored = engine.store().get(&manual.id).unwrap().unwrap();
        assert_eq!(stored.truck_type, TruckType::ThreeAxle);
        assert_eq!(stored.volume, 10.0);
    }

    #[test]
    fn test_registry_changes_seen_on_next_sample() {
        let registry = Arc::new(std::sync::Mutex::new(Vec::<Site>::new()));

        struct Shared(Arc<std::sync::Mutex<Vec<Site>>>);
        impl ZoneRegistry for Shared {
            fn snapshot(&self) -> Result<Vec<Site>> {
                Ok(self.0.lock().unwrap().clone())
            }
        }

        let mut engine = DetectionEngine::new(
            Shared(registry.clone()),
            MemoryLoadStore::new(),
            DetectionConfig::default(),
        );
        engine.on_position(&inside(0)).unwrap();
        assert_eq!(engine.state(), DetectionState::Outside);

        *registry.lock().unwrap() = sites();
        engine.on_position(&inside(1_000)).unwrap();
        assert_eq!(engine.state(), DetectionState::Pending);
    }
}
