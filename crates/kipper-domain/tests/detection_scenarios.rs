//! End-to-end detection scenarios on 1 Hz position streams

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use kipper_domain::repository::MemoryLoadStore;
use kipper_domain::service::{DetectionConfig, DetectionEffect, DetectionEngine, DetectionState};
use kipper_domain::{Coordinate, LoadFilter, LoadStore, Position, Site, TruckType, Zone};

const ZONE: (f64, f64) = (48.0, 11.0);
const OTHER_ZONE: (f64, f64) = (48.001, 11.0);
const AWAY: (f64, f64) = (48.01, 11.0);

type Engine = DetectionEngine<Vec<Site>, Arc<MemoryLoadStore>>;

fn t(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_700_000_000_000 + secs * 1000).unwrap()
}

fn registry() -> Vec<Site> {
    vec![Site::new("Baustelle Nord", Coordinate::new(ZONE.0, ZONE.1))
        .with_zone(Zone::new("Aushub", Coordinate::new(ZONE.0, ZONE.1)))
        .with_zone(Zone::new("Humus", Coordinate::new(OTHER_ZONE.0, OTHER_ZONE.1)))]
}

fn engine() -> Engine {
    DetectionEngine::new(registry(), Arc::new(MemoryLoadStore::new()), DetectionConfig::default())
}

/// Feed one sample the way a live stream would: due timers fire first
fn sample(engine: &mut Engine, secs: i64, at: (f64, f64), accuracy: f64) -> Vec<DetectionEffect> {
    let now = t(secs);
    let mut effects = engine.poll_timer(now).unwrap();
    effects.extend(engine.on_position(&Position::new(at.0, at.1, accuracy, now)).unwrap());
    effects
}

fn stay(engine: &mut Engine, from: i64, to: i64, at: (f64, f64)) -> Vec<DetectionEffect> {
    (from..=to).flat_map(|s| sample(engine, s, at, 5.0)).collect()
}

fn loads(engine: &Engine) -> Vec<kipper_domain::Load> {
    engine.store().query(&LoadFilter::all()).unwrap()
}

fn zone_id(engine: &Engine, index: usize) -> String {
    engine.registry()[0].zones[index].id.clone()
}

#[test]
fn test_six_seconds_in_zone_records_one_load() {
    let mut engine = engine();
    stay(&mut engine, 0, 6, ZONE);

    let loads = loads(&engine);
    assert_eq!(loads.len(), 1);
    let load = &loads[0];
    assert_eq!(load.truck_type, TruckType::FourAxle);
    assert_eq!(load.volume, 12.0);
    assert_eq!(load.material, "Aushub");
    assert_eq!(load.zone_id, zone_id(&engine, 0));
    assert!(load.auto_generated);
    assert!(load.timestamp >= t(5) && load.timestamp <= t(6));
    assert_eq!(engine.active_load_id(), Some(load.id.as_str()));
    assert_eq!(engine.state(), DetectionState::Active);
}

#[test]
fn test_cancel_suppresses_zone_until_exit() {
    let mut engine = engine();
    stay(&mut engine, 0, 5, ZONE);
    assert_eq!(loads(&engine).len(), 1);

    engine.on_cancel_active().unwrap();
    assert!(loads(&engine).is_empty());
    assert_eq!(engine.state(), DetectionState::Suppressed);

    stay(&mut engine, 6, 16, ZONE);
    assert!(loads(&engine).is_empty());
    assert!(engine.next_deadline().is_none());

    sample(&mut engine, 17, AWAY, 5.0);
    assert_eq!(engine.state(), DetectionState::Outside);

    let effects = sample(&mut engine, 18, ZONE, 5.0);
    assert!(effects
        .iter()
        .any(|e| matches!(e, DetectionEffect::ArmTimer { .. })));
    stay(&mut engine, 19, 23, ZONE);
    assert_eq!(loads(&engine).len(), 1);
}

#[test]
fn test_finalize_cooldown_blocks_reentry() {
    let mut engine = engine();
    stay(&mut engine, 0, 5, ZONE);
    engine.on_finalize_active(t(6)).unwrap();
    assert!(engine.active_load_id().is_none());
    assert_eq!(engine.state(), DetectionState::Outside);

    // Cooldown ends at 9 s inclusive
    stay(&mut engine, 7, 9, ZONE);
    assert!(engine.next_deadline().is_none());

    sample(&mut engine, 10, ZONE, 5.0);
    assert_eq!(engine.state(), DetectionState::Pending);

    // Previous load at 5 s is still inside the duplicate window at 15 s
    let effects = stay(&mut engine, 11, 15, ZONE);
    assert!(effects
        .iter()
        .any(|e| matches!(e, DetectionEffect::DuplicateSuppressed { .. })));
    assert_eq!(loads(&engine).len(), 1);
}

#[test]
fn test_exit_before_dwell_records_nothing() {
    let mut engine = engine();
    stay(&mut engine, 0, 3, ZONE);
    let effects = sample(&mut engine, 4, AWAY, 5.0);
    assert!(effects
        .iter()
        .any(|e| matches!(e, DetectionEffect::CancelTimer { .. })));

    stay(&mut engine, 5, 12, AWAY);
    assert!(loads(&engine).is_empty());
    assert_eq!(engine.state(), DetectionState::Outside);
}

#[test]
fn test_inaccurate_samples_change_nothing() {
    let mut engine = engine();
    assert!(sample(&mut engine, 0, ZONE, 80.0).is_empty());
    assert_eq!(engine.state(), DetectionState::Outside);

    sample(&mut engine, 1, ZONE, 5.0);
    let before = engine.memory().clone();
    // A bad fix far away must not count as an exit
    for s in 2..=4 {
        assert!(sample(&mut engine, s, AWAY, 120.0).is_empty());
    }
    assert_eq!(engine.memory(), &before);

    stay(&mut engine, 5, 6, ZONE);
    assert_eq!(loads(&engine).len(), 1);
}

#[test]
fn test_duplicate_window_per_zone() {
    let mut engine = engine();
    stay(&mut engine, 0, 5, ZONE);
    let first = loads(&engine)[0].timestamp;

    sample(&mut engine, 6, AWAY, 5.0);
    let effects = stay(&mut engine, 7, 12, ZONE);
    assert!(effects
        .iter()
        .any(|e| matches!(e, DetectionEffect::DuplicateSuppressed { .. })));
    assert_eq!(loads(&engine).len(), 1);

    sample(&mut engine, 13, AWAY, 5.0);
    stay(&mut engine, 16, 21, ZONE);
    let all = loads(&engine);
    assert_eq!(all.len(), 2);
    assert!(all[0].timestamp - first > chrono::TimeDelta::seconds(15));
}

#[test]
fn test_other_zone_not_blocked_by_duplicate_window() {
    let mut engine = engine();
    stay(&mut engine, 0, 5, ZONE);
    stay(&mut engine, 6, 11, OTHER_ZONE);

    let all = loads(&engine);
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].material, "Humus");
    assert_eq!(all[0].zone_id, zone_id(&engine, 1));
}

#[test]
fn test_overlapping_zones_resolve_to_first() {
    let site = Site::new("Mitte", Coordinate::new(ZONE.0, ZONE.1))
        .with_zone(Zone::new("Bauschutt", Coordinate::new(48.0, 11.0)))
        .with_zone(Zone::new("Humus", Coordinate::new(48.0001, 11.0)));
    let first_zone = site.zones[0].id.clone();
    let mut engine = DetectionEngine::new(
        vec![site],
        Arc::new(MemoryLoadStore::new()),
        DetectionConfig::default(),
    );

    stay(&mut engine, 0, 5, (48.00005, 11.0));
    let all = loads(&engine);
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].zone_id, first_zone);
    assert_eq!(all[0].material, "Bauschutt");
}

#[test]
fn test_stale_timer_expiry_is_ignored() {
    let mut engine = engine();
    sample(&mut engine, 0, ZONE, 5.0);
    let (first_ticket, _) = engine.next_deadline().unwrap();

    sample(&mut engine, 2, OTHER_ZONE, 5.0);
    let (second_ticket, deadline) = engine.next_deadline().unwrap();
    assert_ne!(first_ticket, second_ticket);
    assert_eq!(deadline, t(7));

    assert!(engine.on_timer_expired(first_ticket, t(5)).unwrap().is_empty());
    assert!(loads(&engine).is_empty());
    assert_eq!(engine.state(), DetectionState::Pending);
}

#[test]
fn test_three_axle_default_volume() {
    let mut engine = engine().with_truck_type(TruckType::ThreeAxle);
    stay(&mut engine, 0, 5, ZONE);
    assert_eq!(loads(&engine)[0].volume, 10.0);
}
