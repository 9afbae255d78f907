//! Integration tests: stores on disk, track replay and export together

use chrono::{Local, TimeDelta};
use kipper_app::export::export_loads_csv;
use kipper_app::repository::Stores;
use kipper_app::track::{read_track, replay};
use kipper_domain::service::{
    load_editing::adjust_load_volume, site_material_stats, DetectionConfig, DetectionEngine, StatsRange,
};
use kipper_domain::{Coordinate, LoadFilter, LoadStore, TruckType};
use tempfile::tempdir;

fn track_csv() -> String {
    let start = chrono::Utc::now() - TimeDelta::minutes(10);
    let mut csv = String::from("timestamp,lat,lon,accuracy\n");
    for s in 0..8 {
        let ts = start + TimeDelta::seconds(s);
        csv.push_str(&format!("{},48.0,11.0,6\n", ts.to_rfc3339()));
    }
    let ts = start + TimeDelta::seconds(8);
    csv.push_str(&format!("{},48.01,11.0,6\n", ts.to_rfc3339()));
    csv
}

#[test]
fn test_replay_persists_loads_across_reopen() {
    let dir = tempdir().unwrap();

    let zone_id = {
        let stores = Stores::open_at(dir.path().to_path_buf()).unwrap();
        let (site, zone) = stores
            .sites
            .add_zone_at(Coordinate::new(48.0, 11.0), "Aushub", Some("Nordring"))
            .unwrap();
        assert_eq!(site.name, "NORDRING");

        let track = read_track(track_csv().as_bytes()).unwrap();
        let mut engine = DetectionEngine::new(
            stores.sites.sites().unwrap(),
            stores.loads,
            DetectionConfig::default(),
        )
        .with_truck_type(TruckType::ThreeAxle);
        let report = replay(&mut engine, &track).unwrap();
        assert_eq!(report.loads_created, 1);
        zone.id
    };

    let stores = Stores::open_at(dir.path().to_path_buf()).unwrap();
    let loads = stores.loads.query(&LoadFilter::for_zone(&zone_id)).unwrap();
    assert_eq!(loads.len(), 1);
    assert!(loads[0].auto_generated);
    assert_eq!(loads[0].volume, 10.0);

    let adjusted = adjust_load_volume(&stores.loads, &loads[0].id, 0.5).unwrap();
    assert_eq!(adjusted.volume, 10.5);

    let stats = site_material_stats(
        &stores.loads.all().unwrap(),
        &stores.sites.sites().unwrap(),
        &stores.materials.materials().unwrap(),
        StatsRange::All,
        &Local::now(),
    );
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].total_count(), 1);
    assert_eq!(stats[0].total_volume(), 10.5);
}

#[test]
fn test_manual_load_export() {
    let dir = tempdir().unwrap();
    let stores = Stores::open_at(dir.path().to_path_buf()).unwrap();
    let (site, zone) = stores
        .sites
        .add_zone_at(Coordinate::new(48.0, 11.0), "Humus", None)
        .unwrap();
    stores
        .loads
        .add_manual(&site.id, &zone.id, "Humus", TruckType::FourAxle, chrono::Utc::now())
        .unwrap();

    let out = dir.path().join("export.csv");
    let count = export_loads_csv(
        &stores.loads.all().unwrap(),
        &stores.sites.sites().unwrap(),
        &out,
    )
    .unwrap();
    assert_eq!(count, 1);

    let text = std::fs::read_to_string(&out).unwrap();
    assert!(text.contains(",NEUE BAUSTELLE,"));
    assert!(text.contains(",Humus,Humus,4-Achser,12.0,false"));
}
