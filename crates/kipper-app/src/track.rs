//! Recorded position tracks and their replay through the detection engine
//!
//! Track CSV header (column order free, names case-insensitive):
//! timestamp,lat,lon,accuracy
//!
//! `timestamp` is RFC 3339 or epoch milliseconds. `latitude`/`longitude`
//! and `lng` are accepted as column aliases.

use std::path::Path;

use chrono::{DateTime, Utc};
use kipper_domain::service::{DetectionEffect, DetectionEngine};
use kipper_domain::{LoadStore, Position, ZoneRegistry};
use kipper_types::{Error, Result};
use serde::Serialize;
use tracing::{debug, info};

struct Columns {
    timestamp: usize,
    latitude: usize,
    longitude: usize,
    accuracy: usize,
}

fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Result<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
        .ok_or_else(|| Error::InvalidInput(format!("missing column: {}", names[0])))
}

fn resolve_columns(headers: &csv::StringRecord) -> Result<Columns> {
    Ok(Columns {
        timestamp: find_column(headers, &["timestamp", "time"])?,
        latitude: find_column(headers, &["lat", "latitude"])?,
        longitude: find_column(headers, &["lon", "longitude", "lng"])?,
        accuracy: find_column(headers, &["accuracy", "acc"])?,
    })
}

fn parse_timestamp(value: &str, row: usize) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    value
        .parse::<i64>()
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .ok_or_else(|| Error::InvalidInput(format!("row {}: invalid timestamp: {}", row, value)))
}

fn parse_f64(record: &csv::StringRecord, index: usize, row: usize, column: &str) -> Result<f64> {
    let value = record.get(index).unwrap_or("");
    value.parse().map_err(|_| {
        Error::InvalidInput(format!("row {}: invalid {}: {}", row, column, value))
    })
}

/// Parse a track from any reader, sorted by time
pub fn read_track<R: std::io::Read>(reader: R) -> Result<Vec<Position>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let columns = resolve_columns(&headers)?;

    let mut track = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let record = result?;
        let row = row_idx + 2; // header is row 1
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }

        let timestamp = parse_timestamp(record.get(columns.timestamp).unwrap_or(""), row)?;
        track.push(Position::new(
            parse_f64(&record, columns.latitude, row, "latitude")?,
            parse_f64(&record, columns.longitude, row, "longitude")?,
            parse_f64(&record, columns.accuracy, row, "accuracy")?,
            timestamp,
        ));
    }

    track.sort_by_key(|p| p.timestamp);
    Ok(track)
}

/// Load a track CSV file
pub fn load_track<P: AsRef<Path>>(path: P) -> Result<Vec<Position>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let track = read_track(file)?;
    debug!(path = %path.display(), samples = track.len(), "Track loaded");
    Ok(track)
}

/// One decision taken during a replay
#[derive(Debug, Clone, Serialize)]
pub struct ReplayEvent {
    pub at: DateTime<Utc>,
    pub kind: &'static str,
    pub detail: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplayReport {
    pub samples: usize,
    pub inaccurate: usize,
    pub loads_created: usize,
    pub duplicates_suppressed: usize,
    pub events: Vec<ReplayEvent>,
}

impl ReplayReport {
    fn record(&mut self, at: DateTime<Utc>, effects: Vec<DetectionEffect>) {
        for effect in effects {
            let (kind, detail) = match effect {
                DetectionEffect::ArmTimer {
                    zone_id, deadline, ..
                } => ("armed", format!("zone {} until {}", zone_id, deadline.to_rfc3339())),
                DetectionEffect::CancelTimer { ticket } => ("timer-canceled", format!("ticket {}", ticket)),
                DetectionEffect::AppendLoad(load) => {
                    self.loads_created += 1;
                    (
                        "load",
                        format!("{} {} m³ ({})", load.material, load.volume, load.truck_type),
                    )
                }
                DetectionEffect::RemoveLoad(id) => ("load-removed", id),
                DetectionEffect::DuplicateSuppressed { zone_id } => {
                    self.duplicates_suppressed += 1;
                    ("duplicate", format!("zone {}", zone_id))
                }
            };
            self.events.push(ReplayEvent { at, kind, detail });
        }
    }
}

/// Feed a recorded track through the engine in simulated time.
///
/// Before each sample a due dwell timer fires at its own deadline, exactly as
/// the live timer would have. Timers still running after the last sample
/// never fire.
pub fn replay<R, S>(engine: &mut DetectionEngine<R, S>, track: &[Position]) -> Result<ReplayReport>
where
    R: ZoneRegistry,
    S: LoadStore,
{
    let mut report = ReplayReport::default();
    let threshold = engine.config().accuracy_threshold_m;

    for position in track {
        if let Some((_, deadline)) = engine.next_deadline() {
            let effects = engine.poll_timer(position.timestamp)?;
            report.record(deadline, effects);
        }

        report.samples += 1;
        if !position.is_accurate(threshold) {
            report.inaccurate += 1;
        }
        let effects = engine.on_position(position)?;
        report.record(position.timestamp, effects);
    }

    info!(
        samples = report.samples,
        loads = report.loads_created,
        duplicates = report.duplicates_suppressed,
        "Replay finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kipper_domain::repository::MemoryLoadStore;
    use kipper_domain::service::DetectionConfig;
    use kipper_domain::{Coordinate, LoadFilter, Site, Zone};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TRACK: &str = "\
timestamp,lat,lon,accuracy
2024-05-15T08:00:00Z,48.0100,11.0,5
2024-05-15T08:00:01Z,48.0000,11.0,5
2024-05-15T08:00:02Z,48.0000,11.0,5
2024-05-15T08:00:03Z,48.0000,11.0,80
2024-05-15T08:00:04Z,48.0000,11.0,5
2024-05-15T08:00:05Z,48.0000,11.0,5
2024-05-15T08:00:06Z,48.0000,11.0,5
2024-05-15T08:00:07Z,48.0000,11.0,5
2024-05-15T08:00:08Z,48.0100,11.0,5
";

    fn sites() -> Vec<Site> {
        vec![Site::new("Nord", Coordinate::new(48.0, 11.0))
            .with_zone(Zone::new("Aushub", Coordinate::new(48.0, 11.0)))]
    }

    #[test]
    fn test_read_track() {
        let track = read_track(TRACK.as_bytes()).unwrap();
        assert_eq!(track.len(), 9);
        assert_eq!(track[3].accuracy, 80.0);
        assert_eq!(track[1].latitude, 48.0);
    }

    #[test]
    fn test_column_aliases_and_epoch_millis() {
        let csv = "Latitude,Longitude,Accuracy,Timestamp\n48.0,11.0,3.5,1715760001000\n48.1,11.1,4,1715760000000\n";
        let track = read_track(csv.as_bytes()).unwrap();
        assert_eq!(track.len(), 2);
        // Sorted by time
        assert_eq!(track[0].latitude, 48.1);
        assert_eq!(track[1].timestamp.timestamp_millis(), 1_715_760_001_000);
    }

    #[test]
    fn test_invalid_rows() {
        let missing = "timestamp,lat,lon\n2024-05-15T08:00:00Z,48.0,11.0\n";
        assert!(matches!(read_track(missing.as_bytes()), Err(Error::InvalidInput(_))));

        let bad = "timestamp,lat,lon,accuracy\nyesterday,48.0,11.0,5\n";
        let err = read_track(bad.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("row 2"));
    }

    #[test]
    fn test_replay_records_load_at_deadline() {
        let track = read_track(TRACK.as_bytes()).unwrap();
        let store = MemoryLoadStore::new();
        let mut engine = DetectionEngine::new(sites(), store, DetectionConfig::default());

        let report = replay(&mut engine, &track).unwrap();
        assert_eq!(report.samples, 9);
        assert_eq!(report.inaccurate, 1);
        assert_eq!(report.loads_created, 1);

        let loads = engine.store().query(&LoadFilter::all()).unwrap();
        assert_eq!(loads.len(), 1);
        assert_eq!(loads[0].timestamp, track[1].timestamp + chrono::TimeDelta::seconds(5));
        // Exit at the end drops the open pointer; the load stays
        assert!(engine.active_load_id().is_none());
        assert!(report.events.iter().any(|e| e.kind == "load"));
    }

    #[test]
    fn test_load_track_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(TRACK.as_bytes()).unwrap();
        let track = load_track(file.path()).unwrap();
        assert_eq!(track.len(), 9);
    }
}
