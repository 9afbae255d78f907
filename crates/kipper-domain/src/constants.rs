//! Default geofence radii and detection timings

/// Mean earth radius used for haversine distances
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Default radius of a loading zone
pub const DEFAULT_ZONE_RADIUS_M: f64 = 25.0;

/// Default radius of a construction site
pub const DEFAULT_SITE_RADIUS_M: f64 = 200.0;

/// Continuous time inside a zone before a load is recorded
pub const DWELL_TIME_MS: u64 = 5_000;

/// Window after "done" during which zone entries are ignored
pub const FINALIZE_COOLDOWN_MS: u64 = 3_000;

/// Minimum spacing between two auto-generated loads of the same zone
pub const DUPLICATE_WINDOW_MS: u64 = 15_000;

/// Upper bound accepted for any configured detection timing (one day)
pub const MAX_TIMING_MS: u64 = 86_400_000;

/// Samples less accurate than this are ignored by the detector
pub const ACCURACY_THRESHOLD_M: f64 = 50.0;

/// Step used by the +/- volume buttons
pub const VOLUME_STEP_M3: f64 = 0.5;

/// Name given to a site created without an explicit name
pub const DEFAULT_SITE_NAME: &str = "Neue Baustelle";
