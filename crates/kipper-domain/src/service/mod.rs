//! Domain services

pub mod detection;
pub mod dwell_timer;
pub mod engine;
pub mod load_editing;
pub mod load_factory;
pub mod stats;
pub mod zone_index;

pub use detection::{
    DetectionConfig, DetectionEffect, DetectionEvent, DetectionMemory, DetectionState,
};
pub use dwell_timer::{ArmedDwell, DwellTimer};
pub use engine::DetectionEngine;
pub use load_factory::{create_auto_load, DuplicateGuard};
pub use zone_index::{locate, site_containing, ZoneHit};
pub use stats::{
    filter_history, site_material_stats, summary_volume, HistoryRange, MaterialTotals, SiteStats,
    StatsRange, SummaryPeriod,
};
