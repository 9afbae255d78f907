//! CLI definition using clap

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use kipper_domain::service::{HistoryRange, SummaryPeriod};
use kipper_domain::TruckType;
use kipper_types::OutputFormat;

#[derive(Parser)]
#[command(name = "kipper-log")]
#[command(version)]
#[command(about = "Automatic truck load logging with geofenced loading zones")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json, table). Uses config value if not specified.
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Data directory override
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

/// Range for per-site statistics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum StatsRangeArg {
    #[default]
    Today,
    Week,
    All,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a recorded position track (CSV) through the detector
    Replay {
        /// Track file with timestamp,lat,lon,accuracy columns
        track: PathBuf,

        /// Do not write detected loads
        #[arg(long)]
        dry_run: bool,

        /// Truck type for detected loads (3, 4). Uses config value if not specified.
        #[arg(long, short = 't')]
        truck: Option<TruckType>,
    },

    /// Run live detection on samples read from stdin.
    ///
    /// Each line is `lat,lon,accuracy`, stamped with the current time.
    /// `done` confirms and `cancel` discards the open load. `3`/`4` switch the
    /// truck type, `+`/`-` adjust the volume and `material <name>` relabels it.
    /// A changed truck type is saved to config on exit.
    Watch {
        /// Truck type for detected loads (3, 4). Uses config value if not specified.
        #[arg(long, short = 't')]
        truck: Option<TruckType>,
    },

    /// List sites and their loading zones
    Sites,

    /// Place a loading zone; creates a site when none is active
    SiteAdd {
        /// Latitude of the zone center
        #[arg(allow_negative_numbers = true)]
        lat: f64,

        /// Longitude of the zone center
        #[arg(allow_negative_numbers = true)]
        lon: f64,

        /// Material loaded at this zone
        material: String,

        /// Name for a newly created site
        #[arg(long, short = 'n')]
        name: Option<String>,

        /// Start a new site even if one is active
        #[arg(long)]
        new_site: bool,
    },

    /// Rename a site
    SiteRename { site_id: String, name: String },

    /// Set a site's radius in meters
    SiteRadius { site_id: String, radius: f64 },

    /// Delete a site with all its zones
    SiteDelete { site_id: String },

    /// Set a zone's radius in meters
    ZoneRadius { zone_id: String, radius: f64 },

    /// Change the material recorded for a zone
    ZoneMaterial { zone_id: String, material: String },

    /// Delete a loading zone
    ZoneDelete { zone_id: String },

    /// List materials
    Materials,

    /// Add a custom material
    MaterialAdd { name: String },

    /// Delete a material by id or name
    MaterialDelete { material: String },

    /// Show load history
    Loads {
        /// today, yesterday, week, all
        #[arg(long, short = 'r', default_value = "today")]
        range: HistoryRange,
    },

    /// Record a load by hand
    LoadAdd {
        /// Zone the load was taken from
        zone_id: String,

        /// Truck type (3, 4). Uses config value if not specified.
        #[arg(long, short = 't')]
        truck: Option<TruckType>,

        /// Material override; defaults to the zone's material
        #[arg(long, short = 'm')]
        material: Option<String>,
    },

    /// Change a load's volume by a delta in m³
    LoadAdjust {
        load_id: String,

        #[arg(allow_negative_numbers = true)]
        delta: f64,
    },

    /// Change a load's truck type (resets its volume)
    LoadTruck { load_id: String, truck: TruckType },

    /// Change a load's material
    LoadMaterial { load_id: String, material: String },

    /// Delete a load
    LoadDelete { load_id: String },

    /// Volume and count per site and material
    Stats {
        #[arg(long, short = 'r', value_enum, default_value_t = StatsRangeArg::Today)]
        range: StatsRangeArg,

        /// Single day (YYYY-MM-DD); overrides --range
        #[arg(long, short = 'd')]
        date: Option<NaiveDate>,
    },

    /// Total volume per period
    Summary {
        /// total, today, week, month, year. All periods if not specified.
        #[arg(long, short = 'p')]
        period: Option<SummaryPeriod>,
    },

    /// Export the load log to CSV
    Export {
        /// Output CSV file path
        #[arg(long, short = 'o', default_value = "kipper-loads.csv")]
        output: PathBuf,
    },

    /// Manage configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Set default output format
        #[arg(long)]
        set_output: Option<OutputFormat>,

        /// Set the truck type used for new loads (3, 4)
        #[arg(long)]
        set_truck: Option<TruckType>,

        /// Enable/disable automatic detection
        #[arg(long)]
        set_auto_detect: Option<bool>,

        /// Set the data directory
        #[arg(long)]
        set_data_dir: Option<PathBuf>,

        /// Set the dwell time in milliseconds
        #[arg(long)]
        set_dwell_ms: Option<u64>,

        /// Set the accuracy limit in meters
        #[arg(long)]
        set_accuracy: Option<f64>,

        /// Reset to defaults
        #[arg(long)]
        reset: bool,
    },
}
