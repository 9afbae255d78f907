//! Command implementations

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, Utc};
use kipper_app::config::Config;
use kipper_app::detection_service::{DetectionService, DetectionServiceError, SystemClock};
use kipper_app::export::export_loads_csv;
use kipper_app::repository::Stores;
use kipper_app::track::{load_track, replay, ReplayReport};
use kipper_domain::constants::VOLUME_STEP_M3;
use kipper_domain::repository::MemoryLoadStore;
use kipper_domain::service::load_editing::{adjust_load_volume, set_load_material, switch_load_truck_type};
use kipper_domain::service::{
    filter_history, site_material_stats, summary_volume, DetectionEngine, HistoryRange, StatsRange,
    SummaryPeriod,
};
use kipper_domain::{Coordinate, LoadFilter, LoadStore, Position, Site, TruckType};
use kipper_types::{Error, OutputFormat, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cli::{Cli, Commands, StatsRangeArg};
use crate::output;

pub fn execute(cli: Cli) -> Result<()> {
    // Load config
    let mut config = Config::load()?;

    // Override from CLI args
    if let Some(ref data_dir) = cli.data_dir {
        config.data_dir = Some(data_dir.clone());
    }
    let output_format = cli.format.unwrap_or(config.output_format);

    match &cli.command {
        Commands::Replay {
            track,
            dry_run,
            truck,
        } => {
            let truck_type = truck.unwrap_or(config.current_truck_type);
            cmd_replay(&config, track.clone(), *dry_run, truck_type, output_format)
        }

        Commands::Watch { truck } => {
            let truck_type = truck.unwrap_or(config.current_truck_type);
            cmd_watch(&config, truck_type)
        }

        Commands::Sites => cmd_sites(&config, output_format),

        Commands::SiteAdd {
            lat,
            lon,
            material,
            name,
            new_site,
        } => cmd_site_add(&config, *lat, *lon, material, name.as_deref(), *new_site),

        Commands::SiteRename { site_id, name } => {
            let stores = Stores::open(&config)?;
            let site = stores.sites.rename_site(site_id, name)?;
            println!("Site renamed: {}", site.name);
            Ok(())
        }

        Commands::SiteRadius { site_id, radius } => {
            let stores = Stores::open(&config)?;
            let site = stores.sites.resize_site(site_id, *radius)?;
            println!("Site radius: {} = {:.0} m", site.name, site.effective_radius());
            Ok(())
        }

        Commands::SiteDelete { site_id } => {
            let stores = Stores::open(&config)?;
            if !stores.sites.delete_site(site_id)? {
                return Err(Error::NotFound(format!("site {}", site_id)));
            }
            println!("Site deleted: {}", site_id);
            Ok(())
        }

        Commands::ZoneRadius { zone_id, radius } => {
            let stores = Stores::open(&config)?;
            let zone = stores.sites.resize_zone(zone_id, *radius)?;
            println!("Zone radius: {} = {:.0} m", zone.name, zone.effective_radius());
            Ok(())
        }

        Commands::ZoneMaterial { zone_id, material } => {
            let stores = Stores::open(&config)?;
            let zone = stores.sites.set_zone_material(zone_id, material)?;
            println!("Zone material: {} -> {}", zone.name, zone.material);
            Ok(())
        }

        Commands::ZoneDelete { zone_id } => {
            let stores = Stores::open(&config)?;
            if !stores.sites.delete_zone(zone_id)? {
                return Err(Error::NotFound(format!("zone {}", zone_id)));
            }
            println!("Zone deleted: {}", zone_id);
            Ok(())
        }

        Commands::Materials => {
            let stores = Stores::open(&config)?;
            output::output_materials(output_format, &stores.materials.materials()?)
        }

        Commands::MaterialAdd { name } => {
            let stores = Stores::open(&config)?;
            let material = stores.materials.add(name)?;
            println!("Material added: {} ({})", material.name, material.color_class);
            Ok(())
        }

        Commands::MaterialDelete { material } => {
            let stores = Stores::open(&config)?;
            if !stores.materials.delete(material)? {
                return Err(Error::NotFound(format!("material {}", material)));
            }
            println!("Material deleted: {}", material);
            Ok(())
        }

        Commands::Loads { range } => cmd_loads(&config, *range, output_format),

        Commands::LoadAdd {
            zone_id,
            truck,
            material,
        } => {
            let truck_type = truck.unwrap_or(config.current_truck_type);
            cmd_load_add(&config, zone_id, truck_type, material.as_deref(), output_format)
        }

        Commands::LoadAdjust { load_id, delta } => {
            let stores = Stores::open(&config)?;
            let load = adjust_load_volume(&stores.loads, load_id, *delta)?;
            output::output_load(output_format, "Volume adjusted", &load)
        }

        Commands::LoadTruck { load_id, truck } => {
            let stores = Stores::open(&config)?;
            let load = switch_load_truck_type(&stores.loads, load_id, *truck)?;
            output::output_load(output_format, "Truck type changed", &load)
        }

        Commands::LoadMaterial { load_id, material } => {
            let stores = Stores::open(&config)?;
            let load = set_load_material(&stores.loads, load_id, material)?;
            output::output_load(output_format, "Material changed", &load)
        }

        Commands::LoadDelete { load_id } => {
            let stores = Stores::open(&config)?;
            if !stores.loads.remove(load_id)? {
                return Err(Error::NotFound(format!("load {}", load_id)));
            }
            println!("Load deleted: {}", load_id);
            Ok(())
        }

        Commands::Stats { range, date } => {
            let range = match (date, range) {
                (Some(day), _) => StatsRange::Day(*day),
                (None, StatsRangeArg::Today) => StatsRange::Today,
                (None, StatsRangeArg::Week) => StatsRange::Week,
                (None, StatsRangeArg::All) => StatsRange::All,
            };
            cmd_stats(&config, range, output_format)
        }

        Commands::Summary { period } => cmd_summary(&config, *period, output_format),

        Commands::Export { output } => cmd_export(&config, output.clone()),

        Commands::Config {
            show,
            set_output,
            set_truck,
            set_auto_detect,
            set_data_dir,
            set_dwell_ms,
            set_accuracy,
            reset,
        } => cmd_config(
            *show,
            *set_output,
            *set_truck,
            *set_auto_detect,
            set_data_dir.clone(),
            *set_dwell_ms,
            *set_accuracy,
            *reset,
        ),
    }
}

fn run_replay<S: LoadStore>(
    config: &Config,
    sites: Vec<Site>,
    store: S,
    truck_type: TruckType,
    track: &[Position],
) -> Result<ReplayReport> {
    let mut engine = DetectionEngine::new(sites, store, config.detection)
        .with_truck_type(truck_type)
        .with_auto_detect(config.auto_detect_enabled);
    replay(&mut engine, track)
}

fn cmd_replay(
    config: &Config,
    track_path: PathBuf,
    dry_run: bool,
    truck_type: TruckType,
    output_format: OutputFormat,
) -> Result<()> {
    let track = load_track(&track_path)?;
    if track.is_empty() {
        return Err(Error::InvalidInput(format!(
            "track has no samples: {}",
            track_path.display()
        )));
    }
    if !config.auto_detect_enabled {
        warn!("Automatic detection is disabled; enable with: kipper-log config --set-auto-detect true");
    }

    let stores = Stores::open(config)?;
    let sites = stores.sites.sites()?;
    if sites.iter().all(|s| s.zones.is_empty()) {
        warn!("No loading zones configured");
    }
    debug!(samples = track.len(), sites = sites.len(), dry_run, "Starting replay");

    let report = if dry_run {
        let store = MemoryLoadStore::with_loads(stores.loads.all()?);
        run_replay(config, sites, store, truck_type, &track)?
    } else {
        run_replay(config, sites, stores.loads, truck_type, &track)?
    };

    output::output_replay(output_format, &report, dry_run)
}

fn detection_error(err: DetectionServiceError) -> Error {
    Error::Detection(err.to_string())
}

/// One line of `watch` input
#[derive(Debug, PartialEq)]
enum WatchInput {
    Sample(Position),
    Done,
    Cancel,
    Truck(TruckType),
    Volume(f64),
    Material(String),
}

fn parse_input(line: &str) -> Result<WatchInput> {
    match line {
        "done" => return Ok(WatchInput::Done),
        "cancel" => return Ok(WatchInput::Cancel),
        "+" => return Ok(WatchInput::Volume(VOLUME_STEP_M3)),
        "-" => return Ok(WatchInput::Volume(-VOLUME_STEP_M3)),
        "3" | "4" => return line.parse().map(WatchInput::Truck).map_err(Error::InvalidInput),
        _ => {}
    }
    if let Some(material) = line.strip_prefix("material ") {
        return Ok(WatchInput::Material(material.trim().to_string()));
    }
    parse_sample(line).map(WatchInput::Sample)
}

/// Parse one `lat,lon,accuracy` line
fn parse_sample(line: &str) -> Result<Position> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 3 {
        return Err(Error::InvalidInput(format!("expected lat,lon,accuracy: {}", line)));
    }
    let number = |value: &str| {
        value
            .parse::<f64>()
            .map_err(|_| Error::InvalidInput(format!("not a number: {}", value)))
    };
    Ok(Position::new(
        number(fields[0])?,
        number(fields[1])?,
        number(fields[2])?,
        Utc::now(),
    ))
}

/// A stopped service ends the session; other failures are shown and skipped
fn report<T>(result: std::result::Result<T, DetectionServiceError>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(DetectionServiceError::Stopped) => Err(detection_error(DetectionServiceError::Stopped)),
        Err(e) => {
            eprintln!("Error: {}", e);
            Ok(None)
        }
    }
}

fn cmd_watch(config: &Config, truck_type: TruckType) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(watch_stdin(config, truck_type));
    // The stdin reader blocks on a worker thread until the next line
    runtime.shutdown_background();
    result
}

async fn watch_stdin(config: &Config, truck_type: TruckType) -> Result<()> {
    let stores = Stores::open(config)?;
    let sites = Arc::new(stores.sites);
    let engine = DetectionEngine::new(sites.clone(), stores.loads, config.detection)
        .with_truck_type(truck_type)
        .with_auto_detect(config.auto_detect_enabled);
    let (service, handle) = DetectionService::new(engine, SystemClock);
    let service = service.with_site_store(sites);

    let shutdown = CancellationToken::new();
    let service_task = tokio::spawn(service.run(shutdown.clone()));

    let mut updates = handle.subscribe();
    let printer = tokio::spawn(async move {
        let mut last = updates.borrow().clone();
        while updates.changed().await.is_ok() {
            let current = updates.borrow_and_update().clone();
            let time = Local::now().format("%H:%M:%S");
            if current.errors != last.errors {
                if let Some(ref message) = current.last_error {
                    eprintln!("{} Error: {}", time, message);
                }
            }
            if current.state != last.state || current.active_load_id != last.active_load_id {
                match current.active_load_id {
                    Some(ref id) => println!("{} {} (load {})", time, current.state, id),
                    None => println!("{} {}", time, current.state),
                }
            }
            last = current;
        }
    });

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    println!("Watching stdin for lat,lon,accuracy samples");
    println!("Open load: done, cancel, 3/4 (truck), +/- (volume), material <name>. Ctrl-D stops.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let input = match parse_input(line) {
            Ok(input) => input,
            Err(e) => {
                warn!(error = %e, "Skipping input line");
                continue;
            }
        };
        let open = handle.snapshot().active_load_id;

        match (input, open) {
            (WatchInput::Sample(position), _) => {
                handle.submit_position(position).await.map_err(detection_error)?
            }
            (WatchInput::Done, _) => {
                if let Some(id) = report(handle.finalize_active().await)? {
                    println!("Confirmed: {}", id.as_deref().unwrap_or("-"));
                }
            }
            (WatchInput::Cancel, _) => {
                if let Some(id) = report(handle.cancel_active().await)? {
                    println!("Canceled: {}", id.as_deref().unwrap_or("-"));
                }
            }
            (WatchInput::Truck(truck), Some(id)) => {
                if let Some(load) = report(handle.switch_truck_type(&id, truck).await)? {
                    println!("{}: {:.1} m³", load.truck_type.label(), load.volume);
                }
            }
            (WatchInput::Truck(truck), None) => {
                handle.set_truck_type(truck).await.map_err(detection_error)?;
                println!("Truck type for new loads: {}", truck.label());
            }
            (WatchInput::Volume(delta), Some(id)) => {
                if let Some(load) = report(handle.adjust_volume(&id, delta).await)? {
                    println!("Volume: {:.1} m³", load.volume);
                }
            }
            (WatchInput::Material(material), Some(id)) => {
                if let Some(load) = report(handle.set_material(&id, &material).await)? {
                    println!("Material: {}", load.material);
                }
            }
            (WatchInput::Volume(_) | WatchInput::Material(_), None) => println!("No open load"),
        }
    }

    // Closing the last handle lets the service drain queued samples
    drop(handle);
    let engine = service_task
        .await
        .map_err(|e| Error::Detection(e.to_string()))?;
    printer.abort();

    if let Some(id) = engine.active_load_id() {
        println!("Open load kept: {}", id);
    }
    if engine.truck_type() != truck_type {
        let mut saved = Config::load()?;
        saved.current_truck_type = engine.truck_type();
        saved.save()?;
        println!("Truck type saved: {}", engine.truck_type().label());
    }
    Ok(())
}

fn cmd_sites(config: &Config, output_format: OutputFormat) -> Result<()> {
    let stores = Stores::open(config)?;
    let sites = stores.sites.sites()?;
    let active = stores.sites.active_site_id()?;
    output::output_sites(output_format, &sites, active.as_deref())
}

fn cmd_site_add(
    config: &Config,
    lat: f64,
    lon: f64,
    material: &str,
    name: Option<&str>,
    new_site: bool,
) -> Result<()> {
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(Error::InvalidInput(format!("invalid coordinate: {}, {}", lat, lon)));
    }

    let stores = Stores::open(config)?;
    let center = Coordinate::new(lat, lon);
    if new_site {
        stores.sites.set_active_site(None)?;
    } else if stores.sites.site_containing(center)?.is_some() {
        // A site covering the point wins over the active one
        stores.sites.activate_site_at(center)?;
    }

    let (site, zone) = stores.sites.add_zone_at(center, material, name)?;
    println!("Zone added:");
    println!("  Site:     {} ({})", site.name, site.id);
    println!("  Zone:     {} ({})", zone.name, zone.id);
    println!("  Material: {}", zone.material);
    println!("  Radius:   {:.0} m", zone.effective_radius());
    Ok(())
}

fn cmd_loads(config: &Config, range: HistoryRange, output_format: OutputFormat) -> Result<()> {
    let stores = Stores::open(config)?;
    let loads = stores.loads.query(&LoadFilter::all())?;
    let history = filter_history(&loads, range, &Local::now());
    output::output_loads(output_format, &history, &stores.sites.sites()?)
}

fn cmd_load_add(
    config: &Config,
    zone_id: &str,
    truck_type: TruckType,
    material: Option<&str>,
    output_format: OutputFormat,
) -> Result<()> {
    let stores = Stores::open(config)?;
    let (site_id, zone) = stores
        .sites
        .zone(zone_id)?
        .ok_or_else(|| Error::NotFound(format!("zone {}", zone_id)))?;
    let material = material.unwrap_or(zone.material.as_str());

    let load = stores
        .loads
        .add_manual(&site_id, &zone.id, material, truck_type, Utc::now())?;
    output::output_load(output_format, "Load recorded", &load)
}

fn cmd_stats(config: &Config, range: StatsRange, output_format: OutputFormat) -> Result<()> {
    let stores = Stores::open(config)?;
    let loads = stores.loads.all()?;
    let sites = stores.sites.sites()?;
    let materials = stores.materials.materials()?;

    let stats = site_material_stats(&loads, &sites, &materials, range, &Local::now());
    let label = match range {
        StatsRange::Today => "today".to_string(),
        StatsRange::Week => "this week".to_string(),
        StatsRange::Day(day) => day.format("%Y-%m-%d").to_string(),
        StatsRange::All => "all".to_string(),
    };
    output::output_stats(output_format, &label, &stats)
}

fn cmd_summary(config: &Config, period: Option<SummaryPeriod>, output_format: OutputFormat) -> Result<()> {
    let stores = Stores::open(config)?;
    let loads = stores.loads.all()?;
    let now = Local::now();

    let periods: Vec<SummaryPeriod> = match period {
        Some(p) => vec![p],
        None => SummaryPeriod::ALL.to_vec(),
    };
    let rows: Vec<(SummaryPeriod, f64)> = periods
        .into_iter()
        .map(|p| (p, summary_volume(&loads, p, &now)))
        .collect();
    output::output_summary(output_format, &rows)
}

fn cmd_export(config: &Config, output: PathBuf) -> Result<()> {
    let stores = Stores::open(config)?;
    let loads = stores.loads.query(&LoadFilter::all())?;
    let sites = stores.sites.sites()?;

    let count = export_loads_csv(&loads, &sites, &output)?;
    println!("Exported {} loads to {}", count, output.display());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_config(
    show: bool,
    set_output: Option<OutputFormat>,
    set_truck: Option<TruckType>,
    set_auto_detect: Option<bool>,
    set_data_dir: Option<PathBuf>,
    set_dwell_ms: Option<u64>,
    set_accuracy: Option<f64>,
    reset: bool,
) -> Result<()> {
    if reset {
        let config = Config::default();
        config.save()?;
        println!("Configuration reset to defaults");
        println!("\n{}", config);
        return Ok(());
    }

    let mut config = Config::load()?;
    let mut modified = false;

    if let Some(output_format) = set_output {
        config.output_format = output_format;
        modified = true;
    }

    if let Some(truck_type) = set_truck {
        config.current_truck_type = truck_type;
        modified = true;
    }

    if let Some(enabled) = set_auto_detect {
        config.auto_detect_enabled = enabled;
        modified = true;
    }

    if let Some(dir) = set_data_dir {
        config.data_dir = Some(dir);
        modified = true;
    }

    if let Some(dwell_ms) = set_dwell_ms {
        if dwell_ms == 0 {
            return Err(Error::InvalidInput("dwell time must be positive".to_string()));
        }
        config.detection.dwell_ms = dwell_ms;
        modified = true;
    }

    if let Some(accuracy) = set_accuracy {
        if accuracy <= 0.0 {
            return Err(Error::InvalidInput("accuracy limit must be positive".to_string()));
        }
        config.detection.accuracy_threshold_m = accuracy;
        modified = true;
    }

    if modified {
        config.save()?;
        println!("Configuration updated");
    }

    if show || !modified {
        println!("{}", config);
    }

    Ok(())
}
