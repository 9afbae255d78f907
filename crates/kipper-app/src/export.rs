//! CSV export of the load log

use std::io::Write;
use std::path::Path;

use kipper_domain::{Load, Site};
use kipper_types::Result;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct LoadRow<'a> {
    id: &'a str,
    timestamp: String,
    site: &'a str,
    zone: &'a str,
    material: &'a str,
    truck_type: &'static str,
    volume_m3: f64,
    auto_generated: bool,
}

/// Write loads as CSV, resolving site and zone names from the registry.
/// Loads of deleted sites or zones keep their raw ids.
pub fn write_loads_csv<W: Write>(loads: &[Load], sites: &[Site], writer: W) -> Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    for load in loads {
        let site = sites.iter().find(|s| s.id == load.site_id);
        let site_name = site.map(|s| s.name.as_str()).unwrap_or(load.site_id.as_str());
        let zone_name = site
            .and_then(|s| s.zone(&load.zone_id))
            .map(|z| z.name.as_str())
            .unwrap_or(load.zone_id.as_str());

        csv_writer.serialize(LoadRow {
            id: &load.id,
            timestamp: load.timestamp.to_rfc3339(),
            site: site_name,
            zone: zone_name,
            material: &load.material,
            truck_type: load.truck_type.label(),
            volume_m3: load.volume,
            auto_generated: load.auto_generated,
        })?;
    }

    csv_writer.flush()?;
    Ok(loads.len())
}

/// Export loads to a CSV file
pub fn export_loads_csv(loads: &[Load], sites: &[Site], output_path: &Path) -> Result<usize> {
    let file = std::fs::File::create(output_path)?;
    write_loads_csv(loads, sites, file)
}
