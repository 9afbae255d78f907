//! Output formatting module

use chrono::Local;
use kipper_app::track::ReplayReport;
use kipper_domain::service::{SiteStats, SummaryPeriod};
use kipper_domain::{CustomMaterial, Load, Site};
use kipper_types::{OutputFormat, Result};
use serde::Serialize;

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    println!("{}", content);
    Ok(())
}

pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() > max_len {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        s.to_string()
    }
}

fn zone_label<'a>(sites: &'a [Site], load: &'a Load) -> (&'a str, &'a str) {
    let site = sites.iter().find(|s| s.id == load.site_id);
    let site_name = site.map(|s| s.name.as_str()).unwrap_or("-");
    let zone_name = site
        .and_then(|s| s.zone(&load.zone_id))
        .map(|z| z.name.as_str())
        .unwrap_or("-");
    (site_name, zone_name)
}

pub fn output_sites(output_format: OutputFormat, sites: &[Site], active_site_id: Option<&str>) -> Result<()> {
    if output_format == OutputFormat::Json {
        return print_json(sites);
    }

    println!("Sites");
    println!("=====");
    if sites.is_empty() {
        println!("No sites yet. Place a zone with: kipper-log site-add <lat> <lon> <material>");
        return Ok(());
    }

    for site in sites {
        let marker = if Some(site.id.as_str()) == active_site_id { "*" } else { " " };
        println!(
            "{} {:<24} r={:>5.0} m  ({:.5}, {:.5})  {}",
            marker,
            truncate(&site.name, 24),
            site.effective_radius(),
            site.latitude,
            site.longitude,
            site.id
        );
        for zone in &site.zones {
            println!(
                "    - {:<20} r={:>4.0} m  ({:.5}, {:.5})  {}",
                truncate(&zone.name, 20),
                zone.effective_radius(),
                zone.latitude,
                zone.longitude,
                zone.id
            );
        }
    }
    Ok(())
}

pub fn output_materials(output_format: OutputFormat, materials: &[CustomMaterial]) -> Result<()> {
    if output_format == OutputFormat::Json {
        return print_json(materials);
    }

    println!("{:<24} {:<20} {}", "Material", "Color", "ID");
    println!("{}", "-".repeat(82));
    for material in materials {
        println!(
            "{:<24} {:<20} {}",
            truncate(&material.name, 24),
            material.color_class,
            material.id
        );
    }
    Ok(())
}

pub fn output_loads(output_format: OutputFormat, loads: &[Load], sites: &[Site]) -> Result<()> {
    if output_format == OutputFormat::Json {
        return print_json(loads);
    }

    if loads.is_empty() {
        println!("No loads found.");
        return Ok(());
    }

    println!(
        "{:<12} {:<18} {:<16} {:<16} {:<9} {:>7} {:>4}  {}",
        "Date", "Site", "Zone", "Material", "Truck", "m³", "Auto", "ID"
    );
    println!("{}", "-".repeat(130));

    let mut total = 0.0;
    for load in loads {
        let (site_name, zone_name) = zone_label(sites, load);
        total += load.volume;
        println!(
            "{:<12} {:<18} {:<16} {:<16} {:<9} {:>7.1} {:>4}  {}",
            load.timestamp.with_timezone(&Local).format("%m/%d %H:%M"),
            truncate(site_name, 18),
            truncate(zone_name, 16),
            truncate(&load.material, 16),
            load.truck_type.label(),
            load.volume,
            if load.auto_generated { "A" } else { "" },
            load.id
        );
    }

    println!();
    println!("{} loads, {:.1} m³", loads.len(), total);
    Ok(())
}

pub fn output_load(output_format: OutputFormat, action: &str, load: &Load) -> Result<()> {
    if output_format == OutputFormat::Json {
        return print_json(load);
    }

    println!("{}:", action);
    println!("  ID:       {}", load.id);
    println!("  Material: {}", load.material);
    println!("  Truck:    {}", load.truck_type.label());
    println!("  Volume:   {:.1} m³", load.volume);
    println!(
        "  Time:     {}",
        load.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
    );
    Ok(())
}

pub fn output_stats(output_format: OutputFormat, label: &str, stats: &[SiteStats]) -> Result<()> {
    if output_format == OutputFormat::Json {
        return print_json(stats);
    }

    println!("Statistics: {}", label);
    println!("{}", "=".repeat(12 + label.len()));
    if stats.is_empty() {
        println!("No loads in this range.");
        return Ok(());
    }

    for site in stats {
        println!();
        println!(
            "{}  ({} loads, {:.1} m³)",
            site.site_name,
            site.total_count(),
            site.total_volume()
        );
        for entry in &site.materials {
            println!(
                "  {:<24} {:>4} x {:>8.1} m³",
                truncate(&entry.material, 24),
                entry.count,
                entry.volume
            );
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct SummaryRow {
    period: SummaryPeriod,
    volume: f64,
}

pub fn output_summary(output_format: OutputFormat, rows: &[(SummaryPeriod, f64)]) -> Result<()> {
    if output_format == OutputFormat::Json {
        let rows: Vec<SummaryRow> = rows
            .iter()
            .map(|&(period, volume)| SummaryRow { period, volume })
            .collect();
        return print_json(&rows);
    }

    for (period, volume) in rows {
        println!("{:<6} {:>10.1} m³", period.label(), volume);
    }
    Ok(())
}

pub fn output_replay(output_format: OutputFormat, report: &ReplayReport, dry_run: bool) -> Result<()> {
    if output_format == OutputFormat::Json {
        return print_json(report);
    }

    println!("\nReplay Result{}", if dry_run { " (dry run)" } else { "" });
    println!("=============");
    for event in &report.events {
        println!(
            "{}  {:<15} {}",
            event.at.with_timezone(&Local).format("%H:%M:%S"),
            event.kind,
            event.detail
        );
    }
    if !report.events.is_empty() {
        println!();
    }
    println!("Samples:      {} ({} inaccurate)", report.samples, report.inaccurate);
    println!("Loads:        {}", report.loads_created);
    println!("Duplicates:   {}", report.duplicates_suppressed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Aushub", 10), "Aushub");
        assert_eq!(truncate("Baustelle Nordring", 10), "Baustel...");
        assert_eq!(truncate("Mutterböden", 8), "Mutte...");
    }
}
