//! Volume summaries, history filters and per-site material statistics
//!
//! Calendar boundaries are taken in the time zone of the `now` passed in.
//! Weeks start on Monday.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, TimeZone, Utc};
use serde::Serialize;

use crate::model::{round_volume, CustomMaterial, Load, Site};

/// Period shown by the running total; cycles in declaration order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryPeriod {
    #[default]
    Total,
    Today,
    Week,
    Month,
    Year,
}

impl SummaryPeriod {
    pub const ALL: [SummaryPeriod; 5] = [
        SummaryPeriod::Total,
        SummaryPeriod::Today,
        SummaryPeriod::Week,
        SummaryPeriod::Month,
        SummaryPeriod::Year,
    ];

    pub fn next(self) -> Self {
        match self {
            SummaryPeriod::Total => SummaryPeriod::Today,
            SummaryPeriod::Today => SummaryPeriod::Week,
            SummaryPeriod::Week => SummaryPeriod::Month,
            SummaryPeriod::Month => SummaryPeriod::Year,
            SummaryPeriod::Year => SummaryPeriod::Total,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SummaryPeriod::Total => "Total",
            SummaryPeriod::Today => "Heute",
            SummaryPeriod::Week => "Woche",
            SummaryPeriod::Month => "Monat",
            SummaryPeriod::Year => "Jahr",
        }
    }
}

impl fmt::Display for SummaryPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SummaryPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "total" => Ok(SummaryPeriod::Total),
            "today" | "heute" => Ok(SummaryPeriod::Today),
            "week" | "woche" => Ok(SummaryPeriod::Week),
            "month" | "monat" => Ok(SummaryPeriod::Month),
            "year" | "jahr" => Ok(SummaryPeriod::Year),
            other => Err(format!("unknown period: {}", other)),
        }
    }
}

/// Filter for the load history list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HistoryRange {
    #[default]
    Today,
    Yesterday,
    Week,
    All,
}

impl FromStr for HistoryRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "today" | "heute" => Ok(HistoryRange::Today),
            "yesterday" | "gestern" => Ok(HistoryRange::Yesterday),
            "week" | "woche" => Ok(HistoryRange::Week),
            "all" | "alle" => Ok(HistoryRange::All),
            other => Err(format!("unknown range: {}", other)),
        }
    }
}

/// Filter for per-site statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsRange {
    Today,
    Week,
    Day(NaiveDate),
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialTotals {
    pub material: String,
    pub volume: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteStats {
    pub site_id: String,
    pub site_name: String,
    pub materials: Vec<MaterialTotals>,
}

impl SiteStats {
    pub fn total_volume(&self) -> f64 {
        round_volume(self.materials.iter().map(|m| m.volume).sum())
    }

    pub fn total_count(&self) -> usize {
        self.materials.iter().map(|m| m.count).sum()
    }
}

fn local_date<Tz: TimeZone>(timestamp: &DateTime<Utc>, tz: &Tz) -> NaiveDate {
    timestamp.with_timezone(tz).date_naive()
}

fn week_start(today: NaiveDate) -> NaiveDate {
    today - TimeDelta::days(i64::from(today.weekday().num_days_from_monday()))
}

fn period_start(period: SummaryPeriod, today: NaiveDate) -> Option<NaiveDate> {
    match period {
        SummaryPeriod::Total => None,
        SummaryPeriod::Today => Some(today),
        SummaryPeriod::Week => Some(week_start(today)),
        SummaryPeriod::Month => Some(today.with_day(1).unwrap_or(today)),
        SummaryPeriod::Year => Some(today.with_ordinal(1).unwrap_or(today)),
    }
}

/// Summed volume of all loads in the period, rounded to one decimal
pub fn summary_volume<Tz: TimeZone>(loads: &[Load], period: SummaryPeriod, now: &DateTime<Tz>) -> f64 {
    let tz = now.timezone();
    let start = period_start(period, now.date_naive());
    let total: f64 = loads
        .iter()
        .filter(|load| match start {
            Some(start) => local_date(&load.timestamp, &tz) >= start,
            None => true,
        })
        .map(|load| load.volume)
        .sum();
    round_volume(total)
}

/// Loads inside the history range, newest first
pub fn filter_history<Tz: TimeZone>(loads: &[Load], range: HistoryRange, now: &DateTime<Tz>) -> Vec<Load> {
    let tz = now.timezone();
    let today = now.date_naive();
    let yesterday = today.pred_opt();
    let monday = week_start(today);

    let mut result: Vec<Load> = loads
        .iter()
        .filter(|load| {
            let date = local_date(&load.timestamp, &tz);
            match range {
                HistoryRange::Today => date >= today,
                HistoryRange::Yesterday => Some(date) == yesterday,
                HistoryRange::Week => date >= monday,
                HistoryRange::All => true,
            }
        })
        .cloned()
        .collect();
    result.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    result
}

/// Volume and count per material for every site with loads in the range.
///
/// Sites keep their registry order. Materials follow the catalog order,
/// followed by names no longer in the catalog in order of appearance.
/// Loads of deleted sites are not counted.
pub fn site_material_stats<Tz: TimeZone>(
    loads: &[Load],
    sites: &[Site],
    materials: &[CustomMaterial],
    range: StatsRange,
    now: &DateTime<Tz>,
) -> Vec<SiteStats> {
    let tz = now.timezone();
    let today = now.date_naive();
    let monday = week_start(today);
    let in_range = |load: &Load| {
        let date = local_date(&load.timestamp, &tz);
        match range {
            StatsRange::Today => date >= today,
            StatsRange::Week => date >= monday,
            StatsRange::Day(day) => date == day,
            StatsRange::All => true,
        }
    };

    sites
        .iter()
        .filter_map(|site| {
            let mut totals: Vec<MaterialTotals> = materials
                .iter()
                .map(|m| MaterialTotals {
                    material: m.name.clone(),
                    volume: 0.0,
                    count: 0,
                })
                .collect();

            for load in loads.iter().filter(|l| l.site_id == site.id && in_range(*l)) {
                match totals.iter_mut().find(|t| t.material == load.material) {
                    Some(entry) => {
                        entry.volume += load.volume;
                        entry.count += 1;
                    }
                    None => totals.push(MaterialTotals {
                        material: load.material.clone(),
                        volume: load.volume,
                        count: 1,
                    }),
                }
            }

            totals.retain(|t| t.count > 0);
            if totals.is_empty() {
                return None;
            }
            for entry in &mut totals {
                entry.volume = round_volume(entry.volume);
            }
            Some(SiteStats {
                site_id: site.id.clone(),
                site_name: site.name.clone(),
                materials: totals,
            })
        })
        .collect()
}
