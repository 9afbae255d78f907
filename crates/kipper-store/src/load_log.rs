//! Load history persisted as `loads.json`

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use kipper_domain::{Load, LoadFilter, LoadStore, TruckType};
use kipper_types::{Error, Result, StoreError};
use tracing::debug;

use crate::json_file::{read_or_default, write_pretty};

/// File-backed implementation of [`LoadStore`]
pub struct LoadLog {
    store_path: PathBuf,
    loads: Mutex<Vec<Load>>,
}

impl LoadLog {
    /// Create or load the log in `store_dir`
    pub fn open(store_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&store_dir)?;
        let store_path = store_dir.join("loads.json");
        let loads: Vec<Load> = read_or_default(&store_path)?;
        debug!(path = %store_path.display(), count = loads.len(), "Load log opened");

        Ok(Self {
            store_path,
            loads: Mutex::new(loads),
        })
    }

    pub fn path(&self) -> &Path {
        &self.store_path
    }

    /// Lock and refresh from disk; other processes may have written since
    fn lock(&self) -> Result<MutexGuard<'_, Vec<Load>>> {
        let mut loads = self.loads.lock().map_err(|_| StoreError::Poisoned)?;
        *loads = read_or_default(&self.store_path)?;
        Ok(loads)
    }

    /// Apply `change` to a copy, persist it, then publish it.
    /// A failed write leaves the in-memory log untouched.
    fn mutate<T>(&self, change: impl FnOnce(&mut Vec<Load>) -> T) -> Result<T> {
        let mut loads = self.lock()?;
        let mut next = loads.clone();
        let out = change(&mut next);
        write_pretty(&self.store_path, &next)?;
        *loads = next;
        Ok(out)
    }

    /// All loads, newest first
    pub fn all(&self) -> Result<Vec<Load>> {
        self.query(&LoadFilter::all())
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    /// Record a load entered by hand
    pub fn add_manual(
        &self,
        site_id: &str,
        zone_id: &str,
        material: &str,
        truck_type: TruckType,
        timestamp: DateTime<Utc>,
    ) -> Result<Load> {
        let material = material.trim();
        if material.is_empty() {
            return Err(Error::InvalidInput("material name is empty".to_string()));
        }
        let load = Load::manual(site_id, zone_id, material, truck_type, timestamp);
        self.append(load.clone())?;
        Ok(load)
    }
}

impl LoadStore for LoadLog {
    fn append(&self, load: Load) -> Result<()> {
        self.mutate(|loads| loads.push(load))
    }

    fn remove(&self, id: &str) -> Result<bool> {
        if !self.lock()?.iter().any(|l| l.id == id) {
            return Ok(false);
        }
        self.mutate(|loads| loads.retain(|l| l.id != id))?;
        Ok(true)
    }

    fn query(&self, filter: &LoadFilter) -> Result<Vec<Load>> {
        let loads = self.lock()?;
        let mut matched: Vec<Load> = loads.iter().filter(|l| filter.matches(l)).cloned().collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(matched)
    }

    fn get(&self, id: &str) -> Result<Option<Load>> {
        Ok(self.lock()?.iter().find(|l| l.id == id).cloned())
    }

    fn update(&self, load: &Load) -> Result<bool> {
        if !self.lock()?.iter().any(|l| l.id == load.id) {
            return Ok(false);
        }
        self.mutate(|loads| {
            if let Some(existing) = loads.iter_mut().find(|l| l.id == load.id) {
                *existing = load.clone();
            }
        })?;
        Ok(true)
    }
}
