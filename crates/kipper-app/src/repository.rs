//! Opening the file stores

use std::path::PathBuf;

use kipper_store::{LoadLog, MaterialStore, SiteStore};
use kipper_types::Result;

use crate::config::Config;

/// Open the load log in the configured data directory
pub fn open_load_log(config: &Config) -> Result<LoadLog> {
    LoadLog::open(config.data_dir()?)
}

/// Open the site registry in the configured data directory
pub fn open_site_store(config: &Config) -> Result<SiteStore> {
    SiteStore::open(config.data_dir()?)
}

/// Open the material catalog in the configured data directory
pub fn open_material_store(config: &Config) -> Result<MaterialStore> {
    MaterialStore::open(config.data_dir()?)
}

/// All three stores of one data directory
pub struct Stores {
    pub loads: LoadLog,
    pub sites: SiteStore,
    pub materials: MaterialStore,
}

impl Stores {
    pub fn open(config: &Config) -> Result<Self> {
        Self::open_at(config.data_dir()?)
    }

    pub fn open_at(data_dir: PathBuf) -> Result<Self> {
        Ok(Self {
            loads: LoadLog::open(data_dir.clone())?,
            sites: SiteStore::open(data_dir.clone())?,
            materials: MaterialStore::open(data_dir)?,
        })
    }
}
