//! Material catalog persisted as `materials.json`

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use kipper_domain::{default_materials, CustomMaterial, COLOR_PALETTE, FALLBACK_COLOR};
use kipper_types::{Error, Result, StoreError};
use tracing::info;

use crate::json_file::{read_or_default, write_pretty};

/// Ordered material catalog; never empty
pub struct MaterialStore {
    store_path: PathBuf,
    materials: Mutex<Vec<CustomMaterial>>,
}

/// Missing or empty catalog falls back to the defaults
fn read_catalog(path: &Path) -> Result<Vec<CustomMaterial>> {
    let materials: Vec<CustomMaterial> = read_or_default(path)?;
    if materials.is_empty() {
        return Ok(default_materials());
    }
    Ok(materials)
}

impl MaterialStore {
    /// Create or load the catalog; an empty or missing file yields the defaults
    pub fn open(store_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&store_dir)?;
        let store_path = store_dir.join("materials.json");
        let materials = read_catalog(&store_path)?;

        Ok(Self {
            store_path,
            materials: Mutex::new(materials),
        })
    }

    /// Lock and refresh from disk; other processes may have written since
    fn lock(&self) -> Result<MutexGuard<'_, Vec<CustomMaterial>>> {
        let mut materials = self.materials.lock().map_err(|_| StoreError::Poisoned)?;
        *materials = read_catalog(&self.store_path)?;
        Ok(materials)
    }

    pub fn materials(&self) -> Result<Vec<CustomMaterial>> {
        Ok(self.lock()?.clone())
    }

    /// Add a material; names are unique ignoring case.
    /// Colors are handed out from the palette by catalog size.
    pub fn add(&self, name: &str) -> Result<CustomMaterial> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("material name is empty".to_string()));
        }

        let mut materials = self.lock()?;
        if materials.iter().any(|m| m.name.to_lowercase() == name.to_lowercase()) {
            return Err(StoreError::Duplicate(name.to_string()).into());
        }

        let material = CustomMaterial {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            color_class: COLOR_PALETTE[materials.len() % COLOR_PALETTE.len()].to_string(),
        };
        let mut next = materials.clone();
        next.push(material.clone());
        write_pretty(&self.store_path, &next)?;
        *materials = next;
        info!(name = %material.name, color = %material.color_class, "Material added");
        Ok(material)
    }

    /// Delete by id or exact name. The last remaining material is kept.
    pub fn delete(&self, id_or_name: &str) -> Result<bool> {
        let mut materials = self.lock()?;
        let Some(index) = materials
            .iter()
            .position(|m| m.id == id_or_name || m.name == id_or_name)
        else {
            return Ok(false);
        };
        if materials.len() <= 1 {
            return Err(StoreError::LastMaterial.into());
        }

        let mut next = materials.clone();
        let removed = next.remove(index);
        write_pretty(&self.store_path, &next)?;
        *materials = next;
        info!(name = %removed.name, "Material deleted");
        Ok(true)
    }

    /// Color class for a material name, with a neutral fallback
    pub fn color_for(&self, name: &str) -> Result<String> {
        Ok(self
            .lock()?
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.color_class.clone())
            .unwrap_or_else(|| FALLBACK_COLOR.to_string()))
    }
}
