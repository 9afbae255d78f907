//! Sites, their zones and the active site, persisted as `sites.json`

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use kipper_domain::constants::{DEFAULT_SITE_NAME, DEFAULT_SITE_RADIUS_M, DEFAULT_ZONE_RADIUS_M};
use kipper_domain::service::site_containing;
use kipper_domain::{Coordinate, Site, Zone, ZoneRegistry};
use kipper_types::{Error, Result, StoreError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::json_file::{read_or_default, write_pretty};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SiteFile {
    #[serde(default)]
    sites: Vec<Site>,
    #[serde(default)]
    active_site_id: Option<String>,
}

/// File-backed zone registry with editing operations
pub struct SiteStore {
    store_path: PathBuf,
    data: Mutex<SiteFile>,
}

fn radius_or(radius: f64, default: f64) -> f64 {
    if radius > 0.0 {
        radius
    } else {
        default
    }
}

fn non_empty(value: &str, what: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::InvalidInput(format!("{} is empty", what)));
    }
    Ok(value.to_string())
}

fn site_mut<'a>(data: &'a mut SiteFile, site_id: &str) -> Result<&'a mut Site> {
    data.sites
        .iter_mut()
        .find(|s| s.id == site_id)
        .ok_or_else(|| Error::NotFound(format!("site {}", site_id)))
}

fn zone_mut<'a>(data: &'a mut SiteFile, zone_id: &str) -> Result<&'a mut Zone> {
    data.sites
        .iter_mut()
        .flat_map(|s| s.zones.iter_mut())
        .find(|z| z.id == zone_id)
        .ok_or_else(|| Error::NotFound(format!("zone {}", zone_id)))
}

impl SiteStore {
    /// Create or load the registry in `store_dir`
    pub fn open(store_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&store_dir)?;
        let store_path = store_dir.join("sites.json");
        let data: SiteFile = read_or_default(&store_path)?;
        debug!(path = %store_path.display(), sites = data.sites.len(), "Site store opened");

        Ok(Self {
            store_path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.store_path
    }

    /// Lock and refresh from disk; other processes may have written since
    fn lock(&self) -> Result<MutexGuard<'_, SiteFile>> {
        let mut data = self.data.lock().map_err(|_| StoreError::Poisoned)?;
        *data = read_or_default(&self.store_path)?;
        Ok(data)
    }

    /// Edit a copy and publish it only after it was written
    fn mutate<T>(&self, change: impl FnOnce(&mut SiteFile) -> Result<T>) -> Result<T> {
        let mut data = self.lock()?;
        let mut next = data.clone();
        let out = change(&mut next)?;
        write_pretty(&self.store_path, &next)?;
        *data = next;
        Ok(out)
    }

    pub fn sites(&self) -> Result<Vec<Site>> {
        Ok(self.lock()?.sites.clone())
    }

    pub fn site(&self, site_id: &str) -> Result<Option<Site>> {
        Ok(self.lock()?.sites.iter().find(|s| s.id == site_id).cloned())
    }

    /// Zone with the id of the site it belongs to
    pub fn zone(&self, zone_id: &str) -> Result<Option<(String, Zone)>> {
        let data = self.lock()?;
        Ok(data.sites.iter().find_map(|site| {
            site.zone(zone_id)
                .map(|zone| (site.id.clone(), zone.clone()))
        }))
    }

    pub fn active_site_id(&self) -> Result<Option<String>> {
        Ok(self.lock()?.active_site_id.clone())
    }

    pub fn set_active_site(&self, site_id: Option<&str>) -> Result<()> {
        self.mutate(|data| {
            if let Some(id) = site_id {
                site_mut(data, id)?;
            }
            data.active_site_id = site_id.map(str::to_string);
            Ok(())
        })
    }

    pub fn site_containing(&self, point: Coordinate) -> Result<Option<Site>> {
        Ok(site_containing(point, &self.lock()?.sites).cloned())
    }

    /// Make the site around `point` active, or clear the active site when
    /// the point is outside every site
    pub fn activate_site_at(&self, point: Coordinate) -> Result<Option<Site>> {
        self.mutate(|data| {
            let found = site_containing(point, &data.sites).cloned();
            data.active_site_id = found.as_ref().map(|s| s.id.clone());
            Ok(found)
        })
    }

    /// Place a new zone at `center`.
    ///
    /// The zone goes into the active site. Without one a new site is created
    /// around the same point, named `site_name` or the default name, and made
    /// active. Returns the owning site after the change and the new zone.
    pub fn add_zone_at(
        &self,
        center: Coordinate,
        material: &str,
        site_name: Option<&str>,
    ) -> Result<(Site, Zone)> {
        let material = non_empty(material, "material name")?;
        self.mutate(|data| {
            let active = data
                .active_site_id
                .clone()
                .filter(|id| data.sites.iter().any(|s| &s.id == id));
            let site_id = match active {
                Some(id) => id,
                None => {
                    let name = site_name
                        .map(str::trim)
                        .filter(|n| !n.is_empty())
                        .unwrap_or(DEFAULT_SITE_NAME);
                    let site = Site::new(name, center);
                    info!(site_id = %site.id, name = %site.name, "Site created");
                    let id = site.id.clone();
                    data.sites.push(site);
                    id
                }
            };

            let zone = Zone::new(material, center);
            let site = site_mut(data, &site_id)?;
            site.zones.push(zone.clone());
            let site = site.clone();
            data.active_site_id = Some(site_id);
            info!(zone_id = %zone.id, site_id = %site.id, material = %zone.material, "Zone added");
            Ok((site, zone))
        })
    }

    pub fn rename_site(&self, site_id: &str, name: &str) -> Result<Site> {
        let name = non_empty(name, "site name")?.to_uppercase();
        self.mutate(|data| {
            let site = site_mut(data, site_id)?;
            site.name = name;
            Ok(site.clone())
        })
    }

    pub fn move_site(&self, site_id: &str, center: Coordinate) -> Result<Site> {
        self.mutate(|data| {
            let site = site_mut(data, site_id)?;
            site.latitude = center.latitude;
            site.longitude = center.longitude;
            Ok(site.clone())
        })
    }

    pub fn resize_site(&self, site_id: &str, radius: f64) -> Result<Site> {
        self.mutate(|data| {
            let site = site_mut(data, site_id)?;
            site.radius = radius_or(radius, DEFAULT_SITE_RADIUS_M);
            Ok(site.clone())
        })
    }

    /// Remove a site with all its zones; recorded loads are kept
    pub fn delete_site(&self, site_id: &str) -> Result<bool> {
        if !self.lock()?.sites.iter().any(|s| s.id == site_id) {
            return Ok(false);
        }
        self.mutate(|data| {
            data.sites.retain(|s| s.id != site_id);
            if data.active_site_id.as_deref() == Some(site_id) {
                data.active_site_id = None;
            }
            Ok(())
        })?;
        info!(site_id = %site_id, "Site deleted");
        Ok(true)
    }

    pub fn move_zone(&self, zone_id: &str, center: Coordinate) -> Result<Zone> {
        self.mutate(|data| {
            let zone = zone_mut(data, zone_id)?;
            zone.latitude = center.latitude;
            zone.longitude = center.longitude;
            Ok(zone.clone())
        })
    }

    pub fn resize_zone(&self, zone_id: &str, radius: f64) -> Result<Zone> {
        self.mutate(|data| {
            let zone = zone_mut(data, zone_id)?;
            zone.radius = radius_or(radius, DEFAULT_ZONE_RADIUS_M);
            Ok(zone.clone())
        })
    }

    /// Change the material future loads of this zone get; the zone keeps its name
    pub fn set_zone_material(&self, zone_id: &str, material: &str) -> Result<Zone> {
        let material = non_empty(material, "material name")?;
        self.mutate(|data| {
            let zone = zone_mut(data, zone_id)?;
            zone.material = material;
            Ok(zone.clone())
        })
    }

    pub fn delete_zone(&self, zone_id: &str) -> Result<bool> {
        if self.zone(zone_id)?.is_none() {
            return Ok(false);
        }
        self.mutate(|data| {
            for site in &mut data.sites {
                site.zones.retain(|z| z.id != zone_id);
            }
            Ok(())
        })?;
        info!(zone_id = %zone_id, "Zone deleted");
        Ok(true)
    }
}

impl ZoneRegistry for SiteStore {
    fn snapshot(&self) -> Result<Vec<Site>> {
        self.sites()
    }
}
