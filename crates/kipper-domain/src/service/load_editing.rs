//! Manual load edits

use kipper_types::{Error, Result};

use crate::constants::VOLUME_STEP_M3;
use crate::model::{round_volume, Load, TruckType};
use crate::repository::LoadStore;

/// Add `delta` m³, rounded to one decimal and clamped at zero
pub fn adjust_volume(load: &mut Load, delta: f64) {
    load.volume = round_volume(load.volume + delta).max(0.0);
}

/// One "+" press
pub fn increment_volume(load: &mut Load) {
    adjust_volume(load, VOLUME_STEP_M3);
}

/// One "-" press
pub fn decrement_volume(load: &mut Load) {
    adjust_volume(load, -VOLUME_STEP_M3);
}

/// New truck type resets the volume to that type's default
pub fn switch_truck_type(load: &mut Load, truck_type: TruckType) {
    load.truck_type = truck_type;
    load.volume = truck_type.default_volume();
}

fn edit<S, F>(store: &S, load_id: &str, change: F) -> Result<Load>
where
    S: LoadStore + ?Sized,
    F: FnOnce(&mut Load),
{
    let mut load = store
        .get(load_id)?
        .ok_or_else(|| Error::NotFound(format!("load {}", load_id)))?;
    change(&mut load);
    if !store.update(&load)? {
        return Err(Error::NotFound(format!("load {}", load_id)));
    }
    Ok(load)
}

pub fn adjust_load_volume<S: LoadStore + ?Sized>(store: &S, load_id: &str, delta: f64) -> Result<Load> {
    edit(store, load_id, |load| adjust_volume(load, delta))
}

pub fn switch_load_truck_type<S: LoadStore + ?Sized>(
    store: &S,
    load_id: &str,
    truck_type: TruckType,
) -> Result<Load> {
    edit(store, load_id, |load| switch_truck_type(load, truck_type))
}

pub fn set_load_material<S: LoadStore + ?Sized>(store: &S, load_id: &str, material: &str) -> Result<Load> {
    let material = material.trim();
    if material.is_empty() {
        return Err(Error::InvalidInput("material name is empty".to_string()));
    }
    edit(store, load_id, |load| load.material = material.to_string())
}
