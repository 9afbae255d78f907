//! Kipper-log domain
//!
//! Models for sites, loading zones and loads, plus the geofence detection
//! engine that turns a stream of position samples into load records.

pub mod constants;
pub mod geo;
pub mod model;
pub mod repository;
pub mod service;

pub use model::*;
pub use repository::{LoadFilter, LoadStore, ZoneRegistry};
