//! Domain model types

pub mod load;
pub mod material;
pub mod position;
pub mod site;

pub use load::{round_volume, Load, TruckType};
pub use material::{default_materials, CustomMaterial, COLOR_PALETTE, FALLBACK_COLOR};
pub use position::{Coordinate, Position};
pub use site::{Site, Zone};
