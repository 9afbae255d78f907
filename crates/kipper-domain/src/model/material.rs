//! Material catalog entries

use serde::{Deserialize, Serialize};

/// Material with its display color class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomMaterial {
    pub id: String,
    pub name: String,
    pub color_class: String,
}

/// Colors handed out to new materials in order
pub const COLOR_PALETTE: [&str; 11] = [
    "bg-amber-600",
    "bg-slate-500",
    "bg-red-700",
    "bg-neutral-800",
    "bg-blue-600",
    "bg-emerald-600",
    "bg-orange-500",
    "bg-purple-600",
    "bg-pink-600",
    "bg-cyan-600",
    "bg-lime-600",
];

/// Color used for materials missing from the catalog
pub const FALLBACK_COLOR: &str = "bg-slate-700";

/// Catalog shipped with a fresh installation
pub fn default_materials() -> Vec<CustomMaterial> {
    [
        ("1", "Aushub", "bg-amber-600"),
        ("2", "Betonabbruch", "bg-slate-500"),
        ("3", "Bauschutt", "bg-red-700"),
        ("4", "Asphaltabbruch", "bg-neutral-800"),
        ("5", "Humus", "bg-emerald-600"),
        ("6", "Sonstiges", "bg-blue-600"),
    ]
    .into_iter()
    .map(|(id, name, color)| CustomMaterial {
        id: id.to_string(),
        name: name.to_string(),
        color_class: color.to_string(),
    })
    .collect()
}
