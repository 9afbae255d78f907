//! JSON file stores for kipper-log
//!
//! Each store keeps its data in memory behind a lock and rewrites its file
//! after every change. All stores live in one data directory.

mod json_file;
mod load_log;
mod material_store;
mod site_store;

pub use load_log::LoadLog;
pub use material_store::MaterialStore;
pub use site_store::SiteStore;
