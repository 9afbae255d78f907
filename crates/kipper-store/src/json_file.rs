//! Reading and writing the store files

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use kipper_types::{Result, StoreError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

/// Missing file means an empty store
pub(crate) fn read_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).map_err(|e| {
        warn!(path = %path.display(), error = %e, "Store file unreadable");
        StoreError::Corrupted(format!("{}: {}", path.display(), e)).into()
    })
}

/// Write to a sibling temp file, then rename over the target
pub(crate) fn write_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}
