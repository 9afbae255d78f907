//! In-memory load store

use std::sync::Mutex;

use kipper_types::{Result, StoreError};

use super::{LoadFilter, LoadStore};
use crate::model::Load;

/// Load store without persistence (dry runs, tests)
#[derive(Debug, Default)]
pub struct MemoryLoadStore {
    loads: Mutex<Vec<Load>>,
}

impl MemoryLoadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loads(loads: Vec<Load>) -> Self {
        Self {
            loads: Mutex::new(loads),
        }
    }

    pub fn len(&self) -> usize {
        self.loads.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LoadStore for MemoryLoadStore {
    fn append(&self, load: Load) -> Result<()> {
        self.loads.lock().map_err(|_| StoreError::Poisoned)?.push(load);
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<bool> {
        let mut loads = self.loads.lock().map_err(|_| StoreError::Poisoned)?;
        let before = loads.len();
        loads.retain(|l| l.id != id);
        Ok(loads.len() != before)
    }

    fn query(&self, filter: &LoadFilter) -> Result<Vec<Load>> {
        let loads = self.loads.lock().map_err(|_| StoreError::Poisoned)?;
        let mut matched: Vec<Load> = loads.iter().filter(|l| filter.matches(l)).cloned().collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(matched)
    }

    fn get(&self, id: &str) -> Result<Option<Load>> {
        let loads = self.loads.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(loads.iter().find(|l| l.id == id).cloned())
    }

    fn update(&self, load: &Load) -> Result<bool> {
        let mut loads = self.loads.lock().map_err(|_| StoreError::Poisoned)?;
        match loads.iter_mut().find(|l| l.id == load.id) {
            Some(existing) => {
                *existing = load.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
