//! Runtime measurement store and the read-only snapshot taken from it at shutdown.

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Energy in joules keyed by method or call-tree identifier, in insertion order.
pub type EnergyMap = IndexMap<String, f64>;

/// Energy in joules keyed by Unix timestamp.
pub type Evolution = BTreeMap<i64, f64>;

/// Per-method energy time series.
pub type EvolutionMap = IndexMap<String, Evolution>;

/// Everything the shutdown stage reports on, frozen at the moment it was taken.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementSnapshot {
    pub total_consumed_energy: f64,
    pub methods_energy: EnergyMap,
    pub filtered_methods_energy: EnergyMap,
    pub call_trees_energy: EnergyMap,
    pub filtered_call_trees_energy: EnergyMap,
    pub methods_evolution: EvolutionMap,
    pub filtered_methods_evolution: EvolutionMap,
    pub peak_memory_bytes: u64,
}

impl MeasurementSnapshot {
    /// Parses a snapshot previously dumped as JSON.
    pub fn from_json(text: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Accumulates measurements while the monitored application runs.
///
/// Writers are the sampling threads; the shutdown stage calls
/// [`MonitoringStatus::snapshot`] once, after sampling has stopped.
#[derive(Debug, Default)]
pub struct MonitoringStatus {
    total_consumed_energy: Mutex<f64>,
    methods_energy: RwLock<EnergyMap>,
    filtered_methods_energy: RwLock<EnergyMap>,
    call_trees_energy: RwLock<EnergyMap>,
    filtered_call_trees_energy: RwLock<EnergyMap>,
    methods_evolution: RwLock<EvolutionMap>,
    filtered_methods_evolution: RwLock<EvolutionMap>,
    peak_memory_bytes: Mutex<u64>,
}

fn accumulate(map: &RwLock<EnergyMap>, key: &str, energy: f64) {
    let mut map = map.write();
    match map.get_mut(key) {
        Some(total) => *total += energy,
        None => {
            map.insert(key.to_owned(), energy);
        }
    }
}

fn accumulate_evolution(map: &RwLock<EvolutionMap>, method: &str, timestamp: i64, energy: f64) {
    *map.write()
        .entry(method.to_owned())
        .or_default()
        .entry(timestamp)
        .or_insert(0.0) += energy;
}

impl MonitoringStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_total_energy(&self, energy: f64) {
        *self.total_consumed_energy.lock() += energy;
    }

    pub fn add_method_energy(&self, method: &str, energy: f64) {
        accumulate(&self.methods_energy, method, energy);
    }

    pub fn add_filtered_method_energy(&self, method: &str, energy: f64) {
        accumulate(&self.filtered_methods_energy, method, energy);
    }

    pub fn add_call_tree_energy(&self, call_tree: &str, energy: f64) {
        accumulate(&self.call_trees_energy, call_tree, energy);
    }

    pub fn add_filtered_call_tree_energy(&self, call_tree: &str, energy: f64) {
        accumulate(&self.filtered_call_trees_energy, call_tree, energy);
    }

    /// Adds `energy` to the method's series at `timestamp` (Unix seconds).
    pub fn add_method_evolution(&self, method: &str, timestamp: i64, energy: f64) {
        accumulate_evolution(&self.methods_evolution, method, timestamp, energy);
    }

    pub fn add_filtered_method_evolution(&self, method: &str, timestamp: i64, energy: f64) {
        accumulate_evolution(&self.filtered_methods_evolution, method, timestamp, energy);
    }

    /// Records a memory usage sample; only the maximum is kept.
    pub fn record_memory_usage(&self, bytes: u64) {
        let mut peak = self.peak_memory_bytes.lock();
        if bytes > *peak {
            *peak = bytes;
        }
    }

    /// Copies the current state into an immutable snapshot.
    pub fn snapshot(&self) -> MeasurementSnapshot {
        MeasurementSnapshot {
            total_consumed_energy: *self.total_consumed_energy.lock(),
            methods_energy: self.methods_energy.read().clone(),
            filtered_methods_energy: self.filtered_methods_energy.read().clone(),
            call_trees_energy: self.call_trees_energy.read().clone(),
            filtered_call_trees_energy: self.filtered_call_trees_energy.read().clone(),
            methods_evolution: self.methods_evolution.read().clone(),
            filtered_methods_evolution: self.filtered_methods_evolution.read().clone(),
            peak_memory_bytes: *self.peak_memory_bytes.lock(),
        }
    }
}
