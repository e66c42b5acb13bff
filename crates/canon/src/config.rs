//! Configuration storage contract (§6).
//!
//! Persisted state is opaque to the core; the core only reads/writes
//! through a key→value accessor exposed by the storage collaborator. This
//! module defines that accessor as a trait, [`ConfigStore`], rather than
//! loading an INI/TOML file directly — persistence to non-volatile storage
//! is an excluded collaborator (§1), not a filesystem layout this crate
//! owns.
//!
//! [`MachineConfig`] is the typed view over a `ConfigStore` that
//! [`crate::machine::CanonicalMachine`] is built from: per-axis config,
//! per-coordinate-system offsets, default modal selections, and the last
//! status-report token list.

use motion::kinematics::{AxisConfig, AXES};

use crate::machine::COORDS;

/// A value round-tripped through a [`ConfigStore`]. Kept as a small closed
/// set so a store implementation never needs to know the semantic meaning
/// of a key, only how to store one of these variants under a string key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigValue {
    Float(f32),
    Int(i64),
    Bool(bool),
}

impl ConfigValue {
    pub fn as_float(self) -> Option<f32> {
        match self {
            ConfigValue::Float(f) => Some(f),
            ConfigValue::Int(i) => Some(i as f32),
            ConfigValue::Bool(_) => None,
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(b),
            _ => None,
        }
    }
}

/// Opaque key→value accessor for persisted configuration. Implementations
/// live outside this crate's scope (NVRAM, a config file, a database); the
/// core never assumes a particular backing store.
pub trait ConfigStore {
    fn get(&self, key: &str) -> Option<ConfigValue>;
    fn set(&mut self, key: &str, value: ConfigValue);
}

/// A `ConfigStore` held entirely in memory, for host-side tooling (the
/// `canon` CLI, `sim`) where no real non-volatile storage collaborator is
/// wired in.
#[derive(Debug, Default, Clone)]
pub struct InMemoryConfigStore {
    entries: std::collections::BTreeMap<alloc_string::String, ConfigValue>,
}

mod alloc_string {
    pub type String = std::string::String;
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.entries.get(key).copied()
    }

    fn set(&mut self, key: &str, value: ConfigValue) {
        self.entries.insert(key.to_string(), value);
    }
}

fn axis_key(axis: usize, field: &str) -> std::string::String {
    format!("axis.{axis}.{field}")
}

fn offset_key(coord_system: usize, axis: usize) -> std::string::String {
    format!("offset.{coord_system}.{axis}")
}

/// Typed configuration loaded from / persisted to a [`ConfigStore`]: the
/// per-axis config, per-coordinate-system offsets, default coordinate
/// system selection, and the last configured status-report token list.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    pub axes: [AxisConfig; AXES],
    pub offsets: [[f32; AXES]; COORDS + 1],
    pub default_coord_system: u8,
    pub status_report_tokens: heapless::Vec<u16, 24>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            axes: [AxisConfig::default(); AXES],
            offsets: [[0.0; AXES]; COORDS + 1],
            default_coord_system: 0,
            status_report_tokens: heapless::Vec::new(),
        }
    }
}

impl MachineConfig {
    /// Loads every key this struct owns from `store`, falling back to the
    /// compiled-in default for any key the store does not have (a fresh
    /// store, or one from before a config field existed).
    pub fn load(store: &dyn ConfigStore) -> Self {
        let mut cfg = Self::default();
        for axis in 0..AXES {
            if let Some(v) = store.get(&axis_key(axis, "max_velocity")).and_then(ConfigValue::as_float) {
                cfg.axes[axis].max_velocity = v;
            }
            if let Some(v) = store.get(&axis_key(axis, "max_feedrate")).and_then(ConfigValue::as_float) {
                cfg.axes[axis].max_feedrate = v;
            }
            if let Some(v) = store.get(&axis_key(axis, "max_jerk")).and_then(ConfigValue::as_float) {
                cfg.axes[axis].max_jerk = v;
            }
            if let Some(v) = store.get(&axis_key(axis, "soft_limit_min")).and_then(ConfigValue::as_float) {
                cfg.axes[axis].soft_limit_min = v;
            }
            if let Some(v) = store.get(&axis_key(axis, "soft_limit_max")).and_then(ConfigValue::as_float) {
                cfg.axes[axis].soft_limit_max = v;
            }
            if let Some(v) = store.get(&axis_key(axis, "radius")).and_then(ConfigValue::as_float) {
                cfg.axes[axis].radius = v;
            }
        }
        for coord in 0..=COORDS {
            for axis in 0..AXES {
                if let Some(v) = store.get(&offset_key(coord, axis)).and_then(ConfigValue::as_float) {
                    cfg.offsets[coord][axis] = v;
                }
            }
        }
        cfg
    }

    /// Writes every key this struct owns back to `store`. Called on a
    /// deferred-persist flag, not synchronously with every G10 (§4.G: G10
    /// offsets carry deferred persistence).
    pub fn persist(&self, store: &mut dyn ConfigStore) {
        for axis in 0..AXES {
            store.set(&axis_key(axis, "max_velocity"), ConfigValue::Float(self.axes[axis].max_velocity));
            store.set(&axis_key(axis, "max_feedrate"), ConfigValue::Float(self.axes[axis].max_feedrate));
            store.set(&axis_key(axis, "max_jerk"), ConfigValue::Float(self.axes[axis].max_jerk));
            store.set(&axis_key(axis, "soft_limit_min"), ConfigValue::Float(self.axes[axis].soft_limit_min));
            store.set(&axis_key(axis, "soft_limit_max"), ConfigValue::Float(self.axes[axis].soft_limit_max));
            store.set(&axis_key(axis, "radius"), ConfigValue::Float(self.axes[axis].radius));
        }
        for coord in 0..=COORDS {
            for axis in 0..AXES {
                store.set(&offset_key(coord, axis), ConfigValue::Float(self.offsets[coord][axis]));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_in_memory_store() {
        let mut store = InMemoryConfigStore::new();
        let mut cfg = MachineConfig::default();
        cfg.axes[0].max_velocity = 500.0;
        cfg.offsets[1][0] = 12.5;
        cfg.persist(&mut store);

        let reloaded = MachineConfig::load(&store);
        assert_eq!(reloaded.axes[0].max_velocity, 500.0);
        assert_eq!(reloaded.offsets[1][0], 12.5);
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let store = InMemoryConfigStore::new();
        let cfg = MachineConfig::load(&store);
        assert_eq!(cfg.axes[0].max_velocity, 0.0);
    }
}
