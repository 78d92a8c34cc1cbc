//! Host-facing adapters for hub entities.
//!
//! Adapters register an observer with the [`ModbusHub`](crate::hub::ModbusHub),
//! turn hub state into an [`EntityRender`] and hand it to a [`StateWriter`].
//! User commands go the other way: adapter, hub write, retry executor.

pub mod fan;
pub mod sensor;

pub use fan::FanEntity;
pub use sensor::SensorEntity;

use serde::Serialize;

use crate::descriptors::MANUFACTURER;

/// Device the entities belong to; one per hub.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub identifier: String,
    pub name: String,
    pub manufacturer: &'static str,
}

impl DeviceInfo {
    pub fn for_hub(hub_name: &str) -> Self {
        Self {
            identifier: format!("recom:{hub_name}"),
            name: hub_name.to_string(),
            manufacturer: MANUFACTURER,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityRender {
    Sensor {
        name: String,
        state: Option<f64>,
        unit: String,
        icon: String,
    },
    Fan {
        is_on: Option<bool>,
        percentage: u8,
        preset_mode: Option<String>,
        preset_modes: Vec<String>,
    },
}

/// Rendered state of one entity, as published to the host.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StateUpdate {
    pub entity_id: String,
    pub device: String,
    #[serde(flatten)]
    pub render: EntityRender,
}

/// Sink for rendered entity state.
pub trait StateWriter: Send + Sync {
    fn write_state(&self, update: StateUpdate);
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use super::{StateUpdate, StateWriter};

    /// Collects every update written to it.
    #[derive(Clone, Default)]
    pub struct RecordingWriter {
        updates: Arc<Mutex<Vec<StateUpdate>>>,
    }

    impl RecordingWriter {
        pub fn updates(&self) -> Vec<StateUpdate> {
            self.updates.lock().unwrap().clone()
        }
    }

    impl StateWriter for RecordingWriter {
        fn write_state(&self, update: StateUpdate) {
            self.updates.lock().unwrap().push(update);
        }
    }
}
