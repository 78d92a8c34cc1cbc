//! Application state and global context management.

use std::{collections::HashMap, sync::Arc};

use anyhow::{Context, Result};
use log::info;

use crate::{
    config::{Config, ConfigManager},
    descriptors::{fan_descriptor, sensor_table},
    entities::{FanEntity, SensorEntity, StateWriter},
    event::EventBus,
    hub::ModbusHub,
    protocol::UnitIdBinding,
    transport::{ModbusTransport, TcpSettings, TcpTransport},
};

/// Shared application state containing all runtime data.
///
/// Holds the hub and the entity adapters built on top of it. Adapters
/// publish their rendered state on the [`EventBus`] they were built with.
pub struct AppState {
    pub config_manager: Arc<ConfigManager>,
    pub hub: Arc<ModbusHub>,
    pub sensors: Vec<Arc<SensorEntity>>,
    pub fan: Arc<FanEntity>,
}

impl AppState {
    /// Creates the state for a Modbus/TCP connection described by the config.
    pub async fn new(config_manager: ConfigManager, event_bus: EventBus) -> Result<Self> {
        let config = config_manager.clone_config().await;
        let settings = tcp_settings(&config);
        info!(
            "Hub '{}' targets {}:{} (unit {}, {:?} binding)",
            config.name, settings.host, settings.port, settings.unit_id, settings.binding
        );

        Ok(Self::with_transport(config_manager, Box::new(TcpTransport::new(settings)), event_bus).await)
    }

    /// Creates the state around an already constructed transport.
    pub async fn with_transport(
        config_manager: ConfigManager,
        transport: Box<dyn ModbusTransport>,
        event_bus: EventBus,
    ) -> Self {
        let config = config_manager.clone_config().await;
        let hub = Arc::new(ModbusHub::new(
            config.name.clone(),
            transport,
            config.scan_interval(),
        ));

        let writer: Arc<dyn StateWriter> = Arc::new(event_bus);
        let sensors = sensor_table()
            .into_iter()
            .map(|descriptor| SensorEntity::new(hub.clone(), descriptor, writer.clone()))
            .collect();
        let fan = FanEntity::new(hub.clone(), fan_descriptor(), writer);

        Self {
            config_manager: Arc::new(config_manager),
            hub,
            sensors,
            fan,
        }
    }

    /// Registers every entity with the hub. The first one connects.
    pub async fn attach_entities(&self) -> Result<()> {
        for sensor in &self.sensors {
            sensor
                .attach()
                .await
                .with_context(|| format!("Failed to register sensor '{}'", sensor.unique_id()))?;
        }
        self.fan
            .attach()
            .await
            .with_context(|| format!("Failed to register fan '{}'", self.fan.unique_id()))
    }

    /// Last known sensor values keyed by sensor key; unknown ones are left out.
    pub fn sensor_values(&self) -> HashMap<String, f64> {
        self.sensors
            .iter()
            .filter_map(|sensor| Some((sensor.unique_id().to_string(), sensor.state()?)))
            .collect()
    }

    pub async fn config(&self) -> tokio::sync::RwLockReadGuard<'_, Config> {
        self.config_manager.get().await
    }
}

fn tcp_settings(config: &Config) -> TcpSettings {
    TcpSettings {
        host: config.host.clone(),
        port: config.port,
        unit_id: config.unit_id,
        timeout: config.timeout(),
        binding: UnitIdBinding::probe(config.unit_id_binding),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::protocol::UnitIdBindingCfg;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn builds_every_entity_from_descriptor_table() {
        let mock = unit_mock();
        let state = app_state(&mock, EventBus::new()).await;

        assert_eq!(state.sensors.len(), 9);
        assert_eq!(state.fan.unique_id(), "Ventilation Unit");
        assert_eq!(state.hub.name(), "recom");
        assert_eq!(mock.connect_calls(), 0);
    }

    #[tokio::test]
    async fn attach_registers_all_and_connects_once() {
        let mock = unit_mock();
        let state = app_state(&mock, EventBus::new()).await;

        state.attach_entities().await.unwrap();

        assert_eq!(state.hub.entity_ids().await.len(), 10);
        assert_eq!(mock.connect_calls(), 1);
        state.hub.shutdown().await;
    }

    #[tokio::test]
    async fn sensor_values_skip_unknown() {
        let mock = unit_mock();
        let state = app_state(&mock, EventBus::new()).await;
        state.attach_entities().await.unwrap();
        assert!(state.sensor_values().is_empty());

        state.hub.poll_all_entities().await;

        let values = state.sensor_values();
        assert_eq!(values.len(), 9);
        assert_eq!(values["IR_CurSelTEMP"], 20.0);
        assert_eq!(values["IR_SuRPM"], 223.0);
    }

    #[test]
    fn tcp_settings_follow_config() {
        let mut config = test_config();
        config.unit_id_binding = UnitIdBindingCfg::Legacy;

        let settings = tcp_settings(&config);

        assert_eq!(settings.host, "10.0.0.5");
        assert_eq!(settings.port, 502);
        assert_eq!(settings.unit_id, 1);
        assert_eq!(settings.binding, UnitIdBinding::Legacy);
    }
}
