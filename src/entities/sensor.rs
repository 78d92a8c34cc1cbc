use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;

use crate::{
    descriptors::{EntityDescriptor, SensorDescriptor},
    hub::ModbusHub,
};

use super::{DeviceInfo, EntityRender, StateUpdate, StateWriter};

pub struct SensorEntity {
    hub: Arc<ModbusHub>,
    descriptor: SensorDescriptor,
    device: DeviceInfo,
    state: Mutex<Option<f64>>,
    writer: Arc<dyn StateWriter>,
}

impl SensorEntity {
    pub fn new(
        hub: Arc<ModbusHub>,
        descriptor: SensorDescriptor,
        writer: Arc<dyn StateWriter>,
    ) -> Arc<Self> {
        let device = DeviceInfo::for_hub(hub.name());
        Arc::new(Self {
            hub,
            descriptor,
            device,
            state: Mutex::new(None),
            writer,
        })
    }

    /// Registers with the hub; state arrives through the update callback.
    pub async fn attach(self: &Arc<Self>) -> Result<()> {
        let weak = Arc::downgrade(self);
        self.hub
            .register_entity(
                EntityDescriptor::Sensor(self.descriptor.clone()),
                Arc::new(move || {
                    if let Some(sensor) = weak.upgrade() {
                        sensor.update_callback();
                    }
                }),
            )
            .await
    }

    fn update_callback(&self) {
        let value = self.hub.sensor_value(&self.descriptor.key);
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = value;
        self.writer.write_state(self.render());
    }

    pub fn unique_id(&self) -> &str {
        &self.descriptor.key
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn unit(&self) -> &str {
        &self.descriptor.unit
    }

    pub fn icon(&self) -> &str {
        &self.descriptor.icon
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn state(&self) -> Option<f64> {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn render(&self) -> StateUpdate {
        StateUpdate {
            entity_id: self.unique_id().to_string(),
            device: self.device.name.clone(),
            render: EntityRender::Sensor {
                name: self.descriptor.name.clone(),
                state: self.state(),
                unit: self.descriptor.unit.clone(),
                icon: self.descriptor.icon.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        descriptors::sensor_table, entities::testing::RecordingWriter,
        transport::mock::MockTransport,
    };
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn setup(mock: &MockTransport) -> (Arc<ModbusHub>, RecordingWriter) {
        let hub = Arc::new(ModbusHub::new(
            "recom",
            Box::new(mock.clone()),
            Duration::from_secs(3600),
        ));
        (hub, RecordingWriter::default())
    }

    #[tokio::test]
    async fn renders_decoded_value_after_poll() {
        let mock = MockTransport::new().with_input(2, 0xFF9C);
        let (hub, writer) = setup(&mock);
        let descriptor = sensor_table().remove(2);
        let sensor = SensorEntity::new(hub.clone(), descriptor, Arc::new(writer.clone()));
        sensor.attach().await.unwrap();

        hub.poll_all_entities().await;

        assert_eq!(sensor.state(), Some(-10.0));
        let updates = writer.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(
            updates[0].render,
            EntityRender::Sensor {
                name: "Supply Air Temperature".to_string(),
                state: Some(-10.0),
                unit: "°C".to_string(),
                icon: "mdi:thermometer".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn metadata_comes_from_descriptor() {
        let mock = MockTransport::new();
        let (hub, writer) = setup(&mock);
        let sensor = SensorEntity::new(hub, sensor_table().remove(7), Arc::new(writer));

        assert_eq!(sensor.unique_id(), "IR_CurVBAT");
        assert_eq!(sensor.name(), "Internal Battery");
        assert_eq!(sensor.unit(), "V");
        assert_eq!(sensor.icon(), "mdi:battery");
        assert_eq!(sensor.device_info().manufacturer, "REC Indovent AB");
        assert_eq!(sensor.state(), None);
    }

    #[tokio::test]
    async fn dropped_sensor_is_not_called_back() {
        let mock = MockTransport::new().with_input(0, 215);
        let (hub, writer) = setup(&mock);
        let sensor = SensorEntity::new(hub.clone(), sensor_table().remove(0), Arc::new(writer.clone()));
        sensor.attach().await.unwrap();
        drop(sensor);

        hub.poll_all_entities().await;

        assert!(writer.updates().is_empty());
        assert_eq!(hub.sensor_value("IR_CurSelTEMP"), Some(21.5));
    }
}
