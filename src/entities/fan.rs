use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;

use crate::{
    descriptors::{EntityDescriptor, FanDescriptor},
    hub::ModbusHub,
    percentage::ranged_value_to_percentage,
    speed_mode::SpeedMode,
};

use super::{DeviceInfo, EntityRender, StateUpdate, StateWriter};

#[derive(Clone, Copy, Debug, Default)]
struct FanSnapshot {
    is_on: Option<bool>,
    preset_mode: Option<SpeedMode>,
    /// Last known manual speed; survives failed reads.
    current_speed: u16,
}

/// Ventilation fan with on/off, manual speed and preset modes.
pub struct FanEntity {
    hub: Arc<ModbusHub>,
    descriptor: FanDescriptor,
    device: DeviceInfo,
    snapshot: Mutex<FanSnapshot>,
    writer: Arc<dyn StateWriter>,
}

impl FanEntity {
    pub fn new(
        hub: Arc<ModbusHub>,
        descriptor: FanDescriptor,
        writer: Arc<dyn StateWriter>,
    ) -> Arc<Self> {
        let device = DeviceInfo::for_hub(hub.name());
        Arc::new(Self {
            hub,
            descriptor,
            device,
            snapshot: Mutex::new(FanSnapshot::default()),
            writer,
        })
    }

    pub async fn attach(self: &Arc<Self>) -> Result<()> {
        let weak = Arc::downgrade(self);
        self.hub
            .register_entity(
                EntityDescriptor::Fan(self.descriptor.clone()),
                Arc::new(move || {
                    if let Some(fan) = weak.upgrade() {
                        fan.update_callback();
                    }
                }),
            )
            .await
    }

    fn update_callback(&self) {
        let Some(state) = self.hub.fan_state(&self.descriptor.name) else {
            return;
        };
        {
            let mut snapshot = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
            snapshot.is_on = state.on_off;
            snapshot.preset_mode = state.speed_mode;
            if let Some(speed) = state.manual_speed {
                snapshot.current_speed = speed;
            }
        }
        self.writer.write_state(self.render());
    }

    fn snapshot(&self) -> FanSnapshot {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Powers the fan on, then applies `preset_mode` or else `percentage`.
    pub async fn turn_on(&self, percentage: Option<u8>, preset_mode: Option<&str>) -> bool {
        if !self.hub.set_fan_power(&self.descriptor.name, true).await {
            return false;
        }
        match (preset_mode, percentage) {
            (Some(mode), _) => self.set_preset_mode(mode).await,
            (None, Some(percentage)) => self.set_percentage(percentage).await,
            (None, None) => true,
        }
    }

    pub async fn turn_off(&self) -> bool {
        self.hub.set_fan_power(&self.descriptor.name, false).await
    }

    pub async fn set_percentage(&self, percentage: u8) -> bool {
        self.hub
            .set_fan_speed_percentage(&self.descriptor.name, percentage)
            .await
    }

    /// Unknown names are rejected by the hub.
    pub async fn set_preset_mode(&self, preset_mode: &str) -> bool {
        self.hub
            .set_fan_speed_mode(&self.descriptor.name, preset_mode)
            .await
    }

    pub fn unique_id(&self) -> &str {
        &self.descriptor.name
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn is_on(&self) -> Option<bool> {
        self.snapshot().is_on
    }

    pub fn percentage(&self) -> u8 {
        ranged_value_to_percentage(self.descriptor.speed_range, self.snapshot().current_speed)
    }

    pub fn preset_mode(&self) -> Option<SpeedMode> {
        self.snapshot().preset_mode
    }

    pub fn preset_modes(&self) -> Vec<String> {
        SpeedMode::names().into_iter().map(str::to_string).collect()
    }

    pub fn render(&self) -> StateUpdate {
        StateUpdate {
            entity_id: self.unique_id().to_string(),
            device: self.device.name.clone(),
            render: EntityRender::Fan {
                is_on: self.is_on(),
                percentage: self.percentage(),
                preset_mode: self.preset_mode().map(|mode| mode.name().to_string()),
                preset_modes: self.preset_modes(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        descriptors::fan_descriptor,
        entities::testing::RecordingWriter,
        protocol::Request,
        transport::mock::MockTransport,
    };
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    async fn attached(mock: &MockTransport) -> (Arc<ModbusHub>, Arc<FanEntity>, RecordingWriter) {
        let hub = Arc::new(ModbusHub::new(
            "recom",
            Box::new(mock.clone()),
            Duration::from_secs(3600),
        ));
        let writer = RecordingWriter::default();
        let fan = FanEntity::new(hub.clone(), fan_descriptor(), Arc::new(writer.clone()));
        fan.attach().await.unwrap();
        (hub, fan, writer)
    }

    fn unit() -> MockTransport {
        MockTransport::new()
            .with_coil(0, true)
            .with_holding(2, 2)
            .with_holding(17, 60)
    }

    #[tokio::test]
    async fn poll_populates_snapshot() {
        let mock = unit();
        let (hub, fan, writer) = attached(&mock).await;

        hub.poll_all_entities().await;

        assert_eq!(fan.is_on(), Some(true));
        assert_eq!(fan.preset_mode(), Some(SpeedMode::Speed2));
        assert_eq!(fan.percentage(), 60);
        assert_eq!(writer.updates().len(), 1);
    }

    #[tokio::test]
    async fn failed_speed_read_keeps_last_percentage() {
        let mock = unit();
        let (hub, fan, _writer) = attached(&mock).await;
        hub.poll_all_entities().await;

        mock.state.lock().unwrap().holding_registers.remove(&17);
        hub.poll_all_entities().await;

        assert_eq!(hub.fan_state("Ventilation Unit").unwrap().manual_speed, None);
        assert_eq!(fan.percentage(), 60);
        assert_eq!(fan.is_on(), Some(true));
    }

    #[tokio::test]
    async fn turn_on_with_preset_sets_mode() {
        let mock = unit();
        let (_hub, fan, writer) = attached(&mock).await;

        assert!(fan.turn_on(Some(30), Some("Speed 3")).await);

        assert_eq!(
            mock.writes(),
            vec![
                Request::WriteCoil { address: 0, value: true },
                Request::WriteRegister { address: 2, value: 3 },
            ]
        );
        assert_eq!(fan.preset_mode(), Some(SpeedMode::Speed3));
        assert_eq!(writer.updates().len(), 2);
    }

    #[tokio::test]
    async fn turn_on_with_percentage_writes_manual_speed() {
        let mock = unit();
        let (_hub, fan, _writer) = attached(&mock).await;

        assert!(fan.turn_on(Some(35), None).await);

        assert_eq!(mock.holding(17), Some(35));
        assert_eq!(fan.percentage(), 35);
    }

    #[tokio::test]
    async fn turn_off_clears_power() {
        let mock = unit();
        let (_hub, fan, _writer) = attached(&mock).await;

        assert!(fan.turn_off().await);

        assert_eq!(mock.coil(0), Some(false));
        assert_eq!(fan.is_on(), Some(false));
    }

    #[tokio::test]
    async fn unknown_preset_mode_writes_nothing() {
        let mock = unit();
        let (_hub, fan, writer) = attached(&mock).await;

        assert!(!fan.set_preset_mode("Boost").await);

        assert!(mock.writes().is_empty());
        assert!(writer.updates().is_empty());
    }

    #[tokio::test]
    async fn render_lists_preset_modes() {
        let mock = unit();
        let (_hub, fan, _writer) = attached(&mock).await;

        match fan.render().render {
            EntityRender::Fan { preset_modes, is_on, .. } => {
                assert_eq!(preset_modes, vec!["Speed 1", "Speed 2", "Speed 3", "Manual"]);
                assert_eq!(is_on, None);
            }
            other => panic!("Expected fan render, got {other:?}"),
        }
    }
}
