//! Session-bus interface for the ventilation unit.

use std::{collections::HashMap, sync::Arc};

use log::{info, warn};
use zbus::{interface, object_server::SignalEmitter};

use crate::{
    app_context::AppState,
    event::{Event, EventBus},
};

pub const OBJECT_PATH: &str = "/io/github/recomd";
pub const SERVICE_NAME: &str = "io.github.recomd";

pub struct DBusInterface {
    state: Arc<AppState>,
    version: String,
    event_bus: EventBus,
}

impl DBusInterface {
    pub fn new(state: Arc<AppState>, version: String, event_bus: EventBus) -> Self {
        Self {
            state,
            version,
            event_bus,
        }
    }

    fn request(&self, event: Event) -> bool {
        match self.event_bus.publish(event) {
            Ok(()) => true,
            Err(e) => {
                warn!("Nobody handles the request: {e}");
                false
            }
        }
    }
}

#[interface(name = "io.github.recomd1")]
impl DBusInterface {
    #[zbus(signal)]
    async fn stopped(emitter: &SignalEmitter<'_>) -> zbus::Result<()>;

    async fn stop(
        &self,
        #[zbus(signal_emitter)] emitter: SignalEmitter<'_>,
    ) -> zbus::fdo::Result<()> {
        emitter.stopped().await?;
        self.request(Event::SystemShutdown);
        Ok(())
    }

    async fn turn_on(&self) -> bool {
        self.state.fan.turn_on(None, None).await
    }

    async fn turn_on_with_percentage(&self, percentage: u8) -> bool {
        self.state.fan.turn_on(Some(percentage), None).await
    }

    async fn turn_on_with_preset(&self, preset_mode: String) -> bool {
        self.state.fan.turn_on(None, Some(&preset_mode)).await
    }

    async fn turn_off(&self) -> bool {
        self.state.fan.turn_off().await
    }

    async fn set_percentage(&self, percentage: u8) -> bool {
        self.state.fan.set_percentage(percentage).await
    }

    async fn set_preset_mode(&self, preset_mode: String) -> bool {
        self.state.fan.set_preset_mode(&preset_mode).await
    }

    /// Polls the unit now instead of waiting for the next scan.
    async fn refresh(&self) -> bool {
        info!("Refresh requested over D-Bus");
        self.request(Event::RefreshRequested)
    }

    #[zbus(property)]
    async fn version(&self) -> String {
        self.version.clone()
    }

    #[zbus(property)]
    async fn connected(&self) -> bool {
        self.state.hub.is_connected()
    }

    /// `on`, `off` or `unknown`.
    #[zbus(property)]
    async fn power(&self) -> String {
        match self.state.fan.is_on() {
            Some(true) => "on",
            Some(false) => "off",
            None => "unknown",
        }
        .to_string()
    }

    #[zbus(property)]
    async fn percentage(&self) -> u8 {
        self.state.fan.percentage()
    }

    /// Empty while the mode is unknown.
    #[zbus(property)]
    async fn preset_mode(&self) -> String {
        self.state
            .fan
            .preset_mode()
            .map(|mode| mode.name().to_string())
            .unwrap_or_default()
    }

    #[zbus(property)]
    async fn preset_modes(&self) -> Vec<String> {
        self.state.fan.preset_modes()
    }

    #[zbus(property)]
    async fn sensors(&self) -> HashMap<String, f64> {
        self.state.sensor_values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        app_context::testing::{app_state, unit_mock},
        protocol::Request,
        transport::mock::MockTransport,
    };
    use pretty_assertions::assert_eq;

    async fn interface(mock: &MockTransport, event_bus: EventBus) -> DBusInterface {
        let state = app_state(mock, event_bus.clone()).await;
        state.attach_entities().await.unwrap();
        DBusInterface::new(state, "1.0.0".to_string(), event_bus)
    }

    #[tokio::test]
    async fn properties_reflect_polled_state() {
        let mock = unit_mock();
        let iface = interface(&mock, EventBus::new()).await;
        assert_eq!(iface.power().await, "unknown");
        assert_eq!(iface.preset_mode().await, "");

        iface.state.hub.poll_all_entities().await;

        assert_eq!(iface.version().await, "1.0.0");
        assert!(iface.connected().await);
        assert_eq!(iface.power().await, "on");
        assert_eq!(iface.percentage().await, 45);
        assert_eq!(iface.preset_mode().await, "Speed 1");
        assert_eq!(iface.preset_modes().await.len(), 4);
        assert_eq!(iface.sensors().await["IR_CurRH_Int"], 210.0);
    }

    #[tokio::test]
    async fn fan_commands_reach_the_unit() {
        let mock = unit_mock();
        let iface = interface(&mock, EventBus::new()).await;

        assert!(iface.turn_on_with_preset("Manual".to_string()).await);
        assert!(iface.set_percentage(70).await);
        assert!(iface.turn_off().await);

        assert_eq!(
            mock.writes(),
            vec![
                Request::WriteCoil { address: 0, value: true },
                Request::WriteRegister { address: 2, value: 255 },
                Request::WriteRegister { address: 17, value: 70 },
                Request::WriteCoil { address: 0, value: false },
            ]
        );
        assert_eq!(iface.power().await, "off");
    }

    #[tokio::test]
    async fn unknown_preset_is_refused() {
        let mock = unit_mock();
        let iface = interface(&mock, EventBus::new()).await;

        assert!(!iface.set_preset_mode("Speed 9".to_string()).await);
        assert!(mock.writes().is_empty());
    }

    #[tokio::test]
    async fn refresh_publishes_request() {
        let mock = unit_mock();
        let event_bus = EventBus::new();
        let mut events = event_bus.subscribe();
        let iface = interface(&mock, event_bus).await;

        assert!(iface.refresh().await);

        assert!(matches!(events.recv().await.unwrap(), Event::RefreshRequested));
    }
}
