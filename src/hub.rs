//! Modbus hub: canonical entity state, serialized wire access and polling.
//!
//! The hub owns the state map. Entity adapters register an observer
//! callback and read their state back through [`ModbusHub::state`]; they
//! never hold a reference into hub internals.
//!
//! Every mutation of the map happens under the hub's state lock. A fan
//! refresh holds it across all three reads, and a fan command holds it
//! across its write, so a poll cannot overwrite a newer command result.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use anyhow::{Result, bail};
use dashmap::DashMap;
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::{
    sync::{Mutex as AsyncMutex, RwLock},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tokio_util::sync::CancellationToken;

use crate::{
    codec::{decode_coil, decode_signed_register},
    descriptors::{EntityDescriptor, FanDescriptor, RegisterKind, SensorDescriptor},
    protocol::{Request, Response},
    retry::RetryExecutor,
    speed_mode::SpeedMode,
    transport::ModbusTransport,
};

/// Invoked after the hub changed an entity's state.
pub type UpdateCallback = Arc<dyn Fn() + Send + Sync>;

/// Last known fan registers; `None` marks a value that could not be read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct FanState {
    pub on_off: Option<bool>,
    pub speed_mode: Option<SpeedMode>,
    pub manual_speed: Option<u16>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EntityState {
    Sensor(f64),
    Fan(FanState),
}

#[derive(Clone)]
struct Registration {
    descriptor: EntityDescriptor,
    observer: UpdateCallback,
}

pub struct ModbusHub {
    name: String,
    scan_interval: Duration,
    executor: RetryExecutor,
    entities: RwLock<Vec<Registration>>,
    data: DashMap<String, EntityState>,
    state_lock: AsyncMutex<()>,
    cancel: CancellationToken,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl ModbusHub {
    pub fn new(
        name: impl Into<String>,
        transport: Box<dyn ModbusTransport>,
        scan_interval: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            scan_interval,
            executor: RetryExecutor::new(transport),
            entities: RwLock::new(Vec::new()),
            data: DashMap::new(),
            state_lock: AsyncMutex::new(()),
            cancel: CancellationToken::new(),
            poller: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scan_interval(&self) -> Duration {
        self.scan_interval
    }

    pub async fn connect(&self) -> bool {
        self.executor.connect().await
    }

    pub async fn close(&self) {
        self.executor.close().await;
    }

    /// Best effort; never waits for a request on the wire.
    pub fn is_connected(&self) -> bool {
        self.executor.is_connected()
    }

    pub async fn read_input_register(&self, address: u16, divisor: u16) -> Option<f64> {
        self.read_register(Request::ReadInputRegister { address }, divisor)
            .await
    }

    pub async fn read_holding_register(&self, address: u16, divisor: u16) -> Option<f64> {
        self.read_register(Request::ReadHoldingRegister { address }, divisor)
            .await
    }

    pub async fn read_coil(&self, address: u16) -> Option<bool> {
        let request = Request::ReadCoil { address };
        let response = self.executor.execute(request).await?;
        decode_coil(&response)
            .inspect_err(|e| error!("Cannot decode {request}: {e}"))
            .ok()
    }

    pub async fn write_register(&self, address: u16, value: u16) -> bool {
        self.write(Request::WriteRegister { address, value }).await
    }

    pub async fn write_coil(&self, address: u16, value: bool) -> bool {
        self.write(Request::WriteCoil { address, value }).await
    }

    async fn read_register(&self, request: Request, divisor: u16) -> Option<f64> {
        let response = self.executor.execute(request).await?;
        decode_signed_register(&response, divisor)
            .inspect_err(|e| error!("Cannot decode {request}: {e}"))
            .ok()
    }

    async fn write(&self, request: Request) -> bool {
        match self.executor.execute(request).await {
            Some(Response::Written) => true,
            Some(other) => {
                warn!("{request} answered with {}", other.kind());
                false
            }
            None => false,
        }
    }

    /// Adds an entity to the polled set.
    ///
    /// The first registration connects the transport and starts the
    /// poller; a failed initial connect is healed by later cycles.
    pub async fn register_entity(
        self: &Arc<Self>,
        descriptor: EntityDescriptor,
        observer: UpdateCallback,
    ) -> Result<()> {
        let first = {
            let mut entities = self.entities.write().await;
            if entities
                .iter()
                .any(|r| r.descriptor.id() == descriptor.id())
            {
                bail!(
                    "Entity '{}' is already registered with hub '{}'",
                    descriptor.id(),
                    self.name
                );
            }
            if let EntityDescriptor::Sensor(sensor) = &descriptor {
                if sensor.divisor == 0 {
                    warn!("Sensor '{}' has a zero divisor, it will never report", sensor.key);
                }
            }
            debug!("Registering {:?} entity '{}'", descriptor.kind(), descriptor.id());
            entities.push(Registration {
                descriptor,
                observer,
            });
            entities.len() == 1
        };

        if first {
            if !self.connect().await {
                warn!("Hub '{}' starts disconnected, polling will retry", self.name);
            }
            self.start_polling();
        }
        Ok(())
    }

    pub async fn entity_ids(&self) -> Vec<String> {
        self.entities
            .read()
            .await
            .iter()
            .map(|r| r.descriptor.id().to_string())
            .collect()
    }

    pub fn state(&self, id: &str) -> Option<EntityState> {
        self.data.get(id).map(|entry| *entry.value())
    }

    pub fn sensor_value(&self, id: &str) -> Option<f64> {
        match self.state(id)? {
            EntityState::Sensor(value) => Some(value),
            EntityState::Fan(_) => None,
        }
    }

    pub fn fan_state(&self, id: &str) -> Option<FanState> {
        match self.state(id)? {
            EntityState::Fan(state) => Some(state),
            EntityState::Sensor(_) => None,
        }
    }

    /// Reads every registered entity once: sensors first, then fans.
    pub async fn poll_all_entities(&self) {
        let entities = self.entities.read().await.clone();
        if entities.is_empty() {
            return;
        }

        for registration in &entities {
            if let EntityDescriptor::Sensor(sensor) = &registration.descriptor {
                self.refresh_sensor(sensor, &registration.observer).await;
            }
        }
        for registration in &entities {
            if let EntityDescriptor::Fan(fan) = &registration.descriptor {
                self.refresh_fan(fan, &registration.observer).await;
            }
        }
    }

    async fn refresh_sensor(&self, sensor: &SensorDescriptor, observer: &UpdateCallback) {
        let reading = match sensor.register {
            RegisterKind::InputRegister => {
                self.read_input_register(sensor.address, sensor.divisor)
                    .await
            }
            RegisterKind::HoldingRegister => {
                self.read_holding_register(sensor.address, sensor.divisor)
                    .await
            }
            RegisterKind::Coil => self
                .read_coil(sensor.address)
                .await
                .map(|on| if on { 1.0 } else { 0.0 }),
        };

        let Some(value) = reading else {
            debug!("No reading for '{}', keeping last value", sensor.key);
            return;
        };

        let changed = {
            let _guard = self.state_lock.lock().await;
            let changed = self.sensor_value(&sensor.key) != Some(value);
            if changed {
                self.data
                    .insert(sensor.key.clone(), EntityState::Sensor(value));
            }
            changed
        };
        if changed {
            debug!("{} = {value} {}", sensor.key, sensor.unit);
            observer();
        }
    }

    async fn refresh_fan(&self, fan: &FanDescriptor, observer: &UpdateCallback) {
        let guard = self.state_lock.lock().await;
        let on_off = self.read_coil(fan.on_off_address).await;

        let speed_mode = match self.read_holding_register(fan.speed_mode_address, 1).await {
            Some(raw) => SpeedMode::from_reading(raw)
                .inspect_err(|e| warn!("'{}' reports {e}", fan.name))
                .ok(),
            None => None,
        };

        let manual_speed = self
            .read_holding_register(fan.manual_speed_address, 1)
            .await
            .map(|raw| raw.clamp(0.0, f64::from(u16::MAX)) as u16);

        let state = FanState {
            on_off,
            speed_mode,
            manual_speed,
        };
        debug!("{} = {state:?}", fan.name);
        self.data.insert(fan.name.clone(), EntityState::Fan(state));
        drop(guard);
        observer();
    }

    async fn fan(&self, id: &str) -> Option<(FanDescriptor, UpdateCallback)> {
        let entities = self.entities.read().await;
        let found = entities.iter().find_map(|r| match &r.descriptor {
            EntityDescriptor::Fan(fan) if fan.name == id => Some((fan.clone(), r.observer.clone())),
            _ => None,
        });
        if found.is_none() {
            warn!("No fan named '{id}' is registered with hub '{}'", self.name);
        }
        found
    }

    /// Caller must hold the state lock.
    fn update_fan(&self, id: &str, apply: impl FnOnce(&mut FanState)) {
        let mut entry = self
            .data
            .entry(id.to_string())
            .or_insert_with(|| EntityState::Fan(FanState::default()));
        match entry.value_mut() {
            EntityState::Fan(state) => apply(state),
            EntityState::Sensor(_) => warn!("'{id}' holds sensor state, not a fan"),
        }
    }

    pub async fn set_fan_power(&self, id: &str, on: bool) -> bool {
        let Some((fan, observer)) = self.fan(id).await else {
            return false;
        };
        {
            let _guard = self.state_lock.lock().await;
            if !self.write_coil(fan.on_off_address, on).await {
                return false;
            }
            self.update_fan(id, |state| state.on_off = Some(on));
        }
        observer();
        true
    }

    /// Writes `percent` verbatim to the manual-speed register.
    pub async fn set_fan_speed_percentage(&self, id: &str, percent: u8) -> bool {
        if percent > 100 {
            warn!("Refusing speed {percent}% for '{id}'");
            return false;
        }
        let Some((fan, observer)) = self.fan(id).await else {
            return false;
        };
        {
            let _guard = self.state_lock.lock().await;
            if !self
                .write_register(fan.manual_speed_address, u16::from(percent))
                .await
            {
                return false;
            }
            self.update_fan(id, |state| state.manual_speed = Some(u16::from(percent)));
        }
        observer();
        true
    }

    /// Switches the fan to the speed mode called `mode_name`.
    ///
    /// An unknown name is logged and leaves device and cache untouched.
    pub async fn set_fan_speed_mode(&self, id: &str, mode_name: &str) -> bool {
        let mode = match mode_name.parse::<SpeedMode>() {
            Ok(mode) => mode,
            Err(e) => {
                info!("Ignoring speed mode request for '{id}': {e}");
                return false;
            }
        };
        let Some((fan, observer)) = self.fan(id).await else {
            return false;
        };
        {
            let _guard = self.state_lock.lock().await;
            if !self.write_register(fan.speed_mode_address, mode.code()).await {
                return false;
            }
            self.update_fan(id, |state| state.speed_mode = Some(mode));
        }
        observer();
        true
    }

    fn start_polling(self: &Arc<Self>) {
        let hub = Arc::clone(self);
        let token = self.cancel.child_token();
        let handle = tokio::spawn(async move { hub.run_poller(token).await });
        *self.poller.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    async fn run_poller(&self, token: CancellationToken) {
        let period = self.scan_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Hub '{}' polling every {period:?}", self.name);

        loop {
            tokio::select! {
                () = token.cancelled() => {
                    info!("Hub '{}' poller stopped", self.name);
                    break;
                }
                _ = ticker.tick() => {
                    self.poll_all_entities().await;
                }
            }
        }
    }

    /// Stops polling, waits for an in-flight cycle and closes the transport.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Hub '{}' poller ended abnormally: {e}", self.name);
            }
        }
        self.close().await;
    }
}
