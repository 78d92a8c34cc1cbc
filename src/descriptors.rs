//! Entity descriptors and the register map of the REC Indovent unit.

use serde::Serialize;

pub const MANUFACTURER: &str = "REC Indovent AB";

pub const FAN_NAME: &str = "Ventilation Unit";
pub const FAN_ON_OFF_ADDRESS: u16 = 0;
pub const FAN_SPEED_MODE_ADDRESS: u16 = 2;
pub const FAN_MANUAL_SPEED_ADDRESS: u16 = 17;
pub const FAN_SPEED_RANGE: (u16, u16) = (0, 100);

const CELSIUS: &str = "°C";
const RPM: &str = "rpm";
const VOLT: &str = "V";
const PERCENT: &str = "%";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Sensor,
    Fan,
}

/// Table a sensor value is read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterKind {
    InputRegister,
    HoldingRegister,
    Coil,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SensorDescriptor {
    /// Unique id, also the key in the hub state map.
    pub key: String,
    pub name: String,
    pub address: u16,
    pub unit: String,
    pub divisor: u16,
    pub register: RegisterKind,
    pub icon: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FanDescriptor {
    pub name: String,
    pub on_off_address: u16,
    pub speed_mode_address: u16,
    pub manual_speed_address: u16,
    pub speed_range: (u16, u16),
}

/// Semantic unit of I/O registered with the hub. Immutable once
/// registered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntityDescriptor {
    Sensor(SensorDescriptor),
    Fan(FanDescriptor),
}

impl EntityDescriptor {
    pub fn id(&self) -> &str {
        match self {
            EntityDescriptor::Sensor(sensor) => &sensor.key,
            EntityDescriptor::Fan(fan) => &fan.name,
        }
    }

    pub const fn kind(&self) -> EntityKind {
        match self {
            EntityDescriptor::Sensor(_) => EntityKind::Sensor,
            EntityDescriptor::Fan(_) => EntityKind::Fan,
        }
    }
}

impl SensorDescriptor {
    fn input(key: &str, name: &str, address: u16, unit: &str, divisor: u16, icon: &str) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            address,
            unit: unit.to_string(),
            divisor,
            register: RegisterKind::InputRegister,
            icon: icon.to_string(),
        }
    }
}

/// Sensors exposed by the unit.
pub fn sensor_table() -> Vec<SensorDescriptor> {
    vec![
        SensorDescriptor::input("IR_CurSelTEMP", "Temperature Setpoint", 0, CELSIUS, 10, "mdi:thermometer"),
        SensorDescriptor::input("IR_CurTEMP_SuAirIn", "Intake Air Temperature", 1, CELSIUS, 10, "mdi:thermometer"),
        SensorDescriptor::input("IR_CurTEMP_SuAirOut", "Supply Air Temperature", 2, CELSIUS, 10, "mdi:thermometer"),
        SensorDescriptor::input("IR_CurTEMP_ExAirIn", "Extract Air Temperature", 3, CELSIUS, 10, "mdi:thermometer"),
        SensorDescriptor::input("IR_CurTEMP_ExAirOut", "Exhaust Air Temperature", 4, CELSIUS, 10, "mdi:thermometer"),
        SensorDescriptor::input("IR_SuRPM", "Supply Fan Speed", 23, RPM, 1, "mdi:speedometer"),
        SensorDescriptor::input("IR_ExRPM", "Extract Fan Speed", 24, RPM, 1, "mdi:speedometer"),
        SensorDescriptor::input("IR_CurVBAT", "Internal Battery", 9, VOLT, 1000, "mdi:battery"),
        SensorDescriptor::input("IR_CurRH_Int", "Humidity", 10, PERCENT, 1, "mdi:cloud-percent"),
    ]
}

pub fn fan_descriptor() -> FanDescriptor {
    FanDescriptor {
        name: FAN_NAME.to_string(),
        on_off_address: FAN_ON_OFF_ADDRESS,
        speed_mode_address: FAN_SPEED_MODE_ADDRESS,
        manual_speed_address: FAN_MANUAL_SPEED_ADDRESS,
        speed_range: FAN_SPEED_RANGE,
    }
}
