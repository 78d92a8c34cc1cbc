//! Modbus primitives exchanged with the ventilation unit.
//!
//! Every access addresses exactly one register or coil (quantity 1).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of registers/coils read per request.
pub const QUANTITY: u16 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Request {
    ReadInputRegister { address: u16 },
    ReadHoldingRegister { address: u16 },
    ReadCoil { address: u16 },
    WriteRegister { address: u16, value: u16 },
    WriteCoil { address: u16, value: bool },
}

impl Request {
    pub const fn address(&self) -> u16 {
        match *self {
            Request::ReadInputRegister { address }
            | Request::ReadHoldingRegister { address }
            | Request::ReadCoil { address }
            | Request::WriteRegister { address, .. }
            | Request::WriteCoil { address, .. } => address,
        }
    }

    /// Modbus function code of the request.
    pub const fn function_code(&self) -> u8 {
        match self {
            Request::ReadCoil { .. } => 0x01,
            Request::ReadHoldingRegister { .. } => 0x03,
            Request::ReadInputRegister { .. } => 0x04,
            Request::WriteCoil { .. } => 0x05,
            Request::WriteRegister { .. } => 0x06,
        }
    }

    pub const fn is_write(&self) -> bool {
        matches!(
            self,
            Request::WriteRegister { .. } | Request::WriteCoil { .. }
        )
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::ReadInputRegister { address } => write!(f, "read input register {address}"),
            Request::ReadHoldingRegister { address } => {
                write!(f, "read holding register {address}")
            }
            Request::ReadCoil { address } => write!(f, "read coil {address}"),
            Request::WriteRegister { address, value } => {
                write!(f, "write register {address} = {value}")
            }
            Request::WriteCoil { address, value } => {
                write!(f, "write coil {address} = {}", u8::from(*value))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    Registers(Vec<u16>),
    Coils(Vec<bool>),
    Written,
    /// Exception code returned by the device instead of data.
    Exception(u8),
}

impl Response {
    pub const fn kind(&self) -> &'static str {
        match self {
            Response::Registers(_) => "registers",
            Response::Coils(_) => "coils",
            Response::Written => "write acknowledgement",
            Response::Exception(_) => "exception",
        }
    }
}

/// How the unit identifier reaches the transport library.
///
/// `Current` binds the identifier once when the TCP context is created;
/// `Legacy` creates an unbound context and sets the identifier before
/// every request, for gateways that reset it between transactions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnitIdBinding {
    Legacy,
    Current,
}

/// Configured preference for [`UnitIdBinding`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnitIdBindingCfg {
    #[default]
    Auto,
    Legacy,
    Current,
}

impl UnitIdBinding {
    /// Resolves the binding once at startup.
    ///
    /// The pinned tokio-modbus release accepts the identifier at connect
    /// time, so `auto` resolves to [`UnitIdBinding::Current`].
    pub fn probe(cfg: UnitIdBindingCfg) -> Self {
        let binding = match cfg {
            UnitIdBindingCfg::Auto | UnitIdBindingCfg::Current => UnitIdBinding::Current,
            UnitIdBindingCfg::Legacy => UnitIdBinding::Legacy,
        };
        log::info!("Unit identifier binding resolved to {binding:?} (configured {cfg:?})");
        binding
    }
}
