//! Transport layer owning the single Modbus/TCP connection.

use std::{io, time::Duration};

use async_trait::async_trait;
use log::{debug, error, info, warn};
use thiserror::Error;
use tokio_modbus::{
    client::{Client as _, Context, Reader, Writer, tcp},
    slave::{Slave, SlaveContext as _},
};

use crate::protocol::{QUANTITY, Request, Response, UnitIdBinding};

/// Failures raised by a transport while executing a [`Request`].
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,

    #[error("connection failure: {0}")]
    Connection(#[source] io::Error),

    /// I/O error reported by the Modbus layer; may still hide a broken
    /// socket underneath.
    #[error("modbus i/o failure: {0}")]
    Io(#[source] io::Error),

    #[error("protocol failure: {0}")]
    Protocol(String),

    #[error("device exception: {0}")]
    Exception(String),

    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl From<tokio_modbus::Error> for TransportError {
    fn from(err: tokio_modbus::Error) -> Self {
        #[allow(unreachable_patterns)]
        match err {
            tokio_modbus::Error::Transport(io) => TransportError::Io(io),
            tokio_modbus::Error::Protocol(protocol) => {
                TransportError::Protocol(protocol.to_string())
            }
            other => TransportError::Unexpected(other.to_string()),
        }
    }
}

/// A connection capable of carrying Modbus primitives.
///
/// `connect` and `close` never fail past their own boundary; they log and
/// report through the return value instead.
#[async_trait]
pub trait ModbusTransport: Send {
    /// Opens the connection if needed. Idempotent.
    async fn connect(&mut self) -> bool;

    /// Drops the connection. Idempotent, best effort.
    async fn close(&mut self);

    /// Liveness as last observed; may lag reality.
    fn is_connected(&self) -> bool;

    async fn call(&mut self, request: Request) -> Result<Response, TransportError>;
}

/// Connection parameters for [`TcpTransport`].
#[derive(Debug, Clone)]
pub struct TcpSettings {
    pub host: String,
    pub port: u16,
    pub unit_id: u8,
    pub timeout: Duration,
    pub binding: UnitIdBinding,
}

/// Modbus/TCP transport backed by tokio-modbus.
pub struct TcpTransport {
    settings: TcpSettings,
    ctx: Option<Context>,
}

impl TcpTransport {
    pub fn new(settings: TcpSettings) -> Self {
        Self {
            settings,
            ctx: None,
        }
    }

    /// Resolves and connects; the timeout covers both steps.
    async fn open(settings: &TcpSettings) -> io::Result<Context> {
        let TcpSettings {
            host,
            port,
            unit_id,
            timeout,
            binding,
        } = settings;

        let connecting = async {
            let addr = tokio::net::lookup_host((host.as_str(), *port))
                .await?
                .next()
                .ok_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, format!("{host} did not resolve"))
                })?;

            match binding {
                UnitIdBinding::Current => tcp::connect_slave(addr, Slave(*unit_id)).await,
                UnitIdBinding::Legacy => tcp::connect(addr).await,
            }
        };

        tokio::time::timeout(*timeout, connecting)
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connecting to {host}:{port} timed out after {timeout:?}"),
                )
            })?
    }
}

#[async_trait]
impl ModbusTransport for TcpTransport {
    async fn connect(&mut self) -> bool {
        if self.ctx.is_some() {
            return true;
        }

        match Self::open(&self.settings).await {
            Ok(ctx) => {
                info!(
                    "Connected to {}:{} (unit {})",
                    self.settings.host, self.settings.port, self.settings.unit_id
                );
                self.ctx = Some(ctx);
                true
            }
            Err(e) => {
                error!(
                    "Failed to connect to {}:{}: {e}",
                    self.settings.host, self.settings.port
                );
                false
            }
        }
    }

    async fn close(&mut self) {
        let Some(mut ctx) = self.ctx.take() else {
            return;
        };
        if let Err(e) = ctx.disconnect().await {
            warn!("Error while closing Modbus connection: {e}");
        }
        debug!("Modbus connection closed");
    }

    fn is_connected(&self) -> bool {
        self.ctx.is_some()
    }

    async fn call(&mut self, request: Request) -> Result<Response, TransportError> {
        let unit_id = self.settings.unit_id;
        let binding = self.settings.binding;
        let timeout = self.settings.timeout;
        let ctx = self.ctx.as_mut().ok_or(TransportError::NotConnected)?;

        if binding == UnitIdBinding::Legacy {
            ctx.set_slave(Slave(unit_id));
        }

        let outcome = tokio::time::timeout(timeout, dispatch(ctx, request))
            .await
            .map_err(|_| {
                TransportError::Connection(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("{request} timed out after {timeout:?}"),
                ))
            })?;

        match outcome {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(code)) => Err(TransportError::Exception(code.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

async fn dispatch(ctx: &mut Context, request: Request) -> tokio_modbus::Result<Response> {
    Ok(match request {
        Request::ReadInputRegister { address } => ctx
            .read_input_registers(address, QUANTITY)
            .await?
            .map(Response::Registers),
        Request::ReadHoldingRegister { address } => ctx
            .read_holding_registers(address, QUANTITY)
            .await?
            .map(Response::Registers),
        Request::ReadCoil { address } => ctx
            .read_coils(address, QUANTITY)
            .await?
            .map(Response::Coils),
        Request::WriteRegister { address, value } => ctx
            .write_single_register(address, value)
            .await?
            .map(|()| Response::Written),
        Request::WriteCoil { address, value } => ctx
            .write_single_coil(address, value)
            .await?
            .map(|()| Response::Written),
    })
}
