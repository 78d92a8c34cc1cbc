//! Serialized execution of Modbus primitives with one-shot reconnect.

use std::{
    error::Error as StdError,
    io,
    sync::atomic::{AtomicBool, Ordering},
};

use log::{debug, error, info, warn};
use tokio::sync::Mutex;

use crate::{
    protocol::{Request, Response},
    transport::{ModbusTransport, TransportError},
};

/// How a transport failure is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Socket is gone or unusable; worth one reconnect and retry.
    Connection,
    /// The device rejected the request; retrying will not help.
    Protocol,
    Unexpected,
}

const fn is_connection_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::TimedOut
    )
}

/// Walks the source chain looking for a socket-level cause.
fn has_connection_cause(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<io::Error>() {
            if is_connection_kind(io.kind()) {
                return true;
            }
            if let Some(inner) = io.get_ref() {
                if has_connection_cause(inner) {
                    return true;
                }
            }
        }
        current = e.source();
    }
    false
}

pub fn classify(err: &TransportError) -> FailureClass {
    match err {
        TransportError::NotConnected | TransportError::Connection(_) => FailureClass::Connection,
        TransportError::Io(io) if has_connection_cause(io) => FailureClass::Connection,
        TransportError::Io(_) | TransportError::Protocol(_) | TransportError::Exception(_) => {
            FailureClass::Protocol
        }
        TransportError::Unexpected(_) => FailureClass::Unexpected,
    }
}

/// Owns the transport behind a single lock so at most one Modbus
/// transaction is on the wire at any time.
///
/// Liveness is mirrored into an atomic after every transport operation,
/// so [`is_connected`](Self::is_connected) never waits for the lock.
pub struct RetryExecutor {
    transport: Mutex<Box<dyn ModbusTransport>>,
    connected: AtomicBool,
}

impl RetryExecutor {
    pub fn new(transport: Box<dyn ModbusTransport>) -> Self {
        let connected = AtomicBool::new(transport.is_connected());
        Self {
            transport: Mutex::new(transport),
            connected,
        }
    }

    pub async fn connect(&self) -> bool {
        let mut transport = self.transport.lock().await;
        let connected = transport.connect().await;
        self.observe(&**transport);
        connected
    }

    pub async fn close(&self) {
        let mut transport = self.transport.lock().await;
        transport.close().await;
        self.observe(&**transport);
    }

    /// Last observed liveness; may lag a request that is on the wire.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn observe(&self, transport: &dyn ModbusTransport) {
        self.connected
            .store(transport.is_connected(), Ordering::Release);
    }

    /// Runs `request`, returning `None` on any failure.
    ///
    /// Never errors. A connection-class failure closes the transport and
    /// retries exactly once after a successful reconnect.
    pub async fn execute(&self, request: Request) -> Option<Response> {
        let mut transport = self.transport.lock().await;
        let response = Self::execute_locked(&mut **transport, request).await;
        self.observe(&**transport);
        response
    }

    async fn execute_locked(
        transport: &mut dyn ModbusTransport,
        request: Request,
    ) -> Option<Response> {
        // Cheap when already connected; heals a connection dropped earlier.
        transport.connect().await;
        debug!(
            "fc {:#04x} at {} ({request})",
            request.function_code(),
            request.address()
        );

        let err = match transport.call(request).await {
            Ok(response) => return Some(response),
            Err(err) => err,
        };

        match classify(&err) {
            FailureClass::Connection => {
                warn!("Connection failure during {request}: {err}; reconnecting");
                transport.close().await;
                if !transport.connect().await {
                    error!("Reconnect failed, giving up on {request}");
                    return None;
                }
                match transport.call(request).await {
                    Ok(response) => {
                        info!("{request} succeeded after reconnect");
                        Some(response)
                    }
                    Err(retry_err) => {
                        error!("{request} failed after reconnect: {retry_err}");
                        None
                    }
                }
            }
            FailureClass::Protocol => {
                error!("Device rejected {request}: {err}");
                None
            }
            FailureClass::Unexpected => {
                error!("Unexpected failure during {request}: {err}");
                debug!("{err:?}");
                None
            }
        }
    }
}
