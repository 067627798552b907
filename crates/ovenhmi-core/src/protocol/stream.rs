//! Transport abstraction
//!
//! The link manager only needs an async byte stream. Real hardware hands it a
//! [`SerialStream`](tokio_serial::SerialStream); the demo simulator and tests hand
//! it one end of an in-memory pipe.

use std::future::Future;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWrite};

use super::serial::{list_ports, open_port, select_port};
use super::{LinkConfig, OvenError};

/// Anything the link can talk through
pub trait SerialPortIO: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPortIO for T {}

/// Boxed transport owned by the link manager
pub type DynSerial = Box<dyn SerialPortIO>;

/// Future returned by [`PortProvider::open`]
pub type OpenFuture<'a> = Pin<Box<dyn Future<Output = Result<OpenedPort, OvenError>> + Send + 'a>>;

/// A freshly opened transport and the name of the device behind it
pub struct OpenedPort {
    /// Device name, e.g. `/dev/ttyACM0`
    pub name: String,
    /// The byte stream
    pub io: DynSerial,
}

/// Discovers the oven and opens a transport to it
pub trait PortProvider: Send + Sync {
    /// Find the device and open a transport to it
    fn open<'a>(&'a self, config: &'a LinkConfig) -> OpenFuture<'a>;
}

/// Finds the oven among the host's serial ports
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialPortProvider;

impl PortProvider for SerialPortProvider {
    fn open<'a>(&'a self, config: &'a LinkConfig) -> OpenFuture<'a> {
        let config = config.clone();
        Box::pin(async move {
            // Enumeration and open are blocking calls
            tokio::task::spawn_blocking(move || {
                let ports = list_ports();
                let port = select_port(&ports, &config.vendor_hint)
                    .ok_or_else(|| OvenError::NoDevice(config.vendor_hint.clone()))?;
                tracing::debug!("selected serial device {}", port.identifier());

                let stream = open_port(&port.name, &config)?;
                Ok(OpenedPort {
                    name: port.name.clone(),
                    io: Box::new(stream) as DynSerial,
                })
            })
            .await
            .map_err(|e| OvenError::TransportIo(format!("port discovery task failed: {}", e)))?
        })
    }
}
