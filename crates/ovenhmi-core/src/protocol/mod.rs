//! Serial Protocol Communication
//!
//! Implements the oven controller's single-byte-opcode binary protocol over a
//! half-duplex USB serial link.

mod client;
pub mod codec;
pub mod commands;
mod error;
mod link;
pub mod serial;
pub mod stream;

pub use client::OvenClient;
pub use commands::Command;
pub use error::OvenError;
pub use link::{ConnectionState, LinkConfig, LinkHealth, LinkManager};
pub use serial::{list_ports, open_port, select_port, PortInfo};
pub use stream::{DynSerial, OpenFuture, OpenedPort, PortProvider, SerialPortIO, SerialPortProvider};

/// Default baud rate for oven communication
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default read/write timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Default idle gap that ends a reply, in milliseconds
pub const DEFAULT_RESPONSE_GAP_MS: u64 = 50;

/// Largest reply the firmware can send, bounded by its 64 byte USB packet
pub const MAX_RESPONSE_LEN: usize = 64;

/// The oven is the serial device whose identifier contains this
pub const VENDOR_HINT: &str = "USB";
